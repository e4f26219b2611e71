//! Criterion benchmarks for the lotplan tick pipeline.
//!
//! Two benchmark groups:
//! - `belt_lines`: 32 rows of 30 belts, each fed by a pickup and drained into
//!   storage -- measures negotiation over long chains
//! - `crafting_rows`: miners feeding powered smelters through short belts

use criterion::{Criterion, criterion_group, criterion_main};
use lotplan_core::config::SimConfig;
use lotplan_core::geometry::{CellPos, Rotation};
use lotplan_core::layout::{DeviceInstance, Layout};
use lotplan_core::test_utils::*;
use lotplan_core::warehouse::WarehouseConfig;

// ===========================================================================
// Layout builders
// ===========================================================================

fn build_belt_lines(rows: i32, length: i32) -> Layout {
    let reg = fixture_registry();
    let mut layout = Layout::new((length + 2).max(rows) as u32);
    for y in 0..rows {
        layout.push(pickup(&format!("p{y}"), &reg, 0, y, ore()));
        for x in 1..=length {
            layout.push(belt(&format!("b{y}_{x}"), x, y, Rotation::R0));
        }
        layout.push(storage_box(&format!("s{y}"), length + 1, y));
    }
    layout
}

fn build_crafting_rows(rows: i32) -> Layout {
    let reg = fixture_registry();
    let smelter = device_type(&reg, "smelter");
    let mut layout = Layout::new(32).with_device(hub("hub", 0, 0));
    for y in 3..3 + rows {
        layout.push(miner(&format!("m{y}"), 3, y));
        layout.push(belt(&format!("b{y}"), 4, y, Rotation::R0));
        layout.push(DeviceInstance::new(
            format!("s{y}"),
            smelter,
            CellPos::new(5, y),
        ));
        layout.push(belt(&format!("o{y}"), 6, y, Rotation::R0));
        layout.push(storage_box(&format!("box{y}"), 7, y));
    }
    layout
}

fn config() -> SimConfig {
    SimConfig {
        warehouse: WarehouseConfig {
            infinite_items: vec![ore()],
            initial_stock: Vec::new(),
        },
        ..Default::default()
    }
}

// ===========================================================================
// Benchmarks
// ===========================================================================

fn bench_belt_lines(c: &mut Criterion) {
    let (mut engine, layout) = engine_with(config(), build_belt_lines(32, 30));
    let state = started(&mut engine, &layout);
    // Fill the belts before measuring.
    let mut state = run(&mut engine, &layout, state, 400);

    c.bench_function("belt_lines_tick", |b| {
        b.iter(|| {
            state = engine.tick_simulation(&layout, std::mem::take(&mut state));
        })
    });
}

fn bench_crafting_rows(c: &mut Criterion) {
    let (mut engine, layout) = engine_with(config(), build_crafting_rows(6));
    let state = started(&mut engine, &layout);
    let mut state = run(&mut engine, &layout, state, 200);

    c.bench_function("crafting_rows_tick", |b| {
        b.iter(|| {
            state = engine.tick_simulation(&layout, std::mem::take(&mut state));
        })
    });
}

criterion_group!(benches, bench_belt_lines, bench_crafting_rows);
criterion_main!(benches);
