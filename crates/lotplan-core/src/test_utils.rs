//! Shared test helpers for unit tests, integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::config::SimConfig;
use crate::engine::Engine;
use crate::fixed::Fixed64;
use crate::geometry::{CellPos, Edge, Footprint, Rotation};
use crate::id::*;
use crate::layout::{DeviceInstance, Layout};
use crate::registry::*;
use crate::sim::{SimState, create_initial_sim_state};
use std::sync::Arc;

// ===========================================================================
// Fixed-point helper
// ===========================================================================

pub fn fixed(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

// ===========================================================================
// Items
// ===========================================================================

pub fn ore() -> ItemTypeId {
    ItemTypeId(0)
}
pub fn ingot() -> ItemTypeId {
    ItemTypeId(1)
}
/// Liquid.
pub fn water() -> ItemTypeId {
    ItemTypeId(2)
}
pub fn crystal() -> ItemTypeId {
    ItemTypeId(3)
}
/// Liquid.
pub fn solution() -> ItemTypeId {
    ItemTypeId(4)
}

// ===========================================================================
// Fixture registry
// ===========================================================================

/// A small content set covering every device kind.
///
/// | device        | kind                  | ports                                  |
/// |---------------|-----------------------|----------------------------------------|
/// | `miner`       | crafter, `mine_ore`   | out E                                  |
/// | `smelter`     | crafter, powered      | in W (ore), out E (ingot)              |
/// | `conveyor`    | conveyor              | in W, out E                            |
/// | `pipe`        | liquid conveyor       | in W, out E                            |
/// | `splitter`    | junction              | in W, out N/E/S                        |
/// | `merger`      | junction              | in W/N/S, out E                        |
/// | `bridge`      | junction              | in and out on every edge               |
/// | `storage_box` | storage, 50           | in W, out E                            |
/// | `tank`        | liquid storage, 50    | in W, out E                            |
/// | `pickup_port` | pickup                | out E                                  |
/// | `liquid_pickup` | liquid pickup       | out E                                  |
/// | `hub`         | 3x3 storage, power 8  | none                                   |
/// | `reactor`     | 2x2 reactor, powered  | solid in W, liquid in N, solid out E, liquid out S |
pub fn fixture_registry() -> Registry {
    let mut b = RegistryBuilder::new();

    let ore = b.register_item("ore", PhysicalState::Solid);
    let ingot = b.register_item("ingot", PhysicalState::Solid);
    let water = b.register_item("water", PhysicalState::Liquid);
    let crystal = b.register_item("crystal", PhysicalState::Solid);
    let solution = b.register_item("solution", PhysicalState::Liquid);

    let mine = b.register_recipe("mine_ore", vec![], vec![RecipeEntry::new(ore, 1)], fixed(1.0));
    let smelt = b.register_recipe(
        "smelt",
        vec![RecipeEntry::new(ore, 1)],
        vec![RecipeEntry::new(ingot, 1)],
        fixed(1.0),
    );
    let dissolve = b.register_recipe(
        "dissolve",
        vec![RecipeEntry::new(crystal, 1), RecipeEntry::new(water, 1)],
        vec![RecipeEntry::new(solution, 1)],
        fixed(2.0),
    );
    let refine = b.register_recipe(
        "refine",
        vec![RecipeEntry::new(ore, 1)],
        vec![RecipeEntry::new(crystal, 1)],
        fixed(1.0),
    );

    b.register_device(
        DeviceTypeDef::new("miner", DeviceKind::Crafter, Footprint::single())
            .with_port(PortDef::output(0, 0, Edge::East).with_items(ItemFilter::RecipeOutputs))
            .with_recipes(vec![mine])
            .with_buffers(0, 2),
    );
    b.register_device(
        DeviceTypeDef::new("smelter", DeviceKind::Crafter, Footprint::single())
            .with_port(PortDef::input(0, 0, Edge::West).with_items(ItemFilter::RecipeInputs))
            .with_port(PortDef::output(0, 0, Edge::East).with_items(ItemFilter::RecipeOutputs))
            .with_recipes(vec![smelt])
            .with_buffers(10, 2)
            .powered(),
    );
    b.register_device(
        DeviceTypeDef::new("conveyor", DeviceKind::Conveyor, Footprint::single())
            .with_port(PortDef::input(0, 0, Edge::West))
            .with_port(PortDef::output(0, 0, Edge::East)),
    );
    b.register_device(
        DeviceTypeDef::new("pipe", DeviceKind::Conveyor, Footprint::single())
            .with_port(PortDef::input(0, 0, Edge::West).liquid())
            .with_port(PortDef::output(0, 0, Edge::East).liquid()),
    );
    b.register_device(
        DeviceTypeDef::new(
            "splitter",
            DeviceKind::Junction(JunctionKind::Splitter),
            Footprint::single(),
        )
        .with_port(PortDef::input(0, 0, Edge::West))
        .with_port(PortDef::output(0, 0, Edge::North))
        .with_port(PortDef::output(0, 0, Edge::East))
        .with_port(PortDef::output(0, 0, Edge::South)),
    );
    b.register_device(
        DeviceTypeDef::new(
            "merger",
            DeviceKind::Junction(JunctionKind::Merger),
            Footprint::single(),
        )
        .with_port(PortDef::input(0, 0, Edge::West))
        .with_port(PortDef::input(0, 0, Edge::North))
        .with_port(PortDef::input(0, 0, Edge::South))
        .with_port(PortDef::output(0, 0, Edge::East)),
    );
    let mut bridge = DeviceTypeDef::new(
        "bridge",
        DeviceKind::Junction(JunctionKind::Bridge),
        Footprint::single(),
    );
    for edge in Edge::all() {
        bridge = bridge
            .with_port(PortDef::input(0, 0, edge))
            .with_port(PortDef::output(0, 0, edge));
    }
    b.register_device(bridge);
    b.register_device(
        DeviceTypeDef::new("storage_box", DeviceKind::Storage { capacity: 50 }, Footprint::single())
            .with_port(PortDef::input(0, 0, Edge::West))
            .with_port(PortDef::output(0, 0, Edge::East)),
    );
    b.register_device(
        DeviceTypeDef::new("tank", DeviceKind::Storage { capacity: 50 }, Footprint::single())
            .with_port(PortDef::input(0, 0, Edge::West).liquid())
            .with_port(PortDef::output(0, 0, Edge::East).liquid()),
    );
    b.register_device(
        DeviceTypeDef::new("pickup_port", DeviceKind::Pickup, Footprint::single())
            .with_port(PortDef::output(0, 0, Edge::East).with_items(ItemFilter::PickupItem)),
    );
    b.register_device(
        DeviceTypeDef::new("liquid_pickup", DeviceKind::Pickup, Footprint::single()).with_port(
            PortDef::output(0, 0, Edge::East)
                .with_items(ItemFilter::PickupItem)
                .liquid(),
        ),
    );
    b.register_device(
        DeviceTypeDef::new("hub", DeviceKind::Storage { capacity: 500 }, Footprint::new(3, 3))
            .power_source(8),
    );
    b.register_device(
        DeviceTypeDef::new(
            "reactor",
            DeviceKind::Reactor {
                pool_slots: 3,
                slot_capacity: 10,
            },
            Footprint::new(2, 2),
        )
        .with_port(PortDef::input(0, 0, Edge::West).with_items(ItemFilter::RecipeInputs))
        .with_port(
            PortDef::input(0, 0, Edge::North)
                .with_items(ItemFilter::RecipeInputs)
                .liquid(),
        )
        .with_port(PortDef::output(1, 0, Edge::East).with_items(ItemFilter::RecipeOutputs))
        .with_port(
            PortDef::output(1, 1, Edge::South)
                .with_items(ItemFilter::RecipeOutputs)
                .liquid(),
        )
        .with_recipes(vec![refine, dissolve])
        .powered(),
    );

    b.build().expect("fixture registry is valid")
}

pub fn device_type(registry: &Registry, name: &str) -> DeviceTypeId {
    registry
        .device_id(name)
        .unwrap_or_else(|| panic!("fixture has no device type {name}"))
}

pub fn pipe_type(registry: &Registry) -> DeviceTypeId {
    device_type(registry, "pipe")
}

// ===========================================================================
// Layout helpers
// ===========================================================================

/// Fixture device type ids are stable, so these helpers skip the registry.
fn fixture_device(name: &str) -> DeviceTypeId {
    device_type(&fixture_registry(), name)
}

pub fn belt(id: &str, x: i32, y: i32, rotation: Rotation) -> DeviceInstance {
    DeviceInstance::new(id, fixture_device("conveyor"), CellPos::new(x, y)).rotated(rotation)
}

pub fn splitter(id: &str, x: i32, y: i32) -> DeviceInstance {
    DeviceInstance::new(id, fixture_device("splitter"), CellPos::new(x, y))
}

pub fn merger(id: &str, x: i32, y: i32) -> DeviceInstance {
    DeviceInstance::new(id, fixture_device("merger"), CellPos::new(x, y))
}

pub fn bridge(id: &str, x: i32, y: i32) -> DeviceInstance {
    DeviceInstance::new(id, fixture_device("bridge"), CellPos::new(x, y))
}

pub fn storage_box(id: &str, x: i32, y: i32) -> DeviceInstance {
    DeviceInstance::new(id, fixture_device("storage_box"), CellPos::new(x, y))
}

pub fn miner(id: &str, x: i32, y: i32) -> DeviceInstance {
    DeviceInstance::new(id, fixture_device("miner"), CellPos::new(x, y))
}

pub fn pickup(id: &str, registry: &Registry, x: i32, y: i32, item: ItemTypeId) -> DeviceInstance {
    DeviceInstance::new(id, device_type(registry, "pickup_port"), CellPos::new(x, y))
        .with_pickup_item(item)
}

pub fn hub(id: &str, x: i32, y: i32) -> DeviceInstance {
    DeviceInstance::new(id, fixture_device("hub"), CellPos::new(x, y))
}

/// Miner at (0,0) feeding belt `belt` at (1,0) into storage `box` at (2,0).
pub fn simple_belt_layout() -> Layout {
    Layout::new(8)
        .with_device(miner("miner", 0, 0))
        .with_device(belt("belt", 1, 0, Rotation::R0))
        .with_device(storage_box("box", 2, 0))
}

// ===========================================================================
// Engine helpers
// ===========================================================================

pub fn engine_with(config: SimConfig, layout: Layout) -> (Engine, Arc<Layout>) {
    engine_with_registry(fixture_registry(), config, layout)
}

pub fn engine_with_registry(
    registry: Registry,
    config: SimConfig,
    layout: Layout,
) -> (Engine, Arc<Layout>) {
    let engine = Engine::new(Arc::new(registry), config).expect("valid test config");
    (engine, Arc::new(layout))
}

/// Start `layout` and return the running state.
pub fn started(engine: &mut Engine, layout: &Arc<Layout>) -> SimState {
    engine.start_simulation(layout, create_initial_sim_state())
}

/// Run `ticks` ticks.
pub fn run(engine: &mut Engine, layout: &Arc<Layout>, mut state: SimState, ticks: u64) -> SimState {
    for _ in 0..ticks {
        state = engine.tick_simulation(layout, state);
    }
    state
}

/// Units of `item` in storage device `id`.
pub fn storage_count(state: &SimState, id: &str, item: ItemTypeId) -> u32 {
    state
        .runtime(id)
        .and_then(|rt| rt.as_storage())
        .and_then(|s| s.inventory.get(&item).copied())
        .unwrap_or(0)
}
