//! Simulation state and frame pacing.
//!
//! [`SimState`] is the whole mutable world of a run, threaded through the
//! engine by value. Runtime records sit behind `Arc`, so cloning a state is
//! cheap and a kept clone never sees later ticks.

use crate::engine::Engine;
use crate::fixed::{Fixed64, Ticks};
use crate::id::{InstanceId, ItemTypeId};
use crate::layout::Layout;
use crate::metrics::{MinuteWindow, ThroughputStats};
use crate::runtime::{DeviceRuntime, ItemCounts, Lane, StallReason, add_units};
use crate::transfer::TransferPlan;
use crate::validation::ValidationReport;
use crate::warehouse::{Stock, Warehouse};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Simulation state
// ---------------------------------------------------------------------------

/// What the last tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    /// Transfers committed, in plan order.
    pub plans: Vec<TransferPlan>,
    /// Negotiation passes run.
    pub passes: u32,
    /// Negotiation reached a fixed point rather than the pass cap.
    pub settled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimState {
    pub is_running: bool,
    /// Ticks run since start.
    pub tick: Ticks,
    pub tick_rate_hz: u32,
    pub runtime_by_id: BTreeMap<InstanceId, Arc<DeviceRuntime>>,
    pub warehouse: Warehouse,
    pub stats: ThroughputStats,
    pub window: MinuteWindow,
    pub validation: ValidationReport,
    pub last_tick: TickReport,
}

/// A fresh, stopped state.
pub fn create_initial_sim_state() -> SimState {
    SimState::new(20)
}

impl SimState {
    pub fn new(tick_rate_hz: u32) -> Self {
        Self {
            is_running: false,
            tick: 0,
            tick_rate_hz,
            runtime_by_id: BTreeMap::new(),
            warehouse: Warehouse::default(),
            stats: ThroughputStats::default(),
            window: MinuteWindow::new(tick_rate_hz),
            validation: ValidationReport::default(),
            last_tick: TickReport::default(),
        }
    }

    /// Simulated seconds since start.
    pub fn simulated_seconds(&self) -> f64 {
        self.tick as f64 / f64::from(self.tick_rate_hz.max(1))
    }

    pub fn runtime(&self, id: &str) -> Option<&DeviceRuntime> {
        self.runtime_by_id.get(&InstanceId::new(id)).map(|rt| rt.as_ref())
    }

    pub fn stall_reason(&self, id: &str) -> Option<StallReason> {
        self.runtime(id).map(DeviceRuntime::stall_reason)
    }

    /// Every unit held by any device.
    pub fn held_items(&self) -> ItemCounts {
        let mut counts = ItemCounts::new();
        for rt in self.runtime_by_id.values() {
            for (item, n) in rt.item_counts() {
                add_units(&mut counts, item, n);
            }
        }
        counts
    }

    /// Units of `item` held by devices plus finite warehouse stock.
    pub fn total_units_of(&self, item: ItemTypeId) -> u64 {
        let held = self
            .runtime_by_id
            .values()
            .map(|rt| u64::from(rt.item_counts().get(&item).copied().unwrap_or(0)))
            .sum::<u64>();
        let stocked = match self.warehouse.available(item) {
            Stock::Finite(v) => v,
            Stock::Infinite => 0,
        };
        held + stocked
    }

    /// Deterministic hash of the world, for comparing runs.
    pub fn state_hash(&self) -> u64 {
        let mut h = StateHash::new();
        h.write_u64(self.tick);
        for (id, rt) in &self.runtime_by_id {
            h.write(id.as_str().as_bytes());
            h.write_u32(rt.stall_reason() as u32);
            for (item, n) in rt.item_counts() {
                h.write_u32(item.0);
                h.write_u32(n);
            }
            for lane in [Lane::Slot, Lane::Ns, Lane::We] {
                if let Some(Some(slot)) = rt.slot(lane) {
                    h.write_fixed64(slot.progress01);
                }
            }
            if let Some(p) = rt.as_processor() {
                h.write_u32(p.cycle_progress_ticks);
            }
        }
        for (item, stock) in self.warehouse.iter() {
            h.write_u32(item.0);
            match stock {
                Stock::Finite(v) => h.write_u64(v),
                Stock::Infinite => h.write_u64(u64::MAX),
            }
        }
        h.finish()
    }
}

impl Default for SimState {
    fn default() -> Self {
        create_initial_sim_state()
    }
}

// ---------------------------------------------------------------------------
// Frame driver
// ---------------------------------------------------------------------------

/// Result of one [`FrameDriver::advance`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameResult {
    pub ticks_run: u32,
    /// Whole ticks of elapsed time discarded by the per-frame cap.
    pub dropped_ticks: u64,
}

/// Turns wall-clock frame time into whole ticks.
#[derive(Debug, Clone)]
pub struct FrameDriver {
    accumulator: f64,
    max_ticks_per_frame: u32,
}

impl FrameDriver {
    pub fn new(max_ticks_per_frame: u32) -> Self {
        Self {
            accumulator: 0.0,
            max_ticks_per_frame: max_ticks_per_frame.max(1),
        }
    }

    /// Run as many ticks as `elapsed_seconds` covers, up to the frame cap.
    /// Leftover time under one tick carries over; time beyond the cap is dropped.
    pub fn advance(
        &mut self,
        engine: &mut Engine,
        layout: &Arc<Layout>,
        mut state: SimState,
        elapsed_seconds: f64,
    ) -> (SimState, FrameResult) {
        if !state.is_running || elapsed_seconds.is_nan() || elapsed_seconds <= 0.0 {
            return (state, FrameResult::default());
        }
        let dt = 1.0 / f64::from(state.tick_rate_hz.max(1));
        self.accumulator += elapsed_seconds;
        let due = (self.accumulator / dt).floor();
        self.accumulator -= due * dt;

        let due = due as u64;
        let ticks_run = due.min(u64::from(self.max_ticks_per_frame)) as u32;
        for _ in 0..ticks_run {
            state = engine.tick_simulation(layout, state);
        }
        let result = FrameResult {
            ticks_run,
            dropped_ticks: due - u64::from(ticks_run),
        };
        if result.dropped_ticks > 0 {
            log::debug!("frame cap hit; dropped {} ticks", result.dropped_ticks);
        }
        (state, result)
    }

    /// Time carried into the next frame, in seconds.
    pub fn carried_seconds(&self) -> f64 {
        self.accumulator
    }
}

// ---------------------------------------------------------------------------
// State hash
// ---------------------------------------------------------------------------

/// FNV-1a (64-bit) over the state's observable fields. Not cryptographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHash(pub u64);

impl StateHash {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    pub fn new() -> Self {
        Self(Self::FNV_OFFSET)
    }

    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(Self::FNV_PRIME);
        }
    }

    pub fn write_u64(&mut self, v: u64) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_fixed64(&mut self, v: Fixed64) {
        self.write(&v.to_bits().to_le_bytes());
    }

    pub fn finish(self) -> u64 {
        self.0
    }
}

impl Default for StateHash {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::geometry::Rotation;
    use crate::test_utils::*;

    #[test]
    fn initial_state_is_stopped() {
        let state = create_initial_sim_state();
        assert!(!state.is_running);
        assert_eq!(state.tick, 0);
        assert!(state.runtime_by_id.is_empty());
        assert_eq!(state.simulated_seconds(), 0.0);
    }

    #[test]
    fn simulated_seconds_follow_tick_rate() {
        let mut state = SimState::new(10);
        state.tick = 25;
        assert_eq!(state.simulated_seconds(), 2.5);
    }

    #[test]
    fn hash_order_matters() {
        let mut h1 = StateHash::new();
        h1.write_u32(1);
        h1.write_u32(2);
        let mut h2 = StateHash::new();
        h2.write_u32(2);
        h2.write_u32(1);
        assert_ne!(h1.finish(), h2.finish());
    }

    #[test]
    fn frame_driver_carries_remainder() {
        let config = SimConfig {
            tick_rate_hz: 10,
            ..Default::default()
        };
        let (mut engine, layout) = engine_with(config, belt_layout());
        let state = engine.start_simulation(&layout, create_initial_sim_state());
        let mut driver = FrameDriver::new(8);

        let (state, result) = driver.advance(&mut engine, &layout, state, 0.25);
        assert_eq!(result.ticks_run, 2);
        assert!((driver.carried_seconds() - 0.05).abs() < 1e-9);
        let (state, result) = driver.advance(&mut engine, &layout, state, 0.06);
        assert_eq!(result.ticks_run, 1);
        assert_eq!(state.tick, 3);
    }

    #[test]
    fn frame_driver_caps_and_drops() {
        let config = SimConfig {
            tick_rate_hz: 10,
            ..Default::default()
        };
        let (mut engine, layout) = engine_with(config, belt_layout());
        let state = engine.start_simulation(&layout, create_initial_sim_state());
        let mut driver = FrameDriver::new(4);
        let (state, result) = driver.advance(&mut engine, &layout, state, 1.0);
        assert_eq!(result.ticks_run, 4);
        assert_eq!(result.dropped_ticks, 6);
        assert_eq!(state.tick, 4);
    }

    #[test]
    fn stopped_state_does_not_advance() {
        let (mut engine, layout) = engine_with(
            SimConfig::default(),
            belt_layout(),
        );
        let mut driver = FrameDriver::new(4);
        let (state, result) = driver.advance(&mut engine, &layout, create_initial_sim_state(), 1.0);
        assert_eq!(result, FrameResult::default());
        assert_eq!(state.tick, 0);
    }

    fn belt_layout() -> Layout {
        Layout::new(8).with_device(belt("b", 0, 0, Rotation::R0))
    }
}
