//! The simulation engine: builds runtime state from a layout and steps it.
//!
//! # Tick pipeline
//!
//! Each `tick_simulation()` call runs, strictly in order:
//! 1. **Advance** -- crafters and reactors cycle, storage counts toward its
//!    next submission, transit slots move toward the halfway mark.
//! 2. **Negotiate** -- repeated passes plan at most one transfer per sender
//!    lane and one per receiver lane until nothing changes.
//! 3. **Commit** -- planned units leave their senders, then arrive.
//! 4. **Bookkeeping** -- tick counter, minute window and per-minute rates.
//!
//! Devices stalled at start (overlap, no power, bad config) sit out every
//! phase for the whole run.

use crate::config::{ConfigError, SimConfig};
use crate::fixed::{Fixed64, f64_to_fixed64, seconds_to_ticks};
use crate::layout::Layout;
use crate::links::{LinkCache, ResolvedLayout};
use crate::metrics::TickDelta;
use crate::processor::{advance_crafter, cycle_progress};
use crate::reactor::advance_lanes;
use crate::registry::{DeviceKind, Registry};
use crate::runtime::{DeviceRuntime, StallReason};
use crate::sim::{SimState, TickReport};
use crate::storage::{advance_storage, submit_progress};
use crate::transfer::{LaneKey, TickContext, WorkingSet, commit, negotiate};
use crate::transport::{advance_slots, has_slot_below_half, slot_progress, slot_step};
use crate::validation::validate_layout;
use crate::warehouse::Warehouse;
use std::collections::BTreeSet;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Steps a [`SimState`] over a layout. Holds no world state of its own beyond
/// the link cache.
#[derive(Debug)]
pub struct Engine {
    registry: Arc<Registry>,
    config: SimConfig,
    /// Slot progress per tick.
    step: Fixed64,
    submit_interval_ticks: u32,
    pickup_grace_ticks: u32,
    links: LinkCache,
}

impl Engine {
    pub fn new(registry: Arc<Registry>, config: SimConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let hz = config.tick_rate_hz;
        let grace = config.pickup_blocked_grace_seconds;
        Ok(Self {
            step: slot_step(config.seconds_per_cell, hz),
            submit_interval_ticks: seconds_to_ticks(
                f64_to_fixed64(config.storage_submit_interval_seconds),
                hz,
            ),
            pickup_grace_ticks: if grace == 0.0 {
                0
            } else {
                seconds_to_ticks(f64_to_fixed64(grace), hz)
            },
            registry,
            config,
            links: LinkCache::new(),
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn link_cache(&self) -> &LinkCache {
        &self.links
    }

    /// Links for `layout`, served from the cache when the `Arc` is unchanged.
    pub fn resolved_layout(&mut self, layout: &Arc<Layout>) -> Arc<ResolvedLayout> {
        self.links.get(&self.registry, layout)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Build a running state for `layout`. The incoming state is discarded.
    pub fn start_simulation(&mut self, layout: &Arc<Layout>, _previous: SimState) -> SimState {
        let resolved = self.links.get(&self.registry, layout);
        let validation = validate_layout(&self.registry, layout, &resolved);

        let mut next = SimState::new(self.config.tick_rate_hz);
        for device in &resolved.devices {
            let Some(def) = self.registry.get_device(device.type_id) else {
                continue;
            };
            let mut runtime = DeviceRuntime::for_device(def, &device.config, &device.recipes);
            runtime.status_mut().stall_reason = validation.sticky_reason(&device.instance_id);
            next.runtime_by_id
                .insert(device.instance_id.clone(), Arc::new(runtime));
        }
        next.warehouse = Warehouse::from_config(&self.config.warehouse);
        next.validation = validation;
        next.is_running = true;

        log::debug!(
            "simulation started: {} devices, {} links, {} validation issues",
            resolved.devices.len(),
            resolved.links.len(),
            next.validation.issues.len()
        );
        next
    }

    /// End the run. Returns a fresh, stopped state.
    pub fn stop_simulation(&self, state: SimState) -> SimState {
        log::debug!("simulation stopped at tick {}", state.tick);
        SimState::new(self.config.tick_rate_hz)
    }

    /// Advance a running state by one tick. A stopped state comes back as is.
    pub fn tick_simulation(&mut self, layout: &Arc<Layout>, state: SimState) -> SimState {
        if !state.is_running {
            return state;
        }
        let resolved = self.links.get(&self.registry, layout);
        let mut state = state;
        let ctx = TickContext {
            registry: &self.registry,
            resolved: &resolved,
            tick: state.tick,
            step: self.step,
            pickup_grace_ticks: self.pickup_grace_ticks,
        };

        let mut rts = WorkingSet::take_from(&mut state.runtime_by_id, &resolved);
        let mut delta = TickDelta::default();

        let advanced = advance_devices(
            &ctx,
            self.config.tick_rate_hz,
            self.submit_interval_ticks,
            &mut rts,
            &mut state.warehouse,
            &mut delta,
        );
        let negotiation = negotiate(&ctx, &mut rts, &state.warehouse, advanced);
        let committed = commit(
            &ctx,
            &mut rts,
            &mut state.warehouse,
            &mut delta,
            &negotiation.plans,
        );
        refresh_progress(
            &ctx,
            self.config.tick_rate_hz,
            self.submit_interval_ticks,
            &mut rts,
        );
        rts.restore_into(&mut state.runtime_by_id, &resolved);

        state.tick += 1;
        state.window.push(delta);
        state.stats = state.window.stats();
        log::trace!(
            "tick {}: {} transfers in {} passes",
            state.tick,
            committed.len(),
            negotiation.passes
        );
        state.last_tick = TickReport {
            plans: committed,
            passes: negotiation.passes,
            settled: negotiation.settled,
        };
        state
    }
}

// ---------------------------------------------------------------------------
// Advance phase
// ---------------------------------------------------------------------------

/// Internal progress for every non-sticky device. Returns the slot lanes that
/// moved, so negotiation does not move them again.
fn advance_devices(
    ctx: &TickContext<'_>,
    tick_rate_hz: u32,
    submit_interval_ticks: u32,
    rts: &mut WorkingSet,
    warehouse: &mut Warehouse,
    delta: &mut TickDelta,
) -> BTreeSet<LaneKey> {
    let mut advanced = BTreeSet::new();

    for (d, device) in ctx.resolved.devices.iter().enumerate() {
        let Some(rt) = rts.get(d) else {
            continue;
        };
        let reason = rt.stall_reason();
        if reason.is_sticky() {
            continue;
        }
        let Some(def) = ctx.registry.get_device(device.type_id) else {
            continue;
        };

        // Idle belts and pickups are left shared with the previous state.
        let idle = match &device.kind {
            DeviceKind::Conveyor | DeviceKind::Junction(_) => !has_slot_below_half(rt),
            DeviceKind::Pickup => true,
            _ => false,
        };
        if idle && reason == StallReason::None {
            continue;
        }
        let Some(rt) = rts.get_mut(d) else {
            continue;
        };
        rt.status_mut().stall_reason = StallReason::None;

        match (&device.kind, rt) {
            (DeviceKind::Conveyor | DeviceKind::Junction(_), rt) => {
                for lane in advance_slots(rt, ctx.step) {
                    advanced.insert(LaneKey::new(d, lane));
                }
            }
            (DeviceKind::Crafter, DeviceRuntime::Processor(p)) => {
                advance_crafter(
                    p,
                    ctx.registry,
                    &device.recipes,
                    def.output_capacity,
                    tick_rate_hz,
                    ctx.tick,
                );
            }
            (DeviceKind::Reactor { slot_capacity, .. }, DeviceRuntime::Processor(p)) => {
                advance_lanes(p, ctx.registry, *slot_capacity, tick_rate_hz, ctx.tick);
            }
            (DeviceKind::Storage { .. }, DeviceRuntime::Storage(s)) => {
                advance_storage(
                    s,
                    submit_interval_ticks,
                    device.config.submit_to_warehouse,
                    warehouse,
                    delta,
                );
            }
            _ => {}
        }
    }
    advanced
}

/// Refresh the display progress of every device that changed.
fn refresh_progress(
    ctx: &TickContext<'_>,
    tick_rate_hz: u32,
    submit_interval_ticks: u32,
    rts: &mut WorkingSet,
) {
    for (d, device) in ctx.resolved.devices.iter().enumerate() {
        let Some(rt) = rts.get(d) else {
            continue;
        };
        let progress = match (&device.kind, rt) {
            (DeviceKind::Crafter, DeviceRuntime::Processor(p)) => {
                cycle_progress(p, ctx.registry, tick_rate_hz)
            }
            (DeviceKind::Reactor { .. }, DeviceRuntime::Processor(p)) => p
                .reactor_lanes
                .iter()
                .filter(|lane| lane.active)
                .filter_map(|lane| {
                    let recipe = ctx.registry.get_recipe(lane.recipe)?;
                    let duration = seconds_to_ticks(recipe.seconds, tick_rate_hz);
                    Some(
                        Fixed64::from_num(lane.cycle_progress_ticks)
                            / Fixed64::from_num(duration),
                    )
                })
                .max()
                .unwrap_or(Fixed64::ZERO),
            (_, DeviceRuntime::Storage(s)) => submit_progress(s, submit_interval_ticks),
            (_, DeviceRuntime::Conveyor(_) | DeviceRuntime::Junction(_)) => slot_progress(rt),
            _ => Fixed64::ZERO,
        };
        if rt.status().progress01 != progress {
            if let Some(rt) = rts.get_mut(d) {
                rt.status_mut().progress01 = progress;
            }
        }
    }
}
