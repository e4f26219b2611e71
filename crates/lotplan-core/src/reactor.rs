//! Reactor pool: a processor running up to two recipes side by side over a
//! shared, slot-bounded item pool.
//!
//! The pool is the processor's `input_buffer` (counts) together with
//! `input_slot_items` (which item each slot is bound to). An item occupies at
//! most one slot; a slot frees up when its count drops to zero. Batches are
//! all-or-nothing.

use crate::fixed::seconds_to_ticks;
use crate::id::{ItemTypeId, RecipeId};
use crate::registry::Registry;
use crate::runtime::{ProcessorRuntime, StallReason, add_units, take_units};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Reactors run at most this many recipes at once.
pub const MAX_REACTOR_LANES: usize = 2;

/// One recipe lane of a reactor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactorLane {
    pub recipe: RecipeId,
    pub cycle_progress_ticks: u32,
    pub active: bool,
}

impl ReactorLane {
    pub fn new(recipe: RecipeId) -> Self {
        Self {
            recipe,
            cycle_progress_ticks: 0,
            active: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Pool operations
// ---------------------------------------------------------------------------

fn bound_slot(p: &ProcessorRuntime, item: ItemTypeId) -> Option<usize> {
    p.input_slot_items.iter().position(|s| *s == Some(item))
}

fn free_slot(p: &ProcessorRuntime) -> Option<usize> {
    p.input_slot_items.iter().position(Option::is_none)
}

/// Whether `qty` more units of `item` fit in the pool.
pub fn pool_can_accept(p: &ProcessorRuntime, item: ItemTypeId, qty: u32, slot_capacity: u32) -> bool {
    let held = p.input_buffer.get(&item).copied().unwrap_or(0);
    match bound_slot(p, item) {
        Some(_) => held.saturating_add(qty) <= slot_capacity,
        None => free_slot(p).is_some() && qty <= slot_capacity,
    }
}

/// Deposit every entry of `batch` or none of them.
pub fn pool_deposit_batch(
    p: &mut ProcessorRuntime,
    batch: &[(ItemTypeId, u32)],
    slot_capacity: u32,
) -> bool {
    let mut staged = p.clone();
    for &(item, qty) in batch {
        if !pool_can_accept(&staged, item, qty, slot_capacity) {
            return false;
        }
        if bound_slot(&staged, item).is_none() {
            match free_slot(&staged) {
                Some(slot) => staged.input_slot_items[slot] = Some(item),
                None => return false,
            }
        }
        add_units(&mut staged.input_buffer, item, qty);
    }
    p.input_buffer = staged.input_buffer;
    p.input_slot_items = staged.input_slot_items;
    true
}

/// Remove `qty` units of `item`, unbinding its slot when it empties.
pub fn pool_withdraw(p: &mut ProcessorRuntime, item: ItemTypeId, qty: u32) -> bool {
    if !take_units(&mut p.input_buffer, item, qty) {
        return false;
    }
    if !p.input_buffer.contains_key(&item) {
        if let Some(slot) = bound_slot(p, item) {
            p.input_slot_items[slot] = None;
        }
    }
    true
}

/// Items a reactor may send out: outputs of its lane recipes that no lane
/// consumes, and that the pool currently holds.
pub fn sendable_items(p: &ProcessorRuntime, registry: &Registry) -> Vec<ItemTypeId> {
    let recipes: Vec<RecipeId> = p.reactor_lanes.iter().map(|l| l.recipe).collect();
    let inputs = registry.recipe_inputs(&recipes);
    let outputs: BTreeSet<ItemTypeId> = registry.recipe_outputs(&recipes);
    outputs
        .into_iter()
        .filter(|item| !inputs.contains(item) && p.input_buffer.contains_key(item))
        .collect()
}

// ---------------------------------------------------------------------------
// Lane advancement
// ---------------------------------------------------------------------------

/// Advance every lane by one tick. Lanes start when the pool holds their
/// inputs, and finish by depositing their outputs back into the pool.
pub fn advance_lanes(
    p: &mut ProcessorRuntime,
    registry: &Registry,
    slot_capacity: u32,
    tick_rate_hz: u32,
    tick: u64,
) {
    let mut any_running = false;
    let mut any_blocked = false;

    for i in 0..p.reactor_lanes.len() {
        let recipe_id = p.reactor_lanes[i].recipe;
        let Some(recipe) = registry.get_recipe(recipe_id) else {
            continue;
        };

        if !p.reactor_lanes[i].active {
            let has_inputs = recipe
                .inputs
                .iter()
                .all(|e| p.input_buffer.get(&e.item).copied().unwrap_or(0) >= e.quantity);
            if !has_inputs {
                continue;
            }
            for entry in &recipe.inputs {
                pool_withdraw(p, entry.item, entry.quantity);
            }
            p.reactor_lanes[i].active = true;
            p.reactor_lanes[i].cycle_progress_ticks = 0;
        }

        any_running = true;
        let duration = seconds_to_ticks(recipe.seconds, tick_rate_hz);
        let lane = &mut p.reactor_lanes[i];
        if lane.cycle_progress_ticks < duration {
            lane.cycle_progress_ticks += 1;
        }
        if lane.cycle_progress_ticks < duration {
            continue;
        }

        let batch: Vec<(ItemTypeId, u32)> =
            recipe.outputs.iter().map(|e| (e.item, e.quantity)).collect();
        if pool_deposit_batch(p, &batch, slot_capacity) {
            let lane = &mut p.reactor_lanes[i];
            lane.active = false;
            lane.cycle_progress_ticks = 0;
            p.produced_items_total += batch.iter().map(|&(_, q)| u64::from(q)).sum::<u64>();
            p.last_completed_cycle_ticks = duration;
            p.last_completion_tick = Some(tick);
        } else {
            any_blocked = true;
        }
    }

    p.status.stall_reason = if any_blocked {
        StallReason::OutputBlocked
    } else if !any_running {
        StallReason::NoInput
    } else {
        StallReason::None
    };
}
