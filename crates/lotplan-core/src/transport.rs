//! Item movement across a cell.
//!
//! A slot's progress runs from 0 to 1. The first half happens on its own
//! during the advance phase; the second half only moves while a downstream
//! device is able to take the item, and at most once per tick.

use crate::fixed::{Fixed64, HALF, approach, clamp01, f64_to_fixed64};
use crate::runtime::{DeviceRuntime, Lane, SlotData};

/// Progress per tick for an item crossing one cell in `seconds_per_cell`.
pub fn slot_step(seconds_per_cell: f64, tick_rate_hz: u32) -> Fixed64 {
    let ticks_per_cell = f64_to_fixed64(seconds_per_cell) * Fixed64::from_num(tick_rate_hz.max(1));
    if ticks_per_cell <= Fixed64::ZERO {
        return Fixed64::ONE;
    }
    clamp01(Fixed64::ONE / ticks_per_cell)
}

/// Move a slot toward the halfway mark. Returns true if it moved.
pub fn advance_to_half(slot: &mut SlotData, step: Fixed64) -> bool {
    if !slot.is_below_half() {
        return false;
    }
    slot.progress01 = approach(slot.progress01, step, HALF);
    true
}

/// Move a slot toward arrival.
pub fn advance_to_end(slot: &mut SlotData, step: Fixed64) {
    slot.progress01 = approach(slot.progress01, step, Fixed64::ONE);
}

/// Advance every occupied slot below half. Returns the lanes that moved.
pub fn advance_slots(runtime: &mut DeviceRuntime, step: Fixed64) -> Vec<Lane> {
    let mut moved = Vec::new();
    for lane in [Lane::Slot, Lane::Ns, Lane::We] {
        if let Some(Some(slot)) = runtime.slot_mut(lane) {
            if advance_to_half(slot, step) {
                moved.push(lane);
            }
        }
    }
    moved
}

/// Whether any slot of `runtime` would move in the advance phase.
pub fn has_slot_below_half(runtime: &DeviceRuntime) -> bool {
    [Lane::Slot, Lane::Ns, Lane::We].into_iter().any(|lane| {
        matches!(runtime.slot(lane), Some(Some(slot)) if slot.is_below_half())
    })
}

/// Furthest progress across a device's slots, for display.
pub fn slot_progress(runtime: &DeviceRuntime) -> Fixed64 {
    [Lane::Slot, Lane::Ns, Lane::We]
        .into_iter()
        .filter_map(|lane| runtime.slot(lane).and_then(|s| s.as_ref()))
        .map(|s| s.progress01)
        .max()
        .unwrap_or(Fixed64::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Edge;
    use crate::id::ItemTypeId;
    use crate::runtime::{ConveyorRuntime, JunctionRuntime};

    #[test]
    fn default_step_crosses_in_forty_ticks() {
        let step = slot_step(2.0, 20);
        let mut slot = SlotData::new(ItemTypeId(0), Edge::West, 0);
        let mut ticks = 0;
        while advance_to_half(&mut slot, step) {
            ticks += 1;
        }
        assert_eq!(ticks, 20);
        assert_eq!(slot.progress01, HALF);
        while !slot.is_arrived() {
            advance_to_end(&mut slot, step);
            ticks += 1;
        }
        assert_eq!(ticks, 40);
    }

    #[test]
    fn odd_rates_still_land_exactly() {
        // 1/7 per tick has no exact binary form.
        let step = slot_step(0.7, 10);
        let mut slot = SlotData::new(ItemTypeId(0), Edge::West, 0);
        for _ in 0..4 {
            advance_to_half(&mut slot, step);
        }
        assert_eq!(slot.progress01, HALF);
        for _ in 0..4 {
            advance_to_end(&mut slot, step);
        }
        assert_eq!(slot.progress01, Fixed64::ONE);
    }

    #[test]
    fn advance_stops_at_half() {
        let mut rt = DeviceRuntime::Conveyor(ConveyorRuntime {
            slot: Some(SlotData::new(ItemTypeId(0), Edge::West, 0)),
            ..Default::default()
        });
        let step = slot_step(0.1, 10);
        assert_eq!(advance_slots(&mut rt, step), vec![Lane::Slot]);
        assert_eq!(slot_progress(&rt), HALF);
        assert!(advance_slots(&mut rt, step).is_empty());
        assert!(!has_slot_below_half(&rt));
    }

    #[test]
    fn bridge_lanes_advance_independently() {
        let mut slot = SlotData::new(ItemTypeId(1), Edge::North, 0);
        slot.progress01 = HALF;
        let mut rt = DeviceRuntime::Junction(JunctionRuntime {
            ns_slot: Some(slot),
            we_slot: Some(SlotData::new(ItemTypeId(2), Edge::West, 0)),
            ..Default::default()
        });
        assert_eq!(advance_slots(&mut rt, slot_step(2.0, 20)), vec![Lane::We]);
    }

    #[test]
    fn instant_cells_clamp_step() {
        assert_eq!(slot_step(0.01, 10), Fixed64::ONE);
    }
}
