//! Storage submission to the warehouse.

use crate::fixed::Fixed64;
use crate::metrics::TickDelta;
use crate::runtime::StorageRuntime;
use crate::warehouse::Warehouse;

/// Count one tick toward the next submission. When the interval is reached,
/// the whole inventory moves to the warehouse (if enabled) and is recorded as
/// produced.
pub fn advance_storage(
    s: &mut StorageRuntime,
    submit_interval_ticks: u32,
    submit_to_warehouse: bool,
    warehouse: &mut Warehouse,
    delta: &mut TickDelta,
) {
    s.submit_accumulator_ticks += 1;
    if s.submit_accumulator_ticks < submit_interval_ticks {
        return;
    }
    s.submit_accumulator_ticks = 0;
    if !submit_to_warehouse {
        return;
    }
    for (item, count) in std::mem::take(&mut s.inventory) {
        warehouse.deposit(item, u64::from(count));
        delta.add_produced(item, u64::from(count));
    }
}

/// Fraction of the submit interval elapsed, for display.
pub fn submit_progress(s: &StorageRuntime, submit_interval_ticks: u32) -> Fixed64 {
    Fixed64::from_num(s.submit_accumulator_ticks) / Fixed64::from_num(submit_interval_ticks.max(1))
}
