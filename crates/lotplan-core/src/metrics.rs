//! Rolling per-minute throughput.
//!
//! [`MinuteWindow`] is a ring of per-tick deltas holding exactly one minute of
//! simulated time. Running totals are kept alongside: pushing a tick subtracts
//! the entry it overwrites and adds the new one, so a push costs the size of
//! the two deltas and nothing proportional to history.

use crate::id::ItemTypeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Produced and consumed units of one item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDelta {
    pub produced: u64,
    pub consumed: u64,
}

/// Net item movement of a single tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickDelta {
    entries: Vec<(ItemTypeId, ItemDelta)>,
}

impl TickDelta {
    fn entry(&mut self, item: ItemTypeId) -> &mut ItemDelta {
        let idx = match self.entries.binary_search_by_key(&item, |(i, _)| *i) {
            Ok(idx) => idx,
            Err(idx) => {
                self.entries.insert(idx, (item, ItemDelta::default()));
                idx
            }
        };
        &mut self.entries[idx].1
    }

    pub fn add_produced(&mut self, item: ItemTypeId, n: u64) {
        self.entry(item).produced += n;
    }

    pub fn add_consumed(&mut self, item: ItemTypeId, n: u64) {
        self.entry(item).consumed += n;
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemTypeId, ItemDelta)> + '_ {
        self.entries.iter().copied()
    }
}

/// Per-minute rates derived from the window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThroughputStats {
    pub produced_per_minute: BTreeMap<ItemTypeId, f64>,
    pub consumed_per_minute: BTreeMap<ItemTypeId, f64>,
}

impl ThroughputStats {
    pub fn produced(&self, item: ItemTypeId) -> f64 {
        self.produced_per_minute.get(&item).copied().unwrap_or(0.0)
    }

    pub fn consumed(&self, item: ItemTypeId) -> f64 {
        self.consumed_per_minute.get(&item).copied().unwrap_or(0.0)
    }
}

/// One minute of per-tick deltas with running totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinuteWindow {
    deltas: Arc<Vec<TickDelta>>,
    cursor: usize,
    count: usize,
    tick_rate_hz: u32,
    totals: BTreeMap<ItemTypeId, ItemDelta>,
}

impl MinuteWindow {
    pub fn new(tick_rate_hz: u32) -> Self {
        let capacity = (60 * tick_rate_hz.max(1)) as usize;
        Self {
            deltas: Arc::new(vec![TickDelta::default(); capacity]),
            cursor: 0,
            count: 0,
            tick_rate_hz: tick_rate_hz.max(1),
            totals: BTreeMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.deltas.len()
    }

    /// Ticks currently covered, up to one minute.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Record one tick, expiring the oldest when full.
    pub fn push(&mut self, delta: TickDelta) {
        let cursor = self.cursor;
        let capacity = self.capacity();
        let deltas = Arc::make_mut(&mut self.deltas);
        let expired = std::mem::replace(&mut deltas[cursor], delta);

        if self.count == capacity {
            for (item, d) in expired.iter() {
                if let Some(total) = self.totals.get_mut(&item) {
                    total.produced -= d.produced;
                    total.consumed -= d.consumed;
                    if *total == ItemDelta::default() {
                        self.totals.remove(&item);
                    }
                }
            }
        } else {
            self.count += 1;
        }
        for (item, d) in deltas[cursor].iter() {
            let total = self.totals.entry(item).or_default();
            total.produced += d.produced;
            total.consumed += d.consumed;
        }
        self.cursor = (cursor + 1) % capacity;
    }

    pub fn totals(&self, item: ItemTypeId) -> ItemDelta {
        self.totals.get(&item).copied().unwrap_or_default()
    }

    /// Rates over the covered span, scaled to one minute.
    pub fn stats(&self) -> ThroughputStats {
        let mut stats = ThroughputStats::default();
        if self.count == 0 {
            return stats;
        }
        let seconds = self.count as f64 / f64::from(self.tick_rate_hz);
        let scale = 60.0 / seconds;
        for (&item, total) in &self.totals {
            if total.produced > 0 {
                stats
                    .produced_per_minute
                    .insert(item, total.produced as f64 * scale);
            }
            if total.consumed > 0 {
                stats
                    .consumed_per_minute
                    .insert(item, total.consumed as f64 * scale);
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_produced(item: ItemTypeId) -> TickDelta {
        let mut d = TickDelta::default();
        d.add_produced(item, 1);
        d
    }

    #[test]
    fn capacity_is_one_minute_of_ticks() {
        assert_eq!(MinuteWindow::new(20).capacity(), 1200);
        assert_eq!(MinuteWindow::new(1).capacity(), 60);
    }

    #[test]
    fn steady_production_converges() {
        let hz = 5;
        let mut w = MinuteWindow::new(hz);
        for _ in 0..w.capacity() {
            w.push(one_produced(ItemTypeId(0)));
        }
        let rate = w.stats().produced(ItemTypeId(0));
        assert!((rate - 60.0 * hz as f64).abs() < 1e-9, "rate {rate}");

        for _ in 0..3 * w.capacity() {
            w.push(one_produced(ItemTypeId(0)));
            let rate = w.stats().produced(ItemTypeId(0));
            assert!((rate - 300.0).abs() < 1e-9);
        }
        assert_eq!(w.totals(ItemTypeId(0)).produced, 300);
    }

    #[test]
    fn old_deltas_expire() {
        let mut w = MinuteWindow::new(1);
        let mut d = TickDelta::default();
        d.add_consumed(ItemTypeId(2), 7);
        w.push(d);
        assert_eq!(w.totals(ItemTypeId(2)).consumed, 7);
        for _ in 0..59 {
            w.push(TickDelta::default());
        }
        assert_eq!(w.totals(ItemTypeId(2)).consumed, 7);
        w.push(TickDelta::default());
        assert_eq!(w.totals(ItemTypeId(2)).consumed, 0);
        assert!(w.stats().consumed_per_minute.is_empty());
    }

    #[test]
    fn partial_window_extrapolates_to_a_minute() {
        let mut w = MinuteWindow::new(10);
        for _ in 0..10 {
            w.push(one_produced(ItemTypeId(1)));
        }
        // 10 units in one second.
        assert!((w.stats().produced(ItemTypeId(1)) - 600.0).abs() < 1e-9);
    }

    #[test]
    fn delta_entries_stay_sorted() {
        let mut d = TickDelta::default();
        d.add_produced(ItemTypeId(3), 1);
        d.add_consumed(ItemTypeId(1), 2);
        d.add_produced(ItemTypeId(3), 1);
        let items: Vec<_> = d.iter().collect();
        assert_eq!(items[0].0, ItemTypeId(1));
        assert_eq!(items[1].1.produced, 2);
    }

    #[test]
    fn cloned_window_is_not_disturbed() {
        let mut w = MinuteWindow::new(1);
        w.push(one_produced(ItemTypeId(0)));
        let kept = w.clone();
        w.push(one_produced(ItemTypeId(0)));
        assert_eq!(kept.totals(ItemTypeId(0)).produced, 1);
        assert_eq!(w.totals(ItemTypeId(0)).produced, 2);
    }
}
