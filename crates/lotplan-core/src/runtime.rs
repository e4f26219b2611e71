//! Per-device runtime state.
//!
//! Each placed device owns exactly one [`DeviceRuntime`], shaped by its
//! type's runtime kind. Records live behind `Arc` in the sim state and are
//! cloned on first write within a tick, so a state the caller kept from an
//! earlier tick is never touched.

use crate::fixed::{Fixed64, HALF};
use crate::geometry::{Axis, Edge};
use crate::id::{ItemTypeId, RecipeId};
use crate::layout::DeviceConfig;
use crate::reactor::{self, ReactorLane};
use crate::registry::{DeviceKind, DeviceTypeDef, JunctionKind, RuntimeKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Item id to count.
pub type ItemCounts = BTreeMap<ItemTypeId, u32>;

/// Total number of units in a count map.
pub fn total_units(counts: &ItemCounts) -> u64 {
    counts.values().map(|&c| u64::from(c)).sum()
}

/// Add `n` units of `item`.
pub fn add_units(counts: &mut ItemCounts, item: ItemTypeId, n: u32) {
    *counts.entry(item).or_insert(0) += n;
}

/// Remove `n` units of `item`, dropping the entry when it reaches zero.
/// Returns false and leaves the map untouched when fewer than `n` are held.
pub fn take_units(counts: &mut ItemCounts, item: ItemTypeId, n: u32) -> bool {
    match counts.get_mut(&item) {
        Some(held) if *held >= n => {
            *held -= n;
            if *held == 0 {
                counts.remove(&item);
            }
            true
        }
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Why a device did nothing useful this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StallReason {
    #[default]
    None,
    NoInput,
    OutputBlocked,
    NoPower,
    Overlap,
    ConfigError,
}

impl StallReason {
    /// Sticky reasons are set once at start and keep the device inert.
    pub fn is_sticky(self) -> bool {
        matches!(
            self,
            StallReason::NoPower | StallReason::Overlap | StallReason::ConfigError
        )
    }
}

/// Fields every runtime variant carries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeStatus {
    /// Display progress in `[0, 1]`.
    pub progress01: Fixed64,
    pub stall_reason: StallReason,
    /// Consecutive ticks with ready output and no taker.
    pub blocked_ticks: u32,
}

impl RuntimeStatus {
    pub fn is_stalled(&self) -> bool {
        self.stall_reason != StallReason::None
    }
}

// ---------------------------------------------------------------------------
// Slots and lanes
// ---------------------------------------------------------------------------

/// One item crossing one cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotData {
    pub item: ItemTypeId,
    pub progress01: Fixed64,
    /// Edge of this device the item came in through.
    pub entered_from: Edge,
    pub entered_tick: u64,
}

impl SlotData {
    pub fn new(item: ItemTypeId, entered_from: Edge, entered_tick: u64) -> Self {
        Self {
            item,
            progress01: Fixed64::ZERO,
            entered_from,
            entered_tick,
        }
    }

    /// Fully across the cell and ready to hand off.
    pub fn is_arrived(&self) -> bool {
        self.progress01 >= Fixed64::ONE
    }

    pub fn is_below_half(&self) -> bool {
        self.progress01 < HALF
    }
}

/// An endpoint inside a device that moves at most one item per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Lane {
    /// The single slot of a conveyor, splitter or merger.
    Slot,
    /// North/south lane of a bridge.
    Ns,
    /// West/east lane of a bridge.
    We,
    /// A buffer: output side when sending, input side when receiving.
    Output,
}

impl Lane {
    pub fn for_axis(axis: Axis) -> Lane {
        match axis {
            Axis::Vertical => Lane::Ns,
            Axis::Horizontal => Lane::We,
        }
    }
}

// ---------------------------------------------------------------------------
// Runtime variants
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessorRuntime {
    pub status: RuntimeStatus,
    pub input_buffer: ItemCounts,
    pub output_buffer: ItemCounts,
    /// Slot to item binding of a reactor's shared pool. Empty for crafters.
    pub input_slot_items: Vec<Option<ItemTypeId>>,
    pub active_recipe: Option<RecipeId>,
    pub cycle_progress_ticks: u32,
    pub produced_items_total: u64,
    pub last_completed_cycle_ticks: u32,
    pub last_completion_tick: Option<u64>,
    pub reactor_lanes: Vec<ReactorLane>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageRuntime {
    pub status: RuntimeStatus,
    pub inventory: ItemCounts,
    pub submit_accumulator_ticks: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConveyorRuntime {
    pub status: RuntimeStatus,
    pub slot: Option<SlotData>,
    pub items_delivered: u64,
    pub last_transit_ticks: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JunctionRuntime {
    pub status: RuntimeStatus,
    pub slot: Option<SlotData>,
    pub ns_slot: Option<SlotData>,
    pub we_slot: Option<SlotData>,
    pub rr_index: usize,
}

/// Runtime state of one device, tagged by runtime kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeviceRuntime {
    Processor(ProcessorRuntime),
    Storage(StorageRuntime),
    Conveyor(ConveyorRuntime),
    Junction(JunctionRuntime),
}

impl DeviceRuntime {
    /// Fresh runtime for a device of type `def`, with `config.preload` applied.
    pub fn for_device(def: &DeviceTypeDef, config: &DeviceConfig, recipes: &[RecipeId]) -> Self {
        match &def.kind {
            DeviceKind::Crafter | DeviceKind::Pickup => {
                let mut p = ProcessorRuntime::default();
                for &(item, count) in &config.preload {
                    add_units(&mut p.input_buffer, item, count);
                }
                DeviceRuntime::Processor(p)
            }
            DeviceKind::Reactor {
                pool_slots,
                slot_capacity,
            } => {
                let mut p = ProcessorRuntime {
                    input_slot_items: vec![None; *pool_slots as usize],
                    reactor_lanes: recipes
                        .iter()
                        .take(reactor::MAX_REACTOR_LANES)
                        .map(|&r| ReactorLane::new(r))
                        .collect(),
                    ..Default::default()
                };
                for &(item, count) in &config.preload {
                    if !reactor::pool_deposit_batch(&mut p, &[(item, count)], *slot_capacity) {
                        log::warn!("reactor preload of {count} x {item:?} does not fit the pool");
                    }
                }
                DeviceRuntime::Processor(p)
            }
            DeviceKind::Storage { .. } => {
                let mut s = StorageRuntime::default();
                for &(item, count) in &config.preload {
                    add_units(&mut s.inventory, item, count);
                }
                DeviceRuntime::Storage(s)
            }
            DeviceKind::Conveyor => DeviceRuntime::Conveyor(ConveyorRuntime::default()),
            DeviceKind::Junction(_) => DeviceRuntime::Junction(JunctionRuntime::default()),
        }
    }

    pub fn kind(&self) -> RuntimeKind {
        match self {
            DeviceRuntime::Processor(_) => RuntimeKind::Processor,
            DeviceRuntime::Storage(_) => RuntimeKind::Storage,
            DeviceRuntime::Conveyor(_) => RuntimeKind::Conveyor,
            DeviceRuntime::Junction(_) => RuntimeKind::Junction,
        }
    }

    pub fn status(&self) -> &RuntimeStatus {
        match self {
            DeviceRuntime::Processor(p) => &p.status,
            DeviceRuntime::Storage(s) => &s.status,
            DeviceRuntime::Conveyor(c) => &c.status,
            DeviceRuntime::Junction(j) => &j.status,
        }
    }

    pub fn status_mut(&mut self) -> &mut RuntimeStatus {
        match self {
            DeviceRuntime::Processor(p) => &mut p.status,
            DeviceRuntime::Storage(s) => &mut s.status,
            DeviceRuntime::Conveyor(c) => &mut c.status,
            DeviceRuntime::Junction(j) => &mut j.status,
        }
    }

    pub fn stall_reason(&self) -> StallReason {
        self.status().stall_reason
    }

    pub fn is_stalled(&self) -> bool {
        self.status().is_stalled()
    }

    pub fn as_processor(&self) -> Option<&ProcessorRuntime> {
        match self {
            DeviceRuntime::Processor(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_storage(&self) -> Option<&StorageRuntime> {
        match self {
            DeviceRuntime::Storage(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_conveyor(&self) -> Option<&ConveyorRuntime> {
        match self {
            DeviceRuntime::Conveyor(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_junction(&self) -> Option<&JunctionRuntime> {
        match self {
            DeviceRuntime::Junction(j) => Some(j),
            _ => None,
        }
    }

    /// The transit slot behind `lane`, if this runtime has one.
    pub fn slot(&self, lane: Lane) -> Option<&Option<SlotData>> {
        match (self, lane) {
            (DeviceRuntime::Conveyor(c), Lane::Slot) => Some(&c.slot),
            (DeviceRuntime::Junction(j), Lane::Slot) => Some(&j.slot),
            (DeviceRuntime::Junction(j), Lane::Ns) => Some(&j.ns_slot),
            (DeviceRuntime::Junction(j), Lane::We) => Some(&j.we_slot),
            _ => None,
        }
    }

    pub fn slot_mut(&mut self, lane: Lane) -> Option<&mut Option<SlotData>> {
        match (self, lane) {
            (DeviceRuntime::Conveyor(c), Lane::Slot) => Some(&mut c.slot),
            (DeviceRuntime::Junction(j), Lane::Slot) => Some(&mut j.slot),
            (DeviceRuntime::Junction(j), Lane::Ns) => Some(&mut j.ns_slot),
            (DeviceRuntime::Junction(j), Lane::We) => Some(&mut j.we_slot),
            _ => None,
        }
    }

    /// Every item unit held by this device, in buffers and slots.
    pub fn item_counts(&self) -> ItemCounts {
        let mut counts = ItemCounts::new();
        match self {
            DeviceRuntime::Processor(p) => {
                for (&item, &n) in p.input_buffer.iter().chain(p.output_buffer.iter()) {
                    add_units(&mut counts, item, n);
                }
            }
            DeviceRuntime::Storage(s) => counts = s.inventory.clone(),
            DeviceRuntime::Conveyor(c) => {
                if let Some(slot) = &c.slot {
                    add_units(&mut counts, slot.item, 1);
                }
            }
            DeviceRuntime::Junction(j) => {
                for slot in [&j.slot, &j.ns_slot, &j.we_slot].into_iter().flatten() {
                    add_units(&mut counts, slot.item, 1);
                }
            }
        }
        counts
    }
}

/// Lanes a device can send from.
pub fn sender_lanes(kind: &DeviceKind) -> &'static [Lane] {
    match kind {
        DeviceKind::Conveyor => &[Lane::Slot],
        DeviceKind::Junction(JunctionKind::Bridge) => &[Lane::Ns, Lane::We],
        DeviceKind::Junction(_) => &[Lane::Slot],
        _ => &[Lane::Output],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Footprint;
    use crate::registry::DeviceTypeDef;

    #[test]
    fn sticky_reasons() {
        assert!(StallReason::Overlap.is_sticky());
        assert!(StallReason::NoPower.is_sticky());
        assert!(StallReason::ConfigError.is_sticky());
        assert!(!StallReason::NoInput.is_sticky());
        assert!(!StallReason::OutputBlocked.is_sticky());
        assert!(!StallReason::None.is_sticky());
    }

    #[test]
    fn take_units_removes_empty_entries() {
        let mut counts = ItemCounts::new();
        add_units(&mut counts, ItemTypeId(1), 2);
        assert!(!take_units(&mut counts, ItemTypeId(1), 3));
        assert!(take_units(&mut counts, ItemTypeId(1), 2));
        assert!(counts.is_empty());
        assert!(!take_units(&mut counts, ItemTypeId(7), 1));
    }

    #[test]
    fn runtime_shape_follows_device_kind() {
        let config = DeviceConfig::default();
        let belt = DeviceTypeDef::new("belt", DeviceKind::Conveyor, Footprint::single());
        assert_eq!(
            DeviceRuntime::for_device(&belt, &config, &[]).kind(),
            RuntimeKind::Conveyor
        );
        let pickup = DeviceTypeDef::new("pickup", DeviceKind::Pickup, Footprint::single());
        assert_eq!(
            DeviceRuntime::for_device(&pickup, &config, &[]).kind(),
            RuntimeKind::Processor
        );
    }

    #[test]
    fn preload_lands_in_input_side() {
        let config = DeviceConfig {
            preload: vec![(ItemTypeId(0), 3)],
            ..Default::default()
        };
        let smelter = DeviceTypeDef::new("smelter", DeviceKind::Crafter, Footprint::single());
        let rt = DeviceRuntime::for_device(&smelter, &config, &[]);
        assert_eq!(rt.as_processor().unwrap().input_buffer[&ItemTypeId(0)], 3);

        let chest = DeviceTypeDef::new("chest", DeviceKind::Storage { capacity: 10 }, Footprint::single());
        let rt = DeviceRuntime::for_device(&chest, &config, &[]);
        assert_eq!(total_units(&rt.as_storage().unwrap().inventory), 3);
    }

    #[test]
    fn reactor_gets_pool_and_lanes() {
        let def = DeviceTypeDef::new(
            "reactor",
            DeviceKind::Reactor {
                pool_slots: 3,
                slot_capacity: 10,
            },
            Footprint::new(2, 2),
        );
        let rt = DeviceRuntime::for_device(
            &def,
            &DeviceConfig::default(),
            &[RecipeId(0), RecipeId(1), RecipeId(2)],
        );
        let p = rt.as_processor().unwrap();
        assert_eq!(p.input_slot_items.len(), 3);
        assert_eq!(p.reactor_lanes.len(), 2);
    }

    #[test]
    fn junction_slots_by_lane() {
        let mut rt = DeviceRuntime::Junction(JunctionRuntime::default());
        *rt.slot_mut(Lane::Ns).unwrap() = Some(SlotData::new(ItemTypeId(2), Edge::North, 0));
        assert!(rt.slot(Lane::Ns).unwrap().is_some());
        assert!(rt.slot(Lane::We).unwrap().is_none());
        assert!(rt.slot(Lane::Output).is_none());
        assert_eq!(rt.item_counts()[&ItemTypeId(2)], 1);
    }

    #[test]
    fn bridge_sends_from_both_axes() {
        assert_eq!(
            sender_lanes(&DeviceKind::Junction(JunctionKind::Bridge)),
            &[Lane::Ns, Lane::We]
        );
        assert_eq!(sender_lanes(&DeviceKind::Pickup), &[Lane::Output]);
        assert_eq!(Lane::for_axis(Axis::Vertical), Lane::Ns);
    }
}
