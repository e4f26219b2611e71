//! Transfer negotiation and commit.
//!
//! Negotiation repeatedly scans every device until a full pass plans nothing
//! new. A sender lane plans at most one transfer per tick and a receiver lane
//! accepts at most one. A slot only crosses its second half while some
//! receiver is able to take it, so freed capacity discovered in a later pass
//! can still pull an item through in the same tick.
//!
//! Commit applies every removal before any deposit, so a lane that hands off
//! can take in a new item within the same tick.

use crate::fixed::Fixed64;
use crate::id::{InstanceId, ItemTypeId};
use crate::junction::{may_exit, next_rr_index, receiving_lane, round_robin_order};
use crate::links::{PortLink, ResolvedLayout};
use crate::metrics::TickDelta;
use crate::reactor::{pool_can_accept, pool_deposit_batch, pool_withdraw, sendable_items};
use crate::registry::{DeviceKind, Registry};
use crate::runtime::{
    DeviceRuntime, Lane, SlotData, StallReason, add_units, sender_lanes, take_units, total_units,
};
use crate::transport::advance_to_end;
use crate::warehouse::Warehouse;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Keys and plans
// ---------------------------------------------------------------------------

/// A lane of a device, by index into the resolved layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LaneKey {
    pub device: usize,
    pub lane: Lane,
}

impl LaneKey {
    pub fn new(device: usize, lane: Lane) -> Self {
        Self { device, lane }
    }
}

/// One unit moving across one link this tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPlan {
    /// Index into [`ResolvedLayout::links`].
    pub link: usize,
    pub from: LaneKey,
    pub to: LaneKey,
    pub item: ItemTypeId,
    pub from_id: InstanceId,
    pub to_id: InstanceId,
}

/// Read-only inputs shared by the tick phases.
pub struct TickContext<'a> {
    pub registry: &'a Registry,
    pub resolved: &'a ResolvedLayout,
    pub tick: u64,
    /// Slot progress per tick.
    pub step: Fixed64,
    pub pickup_grace_ticks: u32,
}

// ---------------------------------------------------------------------------
// Working set
// ---------------------------------------------------------------------------

/// Runtimes of the resolved devices, indexed like [`ResolvedLayout::devices`].
///
/// Records stay shared with the previous state until first written.
#[derive(Debug, Default)]
pub struct WorkingSet {
    runtimes: Vec<Option<Arc<DeviceRuntime>>>,
}

impl WorkingSet {
    /// Move the records for `resolved` out of `map`.
    pub fn take_from(
        map: &mut BTreeMap<InstanceId, Arc<DeviceRuntime>>,
        resolved: &ResolvedLayout,
    ) -> Self {
        let runtimes = resolved
            .devices
            .iter()
            .map(|d| map.remove(&d.instance_id))
            .collect();
        Self { runtimes }
    }

    /// Put the records back.
    pub fn restore_into(
        self,
        map: &mut BTreeMap<InstanceId, Arc<DeviceRuntime>>,
        resolved: &ResolvedLayout,
    ) {
        for (device, runtime) in resolved.devices.iter().zip(self.runtimes) {
            if let Some(runtime) = runtime {
                map.insert(device.instance_id.clone(), runtime);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.runtimes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runtimes.is_empty()
    }

    pub fn get(&self, device: usize) -> Option<&DeviceRuntime> {
        self.runtimes.get(device)?.as_deref()
    }

    /// Mutable access, cloning the record if the previous state shares it.
    pub fn get_mut(&mut self, device: usize) -> Option<&mut DeviceRuntime> {
        self.runtimes.get_mut(device)?.as_mut().map(Arc::make_mut)
    }

    fn is_active(&self, device: usize) -> bool {
        self.get(device)
            .is_some_and(|rt| !rt.stall_reason().is_sticky())
    }
}

// ---------------------------------------------------------------------------
// Negotiation
// ---------------------------------------------------------------------------

/// Bookkeeping for one tick's negotiation.
#[derive(Debug, Default)]
pub struct Negotiation {
    /// Receiver lanes already claimed.
    reserved: BTreeSet<LaneKey>,
    /// Sender lanes handing off this tick.
    clearing: BTreeSet<LaneKey>,
    /// Slot lanes whose progress already moved this tick.
    advanced: BTreeSet<LaneKey>,
    /// Sender lanes with a plan.
    planned: BTreeSet<LaneKey>,
    /// Warehouse units promised to pickups this tick.
    planned_withdrawals: BTreeMap<ItemTypeId, u64>,
    pub plans: Vec<TransferPlan>,
    pub passes: u32,
    /// The last pass planned nothing new.
    pub settled: bool,
}

impl Negotiation {
    /// Start from the lanes the advance phase already moved.
    pub fn new(advanced: BTreeSet<LaneKey>) -> Self {
        Self {
            advanced,
            ..Default::default()
        }
    }

    pub fn is_planned(&self, key: LaneKey) -> bool {
        self.planned.contains(&key)
    }

    fn pickup_available(&self, warehouse: &Warehouse, item: ItemTypeId) -> bool {
        let promised = self.planned_withdrawals.get(&item).copied().unwrap_or(0);
        warehouse.available(item).at_least(promised + 1)
    }
}

fn link_carries(ctx: &TickContext<'_>, link: &PortLink, item: ItemTypeId) -> bool {
    link.allowed.contains(item) && ctx.registry.item_state(item) == link.medium
}

/// First of `items` that `link` carries.
fn first_carried(
    ctx: &TickContext<'_>,
    link: &PortLink,
    items: impl IntoIterator<Item = ItemTypeId>,
) -> Option<ItemTypeId> {
    items.into_iter().find(|&item| link_carries(ctx, link, item))
}

/// The item `lane` of `device` would send across `link`, if any.
fn candidate_item(
    ctx: &TickContext<'_>,
    rts: &WorkingSet,
    warehouse: &Warehouse,
    n: &Negotiation,
    device: usize,
    lane: Lane,
    link: &PortLink,
) -> Option<ItemTypeId> {
    let kind = &ctx.resolved.devices[device].kind;
    let rt = rts.get(device)?;

    match (rt, lane) {
        (_, Lane::Slot | Lane::Ns | Lane::We) => {
            let slot = rt.slot(lane)?.as_ref()?;
            (may_exit(kind, slot.entered_from, link.from_edge) && link_carries(ctx, link, slot.item))
                .then_some(slot.item)
        }
        (DeviceRuntime::Processor(p), Lane::Output) => match kind {
            DeviceKind::Pickup => {
                let item = ctx.resolved.devices[device].config.pickup_item?;
                (n.pickup_available(warehouse, item) && link_carries(ctx, link, item))
                    .then_some(item)
            }
            DeviceKind::Reactor { .. } => {
                first_carried(ctx, link, sendable_items(p, ctx.registry))
            }
            _ => first_carried(ctx, link, p.output_buffer.keys().copied()),
        },
        (DeviceRuntime::Storage(s), Lane::Output) => {
            first_carried(ctx, link, s.inventory.keys().copied())
        }
        _ => None,
    }
}

/// Whether `lane` of `device` could take one `item` this tick.
fn can_try(
    ctx: &TickContext<'_>,
    rts: &WorkingSet,
    n: &Negotiation,
    device: usize,
    lane: Lane,
    item: ItemTypeId,
) -> bool {
    let key = LaneKey::new(device, lane);
    if !rts.is_active(device) || n.reserved.contains(&key) {
        return false;
    }
    let Some(rt) = rts.get(device) else {
        return false;
    };
    if lane != Lane::Output {
        return match rt.slot(lane) {
            Some(None) => true,
            Some(Some(_)) => n.clearing.contains(&key),
            None => false,
        };
    }

    let resolved = &ctx.resolved.devices[device];
    let Some(def) = ctx.registry.get_device(resolved.type_id) else {
        return false;
    };
    match (rt, &def.kind) {
        (DeviceRuntime::Processor(p), DeviceKind::Crafter) => {
            p.input_buffer.get(&item).copied().unwrap_or(0) < def.input_capacity
        }
        (DeviceRuntime::Processor(p), DeviceKind::Reactor { slot_capacity, .. }) => {
            pool_can_accept(p, item, 1, *slot_capacity)
        }
        (DeviceRuntime::Storage(s), DeviceKind::Storage { capacity }) => {
            total_units(&s.inventory) < u64::from(*capacity)
        }
        _ => false,
    }
}

fn sender_ready(rts: &WorkingSet, device: usize, lane: Lane) -> bool {
    match lane {
        Lane::Output => true,
        _ => matches!(
            rts.get(device).and_then(|rt| rt.slot(lane)),
            Some(Some(slot)) if slot.is_arrived()
        ),
    }
}

/// Try to plan one transfer out of `lane` of `device`. Returns true on success.
fn try_send(
    ctx: &TickContext<'_>,
    rts: &mut WorkingSet,
    warehouse: &Warehouse,
    n: &mut Negotiation,
    device: usize,
    lane: Lane,
) -> bool {
    let outgoing = &ctx.resolved.outgoing[device];
    let from = LaneKey::new(device, lane);
    let start = rts
        .get(device)
        .and_then(DeviceRuntime::as_junction)
        .map_or(0, |j| j.rr_index);

    for pos in round_robin_order(outgoing.len(), start) {
        let link_idx = outgoing[pos];
        let link = &ctx.resolved.links[link_idx];
        let Some(item) = candidate_item(ctx, rts, warehouse, n, device, lane, link) else {
            continue;
        };
        let to_kind = &ctx.resolved.devices[link.to].kind;
        let to = LaneKey::new(link.to, receiving_lane(to_kind, link.to_edge));
        if !can_try(ctx, rts, n, to.device, to.lane, item) {
            continue;
        }

        if lane != Lane::Output && n.advanced.insert(from) {
            if let Some(Some(slot)) = rts.get_mut(device).and_then(|rt| rt.slot_mut(lane)) {
                advance_to_end(slot, ctx.step);
            }
        }
        if !sender_ready(rts, device, lane) {
            return false;
        }

        n.plans.push(TransferPlan {
            link: link_idx,
            from,
            to,
            item,
            from_id: ctx.resolved.devices[device].instance_id.clone(),
            to_id: ctx.resolved.devices[link.to].instance_id.clone(),
        });
        n.planned.insert(from);
        n.reserved.insert(to);
        n.clearing.insert(from);
        if ctx.resolved.devices[device].kind == DeviceKind::Pickup {
            *n.planned_withdrawals.entry(item).or_insert(0) += 1;
        }
        if matches!(ctx.resolved.devices[device].kind, DeviceKind::Junction(_)) {
            if let Some(DeviceRuntime::Junction(j)) = rts.get_mut(device) {
                j.rr_index = next_rr_index(pos, outgoing.len());
            }
        }
        return true;
    }
    false
}

/// Run passes until nothing changes.
///
/// A pass counts as a change only when it plans a sender lane, and each lane
/// plans at most once per tick, so a tick settles within `sender lanes + 1`
/// passes: the productive ones plus one quiet pass. The loop still stops at
/// `sender lanes + 2` and reports `settled == false` if that ever fails.
pub fn negotiate(
    ctx: &TickContext<'_>,
    rts: &mut WorkingSet,
    warehouse: &Warehouse,
    advanced: BTreeSet<LaneKey>,
) -> Negotiation {
    let mut n = Negotiation::new(advanced);
    let lanes_total: usize = ctx
        .resolved
        .devices
        .iter()
        .map(|d| sender_lanes(&d.kind).len())
        .sum();
    let max_passes = lanes_total as u32 + 2;

    loop {
        n.passes += 1;
        let mut changed = false;
        for device in 0..ctx.resolved.devices.len() {
            if !rts.is_active(device) {
                continue;
            }
            for &lane in sender_lanes(&ctx.resolved.devices[device].kind) {
                if n.is_planned(LaneKey::new(device, lane)) {
                    continue;
                }
                changed |= try_send(ctx, rts, warehouse, &mut n, device, lane);
            }
        }
        if !changed {
            n.settled = true;
            break;
        }
        if n.passes >= max_passes {
            log::warn!(
                "tick {}: negotiation stopped after {} passes without settling",
                ctx.tick,
                n.passes
            );
            break;
        }
    }

    mark_blocked(ctx, rts, warehouse, &n);
    n
}

/// Whether `lane` still holds output that found no taker this tick.
fn lane_holding(
    ctx: &TickContext<'_>,
    rts: &WorkingSet,
    n: &Negotiation,
    device: usize,
    lane: Lane,
) -> bool {
    let key = LaneKey::new(device, lane);
    if n.is_planned(key) {
        return false;
    }
    let Some(rt) = rts.get(device) else {
        return false;
    };
    match (rt, lane) {
        (_, Lane::Slot | Lane::Ns | Lane::We) => matches!(
            rt.slot(lane),
            Some(Some(slot)) if !slot.is_below_half() && !n.advanced.contains(&key)
        ),
        (DeviceRuntime::Processor(p), Lane::Output) => match ctx.resolved.devices[device].kind {
            DeviceKind::Reactor { .. } => !sendable_items(p, ctx.registry).is_empty(),
            _ => !p.output_buffer.is_empty(),
        },
        (DeviceRuntime::Storage(s), Lane::Output) => {
            !ctx.resolved.outgoing[device].is_empty() && !s.inventory.is_empty()
        }
        _ => false,
    }
}

/// Flag senders left holding ready output, and track pickup back-pressure.
fn mark_blocked(ctx: &TickContext<'_>, rts: &mut WorkingSet, warehouse: &Warehouse, n: &Negotiation) {
    for device in 0..ctx.resolved.devices.len() {
        if !rts.is_active(device) {
            continue;
        }
        let resolved = &ctx.resolved.devices[device];
        let Some(status) = rts.get(device).map(|rt| rt.status().clone()) else {
            continue;
        };
        let mut next = status.clone();

        if resolved.kind == DeviceKind::Pickup {
            let available = resolved
                .config
                .pickup_item
                .is_some_and(|item| n.pickup_available(warehouse, item));
            if n.is_planned(LaneKey::new(device, Lane::Output)) {
                next.blocked_ticks = 0;
            } else if available {
                next.blocked_ticks = next.blocked_ticks.saturating_add(1);
                if next.blocked_ticks >= ctx.pickup_grace_ticks {
                    next.stall_reason = StallReason::OutputBlocked;
                }
            } else {
                next.blocked_ticks = 0;
                next.stall_reason = StallReason::NoInput;
            }
        } else {
            let holding = sender_lanes(&resolved.kind)
                .iter()
                .any(|&lane| lane_holding(ctx, rts, n, device, lane));
            if holding {
                next.blocked_ticks = next.blocked_ticks.saturating_add(1);
                if next.stall_reason == StallReason::None {
                    next.stall_reason = StallReason::OutputBlocked;
                }
            } else {
                next.blocked_ticks = 0;
            }
        }

        if next != status {
            if let Some(rt) = rts.get_mut(device) {
                *rt.status_mut() = next;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

/// Take the planned unit out of the sender. Returns false if it was not there.
fn remove_from_sender(
    ctx: &TickContext<'_>,
    rts: &mut WorkingSet,
    warehouse: &mut Warehouse,
    delta: &mut TickDelta,
    plan: &TransferPlan,
) -> bool {
    let kind = ctx.resolved.devices[plan.from.device].kind.clone();
    let Some(rt) = rts.get_mut(plan.from.device) else {
        return false;
    };
    match (rt, plan.from.lane) {
        (rt, Lane::Slot | Lane::Ns | Lane::We) => {
            let Some(slot) = rt.slot_mut(plan.from.lane).and_then(Option::take) else {
                return false;
            };
            if let DeviceRuntime::Conveyor(c) = rt {
                c.items_delivered += 1;
                c.last_transit_ticks = Some(ctx.tick.saturating_sub(slot.entered_tick));
            }
            true
        }
        (DeviceRuntime::Processor(_), Lane::Output) if kind == DeviceKind::Pickup => {
            if !warehouse.withdraw(plan.item, 1) {
                return false;
            }
            delta.add_consumed(plan.item, 1);
            true
        }
        (DeviceRuntime::Processor(p), Lane::Output) => match kind {
            DeviceKind::Reactor { .. } => pool_withdraw(p, plan.item, 1),
            _ => take_units(&mut p.output_buffer, plan.item, 1),
        },
        (DeviceRuntime::Storage(s), Lane::Output) => take_units(&mut s.inventory, plan.item, 1),
        _ => false,
    }
}

fn deposit_into_receiver(ctx: &TickContext<'_>, rts: &mut WorkingSet, plan: &TransferPlan) {
    let link = &ctx.resolved.links[plan.link];
    let kind = ctx.resolved.devices[plan.to.device].kind.clone();
    let Some(rt) = rts.get_mut(plan.to.device) else {
        log::warn!("tick {}: receiver {} vanished; unit lost", ctx.tick, plan.to_id);
        return;
    };
    match (rt, plan.to.lane) {
        (rt, Lane::Slot | Lane::Ns | Lane::We) => {
            if let Some(slot) = rt.slot_mut(plan.to.lane) {
                *slot = Some(SlotData::new(plan.item, link.to_edge, ctx.tick));
            }
        }
        (DeviceRuntime::Processor(p), Lane::Output) => match kind {
            DeviceKind::Reactor { slot_capacity, .. } => {
                if !pool_deposit_batch(p, &[(plan.item, 1)], slot_capacity) {
                    log::warn!("tick {}: reactor {} refused a planned unit", ctx.tick, plan.to_id);
                }
            }
            _ => add_units(&mut p.input_buffer, plan.item, 1),
        },
        (DeviceRuntime::Storage(s), Lane::Output) => add_units(&mut s.inventory, plan.item, 1),
        _ => {}
    }
}

/// Apply the planned transfers: all removals, then all deposits.
pub fn commit(
    ctx: &TickContext<'_>,
    rts: &mut WorkingSet,
    warehouse: &mut Warehouse,
    delta: &mut TickDelta,
    plans: &[TransferPlan],
) -> Vec<TransferPlan> {
    let removed: Vec<&TransferPlan> = plans
        .iter()
        .filter(|plan| remove_from_sender(ctx, rts, warehouse, delta, plan))
        .collect();
    for plan in &removed {
        deposit_into_receiver(ctx, rts, plan);
    }
    removed.into_iter().cloned().collect()
}
