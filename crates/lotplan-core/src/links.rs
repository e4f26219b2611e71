//! Port link resolution.
//!
//! Every placed device's ports are rotated into world space and bucketed by
//! the cell boundary they sit on. An output and an input in the same bucket,
//! on different devices and facing each other, become a [`PortLink`] when
//! their media match and their allowed item sets overlap.
//!
//! The result is a plain value ([`ResolvedLayout`]) with index-based adjacency
//! rather than a pointer graph, memoised per layout by [`LinkCache`].

use crate::geometry::{BoundaryKey, CellPos, CellRect, Edge, Rotation};
use crate::id::{DeviceTypeId, InstanceId, ItemTypeId, RecipeId};
use crate::layout::{DeviceConfig, Layout};
use crate::reactor::MAX_REACTOR_LANES;
use crate::registry::{
    DeviceKind, DeviceTypeDef, ItemFilter, Medium, PortDirection, Registry,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Allowed item sets
// ---------------------------------------------------------------------------

/// The items a port or link admits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedItems {
    Any,
    Set(BTreeSet<ItemTypeId>),
}

impl AllowedItems {
    pub fn contains(&self, item: ItemTypeId) -> bool {
        match self {
            AllowedItems::Any => true,
            AllowedItems::Set(set) => set.contains(&item),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            AllowedItems::Any => false,
            AllowedItems::Set(set) => set.is_empty(),
        }
    }

    pub fn intersect(&self, other: &AllowedItems) -> AllowedItems {
        match (self, other) {
            (AllowedItems::Any, x) | (x, AllowedItems::Any) => x.clone(),
            (AllowedItems::Set(a), AllowedItems::Set(b)) => {
                AllowedItems::Set(a.intersection(b).copied().collect())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Resolved devices and links
// ---------------------------------------------------------------------------

/// A port in world space. Derived on every resolution, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotatedPort {
    /// Index into the type's port list.
    pub port_index: usize,
    pub cell: CellPos,
    pub edge: Edge,
    pub direction: PortDirection,
    pub allowed: AllowedItems,
    pub medium: Medium,
}

/// A placed device with its geometry worked out.
#[derive(Debug, Clone)]
pub struct ResolvedDevice {
    pub instance_id: InstanceId,
    pub type_id: DeviceTypeId,
    pub kind: DeviceKind,
    pub rect: CellRect,
    pub ports: Vec<RotatedPort>,
    pub config: DeviceConfig,
    /// Recipes this instance actually runs.
    pub recipes: Vec<RecipeId>,
}

/// A connection from one device's output port to another's input port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortLink {
    /// Sending device, as an index into [`ResolvedLayout::devices`].
    pub from: usize,
    pub from_port: usize,
    pub to: usize,
    pub to_port: usize,
    /// World edge of the output port.
    pub from_edge: Edge,
    /// World edge of the input port; always `from_edge.opposite()`.
    pub to_edge: Edge,
    pub allowed: AllowedItems,
    pub medium: Medium,
}

/// Connectivity of a layout.
#[derive(Debug, Clone, Default)]
pub struct ResolvedLayout {
    /// Devices in layout order. Unknown types and repeated ids are left out.
    pub devices: Vec<ResolvedDevice>,
    pub links: Vec<PortLink>,
    /// Per device, indices into `links` where the device is the sender.
    pub outgoing: Vec<Vec<usize>>,
    /// Per device, indices into `links` where the device is the receiver.
    pub incoming: Vec<Vec<usize>>,
    index: HashMap<InstanceId, usize>,
}

impl ResolvedLayout {
    pub fn device_index(&self, id: &str) -> Option<usize> {
        self.index.get(&InstanceId::new(id)).copied()
    }

    pub fn outgoing_of(&self, id: &str) -> impl Iterator<Item = &PortLink> {
        let links = self.device_index(id).map(|i| self.outgoing[i].as_slice()).unwrap_or(&[]);
        links.iter().map(|&l| &self.links[l])
    }

    pub fn incoming_of(&self, id: &str) -> impl Iterator<Item = &PortLink> {
        let links = self.device_index(id).map(|i| self.incoming[i].as_slice()).unwrap_or(&[]);
        links.iter().map(|&l| &self.links[l])
    }
}

/// Recipes an instance runs, after applying its config.
pub fn effective_recipes(def: &DeviceTypeDef, config: &DeviceConfig) -> Vec<RecipeId> {
    match def.kind {
        DeviceKind::Crafter => match config.recipe {
            Some(recipe) => vec![recipe],
            None => def.recipes.clone(),
        },
        DeviceKind::Reactor { .. } if !config.reactor_recipes.is_empty() => {
            config.reactor_recipes.clone()
        }
        DeviceKind::Reactor { .. } => def.recipes.iter().take(MAX_REACTOR_LANES).copied().collect(),
        _ => def.recipes.clone(),
    }
}

fn allowed_for(
    filter: &ItemFilter,
    registry: &Registry,
    recipes: &[RecipeId],
    config: &DeviceConfig,
) -> AllowedItems {
    match filter {
        ItemFilter::Any => AllowedItems::Any,
        ItemFilter::Only(items) => AllowedItems::Set(items.iter().copied().collect()),
        ItemFilter::RecipeInputs => AllowedItems::Set(registry.recipe_inputs(recipes)),
        ItemFilter::RecipeOutputs => AllowedItems::Set(registry.recipe_outputs(recipes)),
        ItemFilter::PickupItem => AllowedItems::Set(config.pickup_item.into_iter().collect()),
    }
}

fn rotate_ports(
    def: &DeviceTypeDef,
    origin: CellPos,
    rotation: Rotation,
    registry: &Registry,
    recipes: &[RecipeId],
    config: &DeviceConfig,
) -> Vec<RotatedPort> {
    def.ports
        .iter()
        .enumerate()
        .map(|(port_index, port)| {
            let (lx, ly) = rotation.apply_to_cell(port.cell.0, port.cell.1, def.footprint);
            RotatedPort {
                port_index,
                cell: CellPos::new(origin.x + lx as i32, origin.y + ly as i32),
                edge: port.edge.rotated(rotation),
                direction: port.direction,
                allowed: allowed_for(&port.items, registry, recipes, config),
                medium: port.medium,
            }
        })
        .collect()
}

/// Resolve every link in `layout`. Pure: the same inputs always give the same
/// links in the same order.
pub fn resolve_links(registry: &Registry, layout: &Layout) -> ResolvedLayout {
    let mut resolved = ResolvedLayout::default();

    for instance in &layout.devices {
        let Some(def) = registry.get_device(instance.type_id) else {
            log::warn!(
                "device {} has unknown type {:?}; skipped",
                instance.instance_id,
                instance.type_id
            );
            continue;
        };
        if resolved.index.contains_key(&instance.instance_id) {
            log::warn!("duplicate instance id {}; later copy skipped", instance.instance_id);
            continue;
        }
        let recipes = effective_recipes(def, &instance.config);
        let footprint = def.footprint.rotated(instance.rotation);
        let ports = rotate_ports(
            def,
            instance.origin,
            instance.rotation,
            registry,
            &recipes,
            &instance.config,
        );
        resolved
            .index
            .insert(instance.instance_id.clone(), resolved.devices.len());
        resolved.devices.push(ResolvedDevice {
            instance_id: instance.instance_id.clone(),
            type_id: instance.type_id,
            kind: def.kind.clone(),
            rect: CellRect::from_footprint(instance.origin, footprint),
            ports,
            config: instance.config.clone(),
            recipes,
        });
    }

    // Bucket (device, port) pairs by the boundary they sit on.
    let mut buckets: HashMap<BoundaryKey, Vec<(usize, usize)>> = HashMap::new();
    for (d, device) in resolved.devices.iter().enumerate() {
        for (p, port) in device.ports.iter().enumerate() {
            buckets
                .entry(BoundaryKey::of(port.cell, port.edge))
                .or_default()
                .push((d, p));
        }
    }

    for members in buckets.values().filter(|m| m.len() >= 2) {
        for &(od, op) in members {
            let out = &resolved.devices[od].ports[op];
            if out.direction != PortDirection::Output {
                continue;
            }
            for &(id, ip) in members {
                let input = &resolved.devices[id].ports[ip];
                if id == od
                    || input.direction != PortDirection::Input
                    || input.edge != out.edge.opposite()
                    || input.medium != out.medium
                {
                    continue;
                }
                let allowed = out.allowed.intersect(&input.allowed);
                if allowed.is_empty() {
                    continue;
                }
                resolved.links.push(PortLink {
                    from: od,
                    from_port: out.port_index,
                    to: id,
                    to_port: input.port_index,
                    from_edge: out.edge,
                    to_edge: input.edge,
                    allowed,
                    medium: out.medium,
                });
            }
        }
    }

    resolved
        .links
        .sort_by_key(|l| (l.from, l.from_port, l.to, l.to_port));
    resolved.outgoing = vec![Vec::new(); resolved.devices.len()];
    resolved.incoming = vec![Vec::new(); resolved.devices.len()];
    for (i, link) in resolved.links.iter().enumerate() {
        resolved.outgoing[link.from].push(i);
        resolved.incoming[link.to].push(i);
    }
    resolved
}

// ---------------------------------------------------------------------------
// LinkCache
// ---------------------------------------------------------------------------

/// Memoises the last resolution against the identity of the layout `Arc`.
#[derive(Debug, Default)]
pub struct LinkCache {
    layout: Option<Arc<Layout>>,
    resolved: Arc<ResolvedLayout>,
    hits: u64,
    misses: u64,
}

impl LinkCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Links for `layout`, recomputed only when a different layout is passed.
    pub fn get(&mut self, registry: &Registry, layout: &Arc<Layout>) -> Arc<ResolvedLayout> {
        match &self.layout {
            Some(cached) if Arc::ptr_eq(cached, layout) => {
                self.hits += 1;
            }
            _ => {
                self.misses += 1;
                self.resolved = Arc::new(resolve_links(registry, layout));
                self.layout = Some(Arc::clone(layout));
                log::debug!(
                    "resolved {} links across {} devices",
                    self.resolved.links.len(),
                    self.resolved.devices.len()
                );
            }
        }
        Arc::clone(&self.resolved)
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn clear(&mut self) {
        self.layout = None;
        self.resolved = Arc::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::DeviceInstance;
    use crate::test_utils::*;

    #[test]
    fn adjacent_belts_link_east_to_west() {
        let reg = fixture_registry();
        let layout = Layout::new(8)
            .with_device(belt("a", 0, 0, Rotation::R0))
            .with_device(belt("b", 1, 0, Rotation::R0));
        let resolved = resolve_links(&reg, &layout);
        assert_eq!(resolved.links.len(), 1);
        let link = &resolved.links[0];
        assert_eq!((link.from, link.to), (0, 1));
        assert_eq!(link.from_edge, Edge::East);
        assert_eq!(link.to_edge, Edge::West);
        assert_eq!(resolved.outgoing_of("a").count(), 1);
        assert_eq!(resolved.incoming_of("b").count(), 1);
        assert_eq!(resolved.incoming_of("a").count(), 0);
    }

    #[test]
    fn belts_facing_same_way_across_gap_do_not_link() {
        let reg = fixture_registry();
        let layout = Layout::new(8)
            .with_device(belt("a", 0, 0, Rotation::R0))
            .with_device(belt("b", 2, 0, Rotation::R0));
        assert!(resolve_links(&reg, &layout).links.is_empty());
    }

    #[test]
    fn head_to_head_belts_do_not_link() {
        let reg = fixture_registry();
        let layout = Layout::new(8)
            .with_device(belt("a", 0, 0, Rotation::R0))
            .with_device(belt("b", 1, 0, Rotation::R180));
        assert!(resolve_links(&reg, &layout).links.is_empty());
    }

    #[test]
    fn rotated_belt_feeds_south() {
        let reg = fixture_registry();
        let layout = Layout::new(8)
            .with_device(belt("a", 0, 0, Rotation::R90))
            .with_device(belt("b", 0, 1, Rotation::R90));
        let resolved = resolve_links(&reg, &layout);
        assert_eq!(resolved.links.len(), 1);
        assert_eq!(resolved.links[0].from_edge, Edge::South);
        assert_eq!(resolved.links[0].to_edge, Edge::North);
    }

    #[test]
    fn liquid_ports_never_link_to_solid_ports() {
        let reg = fixture_registry();
        let layout = Layout::new(8)
            .with_device(belt("a", 0, 0, Rotation::R0))
            .with_device(DeviceInstance::new("p", pipe_type(&reg), CellPos::new(1, 0)));
        assert!(resolve_links(&reg, &layout).links.is_empty());
    }

    #[test]
    fn recipe_filters_intersect() {
        let reg = fixture_registry();
        // Smelter outputs ingots; a second smelter only takes ore.
        let smelter = reg.device_id("smelter").unwrap();
        let layout = Layout::new(8)
            .with_device(DeviceInstance::new("s1", smelter, CellPos::new(0, 0)))
            .with_device(DeviceInstance::new("s2", smelter, CellPos::new(1, 0)));
        assert!(resolve_links(&reg, &layout).links.is_empty());

        let layout = Layout::new(8)
            .with_device(DeviceInstance::new("s1", smelter, CellPos::new(0, 0)))
            .with_device(belt("b", 1, 0, Rotation::R0));
        let resolved = resolve_links(&reg, &layout);
        assert_eq!(resolved.links.len(), 1);
        assert!(resolved.links[0].allowed.contains(ingot()));
        assert!(!resolved.links[0].allowed.contains(ore()));
    }

    #[test]
    fn unknown_types_and_duplicate_ids_are_skipped() {
        let reg = fixture_registry();
        let layout = Layout::new(8)
            .with_device(belt("a", 0, 0, Rotation::R0))
            .with_device(DeviceInstance::new("ghost", DeviceTypeId(999), CellPos::new(3, 3)))
            .with_device(belt("a", 5, 5, Rotation::R0));
        let resolved = resolve_links(&reg, &layout);
        assert_eq!(resolved.devices.len(), 1);
        assert!(resolved.device_index("ghost").is_none());
    }

    #[test]
    fn resolution_is_idempotent() {
        let reg = fixture_registry();
        let layout = Layout::new(8)
            .with_device(belt("a", 0, 1, Rotation::R0))
            .with_device(splitter("s", 1, 1))
            .with_device(belt("n", 1, 0, Rotation::R270))
            .with_device(belt("e", 2, 1, Rotation::R0))
            .with_device(belt("so", 1, 2, Rotation::R90));
        let first = resolve_links(&reg, &layout);
        let second = resolve_links(&reg, &layout);
        assert_eq!(first.links, second.links);
        assert_eq!(first.outgoing, second.outgoing);
        assert_eq!(first.outgoing[1].len(), 3);
    }

    #[test]
    fn allowed_intersection() {
        let a = AllowedItems::Set(BTreeSet::from([ItemTypeId(0), ItemTypeId(1)]));
        let b = AllowedItems::Set(BTreeSet::from([ItemTypeId(1), ItemTypeId(2)]));
        assert_eq!(a.intersect(&AllowedItems::Any), a);
        assert_eq!(
            a.intersect(&b),
            AllowedItems::Set(BTreeSet::from([ItemTypeId(1)]))
        );
        assert!(AllowedItems::Set(BTreeSet::new()).is_empty());
        assert!(!AllowedItems::Any.is_empty());
    }

    #[test]
    fn cache_hits_on_same_arc_and_misses_on_new_one() {
        let reg = fixture_registry();
        let layout = Arc::new(Layout::new(8).with_device(belt("a", 0, 0, Rotation::R0)));
        let mut cache = LinkCache::new();
        let first = cache.get(&reg, &layout);
        let second = cache.get(&reg, &layout);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!((cache.hits(), cache.misses()), (1, 1));

        let edited = Arc::new((*layout).clone());
        cache.get(&reg, &edited);
        assert_eq!(cache.misses(), 2);
    }
}
