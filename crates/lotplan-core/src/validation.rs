//! Static checks run once when a simulation starts.
//!
//! Every problem found becomes a [`ValidationIssue`]. Issues that disable a
//! device map onto a sticky [`StallReason`]; the device then stays inert for
//! the whole run.

use crate::id::{DeviceTypeId, InstanceId, ItemTypeId, RecipeId};
use crate::layout::Layout;
use crate::links::ResolvedLayout;
use crate::reactor::MAX_REACTOR_LANES;
use crate::registry::{DeviceKind, Registry};
use crate::runtime::StallReason;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

// ---------------------------------------------------------------------------
// Issues
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationIssue {
    /// The device names a type the registry does not know. No runtime is built.
    UnknownType {
        device: InstanceId,
        type_id: DeviceTypeId,
    },
    /// A second device reuses an instance id. Only the first is simulated.
    DuplicateInstance(InstanceId),
    Overlap { a: InstanceId, b: InstanceId },
    OutOfLot(InstanceId),
    MissingPickupItem(InstanceId),
    UnknownItem { device: InstanceId, item: ItemTypeId },
    InvalidRecipe { device: InstanceId, recipe: RecipeId },
    TooManyReactorLanes { device: InstanceId, lanes: usize },
    NoPower(InstanceId),
}

impl ValidationIssue {
    /// Devices this issue disables and the reason they stall with.
    fn sticky(&self) -> Vec<(&InstanceId, StallReason)> {
        match self {
            ValidationIssue::UnknownType { .. } | ValidationIssue::DuplicateInstance(_) => vec![],
            ValidationIssue::Overlap { a, b } => {
                vec![(a, StallReason::Overlap), (b, StallReason::Overlap)]
            }
            ValidationIssue::OutOfLot(d)
            | ValidationIssue::MissingPickupItem(d)
            | ValidationIssue::UnknownItem { device: d, .. }
            | ValidationIssue::InvalidRecipe { device: d, .. }
            | ValidationIssue::TooManyReactorLanes { device: d, .. } => {
                vec![(d, StallReason::ConfigError)]
            }
            ValidationIssue::NoPower(d) => vec![(d, StallReason::NoPower)],
        }
    }
}

fn precedence(reason: StallReason) -> u8 {
    match reason {
        StallReason::Overlap => 3,
        StallReason::ConfigError => 2,
        StallReason::NoPower => 1,
        _ => 0,
    }
}

/// Everything static validation found, plus the resulting sticky reasons.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
    sticky: BTreeMap<InstanceId, StallReason>,
}

impl ValidationReport {
    fn push(&mut self, issue: ValidationIssue) {
        for (device, reason) in issue.sticky() {
            let slot = self.sticky.entry(device.clone()).or_default();
            if precedence(reason) > precedence(*slot) {
                *slot = reason;
            }
        }
        self.issues.push(issue);
    }

    /// Sticky stall reason for a device, or `StallReason::None`.
    pub fn sticky_reason(&self, device: &InstanceId) -> StallReason {
        self.sticky.get(device).copied().unwrap_or_default()
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

/// Run every static check over `layout`.
pub fn validate_layout(
    registry: &Registry,
    layout: &Layout,
    resolved: &ResolvedLayout,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    let mut seen = BTreeSet::new();
    for instance in &layout.devices {
        if registry.get_device(instance.type_id).is_none() {
            report.push(ValidationIssue::UnknownType {
                device: instance.instance_id.clone(),
                type_id: instance.type_id,
            });
        } else if !seen.insert(&instance.instance_id) {
            report.push(ValidationIssue::DuplicateInstance(instance.instance_id.clone()));
        }
    }

    // Overlaps, reported once per pair in layout order.
    let mut occupied = HashMap::new();
    let mut pairs = BTreeSet::new();
    for (d, device) in resolved.devices.iter().enumerate() {
        for cell in device.rect.cells() {
            if let Some(&other) = occupied.get(&cell) {
                pairs.insert((other, d));
            } else {
                occupied.insert(cell, d);
            }
        }
    }
    let mut overlapped = BTreeSet::new();
    for (a, b) in pairs {
        overlapped.insert(a);
        overlapped.insert(b);
        report.push(ValidationIssue::Overlap {
            a: resolved.devices[a].instance_id.clone(),
            b: resolved.devices[b].instance_id.clone(),
        });
    }

    for device in &resolved.devices {
        let Some(def) = registry.get_device(device.type_id) else {
            continue;
        };
        let id = &device.instance_id;

        if !device.rect.within_lot(layout.lot_size) {
            report.push(ValidationIssue::OutOfLot(id.clone()));
        }

        match &def.kind {
            DeviceKind::Pickup => match device.config.pickup_item {
                None => report.push(ValidationIssue::MissingPickupItem(id.clone())),
                Some(item) if registry.get_item(item).is_none() => {
                    report.push(ValidationIssue::UnknownItem {
                        device: id.clone(),
                        item,
                    });
                }
                Some(_) => {}
            },
            DeviceKind::Crafter => {
                if let Some(recipe) = device.config.recipe {
                    if !def.recipes.contains(&recipe) {
                        report.push(ValidationIssue::InvalidRecipe {
                            device: id.clone(),
                            recipe,
                        });
                    }
                }
            }
            DeviceKind::Reactor { .. } => {
                if device.recipes.len() > MAX_REACTOR_LANES {
                    report.push(ValidationIssue::TooManyReactorLanes {
                        device: id.clone(),
                        lanes: device.recipes.len(),
                    });
                }
                for &recipe in &device.recipes {
                    if !def.recipes.contains(&recipe) {
                        report.push(ValidationIssue::InvalidRecipe {
                            device: id.clone(),
                            recipe,
                        });
                    }
                }
            }
            _ => {}
        }
    }

    // Power: a source covers its footprint grown by its range.
    let sources: Vec<_> = resolved
        .devices
        .iter()
        .enumerate()
        .filter(|(d, _)| !overlapped.contains(d))
        .filter_map(|(_, device)| {
            let range = registry.get_device(device.type_id)?.power_supply_range?;
            Some(device.rect.expanded(range))
        })
        .collect();
    for device in &resolved.devices {
        let needs_power = registry
            .get_device(device.type_id)
            .is_some_and(|def| def.requires_power);
        if needs_power && !sources.iter().any(|area| area.intersects(&device.rect)) {
            report.push(ValidationIssue::NoPower(device.instance_id.clone()));
        }
    }

    for issue in &report.issues {
        log::warn!("layout validation: {issue:?}");
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{CellPos, Rotation};
    use crate::layout::DeviceInstance;
    use crate::links::resolve_links;
    use crate::test_utils::*;

    fn validate(layout: &Layout) -> ValidationReport {
        let reg = fixture_registry();
        let resolved = resolve_links(&reg, layout);
        validate_layout(&reg, layout, &resolved)
    }

    #[test]
    fn clean_layout_has_no_issues() {
        let layout = Layout::new(8)
            .with_device(belt("a", 0, 0, Rotation::R0))
            .with_device(belt("b", 1, 0, Rotation::R0));
        assert!(validate(&layout).is_clean());
    }

    #[test]
    fn overlap_marks_both_devices() {
        let layout = Layout::new(8)
            .with_device(belt("a", 2, 2, Rotation::R0))
            .with_device(belt("b", 2, 2, Rotation::R90));
        let report = validate(&layout);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.sticky_reason(&"a".into()), StallReason::Overlap);
        assert_eq!(report.sticky_reason(&"b".into()), StallReason::Overlap);
    }

    #[test]
    fn pickup_without_item_is_config_error() {
        let reg = fixture_registry();
        let pickup = reg.device_id("pickup_port").unwrap();
        let layout = Layout::new(8).with_device(DeviceInstance::new("p", pickup, CellPos::new(0, 0)));
        let report = validate(&layout);
        assert_eq!(
            report.issues,
            vec![ValidationIssue::MissingPickupItem("p".into())]
        );
        assert_eq!(report.sticky_reason(&"p".into()), StallReason::ConfigError);
    }

    #[test]
    fn out_of_lot_is_config_error() {
        let layout = Layout::new(4).with_device(belt("a", 4, 0, Rotation::R0));
        let report = validate(&layout);
        assert_eq!(report.sticky_reason(&"a".into()), StallReason::ConfigError);
    }

    #[test]
    fn powered_device_needs_a_source_in_range() {
        let reg = fixture_registry();
        let smelter = reg.device_id("smelter").unwrap();
        let hub = reg.device_id("hub").unwrap();

        let unpowered = Layout::new(32).with_device(DeviceInstance::new("s", smelter, CellPos::new(20, 20)));
        let report = validate(&unpowered);
        assert_eq!(report.sticky_reason(&"s".into()), StallReason::NoPower);

        // Hub covers (0,0)..(2,2) grown by 8 cells.
        let powered = unpowered
            .clone()
            .with_device(DeviceInstance::new("hub", hub, CellPos::new(0, 0)))
            .with_device(DeviceInstance::new("near", smelter, CellPos::new(10, 10)));
        let report = validate(&powered);
        assert_eq!(report.sticky_reason(&"near".into()), StallReason::None);
        assert_eq!(report.sticky_reason(&"s".into()), StallReason::NoPower);
    }

    #[test]
    fn overlapped_source_powers_nothing_and_overlap_wins() {
        let reg = fixture_registry();
        let smelter = reg.device_id("smelter").unwrap();
        let hub = reg.device_id("hub").unwrap();
        let layout = Layout::new(16)
            .with_device(DeviceInstance::new("hub", hub, CellPos::new(0, 0)))
            .with_device(DeviceInstance::new("s", smelter, CellPos::new(1, 1)))
            .with_device(DeviceInstance::new("t", smelter, CellPos::new(5, 5)));
        let report = validate(&layout);
        assert_eq!(report.sticky_reason(&"s".into()), StallReason::Overlap);
        assert_eq!(report.sticky_reason(&"hub".into()), StallReason::Overlap);
        assert_eq!(report.sticky_reason(&"t".into()), StallReason::NoPower);
    }

    #[test]
    fn crafter_recipe_must_belong_to_type() {
        let reg = fixture_registry();
        let smelter = reg.device_id("smelter").unwrap();
        let hub = reg.device_id("hub").unwrap();
        let mine = reg.recipe_id("mine_ore").unwrap();
        let layout = Layout::new(16)
            .with_device(DeviceInstance::new("hub", hub, CellPos::new(0, 0)))
            .with_device(DeviceInstance::new("s", smelter, CellPos::new(4, 0)).with_recipe(mine));
        let report = validate(&layout);
        assert!(matches!(
            report.issues.as_slice(),
            [ValidationIssue::InvalidRecipe { .. }]
        ));
    }

    #[test]
    fn reactor_lane_limit() {
        let reg = fixture_registry();
        let reactor = reg.device_id("reactor").unwrap();
        let hub = reg.device_id("hub").unwrap();
        let mut instance = DeviceInstance::new("r", reactor, CellPos::new(4, 0));
        instance.config.reactor_recipes = vec![
            reg.recipe_id("refine").unwrap(),
            reg.recipe_id("dissolve").unwrap(),
            reg.recipe_id("refine").unwrap(),
        ];
        let layout = Layout::new(16)
            .with_device(DeviceInstance::new("hub", hub, CellPos::new(0, 0)))
            .with_device(instance);
        let report = validate(&layout);
        assert!(report
            .issues
            .iter()
            .any(|i| matches!(i, ValidationIssue::TooManyReactorLanes { lanes: 3, .. })));
        assert_eq!(report.sticky_reason(&"r".into()), StallReason::ConfigError);
    }

    #[test]
    fn unknown_type_is_reported_without_sticky_reason() {
        let layout = Layout::new(8).with_device(DeviceInstance::new(
            "ghost",
            DeviceTypeId(404),
            CellPos::new(0, 0),
        ));
        let report = validate(&layout);
        assert!(matches!(
            report.issues.as_slice(),
            [ValidationIssue::UnknownType { .. }]
        ));
        assert_eq!(report.sticky_reason(&"ghost".into()), StallReason::None);
    }
}
