//! The static input to a run: placed device instances on a square lot.
//!
//! A [`Layout`] is never mutated by the engine. Callers hand it over as an
//! `Arc<Layout>`; the pointer identity is what the link cache keys on, so an
//! edited layout must be a new `Arc`.

use crate::geometry::{CellPos, Rotation};
use crate::id::{DeviceTypeId, InstanceId, ItemTypeId, RecipeId};
use serde::{Deserialize, Serialize};

/// Per-instance settings chosen in the editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Item a pickup device draws out of the warehouse.
    #[serde(default)]
    pub pickup_item: Option<ItemTypeId>,
    /// Fixed recipe for a crafter. `None` lets the crafter pick the first
    /// recipe of its type whose inputs are on hand.
    #[serde(default)]
    pub recipe: Option<RecipeId>,
    /// Recipes run by a reactor's lanes, one per lane.
    #[serde(default)]
    pub reactor_recipes: Vec<RecipeId>,
    /// Items placed into the device's input side when the run starts.
    #[serde(default)]
    pub preload: Vec<(ItemTypeId, u32)>,
    /// Whether a storage device forwards its inventory to the warehouse.
    #[serde(default = "default_submit")]
    pub submit_to_warehouse: bool,
}

fn default_submit() -> bool {
    true
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            pickup_item: None,
            recipe: None,
            reactor_recipes: Vec::new(),
            preload: Vec::new(),
            submit_to_warehouse: true,
        }
    }
}

/// One placed device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInstance {
    pub instance_id: InstanceId,
    pub type_id: DeviceTypeId,
    /// Top-left cell of the rotated footprint.
    pub origin: CellPos,
    #[serde(default)]
    pub rotation: Rotation,
    #[serde(default)]
    pub config: DeviceConfig,
}

impl DeviceInstance {
    pub fn new(instance_id: impl Into<InstanceId>, type_id: DeviceTypeId, origin: CellPos) -> Self {
        Self {
            instance_id: instance_id.into(),
            type_id,
            origin,
            rotation: Rotation::R0,
            config: DeviceConfig::default(),
        }
    }

    pub fn rotated(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_config(mut self, config: DeviceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_pickup_item(mut self, item: ItemTypeId) -> Self {
        self.config.pickup_item = Some(item);
        self
    }

    pub fn with_recipe(mut self, recipe: RecipeId) -> Self {
        self.config.recipe = Some(recipe);
        self
    }

    pub fn with_preload(mut self, item: ItemTypeId, count: u32) -> Self {
        self.config.preload.push((item, count));
        self
    }
}

impl From<String> for InstanceId {
    fn from(s: String) -> Self {
        InstanceId(s)
    }
}

/// A lot and everything placed on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    /// Side length of the square lot in cells.
    pub lot_size: u32,
    pub devices: Vec<DeviceInstance>,
}

impl Layout {
    pub fn new(lot_size: u32) -> Self {
        Self {
            lot_size,
            devices: Vec::new(),
        }
    }

    pub fn push(&mut self, device: DeviceInstance) -> &mut Self {
        self.devices.push(device);
        self
    }

    pub fn with_device(mut self, device: DeviceInstance) -> Self {
        self.devices.push(device);
        self
    }

    pub fn device(&self, id: &str) -> Option<&DeviceInstance> {
        self.devices.iter().find(|d| d.instance_id.as_str() == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_submit_to_warehouse() {
        assert!(DeviceConfig::default().submit_to_warehouse);
        let parsed: DeviceConfig = serde_json::from_str("{}").unwrap();
        assert!(parsed.submit_to_warehouse);
        assert!(parsed.pickup_item.is_none());
    }

    #[test]
    fn builder_helpers_fill_config() {
        let device = DeviceInstance::new("p1", DeviceTypeId(3), CellPos::new(1, 2))
            .rotated(Rotation::R180)
            .with_pickup_item(ItemTypeId(0))
            .with_preload(ItemTypeId(1), 4);
        assert_eq!(device.rotation, Rotation::R180);
        assert_eq!(device.config.pickup_item, Some(ItemTypeId(0)));
        assert_eq!(device.config.preload, vec![(ItemTypeId(1), 4)]);
    }

    #[test]
    fn lookup_by_instance_id() {
        let layout = Layout::new(8)
            .with_device(DeviceInstance::new("a", DeviceTypeId(0), CellPos::new(0, 0)))
            .with_device(DeviceInstance::new("b", DeviceTypeId(0), CellPos::new(1, 0)));
        assert_eq!(layout.device("b").map(|d| d.origin), Some(CellPos::new(1, 0)));
        assert!(layout.device("c").is_none());
    }
}
