//! Serde data file structs for lot content, layouts and run settings.
//!
//! Everything on disk refers to items, recipes and device types by name. The
//! loader resolves names into registry ids; these structs never hold ids.

use serde::Deserialize;

// ===========================================================================
// Content: items and recipes
// ===========================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateData {
    #[default]
    Solid,
    Liquid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemData {
    pub name: String,
    #[serde(default)]
    pub state: StateData,
}

/// A recipe definition. Entries are `("item_name", quantity)` pairs.
#[derive(Debug, Clone, Deserialize)]
pub struct RecipeData {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<(String, u32)>,
    pub outputs: Vec<(String, u32)>,
    /// Cycle time in simulated seconds.
    pub seconds: f64,
}

// ===========================================================================
// Content: device types
// ===========================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KindData {
    Crafter,
    Reactor { pool_slots: u32, slot_capacity: u32 },
    Pickup,
    Storage { capacity: u32 },
    Conveyor,
    Splitter,
    Merger,
    Bridge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeData {
    North,
    East,
    South,
    West,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectionData {
    Input,
    Output,
}

/// Which items a port admits.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemsData {
    #[default]
    Any,
    Only(Vec<String>),
    RecipeInputs,
    RecipeOutputs,
    PickupItem,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortData {
    #[serde(default)]
    pub x: u32,
    #[serde(default)]
    pub y: u32,
    pub edge: EdgeData,
    pub direction: DirectionData,
    #[serde(default)]
    pub items: ItemsData,
    #[serde(default)]
    pub medium: StateData,
}

/// The footprint (size) of a device on the grid.
#[derive(Debug, Clone, Deserialize)]
pub struct FootprintData {
    pub width: u32,
    pub height: u32,
}

fn default_footprint() -> FootprintData {
    FootprintData {
        width: 1,
        height: 1,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceData {
    pub name: String,
    pub kind: KindData,
    #[serde(default = "default_footprint")]
    pub footprint: FootprintData,
    #[serde(default)]
    pub ports: Vec<PortData>,
    #[serde(default)]
    pub recipes: Vec<String>,
    #[serde(default)]
    pub requires_power: bool,
    /// Set on power sources.
    #[serde(default)]
    pub power_supply_range: Option<u32>,
    #[serde(default)]
    pub input_capacity: u32,
    #[serde(default)]
    pub output_capacity: u32,
}

/// A full content file: items, recipes and device types.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentData {
    #[serde(default)]
    pub items: Vec<ItemData>,
    #[serde(default)]
    pub recipes: Vec<RecipeData>,
    #[serde(default)]
    pub devices: Vec<DeviceData>,
}

// ===========================================================================
// Layouts
// ===========================================================================

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlacementData {
    pub id: String,
    /// Device type name.
    pub device: String,
    pub x: i32,
    pub y: i32,
    /// Clockwise degrees: 0, 90, 180 or 270.
    #[serde(default)]
    pub rotation: u16,
    #[serde(default)]
    pub pickup_item: Option<String>,
    #[serde(default)]
    pub recipe: Option<String>,
    #[serde(default)]
    pub reactor_recipes: Vec<String>,
    #[serde(default)]
    pub preload: Vec<(String, u32)>,
    #[serde(default = "default_true")]
    pub submit_to_warehouse: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LayoutData {
    pub lot_size: u32,
    #[serde(default)]
    pub devices: Vec<PlacementData>,
}

// ===========================================================================
// Run settings
// ===========================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WarehouseData {
    /// Item names with unlimited stock.
    #[serde(default)]
    pub infinite: Vec<String>,
    #[serde(default)]
    pub stock: Vec<(String, u64)>,
}

/// Run settings. Omitted fields keep the engine defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimConfigData {
    pub tick_rate_hz: Option<u32>,
    pub seconds_per_cell: Option<f64>,
    pub storage_submit_interval_seconds: Option<f64>,
    pub pickup_blocked_grace_seconds: Option<f64>,
    pub max_ticks_per_frame: Option<u32>,
    #[serde(default)]
    pub warehouse: WarehouseData,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_defaults_fill_in() {
        let device: DeviceData = ron::from_str(r#"(name: "belt", kind: conveyor)"#).unwrap();
        assert_eq!(device.footprint.width, 1);
        assert!(device.ports.is_empty());
        assert!(!device.requires_power);
        assert!(device.power_supply_range.is_none());
    }

    #[test]
    fn kind_with_fields_parses_in_every_format() {
        let ron_kind: KindData = ron::from_str("storage(capacity: 50)").unwrap();
        assert!(matches!(ron_kind, KindData::Storage { capacity: 50 }));

        let json_kind: KindData =
            serde_json::from_str(r#"{"reactor": {"pool_slots": 3, "slot_capacity": 10}}"#).unwrap();
        assert!(matches!(
            json_kind,
            KindData::Reactor {
                pool_slots: 3,
                slot_capacity: 10
            }
        ));

        let toml_device: DeviceData = toml::from_str(
            r#"
name = "box"
kind = { storage = { capacity = 20 } }
"#,
        )
        .unwrap();
        assert!(matches!(toml_device.kind, KindData::Storage { capacity: 20 }));
    }

    #[test]
    fn port_filters_parse() {
        let port: PortData =
            ron::from_str(r#"(edge: west, direction: input, items: only(["ore"]), medium: liquid)"#)
                .unwrap();
        assert_eq!(port.edge, EdgeData::West);
        assert!(matches!(port.items, ItemsData::Only(ref v) if v == &["ore".to_string()]));
        assert_eq!(port.medium, StateData::Liquid);
        assert_eq!((port.x, port.y), (0, 0));
    }

    #[test]
    fn placement_defaults() {
        let p: PlacementData =
            serde_json::from_str(r#"{"id": "a", "device": "belt", "x": 1, "y": 2}"#).unwrap();
        assert_eq!(p.rotation, 0);
        assert!(p.submit_to_warehouse);
        assert!(p.preload.is_empty());
    }

    #[test]
    fn config_fields_are_optional() {
        let c: SimConfigData = toml::from_str("tick_rate_hz = 30").unwrap();
        assert_eq!(c.tick_rate_hz, Some(30));
        assert!(c.seconds_per_cell.is_none());
        assert!(c.warehouse.infinite.is_empty());
    }
}
