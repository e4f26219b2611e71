use crate::fixed::Fixed64;
use crate::geometry::{Edge, Footprint};
use crate::id::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

// ---------------------------------------------------------------------------
// Items and recipes
// ---------------------------------------------------------------------------

/// Physical state of an item. Liquids only travel through liquid ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PhysicalState {
    #[default]
    Solid,
    Liquid,
}

/// The kind of item a port carries. Mirrors [`PhysicalState`].
pub type Medium = PhysicalState;

/// An item type definition in the registry.
#[derive(Debug, Clone)]
pub struct ItemDef {
    pub name: String,
    pub state: PhysicalState,
}

/// A recipe input/output entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeEntry {
    pub item: ItemTypeId,
    pub quantity: u32,
}

impl RecipeEntry {
    pub fn new(item: ItemTypeId, quantity: u32) -> Self {
        Self { item, quantity }
    }
}

/// A recipe definition. Duration is in simulated seconds so the same content
/// runs at any tick rate.
#[derive(Debug, Clone)]
pub struct RecipeDef {
    pub name: String,
    pub inputs: Vec<RecipeEntry>,
    pub outputs: Vec<RecipeEntry>,
    pub seconds: Fixed64,
}

// ---------------------------------------------------------------------------
// Device types
// ---------------------------------------------------------------------------

/// Runtime shape of a device, one per [`crate::runtime::DeviceRuntime`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuntimeKind {
    Processor,
    Storage,
    Conveyor,
    Junction,
}

/// Routing behaviour of a junction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JunctionKind {
    /// One input fanned out round-robin across several outputs.
    Splitter,
    /// Several inputs funnelled into one output.
    Merger,
    /// Four-way crossing with independent north/south and west/east lanes.
    Bridge,
}

/// What a device type does. Each kind maps onto exactly one [`RuntimeKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceKind {
    /// Runs one recipe at a time from an input buffer into an output buffer.
    Crafter,
    /// Runs up to two recipes side by side over a shared slot pool.
    Reactor { pool_slots: u32, slot_capacity: u32 },
    /// Draws its configured item out of the warehouse ledger.
    Pickup,
    /// Holds items and periodically submits them to the warehouse.
    Storage { capacity: u32 },
    /// Carries one item across one cell.
    Conveyor,
    Junction(JunctionKind),
}

impl DeviceKind {
    pub fn runtime_kind(&self) -> RuntimeKind {
        match self {
            DeviceKind::Crafter | DeviceKind::Reactor { .. } | DeviceKind::Pickup => {
                RuntimeKind::Processor
            }
            DeviceKind::Storage { .. } => RuntimeKind::Storage,
            DeviceKind::Conveyor => RuntimeKind::Conveyor,
            DeviceKind::Junction(_) => RuntimeKind::Junction,
        }
    }
}

/// Whether a port takes items in or hands them out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortDirection {
    Input,
    Output,
}

/// Which items a port admits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemFilter {
    Any,
    Only(Vec<ItemTypeId>),
    /// Inputs of the device's selected recipe(s).
    RecipeInputs,
    /// Outputs of the device's selected recipe(s).
    RecipeOutputs,
    /// The item configured on a pickup device.
    PickupItem,
}

/// A port on a device type, in the unrotated local frame.
#[derive(Debug, Clone)]
pub struct PortDef {
    /// Local cell (x, y) inside the footprint.
    pub cell: (u32, u32),
    pub edge: Edge,
    pub direction: PortDirection,
    pub items: ItemFilter,
    pub medium: Medium,
}

impl PortDef {
    pub fn input(x: u32, y: u32, edge: Edge) -> Self {
        Self {
            cell: (x, y),
            edge,
            direction: PortDirection::Input,
            items: ItemFilter::Any,
            medium: Medium::Solid,
        }
    }

    pub fn output(x: u32, y: u32, edge: Edge) -> Self {
        Self {
            cell: (x, y),
            edge,
            direction: PortDirection::Output,
            items: ItemFilter::Any,
            medium: Medium::Solid,
        }
    }

    pub fn with_items(mut self, items: ItemFilter) -> Self {
        self.items = items;
        self
    }

    pub fn liquid(mut self) -> Self {
        self.medium = Medium::Liquid;
        self
    }
}

/// A device type definition: footprint, ports, buffers and recipes.
#[derive(Debug, Clone)]
pub struct DeviceTypeDef {
    pub name: String,
    pub kind: DeviceKind,
    pub footprint: Footprint,
    pub ports: Vec<PortDef>,
    pub requires_power: bool,
    /// Present on power sources: how many cells beyond the footprint they supply.
    pub power_supply_range: Option<u32>,
    pub recipes: Vec<RecipeId>,
    /// Per-item input buffer capacity.
    pub input_capacity: u32,
    /// Per-item output buffer capacity.
    pub output_capacity: u32,
}

impl DeviceTypeDef {
    pub fn new(name: &str, kind: DeviceKind, footprint: Footprint) -> Self {
        Self {
            name: name.to_string(),
            kind,
            footprint,
            ports: Vec::new(),
            requires_power: false,
            power_supply_range: None,
            recipes: Vec::new(),
            input_capacity: 0,
            output_capacity: 0,
        }
    }

    pub fn with_port(mut self, port: PortDef) -> Self {
        self.ports.push(port);
        self
    }

    pub fn with_recipes(mut self, recipes: Vec<RecipeId>) -> Self {
        self.recipes = recipes;
        self
    }

    pub fn with_buffers(mut self, input_capacity: u32, output_capacity: u32) -> Self {
        self.input_capacity = input_capacity;
        self.output_capacity = output_capacity;
        self
    }

    pub fn powered(mut self) -> Self {
        self.requires_power = true;
        self
    }

    pub fn power_source(mut self, range: u32) -> Self {
        self.power_supply_range = Some(range);
        self
    }

    pub fn runtime_kind(&self) -> RuntimeKind {
        self.kind.runtime_kind()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for constructing an immutable Registry.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    items: Vec<ItemDef>,
    item_name_to_id: HashMap<String, ItemTypeId>,
    recipes: Vec<RecipeDef>,
    recipe_name_to_id: HashMap<String, RecipeId>,
    devices: Vec<DeviceTypeDef>,
    device_name_to_id: HashMap<String, DeviceTypeId>,
    duplicates: Vec<String>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an item type. Returns its ID.
    pub fn register_item(&mut self, name: &str, state: PhysicalState) -> ItemTypeId {
        let id = ItemTypeId(self.items.len() as u32);
        self.items.push(ItemDef {
            name: name.to_string(),
            state,
        });
        if self.item_name_to_id.insert(name.to_string(), id).is_some() {
            self.duplicates.push(name.to_string());
        }
        id
    }

    /// Register a recipe. Returns its ID.
    pub fn register_recipe(
        &mut self,
        name: &str,
        inputs: Vec<RecipeEntry>,
        outputs: Vec<RecipeEntry>,
        seconds: Fixed64,
    ) -> RecipeId {
        let id = RecipeId(self.recipes.len() as u32);
        self.recipes.push(RecipeDef {
            name: name.to_string(),
            inputs,
            outputs,
            seconds,
        });
        if self.recipe_name_to_id.insert(name.to_string(), id).is_some() {
            self.duplicates.push(name.to_string());
        }
        id
    }

    /// Register a device type. Returns its ID.
    pub fn register_device(&mut self, def: DeviceTypeDef) -> DeviceTypeId {
        let id = DeviceTypeId(self.devices.len() as u32);
        if self.device_name_to_id.insert(def.name.clone(), id).is_some() {
            self.duplicates.push(def.name.clone());
        }
        self.devices.push(def);
        id
    }

    pub fn item_id(&self, name: &str) -> Option<ItemTypeId> {
        self.item_name_to_id.get(name).copied()
    }

    pub fn recipe_id(&self, name: &str) -> Option<RecipeId> {
        self.recipe_name_to_id.get(name).copied()
    }

    pub fn device_id(&self, name: &str) -> Option<DeviceTypeId> {
        self.device_name_to_id.get(name).copied()
    }

    /// Finalize and build the immutable registry.
    pub fn build(self) -> Result<Registry, RegistryError> {
        if let Some(name) = self.duplicates.first() {
            return Err(RegistryError::DuplicateName(name.clone()));
        }

        for recipe in &self.recipes {
            for entry in recipe.inputs.iter().chain(recipe.outputs.iter()) {
                if entry.item.0 as usize >= self.items.len() {
                    return Err(RegistryError::InvalidItemRef(entry.item));
                }
            }
        }

        for device in &self.devices {
            for recipe in &device.recipes {
                if recipe.0 as usize >= self.recipes.len() {
                    return Err(RegistryError::InvalidRecipeRef {
                        device: device.name.clone(),
                        recipe: *recipe,
                    });
                }
            }
            for port in &device.ports {
                let (x, y) = port.cell;
                if !device.footprint.contains_local(x, y) {
                    return Err(RegistryError::PortOutsideFootprint {
                        device: device.name.clone(),
                        cell: port.cell,
                    });
                }
                if !port.edge.is_outer(x, y, device.footprint) {
                    return Err(RegistryError::PortNotOnBoundary {
                        device: device.name.clone(),
                        cell: port.cell,
                        edge: port.edge,
                    });
                }
                if let ItemFilter::Only(items) = &port.items {
                    if let Some(bad) = items.iter().find(|i| i.0 as usize >= self.items.len()) {
                        return Err(RegistryError::InvalidItemRef(*bad));
                    }
                }
            }
        }

        Ok(Registry {
            items: self.items,
            item_name_to_id: self.item_name_to_id,
            recipes: self.recipes,
            recipe_name_to_id: self.recipe_name_to_id,
            devices: self.devices,
            device_name_to_id: self.device_name_to_id,
        })
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Immutable registry. Frozen after build(). Thread-safe to share.
#[derive(Debug)]
pub struct Registry {
    items: Vec<ItemDef>,
    item_name_to_id: HashMap<String, ItemTypeId>,
    recipes: Vec<RecipeDef>,
    recipe_name_to_id: HashMap<String, RecipeId>,
    devices: Vec<DeviceTypeDef>,
    device_name_to_id: HashMap<String, DeviceTypeId>,
}

impl Registry {
    pub fn get_item(&self, id: ItemTypeId) -> Option<&ItemDef> {
        self.items.get(id.0 as usize)
    }

    pub fn get_recipe(&self, id: RecipeId) -> Option<&RecipeDef> {
        self.recipes.get(id.0 as usize)
    }

    pub fn get_device(&self, id: DeviceTypeId) -> Option<&DeviceTypeDef> {
        self.devices.get(id.0 as usize)
    }

    pub fn item_id(&self, name: &str) -> Option<ItemTypeId> {
        self.item_name_to_id.get(name).copied()
    }

    pub fn recipe_id(&self, name: &str) -> Option<RecipeId> {
        self.recipe_name_to_id.get(name).copied()
    }

    pub fn device_id(&self, name: &str) -> Option<DeviceTypeId> {
        self.device_name_to_id.get(name).copied()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn recipe_count(&self) -> usize {
        self.recipes.len()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Unregistered items are treated as solids.
    pub fn item_state(&self, id: ItemTypeId) -> PhysicalState {
        self.get_item(id).map(|i| i.state).unwrap_or_default()
    }

    /// Union of the inputs of the given recipes.
    pub fn recipe_inputs(&self, recipes: &[RecipeId]) -> BTreeSet<ItemTypeId> {
        recipes
            .iter()
            .filter_map(|r| self.get_recipe(*r))
            .flat_map(|r| r.inputs.iter().map(|e| e.item))
            .collect()
    }

    /// Union of the outputs of the given recipes.
    pub fn recipe_outputs(&self, recipes: &[RecipeId]) -> BTreeSet<ItemTypeId> {
        recipes
            .iter()
            .filter_map(|r| self.get_recipe(*r))
            .flat_map(|r| r.outputs.iter().map(|e| e.item))
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("duplicate name: {0}")]
    DuplicateName(String),
    #[error("invalid item reference: {0:?}")]
    InvalidItemRef(ItemTypeId),
    #[error("device type {device} references unknown recipe {recipe:?}")]
    InvalidRecipeRef { device: String, recipe: RecipeId },
    #[error("device type {device} has a port on cell {cell:?} outside its footprint")]
    PortOutsideFootprint { device: String, cell: (u32, u32) },
    #[error("device type {device} has a port on the inner {edge:?} edge of cell {cell:?}")]
    PortNotOnBoundary {
        device: String,
        cell: (u32, u32),
        edge: Edge,
    },
}
