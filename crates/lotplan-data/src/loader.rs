//! Resolution pipeline: reads data files, resolves names, builds engine types.
//!
//! Provides format detection (RON/JSON/TOML), file discovery, deserialization
//! helpers, and the loaders that turn [`ContentData`], [`LayoutData`] and
//! [`SimConfigData`] into a `Registry`, a `Layout` and a `SimConfig`.

use crate::schema::*;
use lotplan_core::config::{ConfigError, SimConfig};
use lotplan_core::fixed::f64_to_fixed64;
use lotplan_core::geometry::{CellPos, Edge, Footprint, Rotation};
use lotplan_core::id::{DeviceTypeId, ItemTypeId, RecipeId};
use lotplan_core::layout::{DeviceConfig, DeviceInstance, Layout};
use lotplan_core::registry::{
    DeviceKind, DeviceTypeDef, ItemFilter, JunctionKind, PhysicalState, PortDef, RecipeEntry,
    Registry, RegistryBuilder, RegistryError,
};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Stand-in file name for data loaded from a string.
const INLINE: &str = "<inline>";

// ===========================================================================
// Errors
// ===========================================================================

#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// A required data file was not found in the given directory.
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: String, dir: PathBuf },

    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A name reference could not be resolved.
    #[error("unresolved {expected_kind} reference '{name}' in {file}")]
    UnresolvedRef {
        file: PathBuf,
        name: String,
        expected_kind: &'static str,
    },

    #[error("duplicate name '{name}' in {file}")]
    DuplicateName { file: PathBuf, name: String },

    #[error("device '{id}' in {file} has rotation {degrees}; expected 0, 90, 180 or 270")]
    BadRotation {
        file: PathBuf,
        id: String,
        degrees: u16,
    },

    #[error("invalid content in {file}: {source}")]
    Registry {
        file: PathBuf,
        #[source]
        source: RegistryError,
    },

    #[error("invalid settings in {file}: {source}")]
    InvalidConfig {
        file: PathBuf,
        #[source]
        source: ConfigError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Scan a directory for a data file with the given base name (without extension).
///
/// Returns `Ok(None)` if no file is found, or `Err(ConflictingFormats)` if
/// multiple formats exist for the same base name.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;
    for ext in ["ron", "toml", "json"] {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if candidate.exists() {
            if let Some(existing) = found {
                return Err(DataLoadError::ConflictingFormats {
                    a: existing,
                    b: candidate,
                });
            }
            found = Some(candidate);
        }
    }
    Ok(found)
}

/// Like [`find_data_file`], but returns an error if no file is found.
pub fn require_data_file(dir: &Path, base_name: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name.to_string(),
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

/// Deserialize `text` in `format`. `file` only labels errors.
pub fn parse_str<T: DeserializeOwned>(
    text: &str,
    format: Format,
    file: &Path,
) -> Result<T, DataLoadError> {
    let parse_err = |detail: String| DataLoadError::Parse {
        file: file.to_path_buf(),
        detail,
    };
    match format {
        Format::Ron => ron::from_str(text).map_err(|e| parse_err(e.to_string())),
        Format::Json => serde_json::from_str(text).map_err(|e| parse_err(e.to_string())),
        Format::Toml => toml::from_str(text).map_err(|e| parse_err(e.to_string())),
    }
}

/// Read a file and deserialize it according to its format (detected from extension).
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    parse_str(&content, format, path)
}

// ===========================================================================
// Name resolution helpers
// ===========================================================================

/// Look up a name in a map, returning an `UnresolvedRef` error if not found.
pub fn resolve_name<V: Copy>(
    map: &HashMap<String, V>,
    name: &str,
    file: &Path,
    expected_kind: &'static str,
) -> Result<V, DataLoadError> {
    map.get(name).copied().ok_or_else(|| unresolved(name, file, expected_kind))
}

/// Fail with `DuplicateName` if `name` is already in the map.
pub fn check_duplicate<V>(
    map: &HashMap<String, V>,
    name: &str,
    file: &Path,
) -> Result<(), DataLoadError> {
    if map.contains_key(name) {
        Err(DataLoadError::DuplicateName {
            file: file.to_path_buf(),
            name: name.to_string(),
        })
    } else {
        Ok(())
    }
}

fn unresolved(name: &str, file: &Path, expected_kind: &'static str) -> DataLoadError {
    DataLoadError::UnresolvedRef {
        file: file.to_path_buf(),
        name: name.to_string(),
        expected_kind,
    }
}

// ===========================================================================
// Content -> Registry
// ===========================================================================

fn physical_state(state: StateData) -> PhysicalState {
    match state {
        StateData::Solid => PhysicalState::Solid,
        StateData::Liquid => PhysicalState::Liquid,
    }
}

fn edge(edge: EdgeData) -> Edge {
    match edge {
        EdgeData::North => Edge::North,
        EdgeData::East => Edge::East,
        EdgeData::South => Edge::South,
        EdgeData::West => Edge::West,
    }
}

fn device_kind(kind: &KindData) -> DeviceKind {
    match *kind {
        KindData::Crafter => DeviceKind::Crafter,
        KindData::Reactor {
            pool_slots,
            slot_capacity,
        } => DeviceKind::Reactor {
            pool_slots,
            slot_capacity,
        },
        KindData::Pickup => DeviceKind::Pickup,
        KindData::Storage { capacity } => DeviceKind::Storage { capacity },
        KindData::Conveyor => DeviceKind::Conveyor,
        KindData::Splitter => DeviceKind::Junction(JunctionKind::Splitter),
        KindData::Merger => DeviceKind::Junction(JunctionKind::Merger),
        KindData::Bridge => DeviceKind::Junction(JunctionKind::Bridge),
    }
}

fn entries(
    list: &[(String, u32)],
    items: &HashMap<String, ItemTypeId>,
    file: &Path,
) -> Result<Vec<RecipeEntry>, DataLoadError> {
    list.iter()
        .map(|(name, qty)| Ok(RecipeEntry::new(resolve_name(items, name, file, "item")?, *qty)))
        .collect()
}

/// Resolve a content file into a frozen registry.
pub fn build_registry(content: &ContentData, file: &Path) -> Result<Registry, DataLoadError> {
    let mut builder = RegistryBuilder::new();

    let mut items: HashMap<String, ItemTypeId> = HashMap::new();
    for item in &content.items {
        check_duplicate(&items, &item.name, file)?;
        let id = builder.register_item(&item.name, physical_state(item.state));
        items.insert(item.name.clone(), id);
    }

    let mut recipes: HashMap<String, RecipeId> = HashMap::new();
    for recipe in &content.recipes {
        check_duplicate(&recipes, &recipe.name, file)?;
        if !recipe.seconds.is_finite() || recipe.seconds < 0.0 {
            return Err(DataLoadError::Parse {
                file: file.to_path_buf(),
                detail: format!("recipe '{}' has invalid duration {}", recipe.name, recipe.seconds),
            });
        }
        let id = builder.register_recipe(
            &recipe.name,
            entries(&recipe.inputs, &items, file)?,
            entries(&recipe.outputs, &items, file)?,
            f64_to_fixed64(recipe.seconds),
        );
        recipes.insert(recipe.name.clone(), id);
    }

    let mut devices: HashMap<String, DeviceTypeId> = HashMap::new();
    for device in &content.devices {
        check_duplicate(&devices, &device.name, file)?;
        let footprint = Footprint::new(device.footprint.width, device.footprint.height);
        let mut def = DeviceTypeDef::new(&device.name, device_kind(&device.kind), footprint)
            .with_buffers(device.input_capacity, device.output_capacity);
        def.requires_power = device.requires_power;
        def.power_supply_range = device.power_supply_range;
        def.recipes = device
            .recipes
            .iter()
            .map(|name| resolve_name(&recipes, name, file, "recipe"))
            .collect::<Result<_, _>>()?;

        for port in &device.ports {
            let e = edge(port.edge);
            let mut def_port = match port.direction {
                DirectionData::Input => PortDef::input(port.x, port.y, e),
                DirectionData::Output => PortDef::output(port.x, port.y, e),
            };
            def_port.items = match &port.items {
                ItemsData::Any => ItemFilter::Any,
                ItemsData::Only(names) => ItemFilter::Only(
                    names
                        .iter()
                        .map(|n| resolve_name(&items, n, file, "item"))
                        .collect::<Result<_, _>>()?,
                ),
                ItemsData::RecipeInputs => ItemFilter::RecipeInputs,
                ItemsData::RecipeOutputs => ItemFilter::RecipeOutputs,
                ItemsData::PickupItem => ItemFilter::PickupItem,
            };
            def_port.medium = physical_state(port.medium);
            def = def.with_port(def_port);
        }

        let id = builder.register_device(def);
        devices.insert(device.name.clone(), id);
    }

    let registry = builder.build().map_err(|source| DataLoadError::Registry {
        file: file.to_path_buf(),
        source,
    })?;
    log::debug!(
        "loaded content from {}: {} items, {} recipes, {} device types",
        file.display(),
        registry.item_count(),
        registry.recipe_count(),
        registry.device_count()
    );
    Ok(registry)
}

// ===========================================================================
// Layout
// ===========================================================================

fn registry_item(registry: &Registry, name: &str, file: &Path) -> Result<ItemTypeId, DataLoadError> {
    registry.item_id(name).ok_or_else(|| unresolved(name, file, "item"))
}

fn registry_recipe(registry: &Registry, name: &str, file: &Path) -> Result<RecipeId, DataLoadError> {
    registry.recipe_id(name).ok_or_else(|| unresolved(name, file, "recipe"))
}

/// Resolve a layout file against `registry`. Duplicate instance ids and
/// overlaps are left for the engine's validation to report.
pub fn resolve_layout(
    data: &LayoutData,
    registry: &Registry,
    file: &Path,
) -> Result<Layout, DataLoadError> {
    let mut layout = Layout::new(data.lot_size);
    for placement in &data.devices {
        let type_id = registry
            .device_id(&placement.device)
            .ok_or_else(|| unresolved(&placement.device, file, "device"))?;
        let rotation =
            Rotation::from_degrees(placement.rotation).ok_or_else(|| DataLoadError::BadRotation {
                file: file.to_path_buf(),
                id: placement.id.clone(),
                degrees: placement.rotation,
            })?;

        let config = DeviceConfig {
            pickup_item: placement
                .pickup_item
                .as_deref()
                .map(|n| registry_item(registry, n, file))
                .transpose()?,
            recipe: placement
                .recipe
                .as_deref()
                .map(|n| registry_recipe(registry, n, file))
                .transpose()?,
            reactor_recipes: placement
                .reactor_recipes
                .iter()
                .map(|n| registry_recipe(registry, n, file))
                .collect::<Result<_, _>>()?,
            preload: placement
                .preload
                .iter()
                .map(|(n, count)| Ok((registry_item(registry, n, file)?, *count)))
                .collect::<Result<_, DataLoadError>>()?,
            submit_to_warehouse: placement.submit_to_warehouse,
        };

        layout.push(
            DeviceInstance::new(
                placement.id.as_str(),
                type_id,
                CellPos::new(placement.x, placement.y),
            )
            .rotated(rotation)
            .with_config(config),
        );
    }
    Ok(layout)
}

// ===========================================================================
// Settings
// ===========================================================================

/// Apply settings over the engine defaults and validate the result.
pub fn resolve_config(
    data: &SimConfigData,
    registry: &Registry,
    file: &Path,
) -> Result<SimConfig, DataLoadError> {
    let mut config = SimConfig::default();
    if let Some(v) = data.tick_rate_hz {
        config.tick_rate_hz = v;
    }
    if let Some(v) = data.seconds_per_cell {
        config.seconds_per_cell = v;
    }
    if let Some(v) = data.storage_submit_interval_seconds {
        config.storage_submit_interval_seconds = v;
    }
    if let Some(v) = data.pickup_blocked_grace_seconds {
        config.pickup_blocked_grace_seconds = v;
    }
    if let Some(v) = data.max_ticks_per_frame {
        config.max_ticks_per_frame = v;
    }
    config.warehouse.infinite_items = data
        .warehouse
        .infinite
        .iter()
        .map(|n| registry_item(registry, n, file))
        .collect::<Result<_, _>>()?;
    config.warehouse.initial_stock = data
        .warehouse
        .stock
        .iter()
        .map(|(n, count)| Ok((registry_item(registry, n, file)?, *count)))
        .collect::<Result<_, DataLoadError>>()?;

    config.validate().map_err(|source| DataLoadError::InvalidConfig {
        file: file.to_path_buf(),
        source,
    })?;
    Ok(config)
}

// ===========================================================================
// Entry points
// ===========================================================================

pub fn load_content_str(text: &str, format: Format) -> Result<Registry, DataLoadError> {
    let file = Path::new(INLINE);
    build_registry(&parse_str(text, format, file)?, file)
}

pub fn load_layout_str(
    text: &str,
    format: Format,
    registry: &Registry,
) -> Result<Layout, DataLoadError> {
    let file = Path::new(INLINE);
    resolve_layout(&parse_str(text, format, file)?, registry, file)
}

pub fn load_config_str(
    text: &str,
    format: Format,
    registry: &Registry,
) -> Result<SimConfig, DataLoadError> {
    let file = Path::new(INLINE);
    resolve_config(&parse_str(text, format, file)?, registry, file)
}

pub fn load_content(path: &Path) -> Result<Registry, DataLoadError> {
    build_registry(&deserialize_file(path)?, path)
}

pub fn load_layout(path: &Path, registry: &Registry) -> Result<Layout, DataLoadError> {
    resolve_layout(&deserialize_file(path)?, registry, path)
}

pub fn load_config(path: &Path, registry: &Registry) -> Result<SimConfig, DataLoadError> {
    resolve_config(&deserialize_file(path)?, registry, path)
}

/// Everything needed to start a run.
#[derive(Debug)]
pub struct LotData {
    pub registry: Registry,
    pub layout: Layout,
    pub config: SimConfig,
}

/// Load `content` and `layout` (required) and `config` (optional) from `dir`.
pub fn load_lot(dir: &Path) -> Result<LotData, DataLoadError> {
    let registry = load_content(&require_data_file(dir, "content")?)?;
    let layout = load_layout(&require_data_file(dir, "layout")?, &registry)?;
    let config = match find_data_file(dir, "config")? {
        Some(path) => load_config(&path, &registry)?,
        None => SimConfig::default(),
    };
    log::debug!(
        "loaded lot from {}: {} devices on a {}x{} lot",
        dir.display(),
        layout.devices.len(),
        layout.lot_size,
        layout.lot_size
    );
    Ok(LotData {
        registry,
        layout,
        config,
    })
}

// ===========================================================================
// Tests
// ===========================================================================
