//! Loads lot content, layouts and run settings from RON, TOML or JSON files.
//!
//! Data files name items, recipes and device types; loading resolves those
//! names into the ids of a `lotplan_core` registry.

pub mod loader;
pub mod schema;

pub use loader::{
    DataLoadError, Format, LotData, load_config, load_config_str, load_content, load_content_str,
    load_layout, load_layout_str, load_lot,
};
