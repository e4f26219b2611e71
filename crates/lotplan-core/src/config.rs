use crate::warehouse::WarehouseConfig;
use serde::{Deserialize, Serialize};

/// Engine settings. Every field has a default so partial config files load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub tick_rate_hz: u32,
    /// Simulated seconds for an item to cross one conveyor cell.
    pub seconds_per_cell: f64,
    pub storage_submit_interval_seconds: f64,
    /// How long a pickup may sit on a ready item before it reports blocked.
    pub pickup_blocked_grace_seconds: f64,
    pub max_ticks_per_frame: u32,
    pub warehouse: WarehouseConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 20,
            seconds_per_cell: 2.0,
            storage_submit_interval_seconds: 10.0,
            pickup_blocked_grace_seconds: 1.0,
            max_ticks_per_frame: 8,
            warehouse: WarehouseConfig::default(),
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate_hz == 0 {
            return Err(ConfigError::ZeroTickRate);
        }
        if !positive(self.seconds_per_cell) {
            return Err(ConfigError::InvalidSecondsPerCell(self.seconds_per_cell));
        }
        if !positive(self.storage_submit_interval_seconds) {
            return Err(ConfigError::InvalidSubmitInterval(
                self.storage_submit_interval_seconds,
            ));
        }
        let grace = self.pickup_blocked_grace_seconds;
        if grace != 0.0 && !positive(grace) {
            return Err(ConfigError::InvalidPickupGrace(
                self.pickup_blocked_grace_seconds,
            ));
        }
        if self.max_ticks_per_frame == 0 {
            return Err(ConfigError::ZeroFrameCap);
        }
        Ok(())
    }
}

fn positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("tick rate must be at least 1 Hz")]
    ZeroTickRate,
    #[error("seconds per cell must be positive, got {0}")]
    InvalidSecondsPerCell(f64),
    #[error("storage submit interval must be positive, got {0}")]
    InvalidSubmitInterval(f64),
    #[error("pickup blocked grace must be zero or more seconds, got {0}")]
    InvalidPickupGrace(f64),
    #[error("max ticks per frame must be at least 1")]
    ZeroFrameCap,
}
