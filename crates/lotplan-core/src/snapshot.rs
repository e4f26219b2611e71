//! Binary snapshots of a [`SimState`].
//!
//! A snapshot is the state plus a versioned header, encoded with `bitcode`.
//! Restoring one and ticking it against the same layout continues the run
//! exactly where it left off.

use crate::sim::SimState;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying a lotplan snapshot.
pub const SNAPSHOT_MAGIC: u32 = 0x107A_0001;

/// Current format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DeserializeError {
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SNAPSHOT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("snapshot from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// Snapshot header
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
    /// Tick of the state at the time the snapshot was taken.
    pub tick: u64,
}

impl SnapshotHeader {
    pub fn new(tick: u64) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: FORMAT_VERSION,
            tick,
        }
    }

    pub fn validate(&self) -> Result<(), DeserializeError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(DeserializeError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(DeserializeError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(DeserializeError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    header: SnapshotHeader,
    state: SimState,
}

// ---------------------------------------------------------------------------
// Encode / decode
// ---------------------------------------------------------------------------

pub fn serialize(state: &SimState) -> Result<Vec<u8>, SerializeError> {
    let snapshot = Snapshot {
        header: SnapshotHeader::new(state.tick),
        state: state.clone(),
    };
    bitcode::serialize(&snapshot).map_err(|e| SerializeError::Encode(e.to_string()))
}

pub fn deserialize(data: &[u8]) -> Result<SimState, DeserializeError> {
    let snapshot: Snapshot =
        bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
    snapshot.header.validate()?;
    log::debug!("restored snapshot at tick {}", snapshot.header.tick);
    Ok(snapshot.state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::test_utils::*;

    fn config() -> SimConfig {
        SimConfig {
            tick_rate_hz: 10,
            ..Default::default()
        }
    }

    #[test]
    fn header_rejects_wrong_magic_and_versions() {
        let mut header = SnapshotHeader::new(3);
        assert!(header.validate().is_ok());
        header.magic = 0xDEAD_BEEF;
        assert!(matches!(
            header.validate(),
            Err(DeserializeError::InvalidMagic(0xDEAD_BEEF))
        ));
        let mut header = SnapshotHeader::new(3);
        header.version = FORMAT_VERSION + 1;
        assert!(matches!(
            header.validate(),
            Err(DeserializeError::FutureVersion(_))
        ));
        header.version = 0;
        assert!(matches!(
            header.validate(),
            Err(DeserializeError::UnsupportedVersion(0))
        ));
    }

    #[test]
    fn garbage_fails_to_decode() {
        assert!(matches!(
            deserialize(&[1, 2, 3]),
            Err(DeserializeError::Decode(_))
        ));
    }

    #[test]
    fn restored_state_continues_identically() {
        let (mut engine, layout) = engine_with(config(), simple_belt_layout());
        let state = started(&mut engine, &layout);
        let state = run(&mut engine, &layout, state, 17);

        let bytes = serialize(&state).unwrap();
        let restored = deserialize(&bytes).unwrap();
        assert_eq!(restored, state);

        let a = run(&mut engine, &layout, state, 40);
        let b = run(&mut engine, &layout, restored, 40);
        assert_eq!(a.state_hash(), b.state_hash());
        assert_eq!(storage_count(&a, "box", ore()), storage_count(&b, "box", ore()));
    }
}
