//! Lotplan Core -- the simulation engine for grid factory layouts.
//!
//! A [`layout::Layout`] places device instances on a square lot. The engine
//! resolves which device ports touch, builds one runtime record per device,
//! and steps the whole lot at a fixed tick rate with deterministic
//! fixed-point arithmetic.
//!
//! # Tick Pipeline
//!
//! Each call to [`engine::Engine::tick_simulation`] advances the state by one
//! tick:
//!
//! 1. **Advance** -- crafters and reactors cycle, storage counts toward its
//!    next warehouse submission, transit slots move to the halfway mark.
//! 2. **Negotiate** -- fixed-point passes plan transfers between linked
//!    devices, at most one per sender lane and one per receiver lane.
//! 3. **Commit** -- every planned unit leaves its sender, then arrives.
//! 4. **Bookkeeping** -- tick counter, minute window and throughput rates.
//!
//! # State Threading
//!
//! The engine takes a [`sim::SimState`] by value and returns the next one.
//! Runtime records are shared behind `Arc` and cloned only when a tick writes
//! them, so a caller may keep any earlier state around unchanged:
//!
//! ```rust,ignore
//! let mut engine = Engine::new(registry, SimConfig::default())?;
//! let layout = Arc::new(layout);
//! let state = engine.start_simulation(&layout, create_initial_sim_state());
//! let next = engine.tick_simulation(&layout, state.clone());
//! assert_eq!(next.tick, state.tick + 1);
//! ```
//!
//! # Key Types
//!
//! - [`registry::Registry`] -- Immutable registry of items, recipes and
//!   device types (frozen at startup).
//! - [`links::ResolvedLayout`] -- Port-to-port links derived from a layout.
//! - [`runtime::DeviceRuntime`] -- Per-device state: processor, storage,
//!   conveyor or junction.
//! - [`warehouse::Warehouse`] -- Lot-wide item ledger fed by storage and
//!   drained by pickups.
//! - [`metrics::MinuteWindow`] -- Rolling one-minute production counts.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for deterministic math.
//! - [`snapshot`] -- Versioned binary snapshots via bitcode.

pub mod config;
pub mod engine;
pub mod fixed;
pub mod geometry;
pub mod id;
pub mod junction;
pub mod layout;
pub mod links;
pub mod metrics;
pub mod processor;
pub mod reactor;
pub mod registry;
pub mod runtime;
pub mod sim;
pub mod snapshot;
pub mod storage;
pub mod transfer;
pub mod transport;
pub mod validation;
pub mod warehouse;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
