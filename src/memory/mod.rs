//! Memory accounting for the paging subsystem.
//!
//! Provides per-tier byte tallies and the pressure bands derived from them.

mod monitor;

pub use monitor::{MemoryMonitor, PressureThresholds};
