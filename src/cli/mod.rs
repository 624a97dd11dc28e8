//! CLI subcommands for `hd-pager-cli`.
//!
//! ## Usage
//!
//! ```bash
//! hd-pager-cli config show       # Effective configuration
//! hd-pager-cli config defaults   # Built-in defaults
//! hd-pager-cli config validate   # Check for misconfiguration
//! hd-pager-cli simulate          # Run the allocate-fill-evict cycle
//! ```

pub mod config_cmd;
pub mod simulate_cmd;

pub use simulate_cmd::{run_simulate, simulate, SimulationReport, SimulationStep};

/// Value following `flag` in `args`, if present.
pub fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}
