//! hd-pager command-line entry point.
//!
//! ## Subcommands
//!
//! - `hd-pager-cli config show|defaults|validate [--file PATH]`
//! - `hd-pager-cli simulate [--unit BYTES]`
//! - `hd-pager-cli help [COMMAND]`
//! - `hd-pager-cli version`

use std::path::Path;
use std::process::ExitCode;

use hd_pager::cli::{config_cmd, flag_value, run_simulate};
use hd_pager::config as pager_config;
use hd_pager::telemetry::{self, LogConfig, LogFormat};

const DEFAULT_SIMULATION_UNIT: usize = 64 * 1024;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");
    let file = flag_value(&args, "--file").map(Path::new);

    match command {
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => ExitCode::from(config_cmd::run_show(file) as u8),
                "defaults" => {
                    config_cmd::run_defaults();
                    ExitCode::SUCCESS
                }
                "validate" => ExitCode::from(config_cmd::run_validate(file) as u8),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "simulate" => {
            let config = match file {
                Some(path) => match pager_config::load_file(path) {
                    Ok(cfg) => cfg,
                    Err(e) => {
                        eprintln!("ERROR: {}", e);
                        return ExitCode::from(2u8);
                    }
                },
                None => pager_config::load(),
            };
            let log = LogConfig { format: LogFormat::Pretty, ..config.log.clone() };
            if let Err(e) = telemetry::init_logging(&log) {
                eprintln!("WARNING: logging disabled: {}", e);
            }
            telemetry::init_metrics();

            let unit = match flag_value(&args, "--unit") {
                Some(raw) => match raw.parse::<usize>() {
                    Ok(n) if n > 0 => n,
                    _ => {
                        eprintln!("Invalid --unit: {}", raw);
                        return ExitCode::from(2u8);
                    }
                },
                None => DEFAULT_SIMULATION_UNIT,
            };
            ExitCode::from(run_simulate(&config.buffer_manager, unit) as u8)
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("hd-pager {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "hd-pager - paged buffer memory manager v{}

USAGE:
    hd-pager-cli <COMMAND> [OPTIONS]

COMMANDS:
    config     Show, list defaults for, or validate configuration
    simulate   Run the allocate-fill-evict cycle and print pressures
    version    Show version information
    help       Show this help message

OPTIONS:
    --file PATH   Read configuration from a TOML file instead of the environment

ENVIRONMENT:
    HD_PAGER_*    See `hd-pager-cli config defaults` for every variable

EXIT CODES:
    0  Success
    1  Failure / validation warnings
    2  Configuration error
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "config" => {
            eprintln!(
                "hd-pager-cli config - Inspect configuration

USAGE:
    hd-pager-cli config <show|defaults|validate> [--file PATH]

DESCRIPTION:
    show      Print effective values as HD_PAGER_* assignments
    defaults  Print built-in defaults, ignoring the environment
    validate  Warn about thresholds out of order, unusable page
              directories and sweeps that can never evict
"
            );
        }
        "simulate" => {
            eprintln!(
                "hd-pager-cli simulate - Exercise the pager

USAGE:
    hd-pager-cli simulate [--unit BYTES] [--file PATH]

DESCRIPTION:
    Creates buffers of 50, 30 and 100 units against limits of 512
    (scene) and 256 (renderer) units, moves them into renderer memory,
    overcommits renderer memory with ten 80-unit buffers and runs a 90%
    free crawl. Prints the pressure after each step as JSON.

    --unit defaults to 65536 bytes.
"
            );
        }
        other => {
            eprintln!("No help for unknown command: {}", other);
            print_usage();
        }
    }
}
