//! Dhrake - Delphi class reconstruction
//!
//! Entry point that handles CLI argument parsing and switches between a
//! one-shot class parse and the interactive REPL.

use std::process::ExitCode;

use anyhow::{anyhow, Result};
use clap::Parser;

use dhrake::app::{parse_address, AppState};
use dhrake::core::memory::Address;
use dhrake::rtti::{self, dialect, DialectConfig};
use dhrake::script::TerminalConsole;
use dhrake::ui::cli::{print_class, run_cli};

/// Dhrake: rebuild Delphi classes from RTTI metadata
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// PE32 binary to analyze
    #[arg(short, long)]
    target: Option<String>,

    /// Class metadata address; parses once and exits (requires --target)
    #[arg(short, long, value_parser = address_arg)]
    address: Option<Address>,

    /// Displacement of the class-name pointer in the metadata record
    #[arg(long, default_value_t = dialect::NAME_POINTER_OFFSET)]
    name_offset: u32,

    /// Maximum number of VT slots to inspect
    #[arg(long, default_value_t = dialect::MAX_VT_SLOTS)]
    max_slots: u32,

    /// Tag prefixed to every log line
    #[arg(long, default_value = dialect::LOG_TAG)]
    tag: String,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn address_arg(s: &str) -> Result<Address, String> {
    parse_address(s).ok_or_else(|| format!("invalid address: {}", s))
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // 1. Initialize logger with verbosity level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        match args.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        },
    ))
    .init();

    log::debug!("Target: {:?}", args.target);
    log::debug!("Address: {:?}", args.address);

    // 2. Build state from arguments
    let config = DialectConfig {
        name_offset: args.name_offset,
        max_slots: args.max_slots,
        log_tag: args.tag,
        ..DialectConfig::default()
    };
    let mut state = AppState::new(config);

    if let Some(path) = &args.target {
        let summary = state.open(path)?;
        log::info!("{}", summary.replace('\n', ", "));
    }

    // 3. One-shot parse or REPL
    match args.address {
        Some(address) => {
            let config = state.config.clone();
            let db = state
                .project
                .as_mut()
                .ok_or_else(|| anyhow!("--address requires --target"))?;

            let mut console = TerminalConsole;
            match rtti::parse_class(db, &mut console, address, &config) {
                Ok(parsed) => {
                    print_class(db, &parsed);
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) if e.is_failure() => Ok(ExitCode::FAILURE),
                Err(_) => Ok(ExitCode::SUCCESS),
            }
        }
        None => {
            println!("[*] Dhrake v{} - Interactive Mode", env!("CARGO_PKG_VERSION"));
            run_cli(state)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
