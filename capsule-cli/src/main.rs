//! Capsule CLI
//!
//! Starts an interactive shell inside selectable Linux namespaces.

use std::ffi::OsString;
use std::process;

use capsule_core::ProgramInfo;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::Cli;

/// Environment variable holding the log filter
const LOG_ENV: &str = "CAPSULE_LOG";

fn main() {
    let args: Vec<OsString> = std::env::args_os().collect();
    let cli = Cli::parse_args(args.iter().cloned());

    // Logs go to stderr so they never mix with the shell's output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let program = ProgramInfo::current();
    let original_args = args.get(1..).unwrap_or_default();

    match commands::dispatch(&cli, original_args, &program) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("❌ Error: {e:#}");
            process::exit(1);
        }
    }
}
