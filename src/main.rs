//! # EO Custody Entry Point
//!
//! ```text
//! main()
//!   │
//!   ├─> Parse CLI arguments (clap)
//!   ├─> Initialize logging (terminal + rotating files)
//!   │
//!   └─> Run the subcommand, or the operator console if none was given
//! ```
//!
//! ```bash
//! eo-custody                      # interactive console
//! eo-custody demo                 # scripted end-to-end run
//! eo-custody audit                # intrusion detection over the audit file
//! eo-custody reset -i emanuele_admin
//! eo-custody init-config
//! ```

#![warn(clippy::all, rust_2018_idioms)]
#![expect(clippy::print_stdout)] // Allow println! in main binary

mod cli;

use anyhow::Result;
use clap::Parser as _;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    eo_custody::logging::init(cli.quiet)?;

    let command = cli.command.unwrap_or(cli::Commands::Console);
    let result = cli::run_command(command, cli.config.as_deref());
    if let Err(e) = &result {
        tracing::error!("{e:#}");
    }
    result
}
