//! CLI command implementations
//!
//! Running the binary without a subcommand performs an ingestion run
//! configured entirely from the environment.

use clap::{Parser, Subcommand};

pub mod error;
pub mod ingest;
pub mod store;

pub use error::CliError;
pub use ingest::IngestCommand;
pub use store::{InitCommand, VerifyCommand};

/// Solana transfers ingest CLI
#[derive(Parser, Debug)]
#[command(name = "solana-transfers-ingest")]
#[command(about = "Load Solana transfers from the Flipside API into DuckDB", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute (defaults to `ingest` configured from the environment)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Ingest settings read from the environment alone
#[derive(Parser, Debug)]
#[command(name = "solana-transfers-ingest")]
struct EnvIngest {
    #[command(flatten)]
    ingest: IngestCommand,
}

impl Cli {
    /// Resolve the command to run, falling back to `ingest`
    ///
    /// Ingest settings are only read when no subcommand is given, so a bad
    /// `PAGE_SIZE` or `MAX_CONCURRENT` never blocks `init` or `verify`.
    pub fn into_command(self) -> Result<Commands, clap::Error> {
        match self.command {
            Some(command) => Ok(command),
            None => {
                let env = EnvIngest::try_parse_from(["solana-transfers-ingest"])?;
                Ok(Commands::Ingest(env.ingest))
            }
        }
    }
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the transfers table
    Init(InitCommand),

    /// Fetch transfers for the LOW_TS..HIGH_TS window and load them
    Ingest(IngestCommand),

    /// Summarize the stored transfers
    Verify(VerifyCommand),
}
