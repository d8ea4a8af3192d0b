use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::core::domain::Chain;

/// Key vault CLI (library-facing definitions)
#[derive(Debug, Parser)]
#[command(name = "keyvault", about = "Multi-chain wallet key vault", version, disable_help_subcommand = true)]
pub struct Cli {
    /// TOML configuration file; defaults are used when omitted
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Agent whose wallets are addressed
    #[arg(long, global = true, default_value = "default")]
    pub agent: String,
    /// Print listings as JSON
    #[arg(long, global = true)]
    pub json: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create a wallet from a fresh mnemonic (shown once)
    Create {
        #[arg(long)]
        chain: Chain,
        #[arg(long)]
        name: String,
        #[arg(long, default_value_t = 12)]
        words: usize,
        /// Allow printing the mnemonic when stdout is not a terminal
        #[arg(long)]
        print_mnemonic: bool,
    },
    /// Import from a mnemonic or raw private key read from stdin
    Import {
        #[arg(long)]
        chain: Chain,
        #[arg(long)]
        name: String,
        /// Read a hex private key instead of a mnemonic
        #[arg(long)]
        private_key: bool,
    },
    List,
    Delete {
        #[arg(long)]
        id: String,
    },
    /// Write an encrypted backup of the agent's wallets
    Export {
        #[arg(long)]
        output: PathBuf,
        /// Limit to these wallet ids
        #[arg(long = "id")]
        ids: Vec<String>,
    },
    /// Show a backup's header without the password
    Preview {
        #[arg(long)]
        input: PathBuf,
    },
    Restore {
        #[arg(long)]
        input: PathBuf,
        /// Replace local wallets with these archived ones
        #[arg(long = "overwrite")]
        overwrite: Vec<String>,
    },
}
