// src/main.rs
//! Key vault command line entry point.
//! Thin glue over `KeyVault`; secrets are read from the terminal or stdin only.
use anyhow::{Context, Result};
use clap::Parser;
use secrecy::SecretString;
use std::fs;
use std::io::{self, BufRead, IsTerminal, Write};
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use wallet_keyvault::cli::{Cli, Commands};
use wallet_keyvault::core::config::VaultConfig;
use wallet_keyvault::service::{ImportSource, KeyVault};
use wallet_keyvault::WalletError;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging()?;

    // vault errors leave the process in their scrubbed form only
    run(&cli).map_err(|err| match err.downcast_ref::<WalletError>() {
        Some(vault_err) => {
            if vault_err.is_critical() {
                error!(kind = vault_err.kind(), "vault integrity failure");
            }
            anyhow::anyhow!(vault_err.user_message())
        }
        None => err,
    })
}

fn run(cli: &Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => VaultConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => VaultConfig::from_env(),
    };

    let agent = cli.agent.as_str();
    // opened lazily: preview works without a store
    let open = || KeyVault::open(config.clone());

    match &cli.command {
        Commands::Preview { input } => {
            let bytes = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
            let header = wallet_keyvault::storage::archive::read_metadata(&bytes)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&header)?);
                return Ok(());
            }
            println!("created: {}  tool: {}", header.created_at.to_rfc3339(), header.tool_version);
            for w in header.wallets {
                println!("{}  {:<8}  {}  {}", w.id, w.chain, w.address, w.display_name);
            }
        }
        Commands::Create { chain, name, words, print_mnemonic } => {
            if !io::stdout().is_terminal() && !*print_mnemonic {
                anyhow::bail!("refusing to print a mnemonic to a non-terminal; pass --print-mnemonic to allow");
            }
            let password = read_new_password("Wallet password")?;
            let created = open()?.create_wallet(agent, name, *chain, *words, &password)?;
            println!("{}  {}  {}", created.wallet.id, created.wallet.chain, created.wallet.address);
            println!("Write down this recovery phrase. It will not be shown again:");
            println!("{}", created.mnemonic.as_str());
        }
        Commands::Import { chain, name, private_key } => {
            let source = if *private_key {
                ImportSource::PrivateKeyHex(read_secret("Private key (hex)")?)
            } else {
                ImportSource::Mnemonic {
                    phrase: read_secret("Recovery phrase")?,
                    passphrase: read_secret("BIP-39 passphrase (empty for none)")?,
                }
            };
            let password = read_new_password("Wallet password")?;
            let wallet = open()?.import_wallet(agent, name, *chain, &source, &password)?;
            println!("{}  {}  {}", wallet.id, wallet.chain, wallet.address);
        }
        Commands::List => {
            let wallets = open()?.list_wallets(agent)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&wallets)?);
                return Ok(());
            }
            for w in wallets {
                let path = w.derivation_path.map(|p| p.to_string()).unwrap_or_else(|| "imported".into());
                println!("{}  {:<8}  {}  {}  {}", w.id, w.chain, w.address, path, w.display_name);
            }
        }
        Commands::Delete { id } => {
            open()?.delete_wallet(agent, id)?;
            println!("deleted {}", id);
        }
        Commands::Export { output, ids } => {
            let password = read_new_password("Backup password")?;
            let selection = (!ids.is_empty()).then_some(ids.as_slice());
            let written = open()?.export_backup_to(agent, selection, &password, output)?;
            println!("wrote {} bytes to {}", written, output.display());
        }
        Commands::Restore { input, overwrite } => {
            let bytes = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
            let password = read_secret("Backup password")?;
            let vault = open()?;
            let report = if overwrite.is_empty() {
                vault.restore_backup(agent, &bytes, &password)?
            } else {
                vault.overwrite_from_backup(agent, &bytes, &password, overwrite)?
            };
            println!("restored: {}  skipped: {}", report.restored.len(), report.skipped.len());
            for id in report.skipped {
                println!("skipped {}", id);
            }
        }
    }
    Ok(())
}

/// Prompts on stderr when attached to a terminal, otherwise reads one line of stdin.
fn read_secret(prompt: &str) -> Result<SecretString> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        eprint!("{}: ", prompt);
        io::stderr().flush()?;
    }
    let mut line = String::new();
    stdin.lock().read_line(&mut line).context("reading secret from stdin")?;
    let trimmed = line.trim_end_matches(&['\r', '\n'][..]).to_string();
    zeroize::Zeroize::zeroize(&mut line);
    Ok(SecretString::new(trimmed))
}

fn read_new_password(prompt: &str) -> Result<SecretString> {
    use secrecy::ExposeSecret;
    let first = read_secret(prompt)?;
    if io::stdin().is_terminal() {
        let again = read_secret("Repeat password")?;
        if first.expose_secret() != again.expose_secret() {
            anyhow::bail!("passwords do not match");
        }
    }
    Ok(first)
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
