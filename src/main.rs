// src/main.rs

use clap::{Parser, Subcommand};
use opkl::client::unix_now;
use opkl::prelude::*;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "opkl-updater")]
#[command(about = "Manages the OIDC Public Key Ledger (OPKL)")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./config.opkl-updater.yaml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Ledger root directory
    #[arg(long, global = true)]
    ledger_root: Option<PathBuf>,

    /// Log filter, e.g. `info` or `opkl=debug`
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Update the ledger from the provider's OIDC discovery document
    Update {
        /// Provider (issuer) URI, e.g. https://accounts.example.com
        provider_uri: String,

        /// What to do when an archived key is published again
        #[arg(long)]
        on_reappearance: Option<ReappearancePolicy>,
    },

    /// Print every key the ledger tracks for a provider
    Show { provider_uri: String },

    /// Mark a tracked key as revoked
    Revoke { provider_uri: String, kid: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config);

    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config, OpklError> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(root) = &cli.ledger_root {
        config.ledger_root = root.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if cli.verbose {
        config.log_level = "debug".to_string();
    }
    if let Commands::Update { on_reappearance: Some(policy), .. } = &cli.command {
        config.reappearance = *policy;
    }
    Ok(config)
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|e| {
        eprintln!("invalid log level '{}' ({e}); falling back to info", config.log_level);
        EnvFilter::new("info")
    });
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if config.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(command: Commands, config: &Config) -> Result<(), OpklError> {
    let ledger = Ledger::open(&config.ledger_root);

    match command {
        Commands::Update { provider_uri, .. } => {
            let issuer = IssuerId::parse(&provider_uri)?;
            let location = ledger.resolve_issuer(&issuer)?;
            let fetched = JwksClient::new(config)?.fetch(&issuer).await?;
            let report = ledger.reconcile(&location, &fetched.keys, fetched.fetched_at, &config.into())?;
            println!(
                "{issuer}: {} added, {} archived, {} reactivated, {} skipped from {}{}",
                report.added.len(),
                report.archived.len(),
                report.reactivated.len(),
                report.skipped,
                fetched.jwks_uri,
                if report.is_noop() { " (no changes)" } else { "" },
            );
        }
        Commands::Show { provider_uri } => {
            let issuer = IssuerId::parse(&provider_uri)?;
            for key in ledger.history(&issuer)? {
                let exp = key.exp.map_or_else(|| "-".to_string(), |exp| exp.to_string());
                println!("{}\t{}\tnbf={}\texp={}", key.kid, key.status, key.nbf, exp);
            }
        }
        Commands::Revoke { provider_uri, kid } => {
            let issuer = IssuerId::parse(&provider_uri)?;
            if ledger.revoke(&issuer, &kid, unix_now())? {
                println!("{issuer}: revoked {kid}");
            } else {
                println!("{issuer}: {kid} was already revoked");
            }
        }
    }
    Ok(())
}
