//! COA Forge CLI
//!
//! Command-line interface for hashing, attesting, minting and verifying
//! certificates of authenticity.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod commands;
mod config;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "coa")]
#[command(about = "COA Forge - content-hashed certificates minted on chain", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = "coa.json")]
    config: PathBuf,
    /// File holding the signing key (default: COA_SIGNER_KEY)
    #[arg(long, global = true)]
    signer_key_file: Option<PathBuf>,
    /// Log JSON lines instead of text
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a document's content hash and GVE code
    Hash {
        /// Certificate document
        document: PathBuf,
    },
    /// Aggregate the content hashes of on-chain source tokens
    Attest {
        /// Source token ids, comma separated
        #[arg(short, long, value_delimiter = ',', required = true)]
        tokens: Vec<u64>,
        /// Where to write the attestation record
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Embed a source attestation into every manifest document
    Prepare {
        /// Manifest file
        #[arg(short, long)]
        manifest: PathBuf,
        /// Attestation record
        #[arg(short, long)]
        attestation: PathBuf,
    },
    /// Mint every manifest certificate not yet checkpointed
    Mint {
        /// Manifest file
        #[arg(short, long)]
        manifest: PathBuf,
        /// Only re-render and re-upload artifacts of minted certificates
        #[arg(long)]
        rerender_only: bool,
        /// Mint log path (default: next to the checkpoint)
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Check minted tokens against the manifest and attestation
    Verify {
        /// Manifest file
        #[arg(short, long)]
        manifest: PathBuf,
        /// Attestation record
        #[arg(short, long)]
        attestation: PathBuf,
        /// Where to write the report
        #[arg(short, long)]
        out: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("coa=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let ctx = commands::Context {
        config_path: cli.config,
        signer_key_file: cli.signer_key_file,
    };

    match cli.command {
        Commands::Hash { document } => commands::hash(&document),
        Commands::Attest { tokens, out } => commands::attest(&ctx, &tokens, &out).await,
        Commands::Prepare {
            manifest,
            attestation,
        } => commands::prepare(&manifest, &attestation),
        Commands::Mint {
            manifest,
            rerender_only,
            log,
        } => commands::mint(&ctx, &manifest, rerender_only, log).await,
        Commands::Verify {
            manifest,
            attestation,
            out,
        } => {
            let passed = commands::verify(&ctx, &manifest, &attestation, &out).await?;
            if !passed {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
