//! Subcommand implementations.

use crate::config::{load_signer_key, Config};
use chrono::Utc;
use coa_chain::{ChainClient, EthersChainClient};
use coa_core::{AttestationRecord, ContentHashEngine};
use coa_mint::{prepare_manifest, BatchMintOrchestrator, Manifest, MintLog};
use coa_storage::{open_store, FsArtifactStore};
use coa_verify::{collect_source_attestation, ChainVerifier};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use console::style;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Global options shared by chain commands
pub struct Context {
    /// Configuration file
    pub config_path: PathBuf,
    /// Signing key file, if given
    pub signer_key_file: Option<PathBuf>,
}

impl Context {
    fn config(&self) -> Result<Config> {
        Config::load(&self.config_path)
    }

    async fn connect(&self, config: &Config) -> Result<Arc<EthersChainClient>> {
        let key = load_signer_key(self.signer_key_file.as_deref())?;
        let endpoint = config.chain.endpoint()?;
        let client = EthersChainClient::connect(&endpoint, &key)
            .await
            .wrap_err_with(|| format!("connecting to {}", endpoint.rpc_url))?;
        Ok(Arc::new(client))
    }
}

fn read_json(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).wrap_err_with(|| format!("reading {}", path.display()))
}

/// `coa hash`
pub fn hash(document: &Path) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(&read_json(document)?)
        .wrap_err_with(|| format!("parsing {}", document.display()))?;
    let digest = ContentHashEngine::new().compute_checked(&document.display().to_string(), &value)?;
    println!("{}  {}", style(digest.gve()).bold(), digest);
    Ok(())
}

/// `coa attest`
pub async fn attest(ctx: &Context, tokens: &[u64], out: &Path) -> Result<()> {
    let config = ctx.config()?;
    let client = ctx.connect(&config).await?;
    let record =
        collect_source_attestation(client.as_ref(), tokens, config.chain.chain_id, &config.chain.contract)
            .await?;
    std::fs::write(out, record.to_json()?).wrap_err_with(|| format!("writing {}", out.display()))?;

    println!(
        "{} attestation over {} sources: {}",
        style("OK").green().bold(),
        record.total_sources,
        record.attestation_hash
    );
    Ok(())
}

/// `coa prepare`
pub fn prepare(manifest_path: &Path, attestation_path: &Path) -> Result<()> {
    let mut manifest = Manifest::load(manifest_path)?;
    let record = AttestationRecord::from_json(&read_json(attestation_path)?)?;
    let count = prepare_manifest(&mut manifest, &record, Utc::now())?;
    manifest.save(manifest_path)?;

    println!(
        "{} {} documents sealed with attestation {}",
        style("OK").green().bold(),
        count,
        record.attestation_hash
    );
    Ok(())
}

/// `coa mint`
pub async fn mint(
    ctx: &Context,
    manifest_path: &Path,
    rerender_only: bool,
    log_path: Option<PathBuf>,
) -> Result<()> {
    let config = ctx.config()?;
    let manifest = Manifest::load(manifest_path)?;
    let client = ctx.connect(&config).await?;
    let artifacts = Arc::new(FsArtifactStore::new(
        config.artifacts.root_dir.clone(),
        config.artifacts.public_base_url.clone(),
    ));
    let checkpoint = open_store(config.checkpoint.backend, &config.checkpoint.path)?;

    let mut orchestrator =
        BatchMintOrchestrator::new(client, artifacts, checkpoint, config.metadata.clone())
            .with_config(config.mint.clone())
            .with_renderer(Arc::new(config.artifacts.renderer()));
    if let Some(recipient) = config.chain.recipient()? {
        orchestrator = orchestrator.with_recipient(recipient);
    }

    if rerender_only {
        let count = orchestrator.rerender(&manifest).await?;
        println!("{} {} artifacts re-rendered", style("OK").green().bold(), count);
        return Ok(());
    }

    // The checkpoint already holds every mint that succeeded, so the log is
    // written even when the run halts
    let outcome = orchestrator.run(&manifest).await;
    let log = MintLog::build(&manifest, &orchestrator.checkpoint().snapshot());
    let log_path = log_path.unwrap_or_else(|| {
        config
            .checkpoint
            .path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("mint-log.json")
    });
    log.write(&log_path)?;
    info!(path = %log_path.display(), minted = log.total_minted, "mint log written");

    let summary = outcome?;
    println!(
        "{} minted {}, skipped {}, {}/{} certificates on chain (run {})",
        style("OK").green().bold(),
        summary.minted,
        summary.skipped,
        log.total_minted,
        summary.total,
        summary.run_id
    );
    Ok(())
}

/// `coa verify`; returns whether everything passed
pub async fn verify(
    ctx: &Context,
    manifest_path: &Path,
    attestation_path: &Path,
    out: &Path,
) -> Result<bool> {
    let config = ctx.config()?;
    let manifest = Manifest::load(manifest_path)?;
    let record = AttestationRecord::from_json(&read_json(attestation_path)?)?;
    let checkpoint = open_store(config.checkpoint.backend, &config.checkpoint.path)?.snapshot();
    let client: Arc<dyn ChainClient> = ctx.connect(&config).await?;

    let report = ChainVerifier::new(client)
        .verify_all(&manifest, &checkpoint, &record)
        .await;
    report.write(out)?;

    for finding in &report.failures {
        println!(
            "  {} {} #{}: {}",
            style("FAIL").red(),
            finding.identifier,
            finding.token_id,
            finding.error
        );
    }
    let summary = report.summary();
    if report.passed() {
        println!("{}", style(summary).green().bold());
    } else {
        println!("{}", style(summary).red().bold());
    }
    Ok(report.passed())
}
