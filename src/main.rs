mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Commands};
use syncs3::config::SyncConfig;
use syncs3::digest::Md5Digester;
use syncs3::store::RemoteStore;
use syncs3::store::memory::MemoryStore;
use syncs3::store::s3::S3Store;
use syncs3::{ChangeEvent, EngineConfig, SyncEngine, logging, walker, watcher};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Watch { config, dry_run } => watch(&config, dry_run).await,
        Commands::Check { config, json } => check(&config, json),
    }
}

fn load_config(path: &Path) -> Result<SyncConfig> {
    SyncConfig::load(path).with_context(|| format!("cannot start with {}", path.display()))
}

fn check(path: &Path, json: bool) -> Result<()> {
    let config = load_config(path)?;
    let plan = config.watch_paths();

    if json {
        let summary = serde_json::json!({
            "bucket": config.bucket,
            "batch_size": config.batch_size,
            "idle_timeout_secs": config.idle_timeout_secs,
            "scan_interval_ms": config.scan_interval_ms,
            "initial_sync": config.initial_sync,
            "log_file": config.log_file,
            "paths": plan,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Configuration OK: {}", path.display());
    println!(
        "Bucket: {} ({}{})",
        config.bucket.name,
        config.bucket.region,
        config
            .bucket
            .endpoint
            .as_deref()
            .map(|e| format!(", {e}"))
            .unwrap_or_default()
    );
    println!(
        "Batches of up to {} file(s), flushed after {}s idle.",
        config.batch_size, config.idle_timeout_secs
    );
    for entry in &plan {
        let mode = if entry.recursive { "recursive" } else { "single level" };
        println!("  watch {} ({mode})", entry.root.display());
    }
    Ok(())
}

async fn watch(path: &Path, dry_run: bool) -> Result<()> {
    let config = load_config(path)?;
    logging::init(config.log_file.as_deref());
    tracing::info!(config = %path.display(), dry_run, "starting syncs3");

    let store: Arc<dyn RemoteStore> = if dry_run {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(S3Store::connect(&config.bucket).await)
    };
    let engine = SyncEngine::start(EngineConfig::from(&config), store, Arc::new(Md5Digester));

    let (watcher, mut events) = watcher::start_watcher(&config.watch_paths(), config.scan_interval())
        .context("no usable watch paths")?;

    if config.initial_sync {
        tracing::info!("performing initial sync, this might take a while");
        let files = walker::collect_files(watcher.watched());
        tracing::info!(files = files.len(), "initial sync candidates");
        for file in files {
            engine.ingest(ChangeEvent::create(file)).await;
        }
    } else {
        tracing::info!("initial sync disabled, skipping");
    }

    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    engine.ingest(event).await;
                }
                None => {
                    tracing::warn!("watcher stopped delivering events");
                    break;
                }
            },
            _ = &mut interrupt => {
                tracing::info!("interrupt received, flushing pending changes");
                break;
            }
        }
    }

    drop(watcher);
    let stats = engine.shutdown().await;
    tracing::info!(
        tasks = stats.tasks,
        synced = stats.succeeded,
        failed = stats.failed,
        "syncs3 stopped"
    );
    Ok(())
}
