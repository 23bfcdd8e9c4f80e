//! AIP-SYNC command-line interface
//!
//! The `aipsync` command keeps a local copy of the published AIP dataset.
//!
//! ## Commands
//!
//! - `sync`: Probe the publisher and synchronise the edition in effect
//! - `status`: Show the synchronised edition and its raw files
//! - `current`: Print the synchronised dataset as JSON
//! - `cache`: List or remove cached editions

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};

use aip_core::{SyncEngine, SyncStatus};
use aip_feed::FeedConfig;
use aip_state::{
    format_instant, CacheKey, DatasetCache, FsDatasetCache, ParsedDataset, StorageError,
    SurrealDatasetCache,
};

#[derive(Parser)]
#[command(name = "aipsync")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Keep a local cache of the published AIP in sync", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Directory holding the dataset cache
    #[arg(long, global = true, env = "AIPSYNC_CACHE_DIR", default_value = ".aipsync/cache")]
    cache_dir: PathBuf,

    /// Cache backend
    #[arg(long, global = true, env = "AIPSYNC_STORE", value_enum, default_value_t = StoreKind::Fs)]
    store: StoreKind,

    /// Give up on a sync attempt after this many seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Publication page to probe (overrides AIPSYNC_ENDPOINT)
    #[arg(long, global = true)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    /// JSON files under the cache directory
    Fs,
    /// SurrealDB (SURREALDB_URL, or an embedded store under the cache directory)
    Surreal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronise the edition currently in effect
    Sync {
        /// Working directory for downloaded and extracted images
        #[arg(long, env = "AIPSYNC_WORK_DIR", default_value = ".aipsync/work")]
        work_dir: PathBuf,

        /// Summary format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },

    /// Synchronise (cache first) and show the edition in effect
    Status {
        #[arg(long, env = "AIPSYNC_WORK_DIR", default_value = ".aipsync/work")]
        work_dir: PathBuf,

        /// List extracted raw files matching this glob
        #[arg(long)]
        files: Option<String>,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },

    /// Synchronise (cache first) and print the dataset as JSON
    Current {
        #[arg(long, env = "AIPSYNC_WORK_DIR", default_value = ".aipsync/work")]
        work_dir: PathBuf,
    },

    /// Inspect or prune cached editions
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cache keys
    List,
    /// Remove one cached edition by key
    Remove {
        /// Cache key, e.g. 2010-06-23T00:00:00.000Z/..
        key: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    aip_core::init_tracing(cli.json, level);

    let cache = open_cache(cli.store, &cli.cache_dir)
        .await
        .context("Failed to open dataset cache")?;
    let feed = cli_feed_config(cli.endpoint.as_deref());

    match cli.command {
        Commands::Sync { work_dir, output } => {
            let engine = build_engine(&feed, cache, cli.timeout_secs)?;
            cmd_sync(&engine, &work_dir, output).await
        }
        Commands::Status {
            work_dir,
            files,
            output,
        } => {
            let engine = build_engine(&feed, cache, cli.timeout_secs)?;
            cmd_status(&engine, &work_dir, files.as_deref(), output).await
        }
        Commands::Current { work_dir } => {
            let engine = build_engine(&feed, cache, cli.timeout_secs)?;
            cmd_current(&engine, &work_dir).await
        }
        Commands::Cache { action } => match action {
            CacheAction::List => cmd_cache_list(cache.as_ref()).await,
            CacheAction::Remove { key } => cmd_cache_remove(cache.as_ref(), &key).await,
        },
    }
}

fn cli_feed_config(endpoint: Option<&str>) -> FeedConfig {
    let config = FeedConfig::from_env();
    match endpoint {
        Some(url) => config.with_endpoint(url),
        None => config,
    }
}

async fn open_cache(store: StoreKind, cache_dir: &Path) -> Result<Arc<dyn DatasetCache>> {
    let cache: Arc<dyn DatasetCache> = match store {
        StoreKind::Fs => Arc::new(
            FsDatasetCache::new(cache_dir)
                .with_context(|| format!("Failed to open cache directory {:?}", cache_dir))?,
        ),
        StoreKind::Surreal => Arc::new(
            SurrealDatasetCache::from_env(cache_dir.join("surreal"))
                .await
                .context("Failed to connect to SurrealDB")?,
        ),
    };
    Ok(cache)
}

fn build_engine(
    config: &FeedConfig,
    cache: Arc<dyn DatasetCache>,
    timeout_secs: Option<u64>,
) -> Result<SyncEngine> {
    let engine =
        SyncEngine::from_config(config, cache).context("Failed to set up publisher client")?;
    Ok(match timeout_secs {
        Some(secs) => engine.with_timeout(Duration::from_secs(secs)),
        None => engine,
    })
}

/// Run `init` and print a summary
async fn cmd_sync(engine: &SyncEngine, work_dir: &Path, output: OutputFormat) -> Result<()> {
    let dataset = engine
        .init(work_dir)
        .await
        .context("Synchronisation failed")?;
    let status = engine.status().await?;
    info!(cycle = %dataset.cycle, cache_hit = status.cache_hit, "sync complete");

    match output {
        OutputFormat::Text => print!("{}", render_summary(&dataset, status.cache_hit)),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&summary_json(&dataset, &status, None))?
        ),
    }
    Ok(())
}

async fn cmd_status(
    engine: &SyncEngine,
    work_dir: &Path,
    files: Option<&str>,
    output: OutputFormat,
) -> Result<()> {
    let dataset = engine
        .init(work_dir)
        .await
        .context("Synchronisation failed")?;
    let status = engine.status().await?;
    let listed = match files {
        Some(pattern) => Some(status.files(pattern)?),
        None => None,
    };

    match output {
        OutputFormat::Text => {
            print!("{}", render_summary(&dataset, status.cache_hit));
            if let Some(dir) = &status.source_dir {
                println!("Source:      {}", dir.display());
            }
            if status.skipped_records > 0 {
                println!("Skipped:     {} records", status.skipped_records);
            }
            if let Some(listed) = &listed {
                println!();
                if listed.is_empty() {
                    println!("No matching files.");
                }
                for file in listed {
                    println!("  {}", file);
                }
            }
        }
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&summary_json(&dataset, &status, listed.as_deref()))?
        ),
    }
    Ok(())
}

async fn cmd_current(engine: &SyncEngine, work_dir: &Path) -> Result<()> {
    engine
        .init(work_dir)
        .await
        .context("Synchronisation failed")?;
    let dataset = engine.current().await?;
    println!("{}", serde_json::to_string_pretty(&*dataset)?);
    Ok(())
}

async fn cmd_cache_list(cache: &dyn DatasetCache) -> Result<()> {
    let keys = cache.keys().await.context("Failed to list cache keys")?;
    if keys.is_empty() {
        println!("Cache is empty.");
        return Ok(());
    }
    for key in keys {
        println!("{}", render_key(&key));
    }
    Ok(())
}

async fn cmd_cache_remove(cache: &dyn DatasetCache, key: &str) -> Result<()> {
    let key = CacheKey::from(key.to_string());
    if remove_cached(cache, &key).await? {
        println!("Removed {}", key);
    } else {
        println!("No cached edition for {}", key);
    }
    Ok(())
}

/// Remove `key`, reporting whether an entry was there. A corrupt entry
/// counts as present.
async fn remove_cached(cache: &dyn DatasetCache, key: &CacheKey) -> Result<bool> {
    let present = match cache.get(key).await {
        Ok(found) => found.is_some(),
        Err(StorageError::CorruptEntry { .. }) => true,
        Err(e) => return Err(e).with_context(|| format!("Failed to look up {}", key)),
    };
    cache
        .remove(key)
        .await
        .with_context(|| format!("Failed to remove {}", key))?;
    Ok(present)
}

fn render_key(key: &CacheKey) -> String {
    match key.parse_window() {
        Some(window) if window.is_open_ended() => format!("{}  (open-ended)", key),
        Some(_) => key.to_string(),
        None => format!("{}  (unrecognised key)", key),
    }
}

fn render_until(dataset: &ParsedDataset) -> String {
    dataset
        .valid_until
        .as_ref()
        .map(format_instant)
        .unwrap_or_else(|| "until superseded".to_string())
}

fn render_summary(dataset: &ParsedDataset, cache_hit: bool) -> String {
    let mut out = String::new();
    out.push_str(&format!("Cycle:       {}\n", dataset.cycle));
    out.push_str(&format!("Valid from:  {}\n", format_instant(&dataset.valid_from)));
    out.push_str(&format!("Valid until: {}\n", render_until(dataset)));
    out.push_str(&format!("Aerodromes:  {}\n", dataset.aerodromes.len()));
    out.push_str(&format!("Prohibited:  {}\n", dataset.prohibited_areas.len()));
    out.push_str(&format!("TMA:         {}\n", dataset.tma.len()));
    out.push_str(&format!(
        "Served from: {}\n",
        if cache_hit { "cache" } else { "publisher" }
    ));
    out
}

fn summary_json(dataset: &ParsedDataset, status: &SyncStatus, files: Option<&[String]>) -> Value {
    let mut value = json!({
        "cycle": dataset.cycle,
        "validFrom": format_instant(&dataset.valid_from),
        "validUntil": dataset.valid_until.as_ref().map(format_instant),
        "cacheKey": status.cache_key,
        "cacheHit": status.cache_hit,
        "skippedRecords": status.skipped_records,
        "counts": {
            "aerodromes": dataset.aerodromes.len(),
            "prohibitedAreas": dataset.prohibited_areas.len(),
            "tma": dataset.tma.len(),
        },
    });
    if let Some(files) = files {
        value["files"] = json!(files);
    }
    value
}
