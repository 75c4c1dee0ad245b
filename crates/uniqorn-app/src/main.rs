// Uniqorn batch entry point.
//
// Run sequence:
// 1. Initialize tracing (log to file, not terminal)
// 2. Load config
// 3. Run the pipeline (ingest, aggregate, score, classify, persist)
// 4. Read the fresh all-time table back through the query layer
// 5. Print the run report

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use uniqorn_app::config;
use uniqorn_app::pipeline;
use uniqorn_core::aggregate::Scope;
use uniqorn_core::cache::TableCache;
use uniqorn_core::query::QueryService;
use uniqorn_core::store::FsArtifactStore;

/// Rare buckets listed in the log after a run.
const RAREST_AFTER_RUN: usize = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("uniqorn starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: games={}, artifacts={}, min_games={}",
        config.games_csv.display(),
        config.artifacts_dir.display(),
        config.index.min_games
    );

    // 3. Run the pipeline
    let report = pipeline::run_pipeline(&config)
        .await
        .context("pipeline run failed")?;

    // 4. Read back through the cache; a table that cannot be served is fatal
    let store = Arc::new(FsArtifactStore::new(&config.artifacts_dir));
    let cache = Arc::new(TableCache::new(store, config.cache_ttl));
    let queries = QueryService::new(cache);
    let rarest = queries
        .rarest(Scope::AllTime, RAREST_AFTER_RUN)
        .await
        .context("failed to read back the all-time table")?;
    for bucket in &rarest {
        info!(
            "rare bucket {} ({}): {} game(s)",
            bucket.key, bucket.description, bucket.count
        );
    }

    // 5. Report
    println!(
        "{} games, {} seasons, {} occupied buckets, {} Ultimate Uniqorns ({} new, {} broken, baseline {:?})",
        report.games,
        report.seasons,
        report.occupied_buckets,
        report.ultimates,
        report.new_ultimates,
        report.broken_ultimates,
        report.baseline
    );
    if report.decreased_buckets > 0 {
        println!(
            "warning: {} bucket counts decreased since the previous run; see ultimate.json",
            report.decreased_buckets
        );
    }

    info!("uniqorn finished");
    Ok(())
}

/// Env var that overrides the default log filter.
const LOG_FILTER_ENV: &str = "UNIQORN_LOG";

/// Append this run's log to `logs/uniqorn.log`; batch runs accumulate in one
/// file, each starting with a "uniqorn starting up" line.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_path = std::env::current_dir()?.join("logs").join("uniqorn.log");
    if let Some(dir) = log_path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    }
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open {}", log_path.display()))?;

    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new("uniqorn=info,warn"));
    fmt()
        .with_env_filter(filter)
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to set tracing subscriber: {e}"))?;

    Ok(())
}
