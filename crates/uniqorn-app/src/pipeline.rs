// Batch pipeline: ingest -> aggregate -> score -> classify -> persist.
//
// Season tables and their scores are built on the blocking pool, one task
// per season, alongside the all-time table. Nothing is written until every
// table has been built.

use crate::config::Config;
use anyhow::Context;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uniqorn_core::aggregate::{aggregate, partition_by_season, AggregateTable, Scope};
use uniqorn_core::game::GameStatline;
use uniqorn_core::ingest;
use uniqorn_core::rarity::{Baseline, UltimateLog};
use uniqorn_core::score::{score_season, GameScore, IndexOptions, PlayerIndexTable};
use uniqorn_core::season::Season;
use uniqorn_core::store::{ArtifactStore, FsArtifactStore, RunSummary, StoreError};

/// What one run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub games: usize,
    pub seasons: usize,
    pub occupied_buckets: usize,
    pub player_seasons: usize,
    pub ultimates: usize,
    pub baseline: Baseline,
    pub new_ultimates: usize,
    pub broken_ultimates: usize,
    pub decreased_buckets: usize,
}

/// Load the configured CSV and run the full pipeline into the configured
/// artifacts directory.
pub async fn run_pipeline(config: &Config) -> anyhow::Result<RunReport> {
    let path = config.games_csv.clone();
    let options = config.ingest_options();
    let games = tokio::task::spawn_blocking(move || ingest::load_games(&path, &options))
        .await
        .context("ingestion task failed")?
        .with_context(|| format!("failed to load games from {}", config.games_csv.display()))?;

    let store = FsArtifactStore::new(&config.artifacts_dir);
    process_games(games, config.index, &store).await
}

/// Run everything after ingestion against `store`.
pub async fn process_games(
    games: Vec<GameStatline>,
    index_options: IndexOptions,
    store: &dyn ArtifactStore,
) -> anyhow::Result<RunReport> {
    let games = Arc::new(games);
    info!("processing {} games", games.len());

    // All-time table on its own blocking task
    let all_time_games = Arc::clone(&games);
    let all_time_task =
        tokio::task::spawn_blocking(move || aggregate(&all_time_games, Scope::AllTime));

    // One task per season: aggregate then score against that table
    let mut season_tasks = JoinSet::new();
    for (season, season_games) in partition_by_season(&games) {
        season_tasks.spawn_blocking(move || {
            let table = aggregate(&season_games, Scope::Season(season));
            let scores = score_season(&season_games, &table);
            (season, table, scores)
        });
    }

    let mut season_tables: BTreeMap<Season, AggregateTable> = BTreeMap::new();
    let mut scores: Vec<GameScore> = Vec::with_capacity(games.len());
    while let Some(joined) = season_tasks.join_next().await {
        let (season, table, season_scores) = joined.context("season task failed")?;
        let season_scores =
            season_scores.with_context(|| format!("failed to score season {season}"))?;
        scores.extend(season_scores);
        season_tables.insert(season, table);
    }
    let all_time = all_time_task.await.context("all-time aggregation task failed")?;
    info!(
        "built {} season tables and the all-time table ({} occupied buckets)",
        season_tables.len(),
        all_time.occupied().count()
    );

    let player_index = PlayerIndexTable::build(&scores, index_options);

    let previous = load_previous_all_time(store).await?;
    let ultimate_log = UltimateLog::build(&all_time, previous.as_ref(), &season_tables);
    if ultimate_log.baseline == Baseline::VersionMismatch {
        warn!("previous all-time table used other breakpoints; transitions not computed");
    }

    // Persist
    for table in season_tables.values() {
        store
            .save_table(table)
            .await
            .with_context(|| format!("failed to save {} table", table.scope()))?;
    }
    // Season tables are rebuilt wholesale; a season no longer in the input
    // must not survive from an earlier run.
    let stored = store
        .list_seasons()
        .await
        .context("failed to list stored season tables")?;
    for season in stored.into_iter().filter(|s| !season_tables.contains_key(s)) {
        info!("removing stale {} table", season);
        store
            .remove_table(Scope::Season(season))
            .await
            .with_context(|| format!("failed to remove stale {season} table"))?;
    }
    store
        .save_table(&all_time)
        .await
        .context("failed to save all-time table")?;
    store
        .save_player_index(&player_index)
        .await
        .context("failed to save player index")?;
    store
        .save_ultimate_log(&ultimate_log)
        .await
        .context("failed to save Ultimate Uniqorn log")?;
    let summary = RunSummary {
        generated_at: Utc::now(),
        seasons: season_tables.keys().copied().collect(),
        all_time: all_time.summary(),
    };
    store
        .save_summary(&summary)
        .await
        .context("failed to save run summary")?;

    let report = RunReport {
        games: games.len(),
        seasons: season_tables.len(),
        occupied_buckets: summary.all_time.total_buckets,
        player_seasons: player_index.seasons.len(),
        ultimates: ultimate_log.ultimates.len(),
        baseline: ultimate_log.baseline,
        new_ultimates: ultimate_log.transitions.new.len(),
        broken_ultimates: ultimate_log.transitions.broken.len(),
        decreased_buckets: ultimate_log.transitions.decreased.len(),
    };
    info!("run complete: {:?}", report);
    Ok(report)
}

/// The all-time table from the previous run, if there is a usable one.
async fn load_previous_all_time(store: &dyn ArtifactStore) -> anyhow::Result<Option<AggregateTable>> {
    match store.load_table(Scope::AllTime).await {
        Ok(table) => Ok(Some(table)),
        Err(StoreError::NotFound { .. }) => {
            info!("no previous all-time table; every Ultimate Uniqorn is new");
            Ok(None)
        }
        Err(e @ StoreError::Corrupt { .. }) => {
            warn!("ignoring unreadable previous all-time table: {}", e);
            Ok(None)
        }
        Err(e) => Err(e).context("failed to load previous all-time table"),
    }
}
