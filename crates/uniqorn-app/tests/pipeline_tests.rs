// Integration tests for the uniqorn pipeline.
//
// These drive the library's public API end to end: CSV ingestion, season and
// all-time aggregation, scoring, Ultimate Uniqorn transitions across runs,
// artifact persistence and read-back through the query layer.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use uniqorn_app::config::Config;
use uniqorn_app::pipeline::{process_games, run_pipeline};
use uniqorn_core::aggregate::{aggregate, AggregateTable, Scope};
use uniqorn_core::bucket::{bucketize, SHAPE_COUNT};
use uniqorn_core::cache::TableCache;
use uniqorn_core::game::{GameStatline, StatLine};
use uniqorn_core::query::{QueryError, QueryService};
use uniqorn_core::rarity::Baseline;
use uniqorn_core::score::IndexOptions;
use uniqorn_core::season::Season;
use uniqorn_core::store::{ArtifactStore, FsArtifactStore, MemoryStore};

// ===========================================================================
// Test helpers
// ===========================================================================

/// Fixture directory path (relative to the crate root, which is the cwd for
/// `cargo test`).
const FIXTURES: &str = "tests/fixtures";

fn fixture_config(artifacts: &Path) -> Config {
    Config {
        games_csv: PathBuf::from(FIXTURES).join("box_scores.csv"),
        min_date: NaiveDate::from_ymd_opt(1973, 10, 1).unwrap(),
        dedupe: true,
        artifacts_dir: artifacts.to_path_buf(),
        index: IndexOptions {
            min_games: 0,
            career_leaderboard_size: 50,
        },
        cache_ttl: Duration::from_secs(300),
    }
}

fn temp_artifacts(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("uniqorn_it_{name}"));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

fn game(name: &str, date: &str, stats: [u32; 5]) -> GameStatline {
    let (first, last) = name.split_once(' ').unwrap();
    let [p, a, r, b, s] = stats;
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
    GameStatline {
        first_name: first.into(),
        last_name: last.into(),
        season: Season::for_date(date).unwrap(),
        date,
        stats: StatLine::new(p, a, r, b, s),
        team: String::new(),
        opponent: String::new(),
    }
}

fn big_man() -> GameStatline {
    game("Hakeem Olajuwon", "1990-03-10", [27, 3, 18, 6, 4])
}

fn background() -> Vec<GameStatline> {
    vec![
        game("Role Player", "1990-01-05", [8, 1, 4, 0, 1]),
        game("Role Player", "1990-01-07", [8, 1, 4, 0, 1]),
        game("Bench Guy", "1990-01-09", [8, 1, 4, 0, 1]),
        game("Wing Scorer", "1991-01-09", [23, 8, 11, 2, 3]),
        game("Wing Scorer", "1991-01-11", [24, 8, 11, 2, 3]),
    ]
}

fn default_index() -> IndexOptions {
    IndexOptions {
        min_games: 0,
        career_leaderboard_size: 50,
    }
}

// ===========================================================================
// Full runs from CSV
// ===========================================================================

#[tokio::test]
async fn fixture_run_writes_every_artifact() {
    let artifacts = temp_artifacts("fixture_run");
    let config = fixture_config(&artifacts);

    let report = run_pipeline(&config).await.expect("pipeline should succeed");
    assert_eq!(report.games, 7);
    assert_eq!(report.seasons, 2);
    assert_eq!(report.occupied_buckets, 4);
    assert_eq!(report.player_seasons, 5);
    assert_eq!(report.ultimates, 2);
    assert_eq!(report.baseline, Baseline::None);
    assert_eq!(report.new_ultimates, 2);

    for file in [
        "aggregates/all-time.json",
        "aggregates/seasons/2022-23.json",
        "aggregates/seasons/2023-24.json",
        "player_index.json",
        "player_index.csv",
        "ultimate.json",
        "summary.json",
    ] {
        assert!(artifacts.join(file).exists(), "missing artifact {file}");
    }

    let ultimate: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(artifacts.join("ultimate.json")).unwrap())
            .unwrap();
    assert_eq!(ultimate["baseline"], "none");
    assert_eq!(ultimate["ultimates"].as_array().unwrap().len(), 2);

    let summary: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(artifacts.join("summary.json")).unwrap())
            .unwrap();
    assert_eq!(summary["all_time"]["total_games"], 7);
    assert_eq!(summary["all_time"]["uniqorn_count"], 2);
    assert_eq!(summary["all_time"]["two_occurrence_count"], 1);
    assert_eq!(summary["all_time"]["distribution"]["3-5"], 1);
    assert_eq!(summary["seasons"], serde_json::json!(["2022-23", "2023-24"]));

    let _ = std::fs::remove_dir_all(&artifacts);
}

#[tokio::test]
async fn rerun_on_same_data_has_no_transitions() {
    let artifacts = temp_artifacts("rerun");
    let config = fixture_config(&artifacts);

    run_pipeline(&config).await.unwrap();
    let second = run_pipeline(&config).await.unwrap();
    assert_eq!(second.baseline, Baseline::Previous);
    assert_eq!(second.new_ultimates, 0);
    assert_eq!(second.broken_ultimates, 0);
    assert_eq!(second.decreased_buckets, 0);

    let _ = std::fs::remove_dir_all(&artifacts);
}

#[tokio::test]
async fn missing_csv_fails_the_run() {
    let artifacts = temp_artifacts("missing_csv");
    let mut config = fixture_config(&artifacts);
    config.games_csv = PathBuf::from(FIXTURES).join("does_not_exist.csv");
    assert!(run_pipeline(&config).await.is_err());
    assert!(!artifacts.join("ultimate.json").exists());
}

#[tokio::test]
async fn persisted_tables_serve_lookups() {
    let artifacts = temp_artifacts("lookups");
    let config = fixture_config(&artifacts);
    run_pipeline(&config).await.unwrap();

    let store = Arc::new(FsArtifactStore::new(&artifacts));
    let queries = QueryService::new(Arc::new(TableCache::new(store, config.cache_ttl)));

    // Two 2022-23 games share (4, 2, 3, 1, 1).
    let season = Scope::Season(Season::parse("2022-23").unwrap());
    let hit = queries.lookup([4, 2, 3, 1, 1], season).await.unwrap();
    assert_eq!(hit.count, 2);
    assert_eq!(hit.samples.len(), 2);

    let empty = queries.lookup([8, 5, 5, 4, 4], Scope::AllTime).await.unwrap();
    assert_eq!(empty.count, 0);

    let never_built = Scope::Season(Season::parse("1999-00").unwrap());
    assert!(matches!(
        queries.lookup([0, 0, 0, 0, 0], never_built).await,
        Err(QueryError::Unavailable { .. })
    ));

    let rare = queries.rarest(Scope::AllTime, 10).await.unwrap();
    let counts: Vec<u32> = rare.iter().map(|r| r.count).collect();
    assert_eq!(counts, vec![1, 1, 2, 3]);

    let _ = std::fs::remove_dir_all(&artifacts);
}

// ===========================================================================
// Aggregation invariants through the pipeline
// ===========================================================================

#[tokio::test]
async fn tables_are_prepopulated_and_conserve_counts() {
    let store = MemoryStore::new();
    let mut games = background();
    games.push(big_man());
    let total = games.len() as u64;
    process_games(games, default_index(), &store).await.unwrap();

    let all_time = store.load_table(Scope::AllTime).await.unwrap();
    assert_eq!(all_time.len(), SHAPE_COUNT);
    assert_eq!(all_time.total_games(), total);

    let seasons = store.list_seasons().await.unwrap();
    assert_eq!(seasons.len(), 2);
    let mut season_total = 0;
    for season in seasons {
        let table = store.load_table(Scope::Season(season)).await.unwrap();
        assert_eq!(table.len(), SHAPE_COUNT);
        season_total += table.total_games();
    }
    assert_eq!(season_total, total);
}

#[tokio::test]
async fn near_identical_statlines_share_a_bucket() {
    let store = MemoryStore::new();
    process_games(background(), default_index(), &store).await.unwrap();
    let all_time = store.load_table(Scope::AllTime).await.unwrap();
    let agg = all_time.get(&bucketize(23, 8, 11, 2, 3));
    assert_eq!(agg.count, 2);
    assert_eq!(agg.player_count("Wing Scorer"), 2);
}

#[tokio::test]
async fn self_exclusion_shows_in_player_index() {
    let store = MemoryStore::new();
    let games = vec![
        game("Two Timer", "1990-01-05", [8, 1, 4, 0, 1]),
        game("Two Timer", "1990-01-07", [8, 1, 4, 0, 1]),
        game("Other One", "1990-01-09", [8, 1, 4, 0, 1]),
        game("Other Two", "1990-01-11", [8, 1, 4, 0, 1]),
        game("Other Three", "1990-01-13", [8, 1, 4, 0, 1]),
    ];
    process_games(games, default_index(), &store).await.unwrap();

    let index = store.load_player_index().await.unwrap();
    let row = index
        .seasons
        .iter()
        .find(|r| r.player == "Two Timer")
        .unwrap();
    // 5 occurrences, 2 of them the player's own -> effective 3
    assert!((row.index - (-0.30f64).exp()).abs() < 1e-9);
}

#[tokio::test]
async fn seasons_dropped_from_input_are_removed() {
    let store = MemoryStore::new();
    let mut games = background();
    games.push(big_man());
    process_games(games, default_index(), &store).await.unwrap();
    assert_eq!(store.list_seasons().await.unwrap().len(), 2);

    // Only the 1989-90 games remain.
    let remaining: Vec<GameStatline> = background()
        .into_iter()
        .filter(|g| g.season == big_man().season)
        .collect();
    process_games(remaining, default_index(), &store).await.unwrap();

    assert_eq!(store.list_seasons().await.unwrap(), vec![big_man().season]);
    let dropped = Scope::Season(Season::parse("1990-91").unwrap());
    assert!(store.load_table(dropped).await.is_err());
    let summary = store.load_summary().await.unwrap();
    assert_eq!(summary.seasons, vec![big_man().season]);
}

// ===========================================================================
// Ultimate Uniqorn lifecycle across runs
// ===========================================================================

#[tokio::test]
async fn lone_statline_becomes_ultimate_then_breaks() {
    let store = MemoryStore::new();

    // Run 1: the big-man line is the only game in its bucket.
    let mut first_games = background();
    first_games.push(big_man());
    let first = process_games(first_games.clone(), default_index(), &store)
        .await
        .unwrap();
    assert_eq!(first.baseline, Baseline::None);
    let log = store.load_ultimate_log().await.unwrap();
    assert!(log.contains(&big_man().identity()));

    // Run 2: a second game lands in the same bucket.
    let mut second_games = first_games;
    second_games.push(game("David Robinson", "1994-02-20", [28, 4, 17, 7, 5]));
    let second = process_games(second_games, default_index(), &store)
        .await
        .unwrap();
    assert_eq!(second.baseline, Baseline::Previous);
    assert_eq!(second.broken_ultimates, 1);
    assert_eq!(second.new_ultimates, 0);

    let log = store.load_ultimate_log().await.unwrap();
    assert_eq!(log.transitions.broken.len(), 1);
    assert_eq!(log.transitions.broken[0].identity, big_man().identity());
    assert!(!log.contains(&big_man().identity()));
}

#[tokio::test]
async fn decreased_count_to_one_is_reported_and_new() {
    let store = MemoryStore::new();
    let mut first_games = background();
    first_games.push(big_man());
    first_games.push(game("Twin Tower", "1990-03-12", [27, 3, 18, 6, 4]));
    process_games(first_games, default_index(), &store)
        .await
        .unwrap();

    let mut corrected = background();
    corrected.push(big_man());
    let report = process_games(corrected, default_index(), &store)
        .await
        .unwrap();
    assert_eq!(report.decreased_buckets, 1);
    assert_eq!(report.new_ultimates, 1);
    assert_eq!(report.broken_ultimates, 0);

    let log = store.load_ultimate_log().await.unwrap();
    assert!(log.contains(&big_man().identity()));
    assert_eq!(log.transitions.new[0].identity, big_man().identity());
}

#[tokio::test]
async fn foreign_breakpoint_baseline_is_not_compared() {
    let store = MemoryStore::new();
    let mut file = aggregate(&[big_man()], Scope::AllTime).to_file();
    file.breakpoint_version = "pts8-legacy.v0".into();
    store
        .save_table(&AggregateTable::from_file(file).unwrap())
        .await
        .unwrap();

    let report = process_games(background(), default_index(), &store)
        .await
        .unwrap();
    assert_eq!(report.baseline, Baseline::VersionMismatch);
    assert_eq!(report.new_ultimates, 0);
    assert_eq!(report.broken_ultimates, 0);

    // The run replaced the stale table with a current one.
    let refreshed = store.load_table(Scope::AllTime).await.unwrap();
    assert!(refreshed.is_current_version());
}
