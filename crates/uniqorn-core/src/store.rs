// Artifact persistence: aggregate tables, player index, Ultimate log and run
// summary as flat JSON/CSV files.
//
// Every write goes to a `.tmp` sibling first and is renamed into place, so a
// reader never sees a half-written artifact.

use crate::aggregate::{AggregateFile, AggregateSummary, AggregateTable, Scope};
use crate::bucket::BREAKPOINT_VERSION;
use crate::rarity::UltimateLog;
use crate::score::PlayerIndexTable;
use crate::season::Season;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("artifact not found: {artifact}")]
    NotFound { artifact: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("artifact {artifact} is corrupt: {message}")]
    Corrupt { artifact: String, message: String },

    #[error("artifact {artifact} was built with breakpoints {found}, expected {expected}")]
    VersionMismatch {
        artifact: String,
        found: String,
        expected: String,
    },

    #[error("failed to serialize {artifact}: {message}")]
    Serialize { artifact: String, message: String },
}

/// Refuse a table built with other breakpoints.
pub fn ensure_current(table: AggregateTable) -> Result<AggregateTable, StoreError> {
    if table.is_current_version() {
        Ok(table)
    } else {
        Err(StoreError::VersionMismatch {
            artifact: table_artifact(table.scope()),
            found: table.breakpoint_version().to_string(),
            expected: BREAKPOINT_VERSION.to_string(),
        })
    }
}

fn check_version(artifact: &str, found: &str) -> Result<(), StoreError> {
    if found == BREAKPOINT_VERSION {
        Ok(())
    } else {
        Err(StoreError::VersionMismatch {
            artifact: artifact.to_string(),
            found: found.to_string(),
            expected: BREAKPOINT_VERSION.to_string(),
        })
    }
}

fn table_artifact(scope: Scope) -> String {
    match scope {
        Scope::AllTime => "aggregates/all-time.json".to_string(),
        Scope::Season(season) => format!("aggregates/seasons/{season}.json"),
    }
}

const PLAYER_INDEX_JSON: &str = "player_index.json";
const PLAYER_INDEX_CSV: &str = "player_index.csv";
const ULTIMATE_JSON: &str = "ultimate.json";
const SUMMARY_JSON: &str = "summary.json";

/// Headline output of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    pub seasons: Vec<Season>,
    pub all_time: AggregateSummary,
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Load and save run artifacts.
///
/// `load_table` returns whatever is stored, whatever its breakpoint version;
/// callers that need the current version go through [`ensure_current`].
/// The player index and Ultimate log are version-checked on load.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn load_table(&self, scope: Scope) -> Result<AggregateTable, StoreError>;
    async fn save_table(&self, table: &AggregateTable) -> Result<(), StoreError>;
    /// Delete a stored table. Removing a table that is not there is not an
    /// error.
    async fn remove_table(&self, scope: Scope) -> Result<(), StoreError>;
    async fn list_seasons(&self) -> Result<Vec<Season>, StoreError>;

    async fn load_player_index(&self) -> Result<PlayerIndexTable, StoreError>;
    async fn save_player_index(&self, index: &PlayerIndexTable) -> Result<(), StoreError>;

    async fn load_ultimate_log(&self) -> Result<UltimateLog, StoreError>;
    async fn save_ultimate_log(&self, log: &UltimateLog) -> Result<(), StoreError>;

    async fn load_summary(&self) -> Result<RunSummary, StoreError>;
    async fn save_summary(&self, summary: &RunSummary) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// Filesystem store
// ---------------------------------------------------------------------------

/// Artifacts under one directory:
///
/// ```text
/// <root>/aggregates/all-time.json
/// <root>/aggregates/seasons/<season>.json
/// <root>/player_index.json
/// <root>/player_index.csv
/// <root>/ultimate.json
/// <root>/summary.json
/// ```
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, artifact: &str) -> PathBuf {
        self.root.join(artifact)
    }

    async fn read_json<T: DeserializeOwned>(&self, artifact: &str) -> Result<T, StoreError> {
        let path = self.path(artifact);
        let content = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    artifact: artifact.to_string(),
                });
            }
            Err(e) => {
                return Err(StoreError::Io {
                    path: path.display().to_string(),
                    source: e,
                });
            }
        };
        debug!("read {} ({} bytes)", path.display(), content.len());
        serde_json::from_slice(&content).map_err(|e| StoreError::Corrupt {
            artifact: artifact.to_string(),
            message: e.to_string(),
        })
    }

    async fn write_json_atomic<T: Serialize>(&self, artifact: &str, value: &T) -> Result<(), StoreError> {
        let content = serde_json::to_vec_pretty(value).map_err(|e| StoreError::Serialize {
            artifact: artifact.to_string(),
            message: e.to_string(),
        })?;
        self.write_atomic(artifact, &content).await
    }

    async fn write_atomic(&self, artifact: &str, content: &[u8]) -> Result<(), StoreError> {
        let path = self.path(artifact);
        let io_err = |p: &Path, e: std::io::Error| StoreError::Io {
            path: p.display().to_string(),
            source: e,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err(parent, e))?;
        }

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        tokio::fs::write(&tmp_path, content)
            .await
            .map_err(|e| io_err(&tmp_path, e))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| io_err(&path, e))?;
        debug!("wrote {}", path.display());
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn load_table(&self, scope: Scope) -> Result<AggregateTable, StoreError> {
        let artifact = table_artifact(scope);
        let file: AggregateFile = self.read_json(&artifact).await?;
        if file.scope != scope {
            return Err(StoreError::Corrupt {
                artifact,
                message: format!("file holds the {} table", file.scope),
            });
        }
        AggregateTable::from_file(file).map_err(|e| StoreError::Corrupt {
            artifact: table_artifact(scope),
            message: e.to_string(),
        })
    }

    async fn save_table(&self, table: &AggregateTable) -> Result<(), StoreError> {
        self.write_json_atomic(&table_artifact(table.scope()), &table.to_file())
            .await
    }

    async fn remove_table(&self, scope: Scope) -> Result<(), StoreError> {
        let path = self.path(&table_artifact(scope));
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("removed {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io {
                path: path.display().to_string(),
                source: e,
            }),
        }
    }

    async fn list_seasons(&self) -> Result<Vec<Season>, StoreError> {
        let dir = self.path("aggregates/seasons");
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::Io {
                    path: dir.display().to_string(),
                    source: e,
                });
            }
        };
        let mut seasons = Vec::new();
        loop {
            let entry = entries.next_entry().await.map_err(|e| StoreError::Io {
                path: dir.display().to_string(),
                source: e,
            })?;
            let Some(entry) = entry else { break };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(season) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Season::parse(s).ok())
            {
                seasons.push(season);
            }
        }
        seasons.sort();
        Ok(seasons)
    }

    async fn load_player_index(&self) -> Result<PlayerIndexTable, StoreError> {
        let index: PlayerIndexTable = self.read_json(PLAYER_INDEX_JSON).await?;
        check_version(PLAYER_INDEX_JSON, &index.breakpoint_version)?;
        Ok(index)
    }

    async fn save_player_index(&self, index: &PlayerIndexTable) -> Result<(), StoreError> {
        self.write_json_atomic(PLAYER_INDEX_JSON, index).await?;
        let mut csv_bytes = Vec::new();
        index
            .write_csv(&mut csv_bytes)
            .map_err(|e| StoreError::Serialize {
                artifact: PLAYER_INDEX_CSV.to_string(),
                message: e.to_string(),
            })?;
        self.write_atomic(PLAYER_INDEX_CSV, &csv_bytes).await
    }

    async fn load_ultimate_log(&self) -> Result<UltimateLog, StoreError> {
        let log: UltimateLog = self.read_json(ULTIMATE_JSON).await?;
        check_version(ULTIMATE_JSON, &log.breakpoint_version)?;
        Ok(log)
    }

    async fn save_ultimate_log(&self, log: &UltimateLog) -> Result<(), StoreError> {
        self.write_json_atomic(ULTIMATE_JSON, log).await
    }

    async fn load_summary(&self) -> Result<RunSummary, StoreError> {
        self.read_json(SUMMARY_JSON).await
    }

    async fn save_summary(&self, summary: &RunSummary) -> Result<(), StoreError> {
        self.write_json_atomic(SUMMARY_JSON, summary).await
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Store that keeps artifacts in memory. Counts table loads so callers can
/// observe cache behaviour.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<Scope, AggregateTable>>,
    player_index: RwLock<Option<PlayerIndexTable>>,
    ultimate_log: RwLock<Option<UltimateLog>>,
    summary: RwLock<Option<RunSummary>>,
    table_loads: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `load_table` calls served so far.
    pub fn table_loads(&self) -> usize {
        self.table_loads.load(Ordering::SeqCst)
    }
}

fn not_found(artifact: &str) -> StoreError {
    StoreError::NotFound {
        artifact: artifact.to_string(),
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn load_table(&self, scope: Scope) -> Result<AggregateTable, StoreError> {
        self.table_loads.fetch_add(1, Ordering::SeqCst);
        self.tables
            .read()
            .await
            .get(&scope)
            .cloned()
            .ok_or_else(|| not_found(&table_artifact(scope)))
    }

    async fn save_table(&self, table: &AggregateTable) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .insert(table.scope(), table.clone());
        Ok(())
    }

    async fn remove_table(&self, scope: Scope) -> Result<(), StoreError> {
        self.tables.write().await.remove(&scope);
        Ok(())
    }

    async fn list_seasons(&self) -> Result<Vec<Season>, StoreError> {
        let mut seasons: Vec<Season> = self
            .tables
            .read()
            .await
            .keys()
            .filter_map(|scope| match scope {
                Scope::Season(season) => Some(*season),
                Scope::AllTime => None,
            })
            .collect();
        seasons.sort();
        Ok(seasons)
    }

    async fn load_player_index(&self) -> Result<PlayerIndexTable, StoreError> {
        let index = self
            .player_index
            .read()
            .await
            .clone()
            .ok_or_else(|| not_found(PLAYER_INDEX_JSON))?;
        check_version(PLAYER_INDEX_JSON, &index.breakpoint_version)?;
        Ok(index)
    }

    async fn save_player_index(&self, index: &PlayerIndexTable) -> Result<(), StoreError> {
        *self.player_index.write().await = Some(index.clone());
        Ok(())
    }

    async fn load_ultimate_log(&self) -> Result<UltimateLog, StoreError> {
        let log = self
            .ultimate_log
            .read()
            .await
            .clone()
            .ok_or_else(|| not_found(ULTIMATE_JSON))?;
        check_version(ULTIMATE_JSON, &log.breakpoint_version)?;
        Ok(log)
    }

    async fn save_ultimate_log(&self, log: &UltimateLog) -> Result<(), StoreError> {
        *self.ultimate_log.write().await = Some(log.clone());
        Ok(())
    }

    async fn load_summary(&self) -> Result<RunSummary, StoreError> {
        self.summary
            .read()
            .await
            .clone()
            .ok_or_else(|| not_found(SUMMARY_JSON))
    }

    async fn save_summary(&self, summary: &RunSummary) -> Result<(), StoreError> {
        *self.summary.write().await = Some(summary.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::game::{GameStatline, StatLine};
    use crate::score::{IndexOptions, PlayerIndexTable};
    use chrono::NaiveDate;

    fn temp_root(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("uniqorn_store_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn sample_games() -> Vec<GameStatline> {
        let season = Season::parse("2023-24").unwrap();
        vec![
            GameStatline {
                first_name: "Luka".into(),
                last_name: "Doncic".into(),
                season,
                date: NaiveDate::from_ymd_opt(2024, 1, 26).unwrap(),
                stats: StatLine::new(73, 7, 10, 0, 1),
                team: "Mavericks".into(),
                opponent: "Hawks".into(),
            },
            GameStatline {
                first_name: "Joel".into(),
                last_name: "Embiid".into(),
                season,
                date: NaiveDate::from_ymd_opt(2024, 1, 22).unwrap(),
                stats: StatLine::new(70, 5, 18, 1, 1),
                team: "76ers".into(),
                opponent: "Spurs".into(),
            },
        ]
    }

    // -- Filesystem store --

    #[tokio::test]
    async fn fs_table_round_trip() {
        let root = temp_root("table_round_trip");
        let store = FsArtifactStore::new(&root);
        let games = sample_games();
        let season = Scope::Season(games[0].season);
        let table = aggregate(&games, season);

        store.save_table(&table).await.unwrap();
        assert!(root.join("aggregates/seasons/2023-24.json").exists());
        assert!(!root.join("aggregates/seasons/2023-24.json.tmp").exists());

        let loaded = store.load_table(season).await.unwrap();
        assert_eq!(loaded, table);
        assert_eq!(store.list_seasons().await.unwrap(), vec![games[0].season]);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn fs_remove_table_drops_season_from_listing() {
        let root = temp_root("remove_table");
        let store = FsArtifactStore::new(&root);
        let season = Season::parse("2023-24").unwrap();
        let table = aggregate(&sample_games(), Scope::Season(season));
        store.save_table(&table).await.unwrap();
        assert_eq!(store.list_seasons().await.unwrap(), vec![season]);

        store.remove_table(Scope::Season(season)).await.unwrap();
        assert!(store.list_seasons().await.unwrap().is_empty());
        // Already gone
        store.remove_table(Scope::Season(season)).await.unwrap();

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn fs_missing_table_is_not_found() {
        let root = temp_root("missing_table");
        let store = FsArtifactStore::new(&root);
        let err = store.load_table(Scope::AllTime).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert!(store.list_seasons().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fs_garbage_table_is_corrupt() {
        let root = temp_root("garbage_table");
        std::fs::create_dir_all(root.join("aggregates")).unwrap();
        std::fs::write(root.join("aggregates/all-time.json"), b"{ not json").unwrap();
        let store = FsArtifactStore::new(&root);
        let err = store.load_table(Scope::AllTime).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn fs_truncated_table_is_corrupt() {
        let root = temp_root("truncated_table");
        let store = FsArtifactStore::new(&root);
        let mut file = aggregate(&sample_games(), Scope::AllTime).to_file();
        let first_key = file.buckets.keys().next().cloned().unwrap();
        file.buckets.remove(&first_key);
        store.write_json_atomic("aggregates/all-time.json", &file).await.unwrap();

        let err = store.load_table(Scope::AllTime).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn fs_player_index_writes_json_and_csv() {
        let root = temp_root("player_index");
        let store = FsArtifactStore::new(&root);
        let games = sample_games();
        let table = aggregate(&games, Scope::Season(games[0].season));
        let scores = crate::score::score_season(&games, &table).unwrap();
        let index = PlayerIndexTable::build(&scores, IndexOptions::default());

        store.save_player_index(&index).await.unwrap();
        let csv_text = std::fs::read_to_string(root.join("player_index.csv")).unwrap();
        assert!(csv_text.starts_with("season,player,games,index,eligible"));
        assert_eq!(csv_text.lines().count(), 3);

        let loaded = store.load_player_index().await.unwrap();
        assert_eq!(loaded.seasons.len(), index.seasons.len());
        for (a, b) in loaded.seasons.iter().zip(&index.seasons) {
            assert_eq!(a.player, b.player);
            assert!((a.index - b.index).abs() < 1e-12);
        }
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn fs_player_index_with_foreign_version_is_refused() {
        let root = temp_root("player_index_version");
        let store = FsArtifactStore::new(&root);
        let mut index = PlayerIndexTable::build(&[], IndexOptions::default());
        index.breakpoint_version = "old.v0".into();
        store.save_player_index(&index).await.unwrap();
        let err = store.load_player_index().await.unwrap_err();
        assert!(matches!(err, StoreError::VersionMismatch { .. }));
        let _ = std::fs::remove_dir_all(&root);
    }

    // -- Version checks --

    #[test]
    fn ensure_current_refuses_foreign_tables() {
        let current = aggregate(&[], Scope::AllTime);
        assert!(ensure_current(current.clone()).is_ok());

        let mut file = current.to_file();
        file.breakpoint_version = "old.v0".into();
        let old = AggregateTable::from_file(file).unwrap();
        assert!(matches!(
            ensure_current(old),
            Err(StoreError::VersionMismatch { .. })
        ));
    }

    // -- Memory store --

    #[tokio::test]
    async fn memory_store_counts_loads() {
        let store = MemoryStore::new();
        let table = aggregate(&sample_games(), Scope::AllTime);
        store.save_table(&table).await.unwrap();
        assert_eq!(store.load_table(Scope::AllTime).await.unwrap(), table);
        assert!(store.load_table(Scope::Season(Season::starting(1990))).await.is_err());
        assert_eq!(store.table_loads(), 2);

        store.remove_table(Scope::AllTime).await.unwrap();
        assert!(matches!(
            store.load_table(Scope::AllTime).await,
            Err(StoreError::NotFound { .. })
        ));
    }
}
