// Configuration loading and validation (config/uniqorn.toml).

use chrono::NaiveDate;
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use uniqorn_core::ingest::IngestOptions;
use uniqorn_core::score::IndexOptions;

const CONFIG_FILE: &str = "uniqorn.toml";

/// Shipped defaults, written out on first run.
pub const DEFAULT_CONFIG: &str = include_str!("../defaults/uniqorn.toml");

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to write default config to {path}: {source}")]
    SeedError {
        path: PathBuf,
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Assembled Config
// ---------------------------------------------------------------------------

/// Validated configuration with paths resolved against the base directory.
#[derive(Debug, Clone)]
pub struct Config {
    pub games_csv: PathBuf,
    pub min_date: NaiveDate,
    pub dedupe: bool,
    pub artifacts_dir: PathBuf,
    pub index: IndexOptions,
    pub cache_ttl: Duration,
}

impl Config {
    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            min_date: Some(self.min_date),
            dedupe: self.dedupe,
        }
    }
}

// ---------------------------------------------------------------------------
// uniqorn.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    data: DataSection,
    artifacts: ArtifactsSection,
    #[serde(default)]
    index: IndexSection,
    #[serde(default)]
    cache: CacheSection,
}

#[derive(Debug, Clone, Deserialize)]
struct DataSection {
    games_csv: String,
    #[serde(default = "default_min_date")]
    min_date: String,
    #[serde(default = "default_true")]
    dedupe: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct ArtifactsSection {
    dir: String,
}

#[derive(Debug, Clone, Deserialize)]
struct IndexSection {
    min_games: usize,
    career_leaderboard_size: usize,
}

impl Default for IndexSection {
    fn default() -> Self {
        let defaults = IndexOptions::default();
        Self {
            min_games: defaults.min_games,
            career_leaderboard_size: defaults.career_leaderboard_size,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CacheSection {
    ttl_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self { ttl_secs: 300 }
    }
}

fn default_min_date() -> String {
    "1973-10-01".to_string()
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load `config/uniqorn.toml` under `base_dir`. Relative paths in the file
/// are resolved against `base_dir`.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join(CONFIG_FILE);
    let text = read_file(&path)?;
    let file: ConfigFile = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        source: e,
    })?;
    validate(&file)?;

    let min_date = parse_min_date(&file.data.min_date)?;
    Ok(Config {
        games_csv: resolve(base_dir, &file.data.games_csv),
        min_date,
        dedupe: file.data.dedupe,
        artifacts_dir: resolve(base_dir, &file.artifacts.dir),
        index: IndexOptions {
            min_games: file.index.min_games,
            career_leaderboard_size: file.index.career_leaderboard_size,
        },
        cache_ttl: Duration::from_secs(file.cache.ttl_secs),
    })
}

/// Write the built-in default config to `config/uniqorn.toml` unless a
/// config is already there. Returns the path when a file was written.
pub fn ensure_config_file(base_dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let config_dir = base_dir.join("config");
    std::fs::create_dir_all(&config_dir).map_err(|source| ConfigError::SeedError {
        path: config_dir.clone(),
        source,
    })?;

    let target = config_dir.join(CONFIG_FILE);
    let seeded = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&target)
        .and_then(|mut file| file.write_all(DEFAULT_CONFIG.as_bytes()));
    match seeded {
        Ok(()) => Ok(Some(target)),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
        Err(source) => Err(ConfigError::SeedError {
            path: target,
            source,
        }),
    }
}

/// Load config relative to the current working directory, seeding
/// `config/uniqorn.toml` from the built-in defaults first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_file(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn resolve(base_dir: &Path, value: &str) -> PathBuf {
    let path = Path::new(value);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn parse_min_date(value: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| ConfigError::ValidationError {
        field: "data.min_date".into(),
        message: format!("expected YYYY-MM-DD, got {value:?}: {e}"),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(file: &ConfigFile) -> Result<(), ConfigError> {
    let paths: &[(&str, &str)] = &[
        ("data.games_csv", file.data.games_csv.as_str()),
        ("artifacts.dir", file.artifacts.dir.as_str()),
    ];
    for (name, value) in paths {
        if value.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must not be empty".into(),
            });
        }
    }

    parse_min_date(&file.data.min_date)?;

    if file.index.career_leaderboard_size == 0 {
        return Err(ConfigError::ValidationError {
            field: "index.career_leaderboard_size".into(),
            message: "must be greater than 0".into(),
        });
    }

    if file.cache.ttl_secs == 0 {
        return Err(ConfigError::ValidationError {
            field: "cache.ttl_secs".into(),
            message: "must be greater than 0".into(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
