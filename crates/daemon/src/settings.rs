// Daemon Settings - defaults, optional TOML file, DROVER_* environment

use config::{Config, ConfigError, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "DROVER";
const FALLBACK_DATABASE: &str = "~/.drover/queues.db";
const DATABASE_FILE: &str = "queues.db";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Queue names and cadence of the demo pipelines
#[derive(Debug, Clone, Deserialize)]
pub struct QueueSettings {
    pub companies: String,
    pub shards: String,
    pub shard_count: usize,
    pub queuer_period_secs: u64,
    pub scalable_max_units: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// File path (`~` allowed) or full `sqlite:` URL
    pub database: String,
    pub log_format: LogFormat,
    /// Mirror logs into daily files under this directory
    pub log_dir: Option<String>,
    pub stagger_ms: u64,
    pub queues: QueueSettings,
}

impl Settings {
    /// Load defaults, then `file` (if any), then `DROVER_*` variables
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::build(file, Environment::with_prefix(ENV_PREFIX))
    }

    fn build(file: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("database", default_database())?
            .set_default("log_format", "pretty")?
            .set_default("stagger_ms", 1000_u64)?
            .set_default("queues.companies", "companies")?
            .set_default("queues.shards", "company-shards")?
            .set_default("queues.shard_count", 2_u64)?
            .set_default("queues.queuer_period_secs", 10_u64)?
            .set_default("queues.scalable_max_units", 15_u64)?;

        if let Some(path) = file {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        builder
            .add_source(
                env.prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Connection string the SQLite transport is registered under
    pub fn database_url(&self) -> String {
        if self.database.starts_with("sqlite:") {
            self.database.clone()
        } else {
            format!("sqlite://{}", shellexpand::tilde(&self.database))
        }
    }

    /// On-disk location of the database, when it is a plain path
    pub fn database_file(&self) -> Option<PathBuf> {
        if self.database.starts_with("sqlite:") {
            return None;
        }
        Some(PathBuf::from(shellexpand::tilde(&self.database).into_owned()))
    }

    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }

    pub fn log_dir(&self) -> Option<PathBuf> {
        self.log_dir
            .as_deref()
            .map(|dir| PathBuf::from(shellexpand::tilde(dir).into_owned()))
    }
}

fn default_database() -> String {
    ProjectDirs::from("dev", "drover", "drover")
        .map(|dirs| dirs.data_dir().join(DATABASE_FILE).display().to_string())
        .unwrap_or_else(|| FALLBACK_DATABASE.to_string())
}
