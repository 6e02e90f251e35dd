use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Offline-first local store and sync engine for a reading app.
#[derive(Parser, Debug, Clone)]
#[command(name = "readsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file.
    #[arg(short, long, env = "READSYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Initialize the local store and create a default config.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },

    /// Download a book for offline reading.
    Download {
        /// Server-assigned book ID.
        book_id: String,
        /// Book title (English).
        #[arg(short, long)]
        title: Option<String>,
        /// Total number of chapters in the book.
        #[arg(short = 'n', long)]
        chapters: u32,
    },

    /// Show download status for a book.
    Status {
        /// Server-assigned book ID.
        book_id: String,
    },

    /// Remove an offline copy and all its chapters.
    Remove {
        /// Server-assigned book ID.
        book_id: String,
    },

    /// Run a single sync cycle (progress + pending queue).
    Sync,

    /// Run the background sync loop until interrupted.
    Run,
}

/// Main configuration from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote API configuration.
    #[serde(default)]
    pub api: ApiConfig,

    /// Local database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Sync configuration.
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Remote API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the reading API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token for authenticated endpoints.
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

/// Local database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/offline.db")
}

/// Sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Auto-sync interval in seconds. Fixed interval, no jitter or
    /// backoff, matching the behavior callers expect for a
    /// single-user client.
    #[serde(default = "default_sync_interval")]
    pub interval_seconds: u64,

    /// Attempts before a pending sync item is dropped.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Minimum scroll delta (percent) before a progress save is
    /// dispatched to the server. Chapter completion always dispatches.
    #[serde(default = "default_scroll_threshold")]
    pub scroll_threshold: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_sync_interval(),
            max_attempts: default_max_attempts(),
            scroll_threshold: default_scroll_threshold(),
        }
    }
}

fn default_sync_interval() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    5
}

fn default_scroll_threshold() -> f64 {
    5.0
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &PathBuf) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        toml::from_str(&content).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to parse config file: {}", e))
        })
    }

    /// Find config file in default locations.
    pub fn find_config_file() -> Option<PathBuf> {
        let candidates = [
            PathBuf::from("config.toml"),
            PathBuf::from("readsync.toml"),
            dirs::config_dir()
                .map(|p| p.join("readsync").join("config.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/readsync/config.toml"),
        ];

        candidates.into_iter().find(|p| p.exists())
    }

    /// Generate default config file content.
    pub fn generate_default() -> String {
        r#"# readsync configuration

[api]
base_url = "http://localhost:3000"
# token = "..."

[database]
# path = "data/offline.db"

[sync]
# Auto-sync interval in seconds
interval_seconds = 30
# Attempts before a pending item is dropped
max_attempts = 5
# Minimum scroll delta (percent) before a save is dispatched
scroll_threshold = 5.0
"#
        .to_string()
    }
}
