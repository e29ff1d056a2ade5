use std::path::PathBuf;
use std::time::Duration;

/// Process settings, read from `ROOMLEDGER_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Journal appends since the last compaction that trigger a new one.
    pub compact_threshold: u64,
    pub compact_interval: Duration,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            compact_threshold: 1000,
            compact_interval: Duration::from_secs(30),
            metrics_port: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unparseable values fall back
    /// to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let data_dir = lookup("ROOMLEDGER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let compact_threshold = lookup("ROOMLEDGER_COMPACT_THRESHOLD")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.compact_threshold);
        let compact_interval = lookup("ROOMLEDGER_COMPACT_INTERVAL_SECS")
            .and_then(|s| s.parse().ok())
            .filter(|secs: &u64| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.compact_interval);
        let metrics_port = lookup("ROOMLEDGER_METRICS_PORT").and_then(|s| s.parse().ok());
        Self {
            data_dir,
            compact_threshold,
            compact_interval,
            metrics_port,
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("roomledger.wal")
    }
}
