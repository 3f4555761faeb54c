//! Storage configuration.
//!
//! The server binary builds a [`Config`] from its command-line flags; tests
//! build one pointing at a temporary directory.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default root directory for AOF files and snapshots.
pub const DEFAULT_DB_PATH: &str = "./data";

/// Default interval between TTL reaper sweeps.
pub const DEFAULT_REAPER_INTERVAL: Duration = Duration::from_secs(60);

/// Storage configuration shared by every database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Root directory. AOF files live in `<db_path>/aof`, snapshots in
    /// `<db_path>/<db>/..`.
    pub db_path: PathBuf,

    /// How often the reaper sweeps all open databases.
    #[serde(with = "duration_secs")]
    pub reaper_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            reaper_interval: DEFAULT_REAPER_INTERVAL,
        }
    }
}

impl Config {
    /// Creates a configuration rooted at `db_path` with default intervals.
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Default::default()
        }
    }

    pub fn with_reaper_interval(mut self, interval: Duration) -> Self {
        self.reaper_interval = interval;
        self
    }

    /// Directory holding the per-database AOF files.
    pub fn aof_dir(&self) -> PathBuf {
        self.db_path.join("aof")
    }

    /// Path of the AOF file for database `db`.
    pub fn aof_path(&self, db: usize) -> PathBuf {
        self.aof_dir().join(format!("db_{}.aof", db))
    }

    /// Root of the snapshot tree for database `db`.
    pub fn snapshot_root(&self, db: usize) -> PathBuf {
        self.db_path.join(db.to_string())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let config = Config::default();
        assert_eq!(config.aof_path(0), PathBuf::from("./data/aof/db_0.aof"));
        assert_eq!(config.snapshot_root(3), PathBuf::from("./data/3"));
        assert_eq!(config.reaper_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_json_round_trip() {
        let config = Config::new("/tmp/jsondb").with_reaper_interval(Duration::from_secs(5));
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"reaper_interval\":5"));
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
