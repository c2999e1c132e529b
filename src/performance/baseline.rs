//! Frozen baselines and their persistence.

use crate::core::{now, Error, Result, Timestamp};
use crate::performance::stats::RunningStats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// The statistical "normal" of one operation's duration (milliseconds).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    /// Operation name
    pub operation_name: String,
    /// Mean duration (ms)
    pub mean: f64,
    /// Sample standard deviation (ms)
    pub stddev: f64,
    /// Samples the baseline was computed from
    pub sample_count: u64,
    /// When the baseline was frozen
    pub established_at: Timestamp,
}

impl Baseline {
    /// Freeze running statistics.
    pub fn from_stats(operation_name: &str, stats: &RunningStats) -> Self {
        Self {
            operation_name: operation_name.to_string(),
            mean: stats.mean(),
            stddev: stats.stddev(),
            sample_count: stats.count(),
            established_at: now(),
        }
    }

    /// Duration above which the operation counts as degraded.
    pub fn threshold(&self, k: f64) -> f64 {
        self.mean + k * self.stddev
    }
}

/// All baselines, keyed by operation name.
pub type BaselineMap = BTreeMap<String, Baseline>;

/// Durable storage for baselines.
pub trait BaselineStore: Send + Sync {
    /// Read every stored baseline.
    fn load(&self) -> Result<BaselineMap>;

    /// Replace the stored baselines.
    fn save(&self, baselines: &BaselineMap) -> Result<()>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Stores baselines as one pretty-printed JSON object.
///
/// Writes go to a sibling temp file that is then renamed over the target, so
/// a crash mid-write leaves the previous file intact.
pub struct JsonFileBaselineStore {
    path: PathBuf,
}

impl JsonFileBaselineStore {
    /// Create a store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl BaselineStore for JsonFileBaselineStore {
    fn load(&self) -> Result<BaselineMap> {
        if !self.path.exists() {
            return Ok(BaselineMap::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(BaselineMap::new());
        }
        serde_json::from_str(&raw).map_err(|e| {
            Error::Serialization(format!(
                "Malformed baseline file {}: {e}",
                self.path.display()
            ))
        })
    }

    fn save(&self, baselines: &BaselineMap) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(baselines)?;
        let temp = self.temp_path();
        fs::write(&temp, json)?;
        fs::rename(&temp, &self.path)?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}

/// Keeps baselines in memory only.
#[derive(Default)]
pub struct MemoryBaselineStore {
    baselines: Mutex<BaselineMap>,
}

impl MemoryBaselineStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with baselines.
    pub fn with_baselines(baselines: BaselineMap) -> Self {
        Self {
            baselines: Mutex::new(baselines),
        }
    }
}

impl BaselineStore for MemoryBaselineStore {
    fn load(&self) -> Result<BaselineMap> {
        Ok(self
            .baselines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, baselines: &BaselineMap) -> Result<()> {
        *self.baselines.lock().unwrap_or_else(PoisonError::into_inner) = baselines.clone();
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline(name: &str, mean: f64) -> Baseline {
        Baseline {
            operation_name: name.to_string(),
            mean,
            stddev: 4.0,
            sample_count: 100,
            established_at: now(),
        }
    }

    #[test]
    fn test_from_stats() {
        let mut stats = RunningStats::new();
        for v in [10.0, 20.0, 30.0] {
            stats.push(v);
        }
        let b = Baseline::from_stats("op", &stats);
        assert_eq!(b.sample_count, 3);
        assert!((b.mean - 20.0).abs() < 1e-9);
        assert!((b.stddev - 10.0).abs() < 1e-9);
        assert!((b.threshold(3.0) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_json_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileBaselineStore::new(dir.path().join("nested").join("baselines.json"));
        assert!(store.load().unwrap().is_empty());

        let mut map = BaselineMap::new();
        map.insert("ingest".into(), baseline("ingest", 120.0));
        map.insert("extract_entities".into(), baseline("extract_entities", 300.0));
        store.save(&map).unwrap();

        assert_eq!(store.load().unwrap(), map);
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn test_json_store_is_human_readable() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileBaselineStore::new(dir.path().join("baselines.json"));
        let mut map = BaselineMap::new();
        map.insert("ingest".into(), baseline("ingest", 120.0));
        store.save(&map).unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["ingest"]["mean"], 120.0);
        assert_eq!(value["ingest"]["sample_count"], 100);
        assert!(value["ingest"]["established_at"].is_string());
    }

    #[test]
    fn test_json_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("baselines.json");
        std::fs::write(&path, "not json").unwrap();
        let store = JsonFileBaselineStore::new(&path);
        assert!(matches!(store.load(), Err(Error::Serialization(_))));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryBaselineStore::new();
        let mut map = BaselineMap::new();
        map.insert("op".into(), baseline("op", 1.0));
        store.save(&map).unwrap();
        assert_eq!(store.load().unwrap().len(), 1);
        assert_eq!(store.describe(), "memory");
    }
}
