//! Persistent snapshot of the experiment between (and during) runs.
//!
//! One versioned JSON file per experiment. Writes are atomic (temp file
//! plus rename), so a crash mid-write can never leave a half-written
//! snapshot behind.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::experiment::Experiment;

/// Bump when the snapshot schema changes incompatibly. Older snapshots
/// keep loading through `#[serde(default)]` fields; newer ones are
/// rejected with guidance.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub saved_at: String,
    pub experiment: Experiment,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: &Path) -> Self {
        Self { dir: dir.to_path_buf() }
    }

    fn snapshot_path(&self, expname: &str) -> PathBuf {
        self.dir.join(format!("{}.json", expname.to_lowercase()))
    }

    pub fn exists(&self, expname: &str) -> bool {
        self.snapshot_path(expname).exists()
    }

    /// Persists the full aggregate. Called after every action, so this
    /// must never leave a corrupt file on disk: the snapshot is written
    /// to a temp file and renamed over the final path.
    pub fn store(&self, experiment: &Experiment) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create snapshot dir {}", self.dir.display()))?;

        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            saved_at: chrono::Utc::now().to_rfc3339(),
            experiment: experiment.clone(),
        };
        let json = serde_json::to_string_pretty(&snapshot)
            .context("Failed to serialize experiment snapshot")?;

        let path = self.snapshot_path(experiment.expname());
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &path)
            .with_context(|| format!("Failed to move snapshot into place at {}", path.display()))?;
        Ok(())
    }

    /// Loads the stored aggregate. A missing snapshot is an error with
    /// guidance; a corrupt or too-new snapshot is fatal, never silently
    /// reinitialized.
    pub fn load(&self, expname: &str) -> Result<Experiment> {
        let path = self.snapshot_path(expname);
        if !path.exists() {
            anyhow::bail!(
                "No snapshot found for experiment {} at {}. \
                 Start a fresh run to create one.",
                expname.to_uppercase(),
                path.display()
            );
        }

        let json = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&json)
            .with_context(|| format!("Snapshot {} is corrupt", path.display()))?;

        if snapshot.version > SNAPSHOT_VERSION {
            anyhow::bail!(
                "Snapshot {} has version {} but this build only understands up to {}. \
                 Update the tool to continue this experiment.",
                path.display(),
                snapshot.version,
                SNAPSHOT_VERSION
            );
        }

        Ok(snapshot.experiment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::ObsInfo;
    use tempfile::TempDir;

    fn sample(dir: &Path) -> Experiment {
        let obs = ObsInfo { obsdate: "240312".to_string(), eevn_name: None };
        Experiment::new("EC089A", "marcote", obs, dir.to_path_buf())
    }

    #[test]
    fn store_then_load_roundtrips() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        let mut exp = sample(dir.path());
        exp.last_step = Some("plots".to_string());

        store.store(&exp).unwrap();
        assert!(store.exists("ec089a"));
        let back = store.load("EC089A").unwrap();
        assert_eq!(back.expname(), "EC089A");
        assert_eq!(back.last_step.as_deref(), Some("plots"));
    }

    #[test]
    fn load_missing_snapshot_gives_guidance() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        let err = store.load("EC089A").unwrap_err();
        assert!(err.to_string().contains("No snapshot found"));
    }

    #[test]
    fn load_rejects_newer_version() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        let exp = sample(dir.path());
        store.store(&exp).unwrap();

        let path = dir.path().join("ec089a.json");
        let json = fs::read_to_string(&path).unwrap();
        let bumped = json.replacen(
            &format!("\"version\": {}", SNAPSHOT_VERSION),
            &format!("\"version\": {}", SNAPSHOT_VERSION + 1),
            1,
        );
        fs::write(&path, bumped).unwrap();

        let err = store.load("EC089A").unwrap_err();
        assert!(err.to_string().contains("only understands up to"));
    }

    #[test]
    fn load_corrupt_snapshot_is_fatal() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        fs::write(dir.path().join("ec089a.json"), "{ not json").unwrap();
        let err = store.load("ec089a").unwrap_err();
        assert!(err.to_string().contains("corrupt"));
    }

    #[test]
    fn store_leaves_no_temp_file_behind() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        store.store(&sample(dir.path())).unwrap();
        assert!(!dir.path().join("ec089a.json.tmp").exists());
        assert!(dir.path().join("ec089a.json").exists());
    }
}
