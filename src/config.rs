//! Tool configuration: hosts, paths and timeouts.
//!
//! Loaded from `postprocess.yaml` when present; every field has a
//! default so a missing file just means the standard EVN setup.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub hosts: Hosts,
    pub paths: Paths,
    pub timeouts: Timeouts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Hosts {
    /// Correlator control host, where the lis files are born.
    pub ccs: String,
    /// EVN pipeline host.
    pub pipe: String,
    /// Archive host.
    pub archive: String,
    /// FTP server holding the station log and antab files.
    pub vlbeer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    /// Root of the per-scientist processing areas on eee.
    pub data_root: PathBuf,
    /// Experiment directories on the correlator host.
    pub ccs_expr_dir: PathBuf,
    /// Pipeline $IN root on the pipeline host.
    pub pipe_in_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub command_secs: u64,
    pub transfer_secs: u64,
}

impl Default for Hosts {
    fn default() -> Self {
        Self {
            ccs: "jops@ccs".to_string(),
            pipe: "jops@pipe".to_string(),
            archive: "jops@archive".to_string(),
            vlbeer: "evn@vlbeer.ira.inaf.it".to_string(),
        }
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("/data0"),
            ccs_expr_dir: PathBuf::from("/ccs/expr"),
            pipe_in_dir: PathBuf::from("/jop83_0/pipe/in"),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        // Long: getdata/j2ms2 over a full e-EVN run take hours.
        Self { command_secs: 4 * 3600, transfer_secs: 2 * 3600 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self { hosts: Hosts::default(), paths: Paths::default(), timeouts: Timeouts::default() }
    }
}

impl Config {
    /// Loads from the given path, or from the user config dir, or falls
    /// back to defaults when no file exists. An explicitly given path
    /// must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let default_path = Self::default_path();
                match default_path {
                    Some(p) if p.exists() => Self::from_file(&p),
                    _ => Ok(Self::default()),
                }
            }
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_yaml::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("evn-postprocess").join("postprocess.yaml"))
    }

    /// Processing directory for one experiment on eee.
    pub fn experiment_dir(&self, supsci: &str, expname: &str) -> PathBuf {
        self.paths.data_root.join(supsci.to_lowercase()).join(expname.to_uppercase())
    }

    /// Experiment directory on the correlator host.
    pub fn ccs_dir(&self, correlator_name: &str) -> PathBuf {
        self.paths.ccs_expr_dir.join(correlator_name.to_uppercase())
    }
}
