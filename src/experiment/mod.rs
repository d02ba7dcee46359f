//! The experiment aggregate: everything known about one EVN experiment
//! during post-processing, persisted as a whole between runs.

pub mod antennas;
pub mod credentials;
pub mod passes;
pub mod sources;

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub use antennas::{Antenna, Antennas};
pub use credentials::Credentials;
pub use passes::{CorrelatorPass, FlagWeight, FreqSetup};
pub use sources::{Source, SourceType};

use crate::errors::DomainError;

/// Observation facts resolved from the station catalog (MASTER_PROJECTS.LIS
/// on the correlator host). Resolved exactly once, when the experiment is
/// first created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObsInfo {
    /// Observing epoch as YYMMDD.
    pub obsdate: String,
    /// Umbrella name under which an e-EVN run was correlated, when the
    /// experiment was part of one.
    pub eevn_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    /// Canonical experiment code, always uppercase.
    expname: String,
    pub eevn_name: Option<String>,
    pub obsdate: String,
    /// Supporting scientist id, always lowercase.
    pub supsci: String,
    #[serde(default)]
    pub piname: Vec<String>,
    #[serde(default)]
    pub email: Vec<String>,
    #[serde(default)]
    pub refant: Vec<String>,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub sources_stdplot: Option<Vec<String>>,
    #[serde(default)]
    pub antennas: Antennas,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default)]
    pub passes: Vec<CorrelatorPass>,
    /// Extra command-line parameters for specific tools, keyed by tool name.
    #[serde(default)]
    pub special_params: HashMap<String, Vec<String>>,
    /// Name of the last stage that completed. `None` before the first
    /// stage finishes.
    #[serde(default)]
    pub last_step: Option<String>,
    pub cwd: PathBuf,
    pub created_at: String,
    pub updated_at: String,
}

impl Experiment {
    pub fn new(expname: &str, supsci: &str, obs: ObsInfo, cwd: PathBuf) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            expname: expname.trim().to_uppercase(),
            eevn_name: obs.eevn_name.map(|n| n.trim().to_uppercase()),
            obsdate: obs.obsdate,
            supsci: supsci.trim().to_lowercase(),
            piname: Vec::new(),
            email: Vec::new(),
            refant: Vec::new(),
            sources: Vec::new(),
            sources_stdplot: None,
            antennas: Antennas::new(),
            credentials: None,
            passes: Vec::new(),
            special_params: HashMap::new(),
            last_step: None,
            cwd,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn expname(&self) -> &str {
        &self.expname
    }

    /// Lowercase form, used for file names.
    pub fn expname_lower(&self) -> String {
        self.expname.to_lowercase()
    }

    /// Name the correlator used for this run: the e-EVN umbrella name
    /// when there is one, the experiment code otherwise.
    pub fn correlator_name(&self) -> &str {
        self.eevn_name.as_deref().unwrap_or(&self.expname)
    }

    pub fn is_eevn(&self) -> bool {
        match &self.eevn_name {
            Some(name) => name != &self.expname,
            None => false,
        }
    }

    /// Network monitoring (N) and fringe test (F) experiments: never
    /// proprietary, no archive credentials.
    pub fn is_test_experiment(&self) -> bool {
        matches!(self.expname.chars().next(), Some('N') | Some('F'))
    }

    pub fn obsdatetime(&self) -> Result<NaiveDate, DomainError> {
        NaiveDate::parse_from_str(&self.obsdate, "%y%m%d").map_err(|_| {
            DomainError::InvalidObsDate { value: self.obsdate.clone() }
        })
    }

    /// Replaces the reference antennas from an operator-supplied string.
    pub fn set_refant(&mut self, input: &str) {
        self.refant = antennas::parse_list(input);
    }

    /// Whether the antenna produced data in any correlator pass. There is
    /// no experiment-global observed flag; this view is derived from the
    /// per-pass facts.
    pub fn antenna_observed(&self, name: &str) -> bool {
        let name = antennas::normalize_name(name);
        self.passes
            .iter()
            .any(|p| p.antennas.get(&name).map(|a| a.observed).unwrap_or(false))
    }

    /// Union of antennas observed in at least one pass, in experiment
    /// antenna order.
    pub fn observed_antennas(&self) -> Vec<String> {
        self.antennas
            .iter()
            .map(|a| a.name.clone())
            .filter(|n| self.antenna_observed(n))
            .collect()
    }

    /// Sources to feed to standardplots: the operator's choice when set,
    /// otherwise every fringe finder plus every target.
    pub fn plot_sources(&self) -> Vec<String> {
        if let Some(chosen) = &self.sources_stdplot {
            return chosen.clone();
        }
        self.sources
            .iter()
            .filter(|s| matches!(s.kind, SourceType::Fringefinder | SourceType::Target))
            .map(|s| s.name.clone())
            .collect()
    }

    /// Passes that the EVN pipeline should run on.
    pub fn pipelined_passes(&self) -> Vec<&CorrelatorPass> {
        self.passes.iter().filter(|p| p.pipeline).collect()
    }

    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}
