//! Correlator passes and the facts discovered per pass.

use serde::{Deserialize, Serialize};

use super::antennas::{Antenna, Antennas};

/// Frequency setup read back from the measurement set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreqSetup {
    pub n_subbands: usize,
    pub channels: usize,
    /// Central frequency per subband, in Hz.
    pub frequencies_hz: Vec<f64>,
    pub bandwidth_hz: f64,
}

/// Weight-threshold flagging applied to a measurement set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagWeight {
    /// Visibilities with weights below this were flagged.
    pub threshold: f64,
    /// Percentage of data dropped by the flagging, once known.
    #[serde(default)]
    pub percentage: Option<f64>,
}

impl FlagWeight {
    pub fn new(threshold: f64) -> Self {
        Self { threshold, percentage: None }
    }
}

/// One correlator pass of the experiment: one lis file, one measurement
/// set, one FITS-IDI series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelatorPass {
    pub lisfile: String,
    pub msfile: String,
    pub fitsidifile: String,
    /// Whether the EVN pipeline runs on this pass. Only the first pass
    /// of an experiment is pipelined unless the operator says otherwise.
    pub pipeline: bool,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub antennas: Antennas,
    #[serde(default)]
    pub freqsetup: Option<FreqSetup>,
    #[serde(default)]
    pub flagged_weights: Option<FlagWeight>,
}

impl CorrelatorPass {
    pub fn new(lisfile: &str, msfile: &str, fitsidifile: &str, pipeline: bool) -> Self {
        Self {
            lisfile: lisfile.to_string(),
            msfile: msfile.to_string(),
            fitsidifile: fitsidifile.to_string(),
            pipeline,
            sources: Vec::new(),
            antennas: Antennas::new(),
            freqsetup: None,
            flagged_weights: None,
        }
    }

    /// Antennas that produced data in only part of the band: fewer
    /// subbands than the frequency setup, but more than none.
    pub fn reduced_bandwidth_antennas(&self) -> Vec<&Antenna> {
        match &self.freqsetup {
            Some(setup) => self
                .antennas
                .iter()
                .filter(|a| !a.subbands.is_empty() && a.subbands.len() < setup.n_subbands)
                .collect(),
            None => Vec::new(),
        }
    }
}
