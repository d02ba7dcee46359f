//! Antenna bookkeeping for an experiment or a single correlator pass.

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Per-station facts gathered during post-processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Antenna {
    pub name: String,
    #[serde(default)]
    pub scheduled: bool,
    #[serde(default)]
    pub observed: bool,
    /// Subband indices in which the antenna produced data. Shorter than
    /// the frequency setup means the antenna observed a reduced band.
    #[serde(default)]
    pub subbands: Vec<usize>,
    #[serde(default)]
    pub polswap: bool,
    #[serde(default)]
    pub polconvert: bool,
    #[serde(default)]
    pub onebit: bool,
    /// A station log file was found on vlbeer for this antenna.
    #[serde(default)]
    pub logfsfile: bool,
    /// An antab file was found on vlbeer for this antenna.
    #[serde(default)]
    pub antabfsfile: bool,
    #[serde(default)]
    pub opacity: bool,
}

impl Antenna {
    pub fn new(name: &str) -> Self {
        Self {
            name: normalize_name(name),
            scheduled: true,
            observed: false,
            subbands: Vec::new(),
            polswap: false,
            polconvert: false,
            onebit: false,
            logfsfile: false,
            antabfsfile: false,
            opacity: false,
        }
    }
}

/// Canonical form of an antenna name: first letter uppercase, rest lowercase.
/// Every antenna name entering the system goes through here.
pub fn normalize_name(name: &str) -> String {
    let trimmed = name.trim();
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Parses an operator-supplied antenna list (comma or space separated)
/// into normalized names. This is the only place such strings are parsed.
pub fn parse_list(input: &str) -> Vec<String> {
    input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.trim().is_empty())
        .map(normalize_name)
        .collect()
}

/// Ordered antenna collection with name-keyed access.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Antennas {
    antennas: Vec<Antenna>,
}

impl Antennas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an antenna. Duplicate names (after normalization) are rejected.
    pub fn add(&mut self, antenna: Antenna) -> Result<(), DomainError> {
        if self.contains(&antenna.name) {
            return Err(DomainError::DuplicateAntenna { name: antenna.name });
        }
        self.antennas.push(antenna);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        let name = normalize_name(name);
        self.antennas.iter().any(|a| a.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&Antenna> {
        let name = normalize_name(name);
        self.antennas.iter().find(|a| a.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Antenna> {
        let name = normalize_name(name);
        self.antennas.iter_mut().find(|a| a.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Antenna> {
        self.antennas.iter()
    }

    #[allow(dead_code)]
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Antenna> {
        self.antennas.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.antennas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.antennas.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.antennas.iter().map(|a| a.name.clone()).collect()
    }

    pub fn scheduled(&self) -> Vec<String> {
        self.filtered(|a| a.scheduled)
    }

    pub fn observed(&self) -> Vec<String> {
        self.filtered(|a| a.observed)
    }

    pub fn polswapped(&self) -> Vec<String> {
        self.filtered(|a| a.polswap)
    }

    pub fn polconverted(&self) -> Vec<String> {
        self.filtered(|a| a.polconvert)
    }

    pub fn onebit(&self) -> Vec<String> {
        self.filtered(|a| a.onebit)
    }

    fn filtered(&self, pred: impl Fn(&Antenna) -> bool) -> Vec<String> {
        self.antennas.iter().filter(|a| pred(a)).map(|a| a.name.clone()).collect()
    }
}
