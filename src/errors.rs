//! Error types for the post-processing domain and the step machinery.

use std::fmt::{Display, Formatter};

/// Errors from the experiment aggregate itself.
#[derive(Debug, Clone)]
pub enum DomainError {
    /// Same antenna registered twice (after name normalization).
    DuplicateAntenna { name: String },
    /// Observing date not in YYMMDD form.
    InvalidObsDate { value: String },
}

impl Display for DomainError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateAntenna { name } => write!(f, "antenna {} already registered", name),
            Self::InvalidObsDate { value } => {
                write!(f, "observing date '{}' is not in YYMMDD form", value)
            }
        }
    }
}

impl std::error::Error for DomainError {}

/// Errors surfaced by the dispatcher and the step registry.
#[derive(Debug)]
pub enum StepError {
    /// An action of the step failed; the run cannot continue.
    StepFailed { step: String, expname: String, reason: String },
    /// An action needs the operator to act before the run continues.
    AwaitingOperator { step: String, guidance: String },
    /// A requested step name is not in the registry.
    UnknownStep { name: String, known: Vec<String> },
    /// run range where the end does not come after the start.
    InvalidRange { from: String, to: String },
    /// Snapshot or logbook could not be written.
    Persistence { message: String },
}

impl Display for StepError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StepFailed { step, expname, reason } => {
                write!(f, "step '{}' failed for {}: {}", step, expname, reason)
            }
            Self::AwaitingOperator { step, guidance } => {
                write!(f, "step '{}' is waiting for the operator: {}", step, guidance)
            }
            Self::UnknownStep { name, known } => {
                write!(f, "unknown step '{}'. Known steps: {}", name, known.join(", "))
            }
            Self::InvalidRange { from, to } => {
                write!(f, "invalid step range: '{}' does not come after '{}'", to, from)
            }
            Self::Persistence { message } => write!(f, "could not persist experiment: {}", message),
        }
    }
}

impl std::error::Error for StepError {}
