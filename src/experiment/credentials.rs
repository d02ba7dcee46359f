//! Archive credentials for a proprietary experiment.

use serde::{Deserialize, Serialize};

/// Username/password pair protecting the experiment in the EVN archive.
/// Immutable once issued; re-runs must reuse the same pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self { username: username.to_string(), password: password.to_string() }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}
