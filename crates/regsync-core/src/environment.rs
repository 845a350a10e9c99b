//! Target environments and their label prefixes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RegsyncError;

/// Target environment of a sync or validation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Environment {
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Staging => "STAGING",
            Environment::Production => "PRODUCTION",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = RegsyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "staging" | "stage" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            other => Err(RegsyncError::config(format!("unknown environment '{other}'"))),
        }
    }
}

/// Label prefix table keeping staging and production nodes disjoint in one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelPrefixes {
    pub staging: String,
    pub production: String,
}

impl Default for LabelPrefixes {
    fn default() -> Self {
        Self {
            staging: "Staging_".to_string(),
            production: String::new(),
        }
    }
}

impl LabelPrefixes {
    /// Prefix for an environment.
    pub fn prefix(&self, env: Environment) -> &str {
        match env {
            Environment::Staging => &self.staging,
            Environment::Production => &self.production,
        }
    }

    /// Prefix a label for `env`. Already-prefixed labels come back unchanged.
    pub fn apply(&self, env: Environment, label: &str) -> String {
        let prefix = self.prefix(env);
        if prefix.is_empty() || label.starts_with(prefix) {
            label.to_string()
        } else {
            format!("{prefix}{label}")
        }
    }

    /// Whether a stored label belongs to `env`.
    pub fn in_scope(&self, env: Environment, label: &str) -> bool {
        match env {
            Environment::Staging => label.starts_with(&self.staging),
            Environment::Production if !self.production.is_empty() => {
                label.starts_with(&self.production)
            }
            Environment::Production => !label.starts_with(&self.staging),
        }
    }

    /// Staging must carry a non-empty prefix; both must be usable inside a label.
    pub fn validate(&self) -> Result<(), RegsyncError> {
        if self.staging.is_empty() {
            return Err(RegsyncError::config("staging label prefix must not be empty"));
        }
        if self.staging == self.production {
            return Err(RegsyncError::config(
                "staging and production label prefixes must differ",
            ));
        }
        for prefix in [&self.staging, &self.production] {
            if !prefix.is_empty() && !is_label_prefix(prefix) {
                return Err(RegsyncError::config(format!(
                    "label prefix '{prefix}' must start with an uppercase letter and contain only letters, digits or '_'"
                )));
            }
        }
        Ok(())
    }
}

fn is_label_prefix(prefix: &str) -> bool {
    let mut chars = prefix.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
