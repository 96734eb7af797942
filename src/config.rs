use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::diagnostics::{CheckError, Diagnostic, DiagnosticKind, Severity};

/// A named set of default severities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Default,
    Strict,
    Lenient,
    Silent,
}

/// A severity, or `off` to drop the diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Error,
    Warning,
    Information,
    Hint,
    Off,
}

impl Level {
    pub fn severity(self) -> Option<Severity> {
        match self {
            Level::Error => Some(Severity::Error),
            Level::Warning => Some(Severity::Warning),
            Level::Information => Some(Severity::Information),
            Level::Hint => Some(Severity::Hint),
            Level::Off => None,
        }
    }
}

/// Which diagnostics are reported, and how loudly.
///
/// ```toml
/// profile = "lenient"
///
/// [overrides]
/// UnreachableBranch = "error"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckerConfig {
    #[serde(default)]
    pub profile: Profile,
    /// Diagnostic kind name to level.
    #[serde(default)]
    pub overrides: BTreeMap<String, Level>,
}

impl CheckerConfig {
    pub fn new(profile: Profile) -> Self {
        Self { profile, overrides: BTreeMap::new() }
    }

    pub fn with_override(mut self, kind: &str, level: Level) -> Self {
        self.overrides.insert(kind.to_string(), level);
        self
    }

    pub fn from_toml(src: &str) -> Result<Self, CheckError> {
        let config: CheckerConfig =
            toml::from_str(src).map_err(|e| CheckError::config(format!("invalid checker configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects overrides naming a diagnostic kind that does not exist.
    pub fn validate(&self) -> Result<(), CheckError> {
        for name in self.overrides.keys() {
            if !DiagnosticKind::NAMES.contains(&name.as_str()) {
                return Err(CheckError::config(format!("unknown diagnostic kind '{name}' in [overrides]")));
            }
        }
        Ok(())
    }

    pub fn level(&self, kind: &str) -> Level {
        if let Some(level) = self.overrides.get(kind) {
            return *level;
        }
        match self.profile {
            Profile::Strict => Level::Error,
            Profile::Silent => Level::Off,
            Profile::Default => match kind {
                "UnreachableBranch" | "UnreachableValueBranch" => Level::Hint,
                "FalseAssertion" | "UnexpectedBlockGiven" => Level::Warning,
                _ => Level::Error,
            },
            Profile::Lenient => match kind {
                "NoMethod" | "UnresolvedOverloading" | "IllFormedDeclaration" => Level::Error,
                "UnreachableBranch" | "UnreachableValueBranch" | "FalseAssertion" => Level::Off,
                _ => Level::Warning,
            },
        }
    }

    /// Settles severities; diagnostics whose kind is `off` are dropped.
    pub fn apply(&self, diagnostics: Vec<Diagnostic>) -> Vec<Diagnostic> {
        diagnostics
            .into_iter()
            .filter_map(|mut d| {
                let severity = self.level(d.name()).severity()?;
                d.severity = severity;
                Some(d)
            })
            .collect()
    }
}
