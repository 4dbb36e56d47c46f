//! Stage selection

use std::collections::BTreeSet;
use tracing::info;

pub const DEPLOY: &str = "deploy";
pub const VALIDATE: &str = "validate";
pub const CLEANUP: &str = "cleanup";

const SKIP_PREFIX: &str = "SKIP_";

/// Which stages of a run are skipped
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StageSet {
    skipped: BTreeSet<String>,
}

impl StageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect `SKIP_<stage>` variables from the process environment
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Collect `SKIP_<stage>` entries whose value is non-empty and not false-ish
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let skipped = vars
            .into_iter()
            .filter_map(|(key, value)| {
                let stage = key.as_ref().strip_prefix(SKIP_PREFIX)?;
                let value = value.as_ref().trim().to_lowercase();
                let enabled = !matches!(value.as_str(), "" | "0" | "false" | "no" | "off");
                (enabled && !stage.is_empty()).then(|| stage.to_string())
            })
            .collect();

        Self { skipped }
    }

    pub fn skip(mut self, stage: impl Into<String>) -> Self {
        self.skipped.insert(stage.into());
        self
    }

    pub fn merge(mut self, other: &StageSet) -> Self {
        self.skipped.extend(other.skipped.iter().cloned());
        self
    }

    pub fn is_skipped(&self, stage: &str) -> bool {
        let skipped = self.skipped.contains(stage);
        if skipped {
            info!("The '{}' stage is skipped", stage);
        }
        skipped
    }

    pub fn skipped(&self) -> impl Iterator<Item = &str> {
        self.skipped.iter().map(String::as_str)
    }
}
