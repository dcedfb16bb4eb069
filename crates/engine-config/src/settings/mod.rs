use crate::settings::{error::SettingsError, validated::ValidatedSettings, validator::SettingsValidator};
use engine_core::progress::PhaseSpec;
use engine_processing::batch::SizingConfig;
use engine_runtime::orchestrator::default_phases;
use model::{
    core::key::{ColumnMap, IdentifierKey},
    import::reconciliation::UnmatchedPolicy,
};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, info};

pub mod env;
pub mod error;
pub mod validated;
pub mod validator;

const SETTINGS_DIR: &str = ".tally";
const SETTINGS_FILE: &str = "import.json";

/// Adaptive batch sizing as written in a settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchSettings {
    pub initial_size: usize,
    pub min_size: usize,
    pub max_size: usize,
    pub target_latency_ms: u64,
    pub tolerance: f64,
    pub growth_factor: f64,
    pub shrink_factor: f64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        let sizing = SizingConfig::default();
        BatchSettings {
            initial_size: sizing.initial_size,
            min_size: sizing.min_size,
            max_size: sizing.max_size,
            target_latency_ms: sizing.target_latency.as_millis() as u64,
            tolerance: sizing.tolerance,
            growth_factor: sizing.growth_factor,
            shrink_factor: sizing.shrink_factor,
        }
    }
}

impl BatchSettings {
    pub fn sizing(&self) -> SizingConfig {
        SizingConfig::default()
            .with_bounds(self.initial_size, self.min_size, self.max_size)
            .with_target_latency(Duration::from_millis(self.target_latency_ms))
            .with_tolerance(self.tolerance)
            .with_factors(self.growth_factor, self.shrink_factor)
    }
}

/// Raw, unvalidated import settings. Every field has a default, so an empty
/// JSON object is a valid settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImportSettings {
    /// Pay period the rows belong to, `YYYY-MM`.
    pub period: Option<String>,
    pub batch: BatchSettings,
    pub continue_on_error: bool,
    pub unmatched: UnmatchedPolicy,
    /// Drop incoming zero amounts for fields the entity does not carry yet.
    pub skip_zero_amounts: bool,
    pub identifier_priority: Vec<IdentifierKey>,
    pub columns: ColumnMap,
    pub phases: Vec<PhaseSpec>,
}

impl Default for ImportSettings {
    fn default() -> Self {
        ImportSettings {
            period: None,
            batch: BatchSettings::default(),
            continue_on_error: true,
            unmatched: UnmatchedPolicy::default(),
            skip_zero_amounts: false,
            identifier_priority: IdentifierKey::PRIORITY.to_vec(),
            columns: ColumnMap::default(),
            phases: default_phases(),
        }
    }
}

impl ImportSettings {
    /// `~/.tally/import.json`, when a home directory is known.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(SETTINGS_DIR).join(SETTINGS_FILE))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let settings = serde_json::from_str(&source).map_err(|source| SettingsError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        info!(path = %path.display(), "Loaded import settings");
        Ok(settings)
    }

    /// Loads `path` when one is given. Otherwise falls back to the default
    /// settings file if it exists, and to built-in defaults if it does not.
    pub fn resolve(path: Option<&Path>) -> Result<Self, SettingsError> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(default) if default.is_file() => Self::load(default),
            _ => {
                debug!("No settings file found, using defaults");
                Ok(ImportSettings::default())
            }
        }
    }

    /// Applies `TALLY_*` overrides read through `lookup`.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        env::apply_overrides(&mut self, lookup)?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<ValidatedSettings, SettingsError> {
        SettingsValidator::new().validate(self)
    }
}
