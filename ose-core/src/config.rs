//! Engine configuration
//!
//! One explicit, versioned value carrying the taxonomy, window lengths,
//! imputation defaults and ranking options. It is built once (from TOML or the
//! embedded default) and passed through the pipeline; nothing reads ambient
//! configuration at call time.
//!
//! ```toml
//! version = "ose-config-2025.11"
//! windows_months = [3, 6, 12]
//! top_n = 10
//!
//! [imputation]
//! version = "imputation-v1"
//! [imputation.defaults]
//! "financial.ca_consolide" = 0.0
//!
//! [taxonomy]
//! version = "fr-news-v1"
//! [[taxonomy.categories]]
//! id = "recrutement"
//! polarity = "positive"
//! aliases = ["Recrutement", "Embauche"]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::{AttributeField, MomentumConfig, Taxonomy, TaxonomyConfig, TieBreakField};

/// Embedded default configuration
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../config/default.toml");

/// Longest supported window
pub const MAX_WINDOW_MONTHS: u32 = 120;

/// Configuration errors (all fatal for a batch)
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("imputation policy {policy} has no default for {field}")]
    MissingImputationDefault { policy: String, field: String },

    #[error("imputation policy {policy} names unknown attribute {field}")]
    UnknownImputationField { policy: String, field: String },
}

/// Imputation policy as written in configuration (feature name -> default)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImputationConfig {
    pub version: String,
    pub defaults: BTreeMap<String, f64>,
}

/// Validated imputation policy covering every attribute
#[derive(Debug, Clone, PartialEq)]
pub struct ImputationPolicy {
    version: String,
    /// Indexed by `AttributeField as usize`
    defaults: Vec<f64>,
}

impl ImputationPolicy {
    pub fn from_config(config: &ImputationConfig) -> Result<Self, ConfigError> {
        for name in config.defaults.keys() {
            if AttributeField::from_feature_name(name).is_none() {
                return Err(ConfigError::UnknownImputationField {
                    policy: config.version.clone(),
                    field: name.clone(),
                });
            }
        }

        let mut defaults = Vec::with_capacity(AttributeField::ALL.len());
        for field in AttributeField::ALL {
            let name = field.feature_name();
            let value = config.defaults.get(&name).copied().ok_or_else(|| {
                ConfigError::MissingImputationDefault {
                    policy: config.version.clone(),
                    field: name.clone(),
                }
            })?;
            if !value.is_finite() {
                return Err(ConfigError::Invalid(format!(
                    "imputation default for {} is not finite",
                    name
                )));
            }
            defaults.push(value);
        }

        Ok(Self {
            version: config.version.clone(),
            defaults,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn default_for(&self, field: AttributeField) -> f64 {
        self.defaults[field as usize]
    }
}

/// Configuration file layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfigFile {
    pub version: String,
    #[serde(default = "default_windows")]
    pub windows_months: Vec<u32>,
    #[serde(default = "default_activity_window")]
    pub activity_window_months: u32,
    #[serde(default = "default_activity_window")]
    pub label_window_months: u32,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_recency_cap")]
    pub recency_cap_days: u32,
    #[serde(default = "default_tie_break")]
    pub tie_break: Vec<TieBreakField>,
    #[serde(default)]
    pub momentum: MomentumConfig,
    pub imputation: ImputationConfig,
    pub taxonomy: TaxonomyConfig,
}

fn default_windows() -> Vec<u32> {
    crate::DEFAULT_WINDOWS_MONTHS.to_vec()
}

fn default_activity_window() -> u32 {
    12
}

fn default_top_n() -> usize {
    crate::DEFAULT_TOP_N
}

fn default_recency_cap() -> u32 {
    1825
}

fn default_tie_break() -> Vec<TieBreakField> {
    vec![TieBreakField::PositiveRecency, TieBreakField::CompanyId]
}

/// Validated engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub version: String,
    /// Ascending, unique
    pub windows_months: Vec<u32>,
    /// Window for diversity and intensity
    pub activity_window_months: u32,
    /// Window for training labels
    pub label_window_months: u32,
    pub top_n: usize,
    /// Recency days are clamped here; "never" encodes one day past it
    pub recency_cap_days: u32,
    /// Applied after score; always ends with `company_id`
    pub tie_break: Vec<TieBreakField>,
    pub momentum: MomentumConfig,
    pub imputation: ImputationPolicy,
    pub taxonomy: Taxonomy,
}

impl EngineConfig {
    /// The configuration shipped with the crate
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_toml_str(DEFAULT_CONFIG_TOML)
    }

    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: EngineConfigFile = toml::from_str(content)?;
        Self::from_file(file)
    }

    pub fn from_file(file: EngineConfigFile) -> Result<Self, ConfigError> {
        let config = Self {
            version: file.version,
            windows_months: file.windows_months,
            activity_window_months: file.activity_window_months,
            label_window_months: file.label_window_months,
            top_n: file.top_n,
            recency_cap_days: file.recency_cap_days,
            tie_break: file.tie_break,
            momentum: file.momentum,
            imputation: ImputationPolicy::from_config(&file.imputation)?,
            taxonomy: Taxonomy::from_config(&file.taxonomy)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version.trim().is_empty() {
            return Err(ConfigError::Invalid("config version is empty".to_string()));
        }
        if self.windows_months.is_empty() {
            return Err(ConfigError::Invalid("windows_months is empty".to_string()));
        }
        if self
            .windows_months
            .iter()
            .any(|&w| w == 0 || w > MAX_WINDOW_MONTHS)
        {
            return Err(ConfigError::Invalid(format!(
                "window lengths must be within 1..={} months",
                MAX_WINDOW_MONTHS
            )));
        }
        if self.windows_months.windows(2).any(|p| p[0] >= p[1]) {
            return Err(ConfigError::Invalid(
                "windows_months must be strictly ascending".to_string(),
            ));
        }
        for (name, window) in [
            ("activity_window_months", self.activity_window_months),
            ("label_window_months", self.label_window_months),
        ] {
            if !self.windows_months.contains(&window) {
                return Err(ConfigError::Invalid(format!(
                    "{} = {} is not one of windows_months {:?}",
                    name, window, self.windows_months
                )));
            }
        }
        if self.top_n == 0 {
            return Err(ConfigError::Invalid("top_n must be at least 1".to_string()));
        }
        if self.recency_cap_days == 0 {
            return Err(ConfigError::Invalid(
                "recency_cap_days must be at least 1".to_string(),
            ));
        }
        if self.tie_break.last() != Some(&TieBreakField::CompanyId) {
            return Err(ConfigError::Invalid(
                "tie_break must end with company_id".to_string(),
            ));
        }
        let mut seen = self.tie_break.clone();
        seen.sort();
        seen.dedup();
        if seen.len() != self.tie_break.len() {
            return Err(ConfigError::Invalid(
                "tie_break lists a field twice".to_string(),
            ));
        }
        self.momentum.validate()?;
        Ok(())
    }

    /// Position of a window in `windows_months`
    pub fn window_index(&self, months: u32) -> Option<usize> {
        self.windows_months.iter().position(|&w| w == months)
    }
}
