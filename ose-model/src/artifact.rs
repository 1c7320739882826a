//! Model artifacts
//!
//! A model is an immutable, versioned file (JSON or TOML) declaring:
//! - The feature schema it expects and the taxonomy version it was trained on
//! - Staged transforms, each naming its columns
//! - A logistic classifier (intercept and per-feature coefficients)
//! - A probability calibration
//! - The explanation baseline, in transformed space
//! - Monotone constraints, enforced when the artifact is loaded

use ose_core::{
    FeatureSchema, DIVERSITY_NEGATIVE, DIVERSITY_POSITIVE, INTENSITY_NEGATIVE,
    INTENSITY_POSITIVE,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::{ModelError, TransformStage};

/// Composites the score must rise with, whatever the artifact declares
pub const REQUIRED_INCREASING: [&str; 2] = [DIVERSITY_POSITIVE, INTENSITY_POSITIVE];

/// Composites the score must fall with, whatever the artifact declares
pub const REQUIRED_DECREASING: [&str; 2] = [DIVERSITY_NEGATIVE, INTENSITY_NEGATIVE];

/// Artifact shipped with the crate
pub const EMBEDDED_ARTIFACT_JSON: &str = include_str!("../artifacts/opportunity-logit-v1.json");

/// Features the score must not decrease (or increase) with
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonotoneConstraints {
    pub increasing: Vec<String>,
    pub decreasing: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogisticClassifier {
    pub intercept: f64,
    /// Features without a coefficient weigh zero
    #[serde(default)]
    pub coefficients: BTreeMap<String, f64>,
}

/// Maps the classifier's log-odds to a probability
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Calibration {
    /// sigmoid(z)
    #[default]
    Identity,
    /// sigmoid(slope * z + offset)
    Platt { slope: f64, offset: f64 },
    /// Piecewise-linear map of sigmoid(z), flat outside the thresholds
    Isotonic {
        thresholds: Vec<f64>,
        values: Vec<f64>,
    },
}

pub fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl Calibration {
    pub fn validate(&self) -> Result<(), ModelError> {
        match self {
            Calibration::Identity => Ok(()),
            Calibration::Platt { slope, offset } => {
                if !offset.is_finite() {
                    return Err(ModelError::InvalidArtifact(
                        "platt offset is not finite".to_string(),
                    ));
                }
                if !(slope.is_finite() && *slope > 0.0) {
                    return Err(ModelError::MonotoneViolation {
                        feature: "calibration".to_string(),
                        reason: format!("platt slope {} is not positive", slope),
                    });
                }
                Ok(())
            }
            Calibration::Isotonic { thresholds, values } => {
                if thresholds.is_empty() || thresholds.len() != values.len() {
                    return Err(ModelError::InvalidArtifact(format!(
                        "isotonic calibration has {} thresholds and {} values",
                        thresholds.len(),
                        values.len()
                    )));
                }
                if thresholds.iter().chain(values).any(|v| !v.is_finite()) {
                    return Err(ModelError::InvalidArtifact(
                        "isotonic calibration holds a non-finite number".to_string(),
                    ));
                }
                if values.iter().any(|v| !(0.0..=1.0).contains(v)) {
                    return Err(ModelError::InvalidArtifact(
                        "isotonic values must lie in [0, 1]".to_string(),
                    ));
                }
                if thresholds.windows(2).any(|p| p[0] >= p[1]) {
                    return Err(ModelError::InvalidArtifact(
                        "isotonic thresholds must be strictly ascending".to_string(),
                    ));
                }
                if values.windows(2).any(|p| p[0] > p[1]) {
                    return Err(ModelError::MonotoneViolation {
                        feature: "calibration".to_string(),
                        reason: "isotonic values decrease".to_string(),
                    });
                }
                Ok(())
            }
        }
    }

    /// Calibrated probability for log-odds `z`
    pub fn apply(&self, z: f64) -> f64 {
        match self {
            Calibration::Identity => sigmoid(z),
            Calibration::Platt { slope, offset } => sigmoid(slope * z + offset),
            Calibration::Isotonic { thresholds, values } => {
                interpolate(thresholds, values, sigmoid(z))
            }
        }
    }
}

fn interpolate(thresholds: &[f64], values: &[f64], x: f64) -> f64 {
    let last = thresholds.len() - 1;
    if x <= thresholds[0] {
        return values[0];
    }
    if x >= thresholds[last] {
        return values[last];
    }
    // First threshold strictly above x; 1..=last given the checks above
    let upper = thresholds.partition_point(|&t| t <= x);
    let (x0, x1) = (thresholds[upper - 1], thresholds[upper]);
    let (y0, y1) = (values[upper - 1], values[upper]);
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}

/// A model artifact as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub model_version: String,
    pub taxonomy_version: String,
    #[serde(default)]
    pub description: Option<String>,
    pub feature_schema: Vec<String>,
    #[serde(default)]
    pub monotone: MonotoneConstraints,
    #[serde(default)]
    pub transforms: Vec<TransformStage>,
    pub classifier: LogisticClassifier,
    #[serde(default)]
    pub calibration: Calibration,
    /// Transformed-space reference row; absent features default to 0
    #[serde(default)]
    pub baseline: BTreeMap<String, f64>,
}

impl ModelArtifact {
    /// The artifact shipped with the crate
    pub fn embedded() -> Result<Self, ModelError> {
        Self::from_json_str(EMBEDDED_ARTIFACT_JSON)
    }

    /// Load by extension: `.json` or `.toml`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            Some("toml") => Self::from_toml_str(&content),
            _ => Err(ModelError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    pub fn from_json_str(content: &str) -> Result<Self, ModelError> {
        let artifact: Self = serde_json::from_str(content)?;
        artifact.validate()?;
        Ok(artifact)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ModelError> {
        let artifact: Self = toml::from_str(content)?;
        artifact.validate()?;
        Ok(artifact)
    }

    pub fn schema(&self) -> FeatureSchema {
        FeatureSchema::from_names(self.feature_schema.clone())
    }

    fn require_known<'a>(
        &self,
        known: &HashSet<&str>,
        names: impl IntoIterator<Item = &'a String>,
        what: &str,
    ) -> Result<(), ModelError> {
        for name in names {
            if !known.contains(name.as_str()) {
                return Err(ModelError::InvalidArtifact(format!(
                    "{} names {} which is not in the feature schema",
                    what, name
                )));
            }
        }
        Ok(())
    }

    /// Structural checks plus monotone constraints
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.model_version.trim().is_empty() {
            return Err(ModelError::InvalidArtifact("model_version is empty".to_string()));
        }
        if self.taxonomy_version.trim().is_empty() {
            return Err(ModelError::InvalidArtifact(
                "taxonomy_version is empty".to_string(),
            ));
        }
        if self.feature_schema.is_empty() {
            return Err(ModelError::InvalidArtifact("feature_schema is empty".to_string()));
        }
        let duplicates = self.schema().duplicates();
        if !duplicates.is_empty() {
            return Err(ModelError::InvalidArtifact(format!(
                "feature_schema repeats {:?}",
                duplicates
            )));
        }

        let known: HashSet<&str> = self.feature_schema.iter().map(String::as_str).collect();
        self.require_known(&known, self.classifier.coefficients.keys(), "classifier")?;
        self.require_known(&known, self.baseline.keys(), "baseline")?;
        self.require_known(&known, &self.monotone.increasing, "monotone.increasing")?;
        self.require_known(&known, &self.monotone.decreasing, "monotone.decreasing")?;
        for stage in &self.transforms {
            stage.validate()?;
            self.require_known(&known, stage.columns(), stage.kind())?;
        }

        if !self.classifier.intercept.is_finite() {
            return Err(ModelError::InvalidArtifact("intercept is not finite".to_string()));
        }
        for (name, value) in self.classifier.coefficients.iter().chain(&self.baseline) {
            if !value.is_finite() {
                return Err(ModelError::InvalidArtifact(format!(
                    "non-finite parameter for {}",
                    name
                )));
            }
        }

        self.calibration.validate()?;
        self.check_monotone()
    }

    /// Every transform stage is non-decreasing once validated, so direction
    /// is carried by the coefficient sign alone.
    fn check_monotone(&self) -> Result<(), ModelError> {
        let increasing: HashSet<&str> =
            self.monotone.increasing.iter().map(String::as_str).collect();

        for name in &self.monotone.decreasing {
            if increasing.contains(name.as_str()) {
                return Err(ModelError::MonotoneViolation {
                    feature: name.clone(),
                    reason: "declared both increasing and decreasing".to_string(),
                });
            }
        }

        let decreasing: HashSet<&str> =
            self.monotone.decreasing.iter().map(String::as_str).collect();
        let in_schema = |name: &str| self.feature_schema.iter().any(|f| f == name);

        for name in REQUIRED_INCREASING {
            if in_schema(name) && !increasing.contains(name) {
                return Err(ModelError::MonotoneViolation {
                    feature: name.to_string(),
                    reason: "must be declared in monotone.increasing".to_string(),
                });
            }
        }
        for name in REQUIRED_DECREASING {
            if in_schema(name) && !decreasing.contains(name) {
                return Err(ModelError::MonotoneViolation {
                    feature: name.to_string(),
                    reason: "must be declared in monotone.decreasing".to_string(),
                });
            }
        }

        let weight = |name: &str| self.classifier.coefficients.get(name).copied().unwrap_or(0.0);

        for name in &self.monotone.increasing {
            if weight(name) < 0.0 {
                return Err(ModelError::MonotoneViolation {
                    feature: name.clone(),
                    reason: format!("coefficient {} is negative", weight(name)),
                });
            }
        }
        for name in &self.monotone.decreasing {
            if weight(name) > 0.0 {
                return Err(ModelError::MonotoneViolation {
                    feature: name.clone(),
                    reason: format!("coefficient {} is positive", weight(name)),
                });
            }
        }
        Ok(())
    }
}
