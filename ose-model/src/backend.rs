//! Scoring backend abstraction
//!
//! A backend turns a schema-aligned feature row into a calibrated
//! probability. Explanation is a separate capability trait so a backend
//! advertises it explicitly; the logistic backend implements both.

use ose_core::{Contribution, FeatureRow, FeatureSchema};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::{Calibration, CompiledPipeline, ModelArtifact};

/// Model errors
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid model JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid model TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("unsupported model file {0} (expected .json or .toml)")]
    UnsupportedFormat(PathBuf),

    #[error("invalid model artifact: {0}")]
    InvalidArtifact(String),

    #[error("monotone constraint violated for {feature}: {reason}")]
    MonotoneViolation { feature: String, reason: String },

    #[error("feature schema mismatch: missing {missing:?}, unexpected {unexpected:?}")]
    SchemaMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("taxonomy mismatch: model expects {expected}, features use {found}")]
    TaxonomyMismatch { expected: String, found: String },

    #[error("feature {feature} is not finite")]
    NonFiniteInput { feature: String },

    #[error("model produced a probability outside [0, 1] ({0})")]
    InvalidProbability(f64),
}

impl ModelError {
    /// Errors that invalidate the whole batch rather than one company
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ModelError::NonFiniteInput { .. } | ModelError::InvalidProbability(_)
        )
    }
}

/// Feature values in a model's schema order
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedRow {
    values: Vec<f64>,
}

impl AlignedRow {
    /// Reorder `row` into `schema` order; names must match exactly
    pub fn align(schema: &FeatureSchema, row: &FeatureRow) -> Result<Self, ModelError> {
        let values = if row.names.as_slice() == schema.names() {
            row.values.clone()
        } else {
            let diff = schema.diff(&row.names);
            if !diff.is_empty() || row.names.len() != schema.len() {
                return Err(ModelError::SchemaMismatch {
                    missing: diff.missing,
                    unexpected: diff.unexpected,
                });
            }
            let lookup: HashMap<&str, f64> = row.iter().collect();
            schema
                .names()
                .iter()
                .map(|name| lookup.get(name.as_str()).copied().unwrap_or(f64::NAN))
                .collect()
        };

        if let Some(idx) = values.iter().position(|v| !v.is_finite()) {
            return Err(ModelError::NonFiniteInput {
                feature: schema.names()[idx].clone(),
            });
        }

        Ok(Self { values })
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Signed per-feature contributions to one prediction
#[derive(Debug, Clone, PartialEq)]
pub struct Attribution {
    pub baseline_value: f64,
    /// Sorted by absolute value descending, then feature name
    pub contributions: Vec<Contribution>,
}

/// Probability model over aligned feature rows
pub trait ScoringModel: Send + Sync {
    fn model_version(&self) -> &str;

    fn taxonomy_version(&self) -> &str;

    fn feature_schema(&self) -> &FeatureSchema;

    /// Calibrated probability in [0, 1]
    fn predict_proba(&self, row: &AlignedRow) -> Result<f64, ModelError>;
}

/// Per-feature attribution capability
pub trait Explain {
    fn explain(&self, row: &AlignedRow) -> Result<Attribution, ModelError>;
}

/// A scoring model that can also explain itself
pub trait ModelBackend: ScoringModel + Explain {}

impl<T: ScoringModel + Explain> ModelBackend for T {}

/// Thread-safe reference to a model backend
pub type SharedModel = Arc<dyn ModelBackend>;

/// Logistic regression over transformed features
#[derive(Debug, Clone)]
pub struct LogisticModel {
    model_version: String,
    taxonomy_version: String,
    schema: FeatureSchema,
    pipeline: CompiledPipeline,
    intercept: f64,
    /// Aligned with `schema`
    weights: Vec<f64>,
    /// Aligned with `schema`, transformed space
    baseline: Vec<f64>,
    calibration: Calibration,
}

impl LogisticModel {
    pub fn from_artifact(artifact: &ModelArtifact) -> Result<Self, ModelError> {
        artifact.validate()?;

        let schema = artifact.schema();
        let pipeline = CompiledPipeline::compile(&artifact.transforms, &schema)?;
        let lookup = |map: &std::collections::BTreeMap<String, f64>| -> Vec<f64> {
            schema
                .names()
                .iter()
                .map(|name| map.get(name).copied().unwrap_or(0.0))
                .collect()
        };
        let weights = lookup(&artifact.classifier.coefficients);
        let baseline = lookup(&artifact.baseline);

        debug!(
            model = %artifact.model_version,
            features = schema.len(),
            steps = pipeline.len(),
            "Compiled logistic model"
        );

        Ok(Self {
            model_version: artifact.model_version.clone(),
            taxonomy_version: artifact.taxonomy_version.clone(),
            schema,
            pipeline,
            intercept: artifact.classifier.intercept,
            weights,
            baseline,
            calibration: artifact.calibration.clone(),
        })
    }

    fn transformed(&self, row: &AlignedRow) -> Vec<f64> {
        let mut values = row.values().to_vec();
        self.pipeline.apply(&mut values);
        values
    }

    fn log_odds(&self, transformed: &[f64]) -> f64 {
        self.intercept
            + self
                .weights
                .iter()
                .zip(transformed)
                .map(|(w, x)| w * x)
                .sum::<f64>()
    }
}

impl ScoringModel for LogisticModel {
    fn model_version(&self) -> &str {
        &self.model_version
    }

    fn taxonomy_version(&self) -> &str {
        &self.taxonomy_version
    }

    fn feature_schema(&self) -> &FeatureSchema {
        &self.schema
    }

    fn predict_proba(&self, row: &AlignedRow) -> Result<f64, ModelError> {
        let z = self.log_odds(&self.transformed(row));
        let probability = self.calibration.apply(z);
        if !(0.0..=1.0).contains(&probability) {
            return Err(ModelError::InvalidProbability(probability));
        }
        Ok(probability)
    }
}

impl Explain for LogisticModel {
    /// Contribution of feature i is w_i * (x_i - baseline_i), in log-odds
    fn explain(&self, row: &AlignedRow) -> Result<Attribution, ModelError> {
        let transformed = self.transformed(row);

        let mut contributions: Vec<Contribution> = self
            .schema
            .names()
            .iter()
            .zip(transformed.iter().zip(self.weights.iter().zip(&self.baseline)))
            .map(|(name, (x, (w, b)))| Contribution {
                feature: name.clone(),
                value: w * (x - b),
            })
            .collect();

        if let Some(bad) = contributions.iter().find(|c| !c.value.is_finite()) {
            return Err(ModelError::NonFiniteInput {
                feature: bad.feature.clone(),
            });
        }

        contributions.sort_by(|a, b| match b.value.abs().total_cmp(&a.value.abs()) {
            Ordering::Equal => a.feature.cmp(&b.feature),
            other => other,
        });

        Ok(Attribution {
            baseline_value: self.log_odds(&self.baseline),
            contributions,
        })
    }
}

/// Create a shared logistic backend from an artifact
pub fn create_backend(artifact: &ModelArtifact) -> Result<SharedModel, ModelError> {
    Ok(Arc::new(LogisticModel::from_artifact(artifact)?))
}

/// Create a shared backend from the embedded artifact
pub fn embedded_backend() -> Result<SharedModel, ModelError> {
    create_backend(&ModelArtifact::embedded()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LogisticClassifier, MonotoneConstraints};
    use std::collections::BTreeMap;

    fn artifact() -> ModelArtifact {
        ModelArtifact {
            model_version: "m1".to_string(),
            taxonomy_version: "t1".to_string(),
            description: None,
            feature_schema: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            monotone: MonotoneConstraints::default(),
            transforms: vec![],
            classifier: LogisticClassifier {
                intercept: -1.0,
                coefficients: BTreeMap::from([("a".to_string(), 2.0), ("b".to_string(), -0.5)]),
            },
            calibration: Calibration::Identity,
            baseline: BTreeMap::from([("a".to_string(), 0.5)]),
        }
    }

    fn row(names: &[&str], values: &[f64]) -> FeatureRow {
        FeatureRow {
            names: names.iter().map(|s| s.to_string()).collect(),
            values: values.to_vec(),
        }
    }

    #[test]
    fn test_align_reorders() {
        let model = LogisticModel::from_artifact(&artifact()).unwrap();
        let aligned =
            AlignedRow::align(model.feature_schema(), &row(&["c", "a", "b"], &[3.0, 1.0, 2.0]))
                .unwrap();
        assert_eq!(aligned.values(), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_align_schema_mismatch() {
        let model = LogisticModel::from_artifact(&artifact()).unwrap();
        let err =
            AlignedRow::align(model.feature_schema(), &row(&["a", "b", "d"], &[1.0, 2.0, 3.0]))
                .unwrap_err();
        match err {
            ModelError::SchemaMismatch {
                missing,
                unexpected,
            } => {
                assert_eq!(missing, vec!["c".to_string()]);
                assert_eq!(unexpected, vec!["d".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(AlignedRow::align(model.feature_schema(), &row(&["a", "b"], &[1.0, 2.0])).is_err());
    }

    #[test]
    fn test_align_rejects_non_finite() {
        let model = LogisticModel::from_artifact(&artifact()).unwrap();
        let err = AlignedRow::align(
            model.feature_schema(),
            &row(&["a", "b", "c"], &[1.0, f64::INFINITY, 0.0]),
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::NonFiniteInput { feature } if feature == "b"));
        assert!(!ModelError::InvalidProbability(f64::NAN).is_fatal());
    }

    #[test]
    fn test_predict_and_explain_agree() {
        let model = LogisticModel::from_artifact(&artifact()).unwrap();
        let aligned =
            AlignedRow::align(model.feature_schema(), &row(&["a", "b", "c"], &[1.5, 2.0, 9.0]))
                .unwrap();

        let p = model.predict_proba(&aligned).unwrap();
        let attribution = model.explain(&aligned).unwrap();

        // z = -1 + 2*1.5 - 0.5*2 = 1
        assert!((p - crate::sigmoid(1.0)).abs() < 1e-12);
        // baseline z = -1 + 2*0.5 = 0
        assert!(attribution.baseline_value.abs() < 1e-12);
        let total: f64 = attribution.contributions.iter().map(|c| c.value).sum();
        assert!((attribution.baseline_value + total - 1.0).abs() < 1e-12);

        let order: Vec<&str> = attribution
            .contributions
            .iter()
            .map(|c| c.feature.as_str())
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(attribution.contributions[0].value, 2.0);
        assert_eq!(attribution.contributions[1].value, -1.0);
    }

    #[test]
    fn test_equal_contributions_ordered_by_name() {
        let mut artifact = artifact();
        artifact.feature_schema = vec!["b".to_string(), "a".to_string()];
        artifact.classifier.coefficients =
            BTreeMap::from([("a".to_string(), 1.0), ("b".to_string(), -1.0)]);
        artifact.baseline = BTreeMap::new();
        let model = LogisticModel::from_artifact(&artifact).unwrap();

        let aligned =
            AlignedRow::align(model.feature_schema(), &row(&["b", "a"], &[1.0, 1.0])).unwrap();
        let attribution = model.explain(&aligned).unwrap();

        let order: Vec<(&str, f64)> = attribution
            .contributions
            .iter()
            .map(|c| (c.feature.as_str(), c.value))
            .collect();
        assert_eq!(order, vec![("a", 1.0), ("b", -1.0)]);
    }

    #[test]
    fn test_embedded_backend_loads() {
        let model = embedded_backend().unwrap();
        assert_eq!(model.model_version(), "opportunity-logit-v1");
        assert_eq!(model.taxonomy_version(), "fr-news-v1");
    }
}
