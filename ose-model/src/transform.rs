//! Staged feature transforms
//!
//! Each stage names the columns it touches. Before scoring, the stages are
//! compiled against the model's feature schema into index-based steps, so an
//! unknown column fails at load time instead of silently doing nothing.

use ose_core::FeatureSchema;
use serde::{Deserialize, Serialize};

use crate::ModelError;

/// A transform stage as declared in a model artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformStage {
    /// sign(x) * ln(1 + |x|)
    SignedLog1p { columns: Vec<String> },
    /// Clamp into [min, max]
    Clip {
        columns: Vec<String>,
        min: f64,
        max: f64,
    },
    /// (x - mean) / std, one mean and std per column
    StandardScale {
        columns: Vec<String>,
        mean: Vec<f64>,
        std: Vec<f64>,
    },
}

impl TransformStage {
    pub fn kind(&self) -> &'static str {
        match self {
            TransformStage::SignedLog1p { .. } => "signed_log1p",
            TransformStage::Clip { .. } => "clip",
            TransformStage::StandardScale { .. } => "standard_scale",
        }
    }

    pub fn columns(&self) -> &[String] {
        match self {
            TransformStage::SignedLog1p { columns }
            | TransformStage::Clip { columns, .. }
            | TransformStage::StandardScale { columns, .. } => columns,
        }
    }

    /// Check parameters; every supported stage is non-decreasing once valid
    pub fn validate(&self) -> Result<(), ModelError> {
        match self {
            TransformStage::SignedLog1p { .. } => Ok(()),
            TransformStage::Clip { min, max, .. } => {
                if !(min.is_finite() && max.is_finite() && min <= max) {
                    return Err(ModelError::InvalidArtifact(format!(
                        "clip bounds [{}, {}] are invalid",
                        min, max
                    )));
                }
                Ok(())
            }
            TransformStage::StandardScale { columns, mean, std } => {
                if mean.len() != columns.len() || std.len() != columns.len() {
                    return Err(ModelError::InvalidArtifact(format!(
                        "standard_scale has {} columns, {} means and {} stds",
                        columns.len(),
                        mean.len(),
                        std.len()
                    )));
                }
                for (column, (m, s)) in columns.iter().zip(mean.iter().zip(std)) {
                    if !m.is_finite() {
                        return Err(ModelError::InvalidArtifact(format!(
                            "standard_scale mean for {} is not finite",
                            column
                        )));
                    }
                    // A non-positive scale would flip or flatten the feature
                    if !(s.is_finite() && *s > 0.0) {
                        return Err(ModelError::MonotoneViolation {
                            feature: column.clone(),
                            reason: format!("standard_scale std {} is not positive", s),
                        });
                    }
                }
                Ok(())
            }
        }
    }
}

pub fn signed_log1p(x: f64) -> f64 {
    x.signum() * x.abs().ln_1p()
}

#[derive(Debug, Clone, PartialEq)]
enum Step {
    SignedLog1p { index: usize },
    Clip { index: usize, min: f64, max: f64 },
    Scale { index: usize, mean: f64, std: f64 },
}

/// Stages resolved to schema positions
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledPipeline {
    steps: Vec<Step>,
}

impl CompiledPipeline {
    pub fn compile(stages: &[TransformStage], schema: &FeatureSchema) -> Result<Self, ModelError> {
        let mut steps = Vec::new();

        for stage in stages {
            stage.validate()?;

            let indices = stage
                .columns()
                .iter()
                .map(|column| {
                    schema.position(column).ok_or_else(|| {
                        ModelError::InvalidArtifact(format!(
                            "{} stage names unknown column {}",
                            stage.kind(),
                            column
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            match stage {
                TransformStage::SignedLog1p { .. } => {
                    steps.extend(indices.into_iter().map(|index| Step::SignedLog1p { index }));
                }
                TransformStage::Clip { min, max, .. } => {
                    steps.extend(indices.into_iter().map(|index| Step::Clip {
                        index,
                        min: *min,
                        max: *max,
                    }));
                }
                TransformStage::StandardScale { mean, std, .. } => {
                    steps.extend(indices.into_iter().zip(mean.iter().zip(std)).map(
                        |(index, (&mean, &std))| Step::Scale { index, mean, std },
                    ));
                }
            }
        }

        Ok(Self { steps })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Apply in declaration order, in place
    pub fn apply(&self, values: &mut [f64]) {
        for step in &self.steps {
            match *step {
                Step::SignedLog1p { index } => values[index] = signed_log1p(values[index]),
                Step::Clip { index, min, max } => values[index] = values[index].clamp(min, max),
                Step::Scale { index, mean, std } => values[index] = (values[index] - mean) / std,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> FeatureSchema {
        FeatureSchema::from_names(vec!["a".to_string(), "b".to_string(), "c".to_string()])
    }

    #[test]
    fn test_signed_log1p() {
        assert_eq!(signed_log1p(0.0), 0.0);
        assert!((signed_log1p(std::f64::consts::E - 1.0) - 1.0).abs() < 1e-12);
        assert!((signed_log1p(-(std::f64::consts::E - 1.0)) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pipeline_applies_in_order() {
        let stages = vec![
            TransformStage::Clip {
                columns: vec!["a".to_string()],
                min: 0.0,
                max: 10.0,
            },
            TransformStage::SignedLog1p {
                columns: vec!["a".to_string(), "b".to_string()],
            },
            TransformStage::StandardScale {
                columns: vec!["c".to_string()],
                mean: vec![5.0],
                std: vec![2.0],
            },
        ];
        let pipeline = CompiledPipeline::compile(&stages, &schema()).unwrap();
        assert_eq!(pipeline.len(), 4);

        let mut values = vec![100.0, -3.0, 9.0];
        pipeline.apply(&mut values);
        assert!((values[0] - 11.0_f64.ln()).abs() < 1e-12);
        assert!((values[1] + 4.0_f64.ln()).abs() < 1e-12);
        assert_eq!(values[2], 2.0);
    }

    #[test]
    fn test_unknown_column_rejected() {
        let stages = vec![TransformStage::SignedLog1p {
            columns: vec!["z".to_string()],
        }];
        assert!(matches!(
            CompiledPipeline::compile(&stages, &schema()),
            Err(ModelError::InvalidArtifact(_))
        ));
    }

    #[test]
    fn test_non_positive_std_rejected() {
        let stage = TransformStage::StandardScale {
            columns: vec!["a".to_string()],
            mean: vec![0.0],
            std: vec![-1.0],
        };
        assert!(matches!(
            stage.validate(),
            Err(ModelError::MonotoneViolation { .. })
        ));
    }

    #[test]
    fn test_stage_json_shape() {
        let json = r#"{"kind":"clip","columns":["a"],"min":0.0,"max":1.0}"#;
        let stage: TransformStage = serde_json::from_str(json).unwrap();
        assert_eq!(stage.kind(), "clip");
        assert_eq!(stage.columns().to_vec(), vec!["a".to_string()]);
    }
}
