//! Scorer: feature vectors in, score records and explanations out

use ose_core::{
    score_from_probability, EngineConfig, Explanation, FeatureSchema, FeatureVector, ScoreRecord,
};
use tracing::info;

use crate::{AlignedRow, ModelError, SharedModel};

/// Binds a model backend to an engine configuration
#[derive(Clone)]
pub struct Scorer {
    model: SharedModel,
}

impl Scorer {
    /// Fails when the model cannot consume vectors composed under `config`
    pub fn new(model: SharedModel, config: &EngineConfig) -> Result<Self, ModelError> {
        check_compatibility(&model, config)?;
        info!(
            model = model.model_version(),
            taxonomy = model.taxonomy_version(),
            features = model.feature_schema().len(),
            "Model bound to configuration {}",
            config.version
        );
        Ok(Self { model })
    }

    pub fn model(&self) -> &SharedModel {
        &self.model
    }

    pub fn model_version(&self) -> &str {
        self.model.model_version()
    }

    fn align(&self, vector: &FeatureVector) -> Result<AlignedRow, ModelError> {
        if vector.taxonomy_version != self.model.taxonomy_version() {
            return Err(ModelError::TaxonomyMismatch {
                expected: self.model.taxonomy_version().to_string(),
                found: vector.taxonomy_version.clone(),
            });
        }
        AlignedRow::align(self.model.feature_schema(), &vector.to_row())
    }

    fn record(&self, vector: &FeatureVector, row: &AlignedRow) -> Result<ScoreRecord, ModelError> {
        let probability = self.model.predict_proba(row)?;
        let score = score_from_probability(probability)
            .ok_or(ModelError::InvalidProbability(probability))?;

        Ok(ScoreRecord {
            company_id: vector.company_id.clone(),
            reference_date: vector.reference_date,
            score,
            model_version: self.model.model_version().to_string(),
        })
    }

    pub fn score(&self, vector: &FeatureVector) -> Result<ScoreRecord, ModelError> {
        let row = self.align(vector)?;
        self.record(vector, &row)
    }

    /// Read-only: never changes the score
    pub fn explain(&self, vector: &FeatureVector) -> Result<Explanation, ModelError> {
        let row = self.align(vector)?;
        let attribution = self.model.explain(&row)?;
        Ok(Explanation {
            company_id: vector.company_id.clone(),
            baseline_value: attribution.baseline_value,
            contributions: attribution.contributions,
        })
    }

    /// Score and explain from one alignment
    pub fn score_and_explain(
        &self,
        vector: &FeatureVector,
    ) -> Result<(ScoreRecord, Explanation), ModelError> {
        let row = self.align(vector)?;
        let record = self.record(vector, &row)?;
        let attribution = self.model.explain(&row)?;
        Ok((
            record,
            Explanation {
                company_id: vector.company_id.clone(),
                baseline_value: attribution.baseline_value,
                contributions: attribution.contributions,
            },
        ))
    }
}

/// Structural checks run once per batch, before any company is scored
pub fn check_compatibility(model: &SharedModel, config: &EngineConfig) -> Result<(), ModelError> {
    if model.taxonomy_version() != config.taxonomy.version() {
        return Err(ModelError::TaxonomyMismatch {
            expected: model.taxonomy_version().to_string(),
            found: config.taxonomy.version().to_string(),
        });
    }

    let produced = FeatureSchema::derive(config);
    let diff = model.feature_schema().diff(produced.names());
    if !diff.is_empty() {
        return Err(ModelError::SchemaMismatch {
            missing: diff.missing,
            unexpected: diff.unexpected,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_backend, embedded_backend, ModelArtifact};
    use chrono::NaiveDate;
    use ose_core::{ActivityEvent, CompanyProfile, FeatureComposer, TemporalAggregator};
    use proptest::prelude::*;

    fn reference() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 24).unwrap()
    }

    fn compose(config: &EngineConfig, tags: &[(&str, i64)]) -> FeatureVector {
        let events: Vec<ActivityEvent> = tags
            .iter()
            .map(|(raw, days_ago)| {
                config.taxonomy.normalize(&ActivityEvent {
                    company_id: "c1".to_string(),
                    raw_category: raw.to_string(),
                    canonical_category: None,
                    event_date: reference() - chrono::Duration::days(*days_ago),
                    source: "article".to_string(),
                })
            })
            .collect();
        let aggregate = TemporalAggregator::new(config).aggregate(&events, reference());
        FeatureComposer::new(config).compose("c1", &aggregate, None)
    }

    #[test]
    fn test_embedded_model_scores_default_vector() {
        let config = EngineConfig::embedded().unwrap();
        let scorer = Scorer::new(embedded_backend().unwrap(), &config).unwrap();
        let vector = compose(&config, &[]);

        let (record, explanation) = scorer.score_and_explain(&vector).unwrap();
        assert!(record.score <= 100);
        assert_eq!(record.model_version, "opportunity-logit-v1");
        assert_eq!(scorer.score(&vector).unwrap(), record);
        assert_eq!(scorer.explain(&vector).unwrap(), explanation);
        // An empty, all-default company sits at the baseline
        assert!(explanation.contributions.iter().all(|c| c.value.abs() < 1e-6));
    }

    #[test]
    fn test_signals_raise_score() {
        let config = EngineConfig::embedded().unwrap();
        let scorer = Scorer::new(embedded_backend().unwrap(), &config).unwrap();

        let empty = scorer.score(&compose(&config, &[])).unwrap();
        let active = scorer
            .score(&compose(
                &config,
                &[("Investissements", 30), ("Recrutement", 60), ("Licenciement", 300)],
            ))
            .unwrap();
        assert!(active.score > empty.score);

        let explanation = scorer
            .explain(&compose(&config, &[("Investissements", 30)]))
            .unwrap();
        let magnitudes: Vec<f64> = explanation
            .contributions
            .iter()
            .map(|c| c.value.abs())
            .collect();
        assert!(magnitudes.windows(2).all(|p| p[0] >= p[1]));
    }

    #[test]
    fn test_taxonomy_mismatch_is_fatal() {
        let config = EngineConfig::embedded().unwrap();
        let mut artifact = ModelArtifact::embedded().unwrap();
        artifact.taxonomy_version = "fr-news-v0".to_string();

        let err = Scorer::new(create_backend(&artifact).unwrap(), &config)
            .err()
            .unwrap();
        assert!(matches!(err, ModelError::TaxonomyMismatch { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_schema_mismatch_is_fatal() {
        let mut file: ose_core::EngineConfigFile =
            toml::from_str(ose_core::DEFAULT_CONFIG_TOML).unwrap();
        file.windows_months = vec![1, 3, 6, 12];
        let config = EngineConfig::from_file(file).unwrap();

        let err = Scorer::new(embedded_backend().unwrap(), &config)
            .err()
            .unwrap();
        match err {
            ModelError::SchemaMismatch { unexpected, .. } => {
                assert!(unexpected.contains(&"count_1m.recrutement".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_vector_from_other_taxonomy_rejected() {
        let config = EngineConfig::embedded().unwrap();
        let scorer = Scorer::new(embedded_backend().unwrap(), &config).unwrap();

        let mut vector = compose(&config, &[]);
        vector.taxonomy_version = "fr-news-v0".to_string();
        assert!(matches!(
            scorer.score(&vector),
            Err(ModelError::TaxonomyMismatch { .. })
        ));
    }

    /// Embedded model whose probabilities overshoot 1
    struct Overconfident {
        inner: SharedModel,
    }

    impl crate::ScoringModel for Overconfident {
        fn model_version(&self) -> &str {
            self.inner.model_version()
        }

        fn taxonomy_version(&self) -> &str {
            self.inner.taxonomy_version()
        }

        fn feature_schema(&self) -> &FeatureSchema {
            self.inner.feature_schema()
        }

        fn predict_proba(&self, row: &AlignedRow) -> Result<f64, ModelError> {
            Ok(self.inner.predict_proba(row)? + 1.0)
        }
    }

    impl crate::Explain for Overconfident {
        fn explain(&self, row: &AlignedRow) -> Result<crate::Attribution, ModelError> {
            self.inner.explain(row)
        }
    }

    #[test]
    fn test_out_of_range_probability_fails_company() {
        let config = EngineConfig::embedded().unwrap();
        let model: SharedModel = std::sync::Arc::new(Overconfident {
            inner: embedded_backend().unwrap(),
        });
        let scorer = Scorer::new(model, &config).unwrap();

        let err = scorer.score(&compose(&config, &[])).unwrap_err();
        assert!(matches!(err, ModelError::InvalidProbability(p) if p > 1.0));
        assert!(!err.is_fatal());
    }

    fn profile_strategy() -> impl Strategy<Value = CompanyProfile> {
        (
            proptest::option::of(0.0..5.0e7f64),
            proptest::option::of(0.0..5000.0f64),
            proptest::option::of(any::<bool>()),
            proptest::option::of(0u32..50),
        )
            .prop_map(|(ca, effectif, startup, contacts)| {
                let mut profile = CompanyProfile::empty("c1");
                profile.financial.ca_consolide = ca;
                profile.workforce.effectif = effectif;
                profile.classification.startup = startup;
                profile.contact.nb_contacts = contacts;
                profile
            })
    }

    proptest! {
        #[test]
        fn prop_score_in_range(
            profile in profile_strategy(),
            counts in proptest::collection::vec(0u32..30, 6),
        ) {
            let config = EngineConfig::embedded().unwrap();
            let scorer = Scorer::new(embedded_backend().unwrap(), &config).unwrap();
            let aggregate = TemporalAggregator::new(&config).aggregate(&[], reference());
            let mut vector = FeatureComposer::new(&config).compose("c1", &aggregate, Some(&profile));
            vector.diversity_positive = counts[0] % 7;
            vector.diversity_negative = counts[1] % 5;
            vector.intensity_positive = f64::from(counts[2]) / 12.0;
            vector.intensity_negative = f64::from(counts[3]) / 12.0;
            vector.momentum_positive = f64::from(counts[4]);
            vector.momentum_negative = f64::from(counts[5]);

            let record = scorer.score(&vector).unwrap();
            prop_assert!(record.score <= 100);
        }

        #[test]
        fn prop_monotone_in_diversity_and_intensity(
            profile in profile_strategy(),
            base_div in 0u32..6,
            base_int in 0u32..40,
            bump_div in 0u32..3,
            bump_int in 0u32..20,
        ) {
            let config = EngineConfig::embedded().unwrap();
            let scorer = Scorer::new(embedded_backend().unwrap(), &config).unwrap();
            let aggregate = TemporalAggregator::new(&config).aggregate(&[], reference());
            let base = FeatureComposer::new(&config).compose("c1", &aggregate, Some(&profile));

            let with = |div_pos: u32, int_pos: u32, div_neg: u32, int_neg: u32| {
                let mut v = base.clone();
                v.diversity_positive = div_pos;
                v.intensity_positive = f64::from(int_pos) / 12.0;
                v.diversity_negative = div_neg;
                v.intensity_negative = f64::from(int_neg) / 12.0;
                scorer.score(&v).unwrap().score
            };

            let low = with(base_div, base_int, 1, 1);
            let more_positive = with(base_div + bump_div, base_int + bump_int, 1, 1);
            prop_assert!(more_positive >= low);

            let more_negative = with(base_div, base_int, 1 + bump_div, 1 + bump_int);
            prop_assert!(more_negative <= low);
        }
    }
}
