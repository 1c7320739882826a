//! Feature composition
//!
//! Merges a company's signal aggregates with its static attributes into one
//! `FeatureVector`. Composition is total: a missing profile or missing
//! attributes are imputed from the configured policy, never rejected.
//!
//! Feature names are part of the model contract:
//! - `count_{w}m.{category}` for every window, then every category
//! - `recency_days.{category}`
//! - `diversity_*`, `intensity_*`, `momentum_*` for both polarities
//! - `{group}.{attribute}` for every attribute field

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

use crate::{
    AttributeField, CompanyId, CompanyProfile, EngineConfig, Polarity, Recency, SignalAggregate,
};

pub const DIVERSITY_POSITIVE: &str = "diversity_positive";
pub const DIVERSITY_NEGATIVE: &str = "diversity_negative";
pub const INTENSITY_POSITIVE: &str = "intensity_positive";
pub const INTENSITY_NEGATIVE: &str = "intensity_negative";
pub const MOMENTUM_POSITIVE: &str = "momentum_positive";
pub const MOMENTUM_NEGATIVE: &str = "momentum_negative";

/// Composite features in schema order
pub const COMPOSITE_FEATURES: [&str; 6] = [
    DIVERSITY_POSITIVE,
    DIVERSITY_NEGATIVE,
    INTENSITY_POSITIVE,
    INTENSITY_NEGATIVE,
    MOMENTUM_POSITIVE,
    MOMENTUM_NEGATIVE,
];

pub fn count_feature_name(window_months: u32, category: &str) -> String {
    format!("count_{}m.{}", window_months, category)
}

pub fn recency_feature_name(category: &str) -> String {
    format!("recency_days.{}", category)
}

/// Ordered list of feature names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSchema {
    names: Vec<String>,
}

/// Difference between an expected schema and the names actually supplied
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDiff {
    /// Expected but not supplied
    pub missing: Vec<String>,
    /// Supplied but not expected
    pub unexpected: Vec<String>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty()
    }
}

impl FeatureSchema {
    /// The schema produced by `FeatureComposer` under `config`
    pub fn derive(config: &EngineConfig) -> Self {
        let categories = config.taxonomy.categories();
        let mut names = Vec::with_capacity(
            categories.len() * (config.windows_months.len() + 1)
                + COMPOSITE_FEATURES.len()
                + AttributeField::ALL.len(),
        );

        for &window in &config.windows_months {
            for category in categories {
                names.push(count_feature_name(window, &category.id));
            }
        }
        for category in categories {
            names.push(recency_feature_name(&category.id));
        }
        names.extend(COMPOSITE_FEATURES.iter().map(|s| s.to_string()));
        names.extend(AttributeField::ALL.iter().map(|f| f.feature_name()));

        Self { names }
    }

    pub fn from_names(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Names that appear more than once
    pub fn duplicates(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut duplicates: Vec<String> = self
            .names
            .iter()
            .filter(|n| !seen.insert(n.as_str()))
            .cloned()
            .collect();
        duplicates.sort();
        duplicates.dedup();
        duplicates
    }

    /// Compare against supplied names (order ignored)
    pub fn diff<S: AsRef<str>>(&self, supplied: &[S]) -> SchemaDiff {
        let expected: HashSet<&str> = self.names.iter().map(String::as_str).collect();
        let supplied: HashSet<&str> = supplied.iter().map(|s| s.as_ref()).collect();

        let mut missing: Vec<String> = expected
            .difference(&supplied)
            .map(|s| s.to_string())
            .collect();
        let mut unexpected: Vec<String> = supplied
            .difference(&expected)
            .map(|s| s.to_string())
            .collect();
        missing.sort();
        unexpected.sort();

        SchemaDiff {
            missing,
            unexpected,
        }
    }
}

/// Feature names with values, in schema order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub names: Vec<String>,
    pub values: Vec<f64>,
}

impl FeatureRow {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| self.values[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.names.iter().map(String::as_str).zip(self.values.iter().copied())
    }
}

/// Per-category signal features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryFeatures {
    pub category: String,
    /// Aligned with `FeatureVector::windows_months`
    pub counts: Vec<u32>,
    pub recency: Recency,
}

/// One attribute after imputation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttributeValue {
    pub field: AttributeField,
    pub value: f64,
    pub imputed: bool,
}

/// Everything the model sees about one company at one reference date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub company_id: CompanyId,
    pub reference_date: NaiveDate,
    pub taxonomy_version: String,
    pub config_version: String,
    pub imputation_version: String,
    pub windows_months: Vec<u32>,
    pub recency_cap_days: u32,
    /// Sorted by category id
    pub categories: Vec<CategoryFeatures>,
    pub positive_recency: Recency,
    pub diversity_positive: u32,
    pub diversity_negative: u32,
    pub intensity_positive: f64,
    pub intensity_negative: f64,
    pub momentum_positive: f64,
    pub momentum_negative: f64,
    /// In `AttributeField::ALL` order
    pub attributes: Vec<AttributeValue>,
}

impl FeatureVector {
    pub fn imputed_fields(&self) -> Vec<AttributeField> {
        self.attributes
            .iter()
            .filter(|a| a.imputed)
            .map(|a| a.field)
            .collect()
    }

    pub fn attribute(&self, field: AttributeField) -> Option<f64> {
        self.attributes
            .iter()
            .find(|a| a.field == field)
            .map(|a| a.value)
    }

    /// Flatten into named values, in the order `FeatureSchema::derive` gives
    pub fn to_row(&self) -> FeatureRow {
        let mut names = Vec::new();
        let mut values = Vec::new();

        for (pos, &window) in self.windows_months.iter().enumerate() {
            for category in &self.categories {
                names.push(count_feature_name(window, &category.category));
                values.push(f64::from(category.counts[pos]));
            }
        }
        for category in &self.categories {
            names.push(recency_feature_name(&category.category));
            values.push(category.recency.as_feature(self.recency_cap_days));
        }

        let composites = [
            f64::from(self.diversity_positive),
            f64::from(self.diversity_negative),
            self.intensity_positive,
            self.intensity_negative,
            self.momentum_positive,
            self.momentum_negative,
        ];
        for (name, value) in COMPOSITE_FEATURES.iter().zip(composites) {
            names.push(name.to_string());
            values.push(value);
        }

        for attribute in &self.attributes {
            names.push(attribute.field.feature_name());
            values.push(attribute.value);
        }

        FeatureRow { names, values }
    }

    /// Content hash over identity, versions and every value's bit pattern
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.company_id.as_bytes());
        hasher.update(self.reference_date.to_string().as_bytes());
        hasher.update(self.taxonomy_version.as_bytes());
        hasher.update(self.config_version.as_bytes());
        hasher.update(self.imputation_version.as_bytes());
        for (name, value) in self.to_row().iter() {
            hasher.update(name.as_bytes());
            hasher.update(value.to_bits().to_le_bytes());
        }
        format!("{:x}", hasher.finalize())[..16].to_string()
    }
}

/// Builds `FeatureVector`s under one configuration
pub struct FeatureComposer<'a> {
    config: &'a EngineConfig,
}

impl<'a> FeatureComposer<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    pub fn schema(&self) -> FeatureSchema {
        FeatureSchema::derive(self.config)
    }

    /// Compose the vector for one company; `profile = None` imputes every attribute
    pub fn compose(
        &self,
        company_id: &str,
        aggregate: &SignalAggregate,
        profile: Option<&CompanyProfile>,
    ) -> FeatureVector {
        let config = self.config;
        let activity_months = config.activity_window_months;

        let (diversity_positive, diversity_negative, total_positive, total_negative) =
            match aggregate.window_position(activity_months) {
                Some(pos) => (
                    aggregate.diversity_at(Polarity::Positive, pos),
                    aggregate.diversity_at(Polarity::Negative, pos),
                    aggregate.total_at(Polarity::Positive, pos),
                    aggregate.total_at(Polarity::Negative, pos),
                ),
                None => (0, 0, 0, 0),
            };

        let categories = aggregate
            .categories
            .iter()
            .map(|c| CategoryFeatures {
                category: c.category.clone(),
                counts: c.window_counts.clone(),
                recency: c.recency,
            })
            .collect();

        let attributes = AttributeField::ALL
            .iter()
            .map(|&field| match profile.and_then(|p| p.attribute(field)) {
                Some(value) => AttributeValue {
                    field,
                    value,
                    imputed: false,
                },
                None => AttributeValue {
                    field,
                    value: config.imputation.default_for(field),
                    imputed: true,
                },
            })
            .collect();

        FeatureVector {
            company_id: company_id.to_string(),
            reference_date: aggregate.reference_date,
            taxonomy_version: config.taxonomy.version().to_string(),
            config_version: config.version.clone(),
            imputation_version: config.imputation.version().to_string(),
            windows_months: aggregate.windows_months.clone(),
            recency_cap_days: config.recency_cap_days,
            categories,
            positive_recency: aggregate.positive_recency(),
            diversity_positive,
            diversity_negative,
            intensity_positive: f64::from(total_positive) / f64::from(activity_months),
            intensity_negative: f64::from(total_negative) / f64::from(activity_months),
            momentum_positive: aggregate.momentum(Polarity::Positive),
            momentum_negative: aggregate.momentum(Polarity::Negative),
            attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ActivityEvent, TemporalAggregator};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn events(config: &EngineConfig, tags: &[(&str, NaiveDate)]) -> Vec<ActivityEvent> {
        tags.iter()
            .map(|(raw, event_date)| {
                config.taxonomy.normalize(&ActivityEvent {
                    company_id: "c1".to_string(),
                    raw_category: raw.to_string(),
                    canonical_category: None,
                    event_date: *event_date,
                    source: "article".to_string(),
                })
            })
            .collect()
    }

    #[test]
    fn test_schema_layout() {
        let config = EngineConfig::embedded().unwrap();
        let schema = FeatureSchema::derive(&config);
        let categories = config.taxonomy.categories().len();

        assert_eq!(
            schema.len(),
            categories * 3 + categories + COMPOSITE_FEATURES.len() + AttributeField::ALL.len()
        );
        assert_eq!(schema.names()[0], "count_3m.conflit_social");
        assert!(schema.position("recency_days.recrutement").is_some());
        assert!(schema.position("financial.ca_consolide").is_some());
        assert!(schema.duplicates().is_empty());
    }

    #[test]
    fn test_row_matches_schema() {
        let config = EngineConfig::embedded().unwrap();
        let aggregate = TemporalAggregator::new(&config).aggregate(&[], date(2025, 11, 24));
        let vector = FeatureComposer::new(&config).compose("c1", &aggregate, None);

        let row = vector.to_row();
        assert_eq!(row.names, FeatureSchema::derive(&config).names());
    }

    #[test]
    fn test_missing_profile_is_all_default() {
        let config = EngineConfig::embedded().unwrap();
        let aggregate = TemporalAggregator::new(&config).aggregate(&[], date(2025, 11, 24));
        let composer = FeatureComposer::new(&config);

        let without = composer.compose("c1", &aggregate, None);
        let empty = composer.compose("c1", &aggregate, Some(&CompanyProfile::empty("c1")));

        assert_eq!(without, empty);
        assert_eq!(without.imputed_fields().len(), AttributeField::ALL.len());
        assert_eq!(without.diversity_positive, 0);
        assert_eq!(without.intensity_negative, 0.0);
        assert_eq!(
            without.attribute(AttributeField::Effectif),
            Some(config.imputation.default_for(AttributeField::Effectif))
        );
    }

    #[test]
    fn test_present_attributes_not_imputed() {
        let config = EngineConfig::embedded().unwrap();
        let aggregate = TemporalAggregator::new(&config).aggregate(&[], date(2025, 11, 24));
        let mut profile = CompanyProfile::empty("c1");
        profile.workforce.effectif = Some(42.0);
        profile.contact.has_website = Some(true);

        let vector = FeatureComposer::new(&config).compose("c1", &aggregate, Some(&profile));
        let imputed = vector.imputed_fields();

        assert_eq!(vector.attribute(AttributeField::Effectif), Some(42.0));
        assert_eq!(vector.to_row().get("contact.has_website"), Some(1.0));
        assert!(!imputed.contains(&AttributeField::Effectif));
        assert_eq!(imputed.len(), AttributeField::ALL.len() - 2);
    }

    #[test]
    fn test_diversity_and_intensity() {
        let config = EngineConfig::embedded().unwrap();
        let reference = date(2025, 11, 24);
        let events = events(
            &config,
            &[
                ("Investissements", date(2025, 10, 24)),
                ("Recrutement", date(2025, 9, 24)),
                ("Licenciement", date(2025, 1, 24)),
            ],
        );
        let aggregate = TemporalAggregator::new(&config).aggregate(&events, reference);
        let vector = FeatureComposer::new(&config).compose("c1", &aggregate, None);

        assert_eq!(vector.diversity_positive, 2);
        assert_eq!(vector.diversity_negative, 1);
        assert!((vector.intensity_positive - 2.0 / 12.0).abs() < 1e-12);
        assert!((vector.intensity_negative - 1.0 / 12.0).abs() < 1e-12);

        let row = vector.to_row();
        assert_eq!(row.get("count_3m.investissement"), Some(1.0));
        assert_eq!(row.get("count_3m.licenciement"), Some(0.0));
        assert_eq!(row.get("count_12m.licenciement"), Some(1.0));
        assert_eq!(
            row.get("recency_days.fermeture"),
            Some(f64::from(config.recency_cap_days) + 1.0)
        );
    }

    #[test]
    fn test_fingerprint_reproducible() {
        let config = EngineConfig::embedded().unwrap();
        let reference = date(2025, 11, 24);
        let events = events(&config, &[("Recrutement", date(2025, 9, 24))]);
        let aggregator = TemporalAggregator::new(&config);
        let composer = FeatureComposer::new(&config);

        let a = composer.compose("c1", &aggregator.aggregate(&events, reference), None);
        let b = composer.compose("c1", &aggregator.aggregate(&events, reference), None);
        let later = composer.compose("c1", &aggregator.aggregate(&events, date(2025, 11, 25)), None);

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), later.fingerprint());
    }

    #[test]
    fn test_schema_diff() {
        let schema = FeatureSchema::from_names(vec!["a".to_string(), "b".to_string()]);
        let diff = schema.diff(&["b", "c"]);
        assert_eq!(diff.missing, vec!["a".to_string()]);
        assert_eq!(diff.unexpected, vec!["c".to_string()]);
        assert!(schema.diff(&["b", "a"]).is_empty());
    }
}
