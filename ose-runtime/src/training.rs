//! Training set builder
//!
//! Produces labeled feature rows for a historical snapshot. Rows are written
//! as JSON lines in company id order, each carrying the feature values in
//! schema order followed by the label.

use chrono::NaiveDate;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::io::Write;
use thiserror::Error;
use tracing::{info, warn};

use ose_core::{
    BatchWarning, CompanyId, CompanyProfile, EngineConfig, FeatureComposer, FeatureSchema,
    LabelCounts, LabelDeriver, OpportunityLabel, RawActivityRecord, TemporalAggregator,
};

use crate::{prepare_batch, IngestStats};

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("failed to write training set: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode training row: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One labeled company
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub company_id: CompanyId,
    pub reference_date: NaiveDate,
    /// In `TrainingSet::schema` order
    pub features: Vec<f64>,
    pub counts: LabelCounts,
    pub label: OpportunityLabel,
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    pub reference_date: NaiveDate,
    pub schema: FeatureSchema,
    /// Sorted by company id
    pub examples: Vec<TrainingExample>,
    /// Companies with more than one profile, left out
    pub skipped: Vec<CompanyId>,
    pub warnings: Vec<BatchWarning>,
    pub stats: IngestStats,
}

impl TrainingSet {
    pub fn positives(&self) -> usize {
        self.examples.iter().filter(|e| e.label.is_good()).count()
    }

    /// Write one JSON object per example; returns the number of rows
    pub fn write_jsonl<W: Write>(&self, mut writer: W) -> Result<usize, TrainingError> {
        for example in &self.examples {
            let row = JsonlRow {
                schema: &self.schema,
                example,
            };
            serde_json::to_writer(&mut writer, &row)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(self.examples.len())
    }
}

/// Flat row: identity, features in schema order, then the label
struct JsonlRow<'a> {
    schema: &'a FeatureSchema,
    example: &'a TrainingExample,
}

impl Serialize for JsonlRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.schema.len() + 3))?;
        map.serialize_entry("company_id", &self.example.company_id)?;
        map.serialize_entry("reference_date", &self.example.reference_date)?;
        for (name, value) in self.schema.names().iter().zip(&self.example.features) {
            map.serialize_entry(name, value)?;
        }
        map.serialize_entry("label", &self.example.label.as_target())?;
        map.end()
    }
}

/// Label every company in the snapshot at `reference_date`
pub fn build_training_set(
    config: &EngineConfig,
    reference_date: NaiveDate,
    records: &[RawActivityRecord],
    profiles: Vec<CompanyProfile>,
) -> TrainingSet {
    let prepared = prepare_batch(config, records, profiles);
    let aggregator = TemporalAggregator::new(config);
    let composer = FeatureComposer::new(config);
    let deriver = LabelDeriver::new(config);

    let mut examples = Vec::with_capacity(prepared.partitions.len());
    let mut skipped = Vec::new();

    for (company_id, input) in &prepared.partitions {
        let profile = match input.profiles.as_slice() {
            [] => None,
            [profile] => Some(profile),
            _ => {
                warn!("Skipping {}: duplicate profiles", company_id);
                skipped.push(company_id.clone());
                continue;
            }
        };

        let aggregate = aggregator.aggregate(&input.events, reference_date);
        let vector = composer.compose(company_id, &aggregate, profile);
        let counts = deriver.counts(&aggregate);

        examples.push(TrainingExample {
            company_id: company_id.clone(),
            reference_date,
            features: vector.to_row().values,
            counts,
            label: ose_core::derive_label(counts),
            fingerprint: vector.fingerprint(),
        });
    }

    let set = TrainingSet {
        reference_date,
        schema: composer.schema(),
        examples,
        skipped,
        warnings: prepared.warnings,
        stats: prepared.stats,
    };

    info!(
        "Training set at {}: {} examples ({} good), {} skipped",
        reference_date,
        set.examples.len(),
        set.positives(),
        set.skipped.len()
    );

    set
}
