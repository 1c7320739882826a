//! Batch preparation
//!
//! Validates raw records, normalizes categories and splits the batch into
//! independent per-company partitions. Every excluded record is reported as a
//! warning and counted; nothing is dropped silently.

use std::collections::BTreeMap;

use ose_core::{
    ActivityEvent, BatchWarning, CompanyId, CompanyProfile, EngineConfig, RawActivityRecord,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Everything one company contributes to a batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompanyInput {
    /// Normalized, in input order
    pub events: Vec<ActivityEvent>,
    /// More than one is a per-company failure
    pub profiles: Vec<CompanyProfile>,
}

/// Ingestion counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStats {
    pub events_seen: usize,
    pub events_accepted: usize,
    pub events_malformed: usize,
    pub events_unrecognized: usize,
    pub profiles_seen: usize,
    pub companies: usize,
    pub companies_without_profile: usize,
}

/// A batch split by company, ordered by company id
#[derive(Debug, Clone, Default)]
pub struct PreparedBatch {
    pub partitions: BTreeMap<CompanyId, CompanyInput>,
    pub warnings: Vec<BatchWarning>,
    pub stats: IngestStats,
}

/// Validate, normalize and partition a batch
///
/// The company set is the union of profile ids and event ids.
pub fn prepare_batch(
    config: &EngineConfig,
    records: &[RawActivityRecord],
    profiles: Vec<CompanyProfile>,
) -> PreparedBatch {
    let mut partitions: BTreeMap<CompanyId, CompanyInput> = BTreeMap::new();
    let mut malformed = Vec::new();
    let mut unrecognized = Vec::new();
    let mut stats = IngestStats {
        events_seen: records.len(),
        profiles_seen: profiles.len(),
        ..IngestStats::default()
    };

    for (index, record) in records.iter().enumerate() {
        let event = match ActivityEvent::from_raw(record) {
            Ok(event) => config.taxonomy.normalize(&event),
            Err(reason) => {
                stats.events_malformed += 1;
                malformed.push(BatchWarning::MalformedEvent {
                    index,
                    company_id: record
                        .company_id
                        .as_deref()
                        .map(str::trim)
                        .filter(|id| !id.is_empty())
                        .map(str::to_string),
                    reason,
                });
                continue;
            }
        };

        stats.events_accepted += 1;
        if !event.is_recognized() {
            stats.events_unrecognized += 1;
            unrecognized.push(BatchWarning::UnrecognizedCategory {
                company_id: event.company_id.clone(),
                raw_category: event.raw_category.clone(),
            });
        }

        partitions
            .entry(event.company_id.clone())
            .or_default()
            .events
            .push(event);
    }

    for profile in profiles {
        partitions
            .entry(profile.company_id.clone())
            .or_default()
            .profiles
            .push(profile);
    }

    stats.companies = partitions.len();
    stats.companies_without_profile = partitions.values().filter(|p| p.profiles.is_empty()).count();

    debug!(
        "Prepared {} companies from {} events ({} malformed, {} unrecognized)",
        stats.companies, stats.events_seen, stats.events_malformed, stats.events_unrecognized
    );

    let mut warnings = malformed;
    warnings.extend(unrecognized);

    PreparedBatch {
        partitions,
        warnings,
        stats,
    }
}
