//! Batch Coordinator
//!
//! Scores one batch of companies for one reference date:
//! - Structural checks first (taxonomy version, feature schema); failures are fatal
//! - Each company is scored independently on a bounded blocking pool
//! - Per-company failures (timeout, panic, model error, duplicate profile) are isolated
//! - Ranking is a single join after every company has finished

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use ose_core::{
    AttributeField, BatchWarning, CompanyId, CompanyProfile, ConfigError, EngineConfig,
    Explanation, FeatureComposer, RankCandidate, RankError, RankedEntry, Ranker,
    RawActivityRecord, Recency, ScoreRecord, TemporalAggregator,
};
use ose_model::{check_compatibility, ModelError, Scorer, SharedModel};

use crate::{prepare_batch, CompanyInput, IngestStats};

/// Default per-company model timeout
pub const DEFAULT_MODEL_TIMEOUT_MS: u64 = 5000;

/// Worker count when none is configured
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Errors that abort the whole batch
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("ranking error: {0}")]
    Rank(#[from] RankError),
}

/// Batch configuration
#[derive(Clone)]
pub struct BatchConfig {
    pub engine: Arc<EngineConfig>,
    pub model: SharedModel,
    pub reference_date: NaiveDate,
    /// Companies scored at once
    pub max_concurrent: usize,
    pub model_timeout_ms: u64,
}

impl BatchConfig {
    pub fn new(engine: EngineConfig, model: SharedModel, reference_date: NaiveDate) -> Self {
        Self {
            engine: Arc::new(engine),
            model,
            reference_date,
            max_concurrent: default_concurrency(),
            model_timeout_ms: DEFAULT_MODEL_TIMEOUT_MS,
        }
    }

    pub fn with_concurrency(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.model_timeout_ms = timeout_ms;
        self
    }
}

/// Why a company has no score
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// More than one profile with the same company id
    DuplicateProfile { count: usize },
    /// Model error or a probability outside [0, 1]
    Scoring { message: String },
    Timeout { timeout_ms: u64 },
    /// The worker panicked
    Panicked { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyFailure {
    pub company_id: CompanyId,
    pub reason: FailureReason,
}

/// A successfully scored company
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCompany {
    pub record: ScoreRecord,
    pub explanation: Explanation,
    pub positive_recency: Recency,
    pub diversity_positive: u32,
    pub imputed: Vec<AttributeField>,
    /// Feature vector content hash
    pub fingerprint: String,
}

impl ScoredCompany {
    fn candidate(&self) -> RankCandidate {
        RankCandidate {
            record: self.record.clone(),
            positive_recency: self.positive_recency,
            diversity_positive: self.diversity_positive,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    #[serde(flatten)]
    pub ingest: IngestStats,
    /// Attributes filled from the imputation policy, over scored companies
    pub attributes_imputed: usize,
    pub companies_scored: usize,
    pub companies_failed: usize,
    pub elapsed_ms: u64,
}

/// Outcome of one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: Uuid,
    pub reference_date: NaiveDate,
    pub config_version: String,
    pub taxonomy_version: String,
    pub model_version: String,
    /// Sorted by company id
    pub scored: Vec<ScoredCompany>,
    /// Sorted by company id
    pub failures: Vec<CompanyFailure>,
    pub warnings: Vec<BatchWarning>,
    pub ranking: Vec<RankedEntry>,
    pub stats: BatchStats,
}

impl BatchResult {
    pub fn score_records(&self) -> Vec<&ScoreRecord> {
        self.scored.iter().map(|s| &s.record).collect()
    }

    pub fn scored_company(&self, company_id: &str) -> Option<&ScoredCompany> {
        self.scored
            .binary_search_by(|s| s.record.company_id.as_str().cmp(company_id))
            .ok()
            .map(|idx| &self.scored[idx])
    }
}

enum Outcome {
    Scored(Box<ScoredCompany>),
    Failed(FailureReason),
    /// Structural model error; aborts the batch
    Fatal(ModelError),
}

/// Per-company pipeline: aggregate, compose, score, explain
fn score_company(
    engine: &EngineConfig,
    scorer: &Scorer,
    reference_date: NaiveDate,
    company_id: &str,
    input: &CompanyInput,
) -> Outcome {
    let profile: Option<&CompanyProfile> = match input.profiles.as_slice() {
        [] => None,
        [profile] => Some(profile),
        many => {
            return Outcome::Failed(FailureReason::DuplicateProfile { count: many.len() });
        }
    };

    let aggregate = TemporalAggregator::new(engine).aggregate(&input.events, reference_date);
    let vector = FeatureComposer::new(engine).compose(company_id, &aggregate, profile);

    match scorer.score_and_explain(&vector) {
        Ok((record, explanation)) => Outcome::Scored(Box::new(ScoredCompany {
            record,
            explanation,
            positive_recency: vector.positive_recency,
            diversity_positive: vector.diversity_positive,
            imputed: vector.imputed_fields(),
            fingerprint: vector.fingerprint(),
        })),
        Err(e) if e.is_fatal() => Outcome::Fatal(e),
        Err(e) => Outcome::Failed(FailureReason::Scoring {
            message: e.to_string(),
        }),
    }
}

/// Runs batches against one configuration and model
pub struct BatchRunner {
    config: BatchConfig,
    scorer: Scorer,
}

impl BatchRunner {
    /// Fails fast when the model cannot consume this configuration's features
    pub fn new(config: BatchConfig) -> Result<Self, BatchError> {
        config.engine.validate()?;
        check_compatibility(&config.model, &config.engine)?;
        let scorer = Scorer::new(config.model.clone(), &config.engine)?;
        Ok(Self { config, scorer })
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Score, explain and rank every company in the batch
    pub async fn run(
        &self,
        records: &[RawActivityRecord],
        profiles: Vec<CompanyProfile>,
    ) -> Result<BatchResult, BatchError> {
        let started = Instant::now();
        let batch_id = Uuid::new_v4();
        let engine = Arc::clone(&self.config.engine);
        let reference_date = self.config.reference_date;
        let timeout_ms = self.config.model_timeout_ms;

        info!(
            "Batch {} starting: {} events, {} profiles, reference date {}",
            batch_id,
            records.len(),
            profiles.len(),
            reference_date
        );

        let prepared = prepare_batch(&engine, records, profiles);

        let mut outcomes: Vec<(CompanyId, Outcome)> = stream::iter(prepared.partitions)
            .map(|(company_id, input)| {
                let engine = Arc::clone(&engine);
                let scorer = self.scorer.clone();
                async move {
                    let id = company_id.clone();
                    let task = tokio::task::spawn_blocking(move || {
                        score_company(&engine, &scorer, reference_date, &company_id, &input)
                    });

                    let outcome =
                        match tokio::time::timeout(Duration::from_millis(timeout_ms), task).await {
                            Ok(Ok(outcome)) => outcome,
                            Ok(Err(join_error)) => Outcome::Failed(FailureReason::Panicked {
                                message: join_error.to_string(),
                            }),
                            Err(_) => Outcome::Failed(FailureReason::Timeout { timeout_ms }),
                        };
                    (id, outcome)
                }
            })
            .buffer_unordered(self.config.max_concurrent.max(1))
            .collect()
            .await;

        outcomes.sort_by(|a, b| a.0.cmp(&b.0));

        let mut scored = Vec::new();
        let mut failures = Vec::new();
        for (company_id, outcome) in outcomes {
            match outcome {
                Outcome::Scored(company) => {
                    debug!("Scored {}: {}", company_id, company.record.score);
                    scored.push(*company);
                }
                Outcome::Failed(reason) => {
                    warn!("Company {} failed: {:?}", company_id, reason);
                    failures.push(CompanyFailure { company_id, reason });
                }
                Outcome::Fatal(e) => {
                    warn!("Batch {} aborted on company {}: {}", batch_id, company_id, e);
                    return Err(e.into());
                }
            }
        }

        let candidates: Vec<RankCandidate> = scored.iter().map(ScoredCompany::candidate).collect();
        let ranking = Ranker::from_config(&engine).rank(&candidates)?;

        let stats = BatchStats {
            ingest: prepared.stats,
            attributes_imputed: scored.iter().map(|s| s.imputed.len()).sum(),
            companies_scored: scored.len(),
            companies_failed: failures.len(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            "Batch {} complete: {} scored, {} failed, {} warnings in {}ms",
            batch_id,
            stats.companies_scored,
            stats.companies_failed,
            prepared.warnings.len(),
            stats.elapsed_ms
        );

        Ok(BatchResult {
            batch_id,
            reference_date,
            config_version: engine.version.clone(),
            taxonomy_version: engine.taxonomy.version().to_string(),
            model_version: self.scorer.model_version().to_string(),
            scored,
            failures,
            warnings: prepared.warnings,
            ranking,
            stats,
        })
    }
}
