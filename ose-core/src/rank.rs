//! Deterministic top-N ranking
//!
//! Candidates are ordered by score descending, then by the configured
//! tie-break fields. `company_id` is always the last tie-break, so the order
//! is total and the output is reproducible for identical inputs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use thiserror::Error;

use crate::{CompanyId, EngineConfig, RankedEntry, Recency, ScoreRecord};

/// Fields that break score ties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreakField {
    /// More recent positive signal first
    PositiveRecency,
    /// More distinct positive categories first
    DiversityPositive,
    /// Lexicographic, ascending
    CompanyId,
}

/// Value of one tie-break field for one entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum TieBreakValue {
    PositiveRecency(Recency),
    DiversityPositive(u32),
    CompanyId(CompanyId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RankError {
    #[error("candidates mix reference dates: {expected} and {found} (company {company_id})")]
    MixedReferenceDates {
        expected: NaiveDate,
        found: NaiveDate,
        company_id: CompanyId,
    },

    #[error("company {0} appears more than once")]
    DuplicateCompany(CompanyId),

    #[error("invalid tie-break order: {0}")]
    InvalidTieBreak(String),
}

/// A scored company plus the signals used to break ties
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankCandidate {
    pub record: ScoreRecord,
    pub positive_recency: Recency,
    pub diversity_positive: u32,
}

impl RankCandidate {
    fn key_value(&self, field: TieBreakField) -> TieBreakValue {
        match field {
            TieBreakField::PositiveRecency => TieBreakValue::PositiveRecency(self.positive_recency),
            TieBreakField::DiversityPositive => {
                TieBreakValue::DiversityPositive(self.diversity_positive)
            }
            TieBreakField::CompanyId => TieBreakValue::CompanyId(self.record.company_id.clone()),
        }
    }

    fn compare_on(&self, other: &Self, field: TieBreakField) -> Ordering {
        match field {
            TieBreakField::PositiveRecency => self.positive_recency.cmp(&other.positive_recency),
            TieBreakField::DiversityPositive => {
                other.diversity_positive.cmp(&self.diversity_positive)
            }
            TieBreakField::CompanyId => self.record.company_id.cmp(&other.record.company_id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ranker {
    top_n: usize,
    tie_break: Vec<TieBreakField>,
}

impl Ranker {
    pub fn new(top_n: usize, tie_break: Vec<TieBreakField>) -> Result<Self, RankError> {
        if tie_break.last() != Some(&TieBreakField::CompanyId) {
            return Err(RankError::InvalidTieBreak(
                "company_id must be the last field".to_string(),
            ));
        }
        let unique: HashSet<_> = tie_break.iter().collect();
        if unique.len() != tie_break.len() {
            return Err(RankError::InvalidTieBreak(format!(
                "repeated field in {:?}",
                tie_break
            )));
        }
        Ok(Self { top_n, tie_break })
    }

    /// Ranker for a validated configuration
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            top_n: config.top_n,
            tie_break: config.tie_break.clone(),
        }
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    pub fn tie_break(&self) -> &[TieBreakField] {
        &self.tie_break
    }

    fn compare(&self, a: &RankCandidate, b: &RankCandidate) -> Ordering {
        b.record.score.cmp(&a.record.score).then_with(|| {
            self.tie_break
                .iter()
                .map(|&field| a.compare_on(b, field))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        })
    }

    /// Top-N entries, ranks 1..=N
    pub fn rank(&self, candidates: &[RankCandidate]) -> Result<Vec<RankedEntry>, RankError> {
        if let Some(first) = candidates.first() {
            let expected = first.record.reference_date;
            if let Some(other) = candidates
                .iter()
                .find(|c| c.record.reference_date != expected)
            {
                return Err(RankError::MixedReferenceDates {
                    expected,
                    found: other.record.reference_date,
                    company_id: other.record.company_id.clone(),
                });
            }
        }

        let mut seen = HashSet::with_capacity(candidates.len());
        for candidate in candidates {
            if !seen.insert(candidate.record.company_id.as_str()) {
                return Err(RankError::DuplicateCompany(candidate.record.company_id.clone()));
            }
        }

        let mut ordered: Vec<&RankCandidate> = candidates.iter().collect();
        ordered.sort_by(|a, b| self.compare(a, b));

        Ok(ordered
            .into_iter()
            .take(self.top_n)
            .enumerate()
            .map(|(idx, candidate)| RankedEntry {
                rank: idx + 1,
                company_id: candidate.record.company_id.clone(),
                score: candidate.record.score,
                tie_break_key: self
                    .tie_break
                    .iter()
                    .map(|&field| candidate.key_value(field))
                    .collect(),
            })
            .collect())
    }
}
