//! Scoring outputs

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{CompanyId, TieBreakValue};

/// Highest score a company can get
pub const MAX_SCORE: u8 = 100;

/// A company's opportunity score for one reference date
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub company_id: CompanyId,
    pub reference_date: NaiveDate,
    /// 0..=100
    pub score: u8,
    pub model_version: String,
}

/// Map a probability to a 0..=100 score, `None` outside [0, 1] or when not finite
pub fn score_from_probability(probability: f64) -> Option<u8> {
    if !(0.0..=1.0).contains(&probability) {
        return None;
    }
    let scaled = (probability * f64::from(MAX_SCORE)).round();
    Some(scaled as u8)
}

/// One feature's share of a score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub feature: String,
    /// Signed, in the model's log-odds units
    pub value: f64,
}

/// Why a company got its score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub company_id: CompanyId,
    /// Model output at the baseline row
    pub baseline_value: f64,
    /// Sorted by absolute value descending, then feature name
    pub contributions: Vec<Contribution>,
}

impl Explanation {
    /// The `k` largest contributions
    pub fn top(&self, k: usize) -> &[Contribution] {
        &self.contributions[..k.min(self.contributions.len())]
    }

    /// baseline + Σ contributions
    pub fn total(&self) -> f64 {
        self.baseline_value + self.contributions.iter().map(|c| c.value).sum::<f64>()
    }
}

/// A place in the ranking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry {
    /// 1-based, dense
    pub rank: usize,
    pub company_id: CompanyId,
    pub score: u8,
    /// Values of the tie-break fields in configured order
    pub tie_break_key: Vec<TieBreakValue>,
}
