//! Training labels
//!
//! A company is a good opportunity when, over the label window, it has more
//! positive than negative signals, or at least two positive signals whatever
//! the negatives.

use serde::{Deserialize, Serialize};

use crate::{EngineConfig, Polarity, SignalAggregate};

/// Positive signals that make a company good on their own
pub const MIN_POSITIVE_SIGNALS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityLabel {
    GoodOpportunity,
    NotGood,
}

impl OpportunityLabel {
    pub fn is_good(&self) -> bool {
        matches!(self, OpportunityLabel::GoodOpportunity)
    }

    /// 1 for good, 0 otherwise
    pub fn as_target(&self) -> u8 {
        u8::from(self.is_good())
    }
}

/// Signal totals over the label window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCounts {
    pub positive: u32,
    pub negative: u32,
}

pub fn derive_label(counts: LabelCounts) -> OpportunityLabel {
    if counts.positive > counts.negative || counts.positive >= MIN_POSITIVE_SIGNALS {
        OpportunityLabel::GoodOpportunity
    } else {
        OpportunityLabel::NotGood
    }
}

/// Labels aggregates under one configuration
pub struct LabelDeriver {
    label_window_months: u32,
}

impl LabelDeriver {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            label_window_months: config.label_window_months,
        }
    }

    pub fn counts(&self, aggregate: &SignalAggregate) -> LabelCounts {
        aggregate
            .window_position(self.label_window_months)
            .map(|pos| LabelCounts {
                positive: aggregate.total_at(Polarity::Positive, pos),
                negative: aggregate.total_at(Polarity::Negative, pos),
            })
            .unwrap_or_default()
    }

    pub fn label(&self, aggregate: &SignalAggregate) -> OpportunityLabel {
        derive_label(self.counts(aggregate))
    }
}
