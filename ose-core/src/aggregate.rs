//! Temporal aggregation of normalized events
//!
//! For one company and a reference date, computes per category:
//! - Event counts inside each rolling window `(reference - w months, reference]`
//! - Recency: days since the latest event at or before the reference date
//! - Momentum: recency-weighted event mass under a decay kernel
//!
//! Events after the reference date are ignored (no look-ahead). Events are
//! sorted before consumption so the result never depends on input order.

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{ActivityEvent, ConfigError, EngineConfig, Polarity, Taxonomy};

/// Time since the most recent event of a category
///
/// `Never` orders after every `Days(_)`: it is the worst (oldest) value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recency {
    Days(u32),
    Never,
}

impl Recency {
    pub fn from_last_event(reference_date: NaiveDate, last_event: Option<NaiveDate>) -> Self {
        match last_event {
            Some(date) => Recency::Days(days_between(date, reference_date)),
            None => Recency::Never,
        }
    }

    pub fn days(&self) -> Option<u32> {
        match self {
            Recency::Days(d) => Some(*d),
            Recency::Never => None,
        }
    }

    /// Numeric encoding: days clamped at `cap_days`, `Never` one past the cap
    pub fn as_feature(&self, cap_days: u32) -> f64 {
        match self {
            Recency::Days(d) => f64::from((*d).min(cap_days)),
            Recency::Never => f64::from(cap_days) + 1.0,
        }
    }
}

fn days_between(earlier: NaiveDate, later: NaiveDate) -> u32 {
    let days = (later - earlier).num_days().max(0);
    u32::try_from(days).unwrap_or(u32::MAX)
}

/// Decay kernels for recency weighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DecayKernel {
    /// Half-life decay: w(a) = 0.5^(a / half_life)
    #[default]
    Exponential,
    /// Linear decay: w(a) = 1 - a / horizon
    Linear,
    /// Step function: full weight until the horizon, then zero
    Step,
}

/// Momentum settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomentumConfig {
    #[serde(default)]
    pub kernel: DecayKernel,
    #[serde(default = "default_half_life")]
    pub half_life_days: f64,
    /// Events older than this carry no weight
    #[serde(default = "default_horizon")]
    pub horizon_days: u32,
}

fn default_half_life() -> f64 {
    90.0
}

fn default_horizon() -> u32 {
    365
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            kernel: DecayKernel::default(),
            half_life_days: default_half_life(),
            horizon_days: default_horizon(),
        }
    }
}

impl MomentumConfig {
    /// Weight of an event `age_days` old
    pub fn weight(&self, age_days: u32) -> f64 {
        if age_days > self.horizon_days {
            return 0.0;
        }
        let age = f64::from(age_days);

        match self.kernel {
            DecayKernel::Exponential => 0.5_f64.powf(age / self.half_life_days),
            DecayKernel::Linear => (1.0 - age / f64::from(self.horizon_days)).max(0.0),
            DecayKernel::Step => 1.0,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.half_life_days.is_finite() && self.half_life_days > 0.0) {
            return Err(ConfigError::Invalid(
                "momentum.half_life_days must be positive".to_string(),
            ));
        }
        if self.horizon_days == 0 {
            return Err(ConfigError::Invalid(
                "momentum.horizon_days must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Aggregates for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryAggregate {
    pub category: String,
    pub polarity: Polarity,
    /// Aligned with `SignalAggregate::windows_months`
    pub window_counts: Vec<u32>,
    pub last_event: Option<NaiveDate>,
    pub recency: Recency,
    pub momentum: f64,
}

/// Aggregates for one company at one reference date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalAggregate {
    pub reference_date: NaiveDate,
    pub windows_months: Vec<u32>,
    /// One entry per taxonomy category, sorted by id
    pub categories: Vec<CategoryAggregate>,
    /// Recognized events at or before the reference date
    pub events_used: usize,
    pub events_after_reference: usize,
    pub events_unrecognized: usize,
}

impl SignalAggregate {
    pub fn category(&self, id: &str) -> Option<&CategoryAggregate> {
        self.categories
            .binary_search_by(|c| c.category.as_str().cmp(id))
            .ok()
            .map(|idx| &self.categories[idx])
    }

    pub fn window_position(&self, months: u32) -> Option<usize> {
        self.windows_months.iter().position(|&w| w == months)
    }

    /// Count for one category and window length
    pub fn count(&self, id: &str, months: u32) -> Option<u32> {
        let pos = self.window_position(months)?;
        self.category(id).map(|c| c.window_counts[pos])
    }

    fn with_polarity(&self, polarity: Polarity) -> impl Iterator<Item = &CategoryAggregate> {
        self.categories.iter().filter(move |c| c.polarity == polarity)
    }

    /// Total events of a polarity in the window at `window_pos`
    pub fn total_at(&self, polarity: Polarity, window_pos: usize) -> u32 {
        self.with_polarity(polarity)
            .map(|c| c.window_counts[window_pos])
            .sum()
    }

    /// Distinct categories of a polarity with at least one event in the window at `window_pos`
    pub fn diversity_at(&self, polarity: Polarity, window_pos: usize) -> u32 {
        self.with_polarity(polarity)
            .filter(|c| c.window_counts[window_pos] > 0)
            .count() as u32
    }

    pub fn momentum(&self, polarity: Polarity) -> f64 {
        self.with_polarity(polarity).map(|c| c.momentum).sum()
    }

    /// Recency of the most recent event of any positive category
    pub fn positive_recency(&self) -> Recency {
        self.with_polarity(Polarity::Positive)
            .map(|c| c.recency)
            .min()
            .unwrap_or(Recency::Never)
    }
}

/// Computes `SignalAggregate`s
pub struct TemporalAggregator<'a> {
    taxonomy: &'a Taxonomy,
    windows_months: &'a [u32],
    momentum: &'a MomentumConfig,
}

impl<'a> TemporalAggregator<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self {
            taxonomy: &config.taxonomy,
            windows_months: &config.windows_months,
            momentum: &config.momentum,
        }
    }

    /// Aggregate one company's normalized events
    pub fn aggregate(&self, events: &[ActivityEvent], reference_date: NaiveDate) -> SignalAggregate {
        // Calendar-aware bounds: day clamped to month end (31 May - 3 months = 28/29 Feb)
        let lower_bounds: Vec<Option<NaiveDate>> = self
            .windows_months
            .iter()
            .map(|&w| reference_date.checked_sub_months(Months::new(w)))
            .collect();

        let mut ordered: Vec<&ActivityEvent> = events.iter().collect();
        ordered.sort_by(|a, b| {
            (a.event_date, &a.canonical_category, &a.raw_category, &a.source).cmp(&(
                b.event_date,
                &b.canonical_category,
                &b.raw_category,
                &b.source,
            ))
        });

        let mut categories: Vec<CategoryAggregate> = self
            .taxonomy
            .categories()
            .iter()
            .map(|c| CategoryAggregate {
                category: c.id.clone(),
                polarity: c.polarity,
                window_counts: vec![0; self.windows_months.len()],
                last_event: None,
                recency: Recency::Never,
                momentum: 0.0,
            })
            .collect();

        let mut events_used = 0;
        let mut events_after_reference = 0;
        let mut events_unrecognized = 0;

        for event in ordered {
            let Some(id) = event.canonical_category.as_deref() else {
                events_unrecognized += 1;
                continue;
            };
            // Normalized against another taxonomy version
            let Ok(idx) = categories.binary_search_by(|c| c.category.as_str().cmp(id)) else {
                events_unrecognized += 1;
                continue;
            };
            if event.event_date > reference_date {
                events_after_reference += 1;
                continue;
            }

            let aggregate = &mut categories[idx];
            for (count, lower) in aggregate.window_counts.iter_mut().zip(&lower_bounds) {
                if lower.map_or(true, |bound| event.event_date > bound) {
                    *count += 1;
                }
            }
            // Ascending order: the last event seen is the latest
            aggregate.last_event = Some(event.event_date);
            aggregate.momentum += self
                .momentum
                .weight(days_between(event.event_date, reference_date));
            events_used += 1;
        }

        for aggregate in &mut categories {
            aggregate.recency = Recency::from_last_event(reference_date, aggregate.last_event);
        }

        SignalAggregate {
            reference_date,
            windows_months: self.windows_months.to_vec(),
            categories,
            events_used,
            events_after_reference,
            events_unrecognized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn event(config: &EngineConfig, raw: &str, event_date: NaiveDate) -> ActivityEvent {
        let event = ActivityEvent {
            company_id: "c1".to_string(),
            raw_category: raw.to_string(),
            canonical_category: None,
            event_date,
            source: "article".to_string(),
        };
        config.taxonomy.normalize(&event)
    }

    #[test]
    fn test_window_boundary_exclusive_lower() {
        let config = EngineConfig::embedded().unwrap();
        let reference = date(2025, 11, 24);
        let events = vec![event(&config, "Recrutement", date(2025, 8, 24))];

        let agg = TemporalAggregator::new(&config).aggregate(&events, reference);
        assert_eq!(agg.count("recrutement", 3), Some(0));
        assert_eq!(agg.count("recrutement", 6), Some(1));
        assert_eq!(agg.count("recrutement", 12), Some(1));
    }

    #[test]
    fn test_reference_date_inclusive() {
        let config = EngineConfig::embedded().unwrap();
        let reference = date(2025, 11, 24);
        let events = vec![event(&config, "Recrutement", reference)];

        let agg = TemporalAggregator::new(&config).aggregate(&events, reference);
        assert_eq!(agg.count("recrutement", 3), Some(1));
        assert_eq!(agg.category("recrutement").unwrap().recency, Recency::Days(0));
    }

    #[test]
    fn test_month_end_clamping() {
        let config = EngineConfig::embedded().unwrap();
        let reference = date(2025, 5, 31);
        // 31 May - 3 months clamps to 28 Feb
        let events = vec![
            event(&config, "Recrutement", date(2025, 2, 28)),
            event(&config, "Recrutement", date(2025, 3, 1)),
        ];

        let agg = TemporalAggregator::new(&config).aggregate(&events, reference);
        assert_eq!(agg.count("recrutement", 3), Some(1));
    }

    #[test]
    fn test_future_events_ignored() {
        let config = EngineConfig::embedded().unwrap();
        let reference = date(2025, 11, 24);
        let events = vec![
            event(&config, "Licenciement", date(2025, 11, 25)),
            event(&config, "Licenciement", date(2025, 6, 1)),
        ];

        let agg = TemporalAggregator::new(&config).aggregate(&events, reference);
        let licenciement = agg.category("licenciement").unwrap();
        assert_eq!(licenciement.window_counts, vec![0, 1, 1]);
        assert_eq!(licenciement.last_event, Some(date(2025, 6, 1)));
        assert_eq!(agg.events_after_reference, 1);
        assert_eq!(agg.events_used, 1);
    }

    #[test]
    fn test_recency_never_is_worst() {
        let config = EngineConfig::embedded().unwrap();
        let agg = TemporalAggregator::new(&config).aggregate(&[], date(2025, 11, 24));

        assert!(agg.categories.iter().all(|c| c.recency == Recency::Never));
        assert_eq!(agg.positive_recency(), Recency::Never);
        assert!(Recency::Days(u32::MAX) < Recency::Never);
        assert!(Recency::Never.as_feature(1825) > Recency::Days(100_000).as_feature(1825));
    }

    #[test]
    fn test_unrecognized_excluded() {
        let config = EngineConfig::embedded().unwrap();
        let reference = date(2025, 11, 24);
        let events = vec![event(&config, "Météo", date(2025, 11, 1))];

        let agg = TemporalAggregator::new(&config).aggregate(&events, reference);
        assert_eq!(agg.events_unrecognized, 1);
        assert_eq!(agg.total_at(Polarity::Positive, 2), 0);
        assert_eq!(agg.total_at(Polarity::Negative, 2), 0);
    }

    #[test]
    fn test_totals_and_diversity() {
        let config = EngineConfig::embedded().unwrap();
        let reference = date(2025, 11, 24);
        let events = vec![
            event(&config, "Investissements", date(2025, 10, 24)),
            event(&config, "Recrutement", date(2025, 9, 24)),
            event(&config, "Embauche", date(2025, 9, 20)),
            event(&config, "Licenciement", date(2025, 1, 24)),
        ];

        let agg = TemporalAggregator::new(&config).aggregate(&events, reference);
        let year = agg.window_position(12).unwrap();
        assert_eq!(agg.total_at(Polarity::Positive, year), 3);
        assert_eq!(agg.diversity_at(Polarity::Positive, year), 2);
        assert_eq!(agg.total_at(Polarity::Negative, year), 1);
        assert_eq!(agg.diversity_at(Polarity::Negative, year), 1);
        assert_eq!(agg.positive_recency(), Recency::Days(31));
    }

    #[test]
    fn test_momentum_kernels() {
        let exponential = MomentumConfig::default();
        assert!((exponential.weight(0) - 1.0).abs() < 1e-12);
        assert!((exponential.weight(90) - 0.5).abs() < 1e-12);
        assert_eq!(exponential.weight(366), 0.0);

        let linear = MomentumConfig {
            kernel: DecayKernel::Linear,
            horizon_days: 100,
            ..MomentumConfig::default()
        };
        assert!((linear.weight(25) - 0.75).abs() < 1e-12);

        let step = MomentumConfig {
            kernel: DecayKernel::Step,
            ..MomentumConfig::default()
        };
        assert_eq!(step.weight(365), 1.0);
        assert_eq!(step.weight(366), 0.0);
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let config = EngineConfig::embedded().unwrap();
        let reference = date(2025, 11, 24);
        let raws = ["Investissements", "Recrutement", "Licenciement", "Grève", "Rachat"];
        let mut events: Vec<ActivityEvent> = (0..40)
            .map(|i| {
                let day = reference - chrono::Duration::days(i * 11);
                event(&config, raws[i as usize % raws.len()], day)
            })
            .collect();

        let aggregator = TemporalAggregator::new(&config);
        let expected = aggregator.aggregate(&events, reference);

        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for _ in 0..5 {
            events.shuffle(&mut rng);
            let shuffled = aggregator.aggregate(&events, reference);
            assert_eq!(shuffled, expected);
            for (a, b) in shuffled.categories.iter().zip(&expected.categories) {
                assert_eq!(a.momentum.to_bits(), b.momentum.to_bits());
            }
        }
    }
}
