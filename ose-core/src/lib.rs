//! OSE Core - Domain model for company opportunity scoring
//!
//! This crate provides the deterministic, synchronous pipeline stages:
//! - Versioned signal taxonomy and tag normalizer
//! - Rolling-window aggregation of dated activity events
//! - Feature composition with attribute imputation
//! - Training label derivation
//! - Deterministic top-N ranking
//! - Engine configuration (TOML, embedded default)

pub mod aggregate;
pub mod config;
pub mod events;
pub mod features;
pub mod label;
pub mod profile;
pub mod rank;
pub mod records;
pub mod taxonomy;

pub use aggregate::*;
pub use config::*;
pub use events::*;
pub use features::*;
pub use label::*;
pub use profile::*;
pub use rank::*;
pub use records::*;
pub use taxonomy::*;

/// Default number of ranked companies
pub const DEFAULT_TOP_N: usize = 10;

/// Default rolling windows, in months
pub const DEFAULT_WINDOWS_MONTHS: [u32; 3] = [3, 6, 12];
