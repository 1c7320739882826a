//! OSE Model
//!
//! Scoring models for opportunity scoring:
//! - **Artifact**: versioned model files (JSON or TOML) with load-time validation
//! - **Transform**: staged feature transforms compiled against the schema
//! - **Backend**: scoring and explanation traits, logistic implementation
//! - **Scorer**: feature vectors to score records and explanations
//!
//! ## Embedded model
//!
//! `opportunity-logit-v1` ships in `artifacts/` and matches the embedded
//! engine configuration. See [`artifact::ModelArtifact::embedded`].

pub mod artifact;
pub mod backend;
pub mod scorer;
pub mod transform;

pub use artifact::*;
pub use backend::*;
pub use scorer::*;
pub use transform::*;
