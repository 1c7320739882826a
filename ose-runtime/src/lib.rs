//! OSE Runtime - Batch scoring and training-set construction
//!
//! - Batch preparation: validation, normalization, per-company partitions
//! - Batch coordinator: bounded concurrent scoring with per-company isolation
//! - Training set builder: labeled feature rows exported as JSON lines

pub mod batch;
pub mod partition;
pub mod training;

pub use batch::*;
pub use partition::*;
pub use training::*;
