//! Labstage - staged, content-addressed experiment cache
//!
//! Verifies corpus archives against expected SHA-512 signatures, records the
//! signature of every stage built from the corpus, and guards each stage
//! directory with a crash-diagnosable lock file.

pub mod cache;
pub mod cli;
pub mod config;
pub mod context;
pub mod corpus;
pub mod error;
pub mod lock;
pub mod signature;

pub use error::{LabError, LabResult};
