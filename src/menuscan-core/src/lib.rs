//! menuscan Core Library
//!
//! This crate provides the core functionality for menuscan, including:
//! - Restaurant data model
//! - Synthetic data generation with controlled field cardinality
//! - Scan filter and managed search query builders
//! - MongoDB adapter and secondary index definitions
//! - Transactional collection preparation

pub mod config;
pub mod generator;
pub mod index;
pub mod models;
pub mod preparer;
pub mod query;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use config::Config;
pub use generator::{GenerationSummary, RestaurantGenerator};
pub use index::IndexSpec;
pub use models::*;
pub use preparer::{CollectionPreparer, InstallError, InstallPlan, Installer, PrepareOutcome};
pub use query::{Lookup, QueryOptions, QueryParams, ScanType};
pub use store::{InstallTarget, MongoStore, RestaurantRepository, StoreError};
