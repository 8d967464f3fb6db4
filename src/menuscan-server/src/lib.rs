//! menuscan - seed-and-query demo service for a restaurant collection
//!
//! This crate provides both a library and binary for running menuscan.
//!
//! # Embedded Usage
//!
//! ```rust,no_run
//! use menuscan_core::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = MongoStore::connect("mongodb://localhost:27017", "menuscan", "restaurants").await?;
//!     println!("{} documents", store.count_documents().await?);
//!     Ok(())
//! }
//! ```
//!
//! # Server Usage
//!
//! Run the binary to start the REST API server:
//! ```bash
//! MONGODB_URI=mongodb://localhost:27017 menuscan-server
//! ```

pub use menuscan_core;

pub mod api;
pub mod telemetry;
