//! Windlass - Convergence & caching engine for declarative infrastructure
//!
//! Turns "fetch this file, chart, or rotation state" into idempotent local
//! operations: content-addressed caches for remote artifacts and helm chart
//! bundles, a GitHub repository browser that mints cache handles, and a
//! check/create/diff/update provider for rotating timestamp slots.

pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod github;
pub mod helm;
pub mod provider;

pub use error::{WindlassError, WindlassResult};
