//! Shared service helpers: event deduplication and telemetry wiring.

pub mod cache;
pub mod telemetry;

pub use cache::*;
pub use telemetry::*;
