//! Student risk scoring and cohort analytics.
//!
//! Raw [`models::StudentRecord`]s are scored by [`risk`] against their own
//! cohort, sliced and correlated by [`cohort`], and projected under
//! intervention scenarios by [`simulate`]. [`loader`] and [`report`] are the
//! CSV and markdown collaborators around that core.

pub mod cohort;
pub mod error;
pub mod loader;
pub mod models;
pub mod report;
pub mod risk;
pub mod simulate;

#[cfg(test)]
mod fixtures;

pub use error::{AnalyticsError, AnalyticsResult};
