//! Multi-runtime benchmark harness.
//!
//! Drives the same workload against several deployed variants and turns
//! the raw measurements into a comparison:
//!
//! - [`coldstart`] - sequential idle/invoke/classify loop producing
//!   cold-start records
//! - [`load`] - staged concurrent load against a variant's HTTP surface
//! - [`compare`] - aggregation of both datasets into a report

pub mod coldstart;
pub mod compare;
pub mod load;
