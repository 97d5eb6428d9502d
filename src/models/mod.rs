//! # Models
//!
//! The relaxed-clock branch prior with its gene-rate estimators, and the
//! gene-rate posterior sampler built on top of it.

pub mod posterior;
pub mod prior;
