//! # kestrel-core
//!
//! Error handling and configuration shared by the Kestrel estimator crates.

pub mod config;
pub mod error;
