//! # Keep Provider Library
//!
//! Resource side of a declarative infrastructure provider for the Keep
//! alerting platform: mapping rules, extraction rules, installed providers
//! and alerts, reconciled against Keep's REST API.

pub mod client;
pub mod config;
pub mod error;
pub mod lookup;
pub mod normalization;
pub mod provider;
pub mod resources;
pub mod telemetry;

pub use error::{Diagnostic, ProviderError};
pub use provider::KeepProvider;
