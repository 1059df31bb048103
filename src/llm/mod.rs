//! Classifier oracle providers
//!
//! Provider-agnostic completion interface plus the Anthropic Messages API
//! implementation used in production.

pub mod provider;
pub mod providers;

pub use provider::*;
pub use providers::*;
