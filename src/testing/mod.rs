//! Testing utilities and mock implementations
//!
//! Mock collaborators for exercising the routing engine without a live
//! record store or classifier.

pub mod mocks;

pub use mocks::*;
