//! Shared test utilities for petclinic Rust services.
//!
//! This crate provides:
//! - Proptest generators for inputs and outcome sequences
//! - Mock audit store, metrics sink and flaky operation
//! - Request context and policy configuration fixtures

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod mocks;

pub use generators::*;
