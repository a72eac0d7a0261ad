//! Pet clinic service - the clinic facade behind a resilient interception
//! pipeline.
//!
//! This crate provides the clinic domain model, the [`ClinicService`] facade
//! with an in-memory implementation, and the tower pipeline that wraps every
//! facade call in logging, rate limiting, circuit breaking, auditing, business
//! metrics, retry and result caching.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod domain;
pub mod error;
pub mod facade;
pub mod observability;
pub mod pipeline;

pub use config::{Config, ConfigError};
pub use error::{ErrorCode, ErrorResponse};
pub use facade::{ClinicCall, ClinicReply, ClinicService, InMemoryClinic, OperationName};
pub use pipeline::{ClinicPipeline, ClinicPipelineBuilder, ContextualClinic, PolicyBindings};
