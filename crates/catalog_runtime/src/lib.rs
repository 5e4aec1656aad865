//! AWS-oriented adapters and handlers for publishing the catalog product.
//!
//! This crate owns runtime integration details (the S3 content store, the
//! custom resource callback transport, Lambda and CLI entrypoints) on top of
//! the deterministic primitives in `catalog_core`.

pub mod adapters;
pub mod handlers;
pub mod telemetry;
