//! Shared catalog product domain primitives.
//!
//! This crate owns the deterministic parts of the product publishing pipeline:
//! artifact naming, archive packaging, storage keys, template rendering and the
//! custom resource request/response contract. It intentionally excludes AWS SDK
//! and Lambda runtime concerns, which live in `catalog_runtime`.

pub mod contract;
pub mod error;
pub mod lifecycle;
pub mod naming;
pub mod packaging;
pub mod role_name;
pub mod storage_keys;
pub mod template;
