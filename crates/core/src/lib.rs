//! `vendorflow-core`: shared identifiers and the domain error model.
//!
//! This crate contains no I/O; every other crate in the workspace depends on it.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{ItemId, TenantId, VendorId};
