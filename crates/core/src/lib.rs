//! `rolegate-core`: domain primitives shared by the authorization engine.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod resource;

pub use error::{DomainError, DomainResult};
pub use id::SubjectId;
pub use resource::OwnedResource;
