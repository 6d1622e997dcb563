//! Vitrine Core - Shared types for the displayed-object server
//!
//! This crate provides the domain types shared between the server
//! (`vitrined`), the wire protocol and the binary.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod display;
pub mod error;

// Re-exports for convenience
pub use display::{DisplayState, ObjectName, Probability, NO_OBJECT};
pub use error::{DomainError, DomainResult};
