//! Vitrine Protocol - Wire types for the display server
//!
//! This crate provides the reply envelope used by the HTTP endpoints,
//! the payloads pushed to screens over websockets, and the query
//! parameters the endpoints accept.

pub mod message;
pub mod query;

pub use message::{DisplayUpdate, PushMessage, Reply, Signal};
pub use query::{ObjectQuery, UpdateDisplayQuery};
