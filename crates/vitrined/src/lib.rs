//! Vitrine Daemon - Display broadcast server
//!
//! This crate provides the server behind the vitrine screens:
//! - `channel` - Duplex channel traits and the websocket transport
//! - `registry` - The set of live screen channels and its broadcast
//! - `display` - The current display state and its update path
//! - `server` - HTTP routes, per-screen lifecycle and the server runner
//! - `config` - Startup configuration
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       vitrined                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │  VitrineServer  │────▶│       DisplayStore          │   │
//! │  │  (axum, HTTP)   │     │  (display state owner)      │   │
//! │  └────────┬────────┘     └──────────────┬──────────────┘   │
//! │           │                             │                   │
//! │           │ /ws                         │ broadcast         │
//! │           ▼                             ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │ConnectionHandler│────▶│     ChannelRegistry         │   │
//! │  │  (per screen)   │     │  (live channel set)         │   │
//! │  └─────────────────┘     └─────────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - A broken screen connection only ever affects itself

pub mod channel;
pub mod config;
pub mod display;
pub mod registry;
pub mod server;
