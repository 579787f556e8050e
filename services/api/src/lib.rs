//! Pluto API Library Crate
//!
//! This library contains the web service around the Cookie agent: configuration,
//! shared state, the realtime session protocol, the REST handlers and routing.
//! The binaries under `bin/` are thin wrappers around it.

pub mod config;
pub mod conversation;
pub mod handlers;
pub mod models;
pub mod registry;
pub mod router;
pub mod state;
pub mod ws;
