//! Realtime Session Handling
//!
//! This module serves agent sessions over WebSockets. It is split into:
//!
//! - `protocol`: The fixed client texts and the per-connection state machine.
//! - `exchange`: Forwards one agent exchange as a stream of envelopes.
//! - `session`: Owns the connection lifecycle, from greeting to close.

pub mod exchange;
pub mod protocol;
pub mod session;

pub use session::ws_handler;
