//! Pluto Core
//!
//! Domain logic shared by the Pluto services and clients: the realtime wire
//! frames, the Cookie DAO metrics gateway, the tool-calling agent and the
//! classifier that turns tool output into dashboard cards.

pub mod agent;
pub mod cards;
pub mod dashboard;
pub mod envelope;
pub mod llm_client;
pub mod memory;
pub mod metrics;
pub mod toolbox;
pub mod twitter;
