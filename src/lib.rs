//! agent-factory - manage hierarchical agents on a Letta-compatible server.
//!
//! - [`agents`]: desired agent state, reconciliation and the agent directory
//! - [`client`]: the server seam and its HTTP implementation
//! - [`chat`]: typed reply chunks and turn consumption
//! - [`session`]: explicit per-operator state
//! - [`catalog`]: providers, models, embeddings and context windows

pub mod agents;
pub mod catalog;
pub mod chat;
pub mod client;
pub mod config;
pub mod logging;
pub mod session;

pub use config::Config;
