//! Agents module - desired agent state and how it reaches the server.
//!
//! # Hierarchy
//! - **Level 1**: worker agents
//! - **Level 2-3**: supervisors, given the broadcast tool so they can message
//!   every agent tagged `<supervisor>_sub`
//!
//! # Design Principles
//! - Tags are always rebuilt from `(level, supervisor)`, never edited by hand
//! - Validation happens before any remote call
//! - The server holds the only durable copy of an agent

mod directory;
mod error;
mod overrides;
mod reconcile;
mod types;

pub use directory::AgentDirectory;
pub use error::{AgentError, AgentResult};
pub use overrides::SpecOverrides;
pub use reconcile::{
    DerivedConfig, FollowUpCall, PrimaryCall, ReconcileAction, ReconcilePlan, ReconcileStep,
    Reconciler,
};
pub use types::{
    derive_tags, derive_tools, level_from_tags, supervisor_from_tags, AgentSpec, Level,
    BROADCAST_TOOL_NAME, JOB_DIRECTIVES_LABEL, JOB_DIRECTIVES_LIMIT, PERSONA_LABEL,
    PERSONA_LIMIT,
};
