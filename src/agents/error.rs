use thiserror::Error;

use crate::client::ClientError;

use super::reconcile::ReconcileStep;

/// Errors raised while reconciling an agent.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Level must be 1, 2, or 3 (got {0})")]
    InvalidLevel(u8),

    #[error("Invalid action or missing agent ID for modification")]
    MissingAgentId,

    #[error("Please enter a supervisor name")]
    MissingSupervisor,

    #[error("Invalid agent configuration: {0}")]
    InvalidSpec(String),

    #[error("Remote error: {0}")]
    Remote(#[from] ClientError),

    /// A modify sequence stopped partway. Steps in `completed` stay applied.
    #[error(
        "Agent {agent_id} partially updated: {failed} failed after {} completed step(s): {source}",
        .completed.len()
    )]
    PartialUpdate {
        agent_id: String,
        failed: ReconcileStep,
        completed: Vec<ReconcileStep>,
        #[source]
        source: ClientError,
    },
}

impl AgentError {
    /// True when the error was raised before anything was sent to the server.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidLevel(_)
                | Self::MissingAgentId
                | Self::MissingSupervisor
                | Self::InvalidSpec(_)
        )
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
