//! Read and delete access to the agents on the server.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::client::{AgentRecord, AgentService, AgentSummary, ClientError};

/// Agent listing, lookup and deletion.
#[derive(Clone)]
pub struct AgentDirectory {
    service: Arc<dyn AgentService>,
}

impl AgentDirectory {
    pub fn new(service: Arc<dyn AgentService>) -> Self {
        Self { service }
    }

    /// List agents, failing open.
    ///
    /// An empty result means either "no agents" or "listing failed"; use
    /// [`AgentDirectory::try_list`] when the two must be told apart.
    pub async fn list(&self) -> Vec<AgentSummary> {
        match self.try_list().await {
            Ok(agents) => agents,
            Err(e) => {
                warn!("Listing agents failed, showing none: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn try_list(&self) -> Result<Vec<AgentSummary>, ClientError> {
        self.service.list_agents().await
    }

    pub async fn retrieve(&self, agent_id: &str) -> Result<AgentRecord, ClientError> {
        self.service.retrieve_agent(agent_id).await.map_err(|e| {
            error!("Error fetching agent {}: {}", agent_id, e);
            e
        })
    }

    /// Delete an agent. Returns `false` (after logging) when the server refused.
    pub async fn delete(&self, agent_id: &str) -> bool {
        match self.service.delete_agent(agent_id).await {
            Ok(()) => {
                info!(agent_id = %agent_id, "Deleted agent");
                true
            }
            Err(e) => {
                error!("Error deleting agent {}: {}", agent_id, e);
                false
            }
        }
    }
}
