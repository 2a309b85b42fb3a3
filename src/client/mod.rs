//! Client for the remote agent server.
//!
//! The [`AgentService`] trait is the seam between the console and the server:
//! the reconciler, directory and session only ever see the trait, and
//! [`LettaClient`] is the HTTP implementation.

mod error;
mod letta;
#[cfg(test)]
pub(crate) mod mock;

pub use error::ClientError;
pub use letta::LettaClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chat::{ChunkStream, StreamChunk};

/// LLM settings of an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub model_endpoint_type: String,
    /// `None` is sent as `null`; the server decides whether that is acceptable.
    #[serde(default)]
    pub model_endpoint: Option<String>,
    pub context_window: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

fn default_temperature() -> f64 {
    0.7
}

/// Embedding settings of an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub embedding_model: String,
    pub embedding_endpoint_type: String,
    #[serde(default)]
    pub embedding_endpoint: Option<String>,
    pub embedding_dim: u32,
}

/// A labelled, size-limited memory block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBlock {
    pub label: String,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    #[serde(default)]
    pub blocks: Vec<MemoryBlock>,
}

/// Listing entry for an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Full agent record as held by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub llm_config: Option<LlmConfig>,
    #[serde(default)]
    pub embedding_config: Option<EmbeddingConfig>,
    #[serde(default)]
    pub memory: Option<Memory>,
}

impl AgentRecord {
    /// Find a memory block by label.
    pub fn block(&self, label: &str) -> Option<&MemoryBlock> {
        self.memory
            .as_ref()
            .and_then(|m| m.blocks.iter().find(|b| b.label == label))
    }

    pub fn summary(&self) -> AgentSummary {
        AgentSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            tags: self.tags.clone(),
        }
    }
}

/// Body of a create-agent call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateAgentRequest {
    pub name: String,
    pub memory_blocks: Vec<MemoryBlock>,
    pub llm_config: LlmConfig,
    pub embedding_config: EmbeddingConfig,
    pub tags: Vec<String>,
    pub tools: Vec<String>,
}

/// Body of an update-agent call. Memory and tools are separate calls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateAgentRequest {
    pub name: String,
    pub llm_config: LlmConfig,
    pub embedding_config: EmbeddingConfig,
    pub tags: Vec<String>,
}

/// Operations the console needs from the agent server.
///
/// # Invariants
/// - No implementation retries on its own; a failed call is reported once.
#[async_trait]
pub trait AgentService: Send + Sync {
    async fn list_agents(&self) -> Result<Vec<AgentSummary>, ClientError>;

    async fn retrieve_agent(&self, agent_id: &str) -> Result<AgentRecord, ClientError>;

    async fn delete_agent(&self, agent_id: &str) -> Result<(), ClientError>;

    async fn create_agent(&self, request: &CreateAgentRequest) -> Result<AgentRecord, ClientError>;

    async fn update_agent(
        &self,
        agent_id: &str,
        request: &UpdateAgentRequest,
    ) -> Result<AgentRecord, ClientError>;

    /// Replace the value of the block with the given label.
    async fn update_memory_block(
        &self,
        agent_id: &str,
        label: &str,
        value: &str,
    ) -> Result<MemoryBlock, ClientError>;

    async fn attach_tool(&self, agent_id: &str, tool_id: &str) -> Result<AgentRecord, ClientError>;

    /// Send a user message and wait for the whole reply.
    async fn send_message(&self, agent_id: &str, text: &str)
        -> Result<Vec<StreamChunk>, ClientError>;

    /// Send a user message and receive the reply incrementally.
    ///
    /// The returned stream covers exactly one turn and cannot be restarted.
    async fn stream_message(&self, agent_id: &str, text: &str) -> Result<ChunkStream, ClientError>;
}
