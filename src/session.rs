//! Per-operator session state.
//!
//! Everything a front end needs to remember between operator actions lives
//! here and is passed explicitly to each handler.
//!
//! # Rules
//! - The agent list is fetched on first use and refetched only on request
//! - Selecting a different agent clears the transcript
//! - A session is owned by one operator and never shared

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::agents::AgentDirectory;
use crate::chat::{drain_turn, StreamChunk, TurnOutcome};
use crate::client::{AgentService, AgentSummary, ClientError};

/// Who said something in the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One transcript line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptEntry {
    pub role: ChatRole,
    pub content: String,
    /// The reply stream failed before this entry was complete.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub interrupted: bool,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Please select an agent first")]
    NoAgentSelected,

    #[error("Error getting response from agent: {0}")]
    Remote(#[from] ClientError),
}

/// State for one operator session.
#[derive(Debug, Default)]
pub struct SessionContext {
    selected_agent_id: Option<String>,
    transcript: Vec<TranscriptEntry>,
    agents: Option<Vec<AgentSummary>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached agent list, fetched on first use.
    pub async fn agents(&mut self, directory: &AgentDirectory) -> &[AgentSummary] {
        if self.agents.is_none() {
            self.agents = Some(directory.list().await);
        }
        self.agents.as_deref().unwrap_or_default()
    }

    /// Refetch the agent list, e.g. after a create, update or delete.
    pub async fn refresh_agents(&mut self, directory: &AgentDirectory) -> &[AgentSummary] {
        self.agents = None;
        self.agents(directory).await
    }

    /// Drop the cached list so the next read refetches it.
    pub fn invalidate_agents(&mut self) {
        self.agents = None;
    }

    pub fn selected_agent_id(&self) -> Option<&str> {
        self.selected_agent_id.as_deref()
    }

    /// Select an agent. Returns true when the selection changed.
    ///
    /// # Postcondition
    /// On change, the transcript is empty.
    pub fn select_agent(&mut self, agent_id: &str) -> bool {
        if self.selected_agent_id.as_deref() == Some(agent_id) {
            return false;
        }
        debug!(agent_id = %agent_id, "Switching agent, clearing transcript");
        self.selected_agent_id = Some(agent_id.to_string());
        self.transcript.clear();
        true
    }

    /// Select the cached agent with the given name, if any.
    pub fn select_agent_by_name(&mut self, name: &str) -> Option<bool> {
        let id = self
            .agents
            .as_ref()?
            .iter()
            .find(|a| a.name == name)?
            .id
            .clone();
        Some(self.select_agent(&id))
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    /// Run one chat turn against the selected agent.
    ///
    /// The user message is recorded before the stream opens. The reply is
    /// recorded once the stream ends, marked interrupted if it ended early.
    pub async fn chat_turn<F>(
        &mut self,
        service: &dyn AgentService,
        prompt: &str,
        observer: F,
    ) -> Result<TurnOutcome, ChatError>
    where
        F: FnMut(&StreamChunk),
    {
        let agent_id = self
            .selected_agent_id
            .clone()
            .ok_or(ChatError::NoAgentSelected)?;

        self.transcript.push(TranscriptEntry {
            role: ChatRole::User,
            content: prompt.to_string(),
            interrupted: false,
        });

        let stream = service.stream_message(&agent_id, prompt).await?;
        let outcome = drain_turn(stream, observer).await;

        if outcome.is_complete() || !outcome.content.is_empty() {
            self.transcript.push(TranscriptEntry {
                role: ChatRole::Assistant,
                content: outcome.content.clone(),
                interrupted: !outcome.is_complete(),
            });
        }
        info!(
            agent_id = %agent_id,
            chars = outcome.content.len(),
            complete = outcome.is_complete(),
            "Chat turn finished"
        );
        Ok(outcome)
    }
}
