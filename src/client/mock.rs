//! In-memory agent server used by unit tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{
    AgentRecord, AgentService, AgentSummary, ClientError, CreateAgentRequest, Memory,
    MemoryBlock, UpdateAgentRequest,
};
use crate::chat::{ChunkStream, StreamChunk};

/// Operation that can be made to fail.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Op {
    List,
    Retrieve,
    Delete,
    CreateAgent,
    UpdateAgent,
    UpdateMemoryBlock(String),
    AttachTool,
    SendMessage,
    StreamMessage,
}

/// Call observed by the mock, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List,
    Retrieve { agent_id: String },
    Delete { agent_id: String },
    CreateAgent { name: String, tools: Vec<String> },
    UpdateAgent { agent_id: String, name: String },
    UpdateMemoryBlock { agent_id: String, label: String },
    AttachTool { agent_id: String, tool_id: String },
    SendMessage { agent_id: String, text: String },
    StreamMessage { agent_id: String, text: String },
}

#[derive(Default)]
struct State {
    agents: BTreeMap<String, AgentRecord>,
    next_id: usize,
    calls: Vec<Call>,
    failing: HashSet<Op>,
    unreachable: bool,
    reply: Vec<Result<StreamChunk, String>>,
}

#[derive(Default)]
pub struct MockService {
    state: Mutex<State>,
}

impl MockService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn fail_on(&self, op: Op) {
        self.state.lock().unwrap().failing.insert(op);
    }

    /// Make every operation fail as if the server were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unwrap().unreachable = unreachable;
    }

    /// Script the chunks of the next replies. `Err` ends the stream with that message.
    pub fn set_reply(&self, reply: Vec<Result<StreamChunk, String>>) {
        self.state.lock().unwrap().reply = reply;
    }

    pub fn insert(&self, record: AgentRecord) {
        self.state
            .lock()
            .unwrap()
            .agents
            .insert(record.id.clone(), record);
    }

    fn begin(&self, call: Call, op: Op) -> Result<std::sync::MutexGuard<'_, State>, ClientError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if state.unreachable {
            return Err(ClientError::Status {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }
        if state.failing.contains(&op) {
            return Err(ClientError::Status {
                status: 500,
                message: format!("injected failure for {:?}", op),
            });
        }
        Ok(state)
    }
}

fn not_found(agent_id: &str) -> ClientError {
    ClientError::from_status(404, &format!(r#"{{"detail":"Agent {} not found"}}"#, agent_id))
}

#[async_trait]
impl AgentService for MockService {
    async fn list_agents(&self) -> Result<Vec<AgentSummary>, ClientError> {
        let state = self.begin(Call::List, Op::List)?;
        Ok(state.agents.values().map(AgentRecord::summary).collect())
    }

    async fn retrieve_agent(&self, agent_id: &str) -> Result<AgentRecord, ClientError> {
        let state = self.begin(
            Call::Retrieve {
                agent_id: agent_id.to_string(),
            },
            Op::Retrieve,
        )?;
        state
            .agents
            .get(agent_id)
            .cloned()
            .ok_or_else(|| not_found(agent_id))
    }

    async fn delete_agent(&self, agent_id: &str) -> Result<(), ClientError> {
        let mut state = self.begin(
            Call::Delete {
                agent_id: agent_id.to_string(),
            },
            Op::Delete,
        )?;
        state
            .agents
            .remove(agent_id)
            .map(|_| ())
            .ok_or_else(|| not_found(agent_id))
    }

    async fn create_agent(&self, request: &CreateAgentRequest) -> Result<AgentRecord, ClientError> {
        let mut state = self.begin(
            Call::CreateAgent {
                name: request.name.clone(),
                tools: request.tools.clone(),
            },
            Op::CreateAgent,
        )?;
        state.next_id += 1;
        let record = AgentRecord {
            id: format!("agent-{}", state.next_id),
            name: request.name.clone(),
            tags: request.tags.clone(),
            llm_config: Some(request.llm_config.clone()),
            embedding_config: Some(request.embedding_config.clone()),
            memory: Some(Memory {
                blocks: request.memory_blocks.clone(),
            }),
        };
        state.agents.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn update_agent(
        &self,
        agent_id: &str,
        request: &UpdateAgentRequest,
    ) -> Result<AgentRecord, ClientError> {
        let mut state = self.begin(
            Call::UpdateAgent {
                agent_id: agent_id.to_string(),
                name: request.name.clone(),
            },
            Op::UpdateAgent,
        )?;
        let record = state
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| not_found(agent_id))?;
        record.name = request.name.clone();
        record.tags = request.tags.clone();
        record.llm_config = Some(request.llm_config.clone());
        record.embedding_config = Some(request.embedding_config.clone());
        Ok(record.clone())
    }

    async fn update_memory_block(
        &self,
        agent_id: &str,
        label: &str,
        value: &str,
    ) -> Result<MemoryBlock, ClientError> {
        let mut state = self.begin(
            Call::UpdateMemoryBlock {
                agent_id: agent_id.to_string(),
                label: label.to_string(),
            },
            Op::UpdateMemoryBlock(label.to_string()),
        )?;
        let record = state
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| not_found(agent_id))?;
        let block = record
            .memory
            .get_or_insert_with(Memory::default)
            .blocks
            .iter_mut()
            .find(|b| b.label == label)
            .ok_or_else(|| ClientError::from_status(404, "block not found"))?;
        block.value = value.to_string();
        Ok(block.clone())
    }

    async fn attach_tool(&self, agent_id: &str, tool_id: &str) -> Result<AgentRecord, ClientError> {
        let state = self.begin(
            Call::AttachTool {
                agent_id: agent_id.to_string(),
                tool_id: tool_id.to_string(),
            },
            Op::AttachTool,
        )?;
        state
            .agents
            .get(agent_id)
            .cloned()
            .ok_or_else(|| not_found(agent_id))
    }

    async fn send_message(
        &self,
        agent_id: &str,
        text: &str,
    ) -> Result<Vec<StreamChunk>, ClientError> {
        let state = self.begin(
            Call::SendMessage {
                agent_id: agent_id.to_string(),
                text: text.to_string(),
            },
            Op::SendMessage,
        )?;
        state
            .reply
            .iter()
            .map(|item| item.clone().map_err(ClientError::Stream))
            .collect()
    }

    async fn stream_message(&self, agent_id: &str, text: &str) -> Result<ChunkStream, ClientError> {
        let state = self.begin(
            Call::StreamMessage {
                agent_id: agent_id.to_string(),
                text: text.to_string(),
            },
            Op::StreamMessage,
        )?;
        let items: Vec<Result<StreamChunk, ClientError>> = state
            .reply
            .iter()
            .map(|item| item.clone().map_err(ClientError::Stream))
            .collect();
        Ok(Box::pin(futures::stream::iter(items)))
    }
}
