//! Desired agent state and the values derived from it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, Provider, DEFAULT_CONTEXT_WINDOW};
use crate::client::AgentRecord;

use super::AgentError;

/// Label of the persona memory block.
pub const PERSONA_LABEL: &str = "persona";
/// Label of the job directives memory block.
pub const JOB_DIRECTIVES_LABEL: &str = "job_directives";

pub const PERSONA_LIMIT: u32 = 3000;
pub const JOB_DIRECTIVES_LIMIT: u32 = 2000;

/// Name of the tool that lets supervisors message every agent carrying a tag set.
pub const BROADCAST_TOOL_NAME: &str = "send_message_to_agents_matching_all_tags";

const LEVEL_TAG_PREFIX: &str = "level_";
const SUPERVISOR_TAG_SUFFIX: &str = "_sub";

/// Hierarchy tier of an agent.
///
/// # Invariant
/// Always 1, 2 or 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Level(u8);

impl Level {
    pub const WORKER: Level = Level(1);

    pub fn new(value: u8) -> Result<Self, AgentError> {
        match value {
            1..=3 => Ok(Self(value)),
            other => Err(AgentError::InvalidLevel(other)),
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Levels above 1 fan out to subordinates.
    pub fn is_supervisor(self) -> bool {
        self.0 > 1
    }
}

impl TryFrom<u8> for Level {
    type Error = AgentError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Level> for u8 {
    fn from(level: Level) -> Self {
        level.0
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Desired configuration of one agent.
///
/// Built fresh for every create or modify; the remote record is the durable copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: String,
    pub persona: String,
    pub job_directives: String,
    /// Raw tier; validated by the reconciler before any remote call.
    pub level: u8,
    pub supervisor_name: String,
    pub provider: Provider,
    pub model: String,
    pub context_window: u32,
    pub temperature: f64,
}

impl AgentSpec {
    /// Defaults offered when creating a new agent.
    pub fn create_defaults(catalog: &Catalog) -> Self {
        let provider = Provider::OpenAi;
        Self {
            name: "New Letta Agent".to_string(),
            persona: "I am a helpful AI assistant focused on providing clear and concise information."
                .to_string(),
            job_directives:
                "Your primary responsibility is to assist users with accurate information."
                    .to_string(),
            level: 1,
            supervisor_name: String::new(),
            provider,
            model: catalog
                .default_model(provider)
                .unwrap_or("gpt-4o-mini")
                .to_string(),
            context_window: DEFAULT_CONTEXT_WINDOW,
            temperature: 0.7,
        }
    }

    /// Values used for the edit form when the agent could not be retrieved.
    pub fn edit_fallback() -> Self {
        Self {
            name: String::new(),
            persona: String::new(),
            job_directives: String::new(),
            level: 1,
            supervisor_name: String::new(),
            provider: Provider::OpenAi,
            model: "gpt-4o-mini".to_string(),
            context_window: DEFAULT_CONTEXT_WINDOW,
            temperature: 0.7,
        }
    }

    /// Reconstruct the desired state a remote record was built from.
    ///
    /// Missing pieces take the edit fallback values.
    pub fn from_record(record: &AgentRecord) -> Self {
        let mut spec = Self::edit_fallback();
        spec.name = record.name.clone();
        spec.level = level_from_tags(&record.tags).map(Level::get).unwrap_or(1);
        spec.supervisor_name = supervisor_from_tags(&record.tags).unwrap_or_default();

        if let Some(block) = record.block(PERSONA_LABEL) {
            spec.persona = block.value.clone();
        }
        if let Some(block) = record.block(JOB_DIRECTIVES_LABEL) {
            spec.job_directives = block.value.clone();
        }

        if let Some(llm) = &record.llm_config {
            spec.provider = llm.model_endpoint_type.parse().unwrap_or(Provider::OpenAi);
            spec.model = llm.model.clone();
            spec.context_window = llm.context_window;
            spec.temperature = llm.temperature;
        }
        spec
    }

    /// Tags encoding the agent's place in the hierarchy.
    pub fn tags(&self) -> Vec<String> {
        derive_tags(self.level, &self.supervisor_name)
    }
}

/// `["level_<level>", "<supervisor>_sub"]`.
pub fn derive_tags(level: u8, supervisor_name: &str) -> Vec<String> {
    vec![
        format!("{}{}", LEVEL_TAG_PREFIX, level),
        format!("{}{}", supervisor_name, SUPERVISOR_TAG_SUFFIX),
    ]
}

/// Tools a new agent starts with.
pub fn derive_tools(level: Level) -> Vec<String> {
    if level.is_supervisor() {
        vec![BROADCAST_TOOL_NAME.to_string()]
    } else {
        Vec::new()
    }
}

/// Level encoded in the first `level_*` tag.
pub fn level_from_tags(tags: &[String]) -> Option<Level> {
    let tag = tags.iter().find(|t| t.starts_with(LEVEL_TAG_PREFIX))?;
    tag.split('_')
        .nth(1)
        .and_then(|n| n.parse::<u8>().ok())
        .and_then(|n| Level::new(n).ok())
}

/// Supervisor encoded in the first `*_sub` tag.
pub fn supervisor_from_tags(tags: &[String]) -> Option<String> {
    tags.iter()
        .find_map(|t| t.strip_suffix(SUPERVISOR_TAG_SUFFIX))
        .map(str::to_string)
}
