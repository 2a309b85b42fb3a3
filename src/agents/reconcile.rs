//! Agent configuration reconciler.
//!
//! Turns a desired [`AgentSpec`] into the exact calls the agent server needs.
//!
//! # Flow
//! ```text
//! 1. Validate the desired state (nothing is sent on failure)
//! 2. Derive memory blocks, LLM config, embedding config, tags and tools
//! 3. Build a plan:
//!    Create -> create agent
//!    Modify -> update agent, update job_directives, update persona,
//!              attach broadcast tool (supervisors only)
//! 4. Execute the plan in order, stopping at the first failure
//! ```
//!
//! A modify that fails partway is not rolled back; the error lists which
//! steps were applied.

use std::fmt;
use std::sync::Arc;

use tracing::{error, info};

use crate::catalog::{is_allowed_context_window, Catalog};
use crate::client::{
    AgentRecord, AgentService, CreateAgentRequest, EmbeddingConfig, LlmConfig, Memory,
    MemoryBlock, UpdateAgentRequest,
};
use crate::config::Config;

use super::types::{
    derive_tools, AgentSpec, Level, JOB_DIRECTIVES_LABEL, JOB_DIRECTIVES_LIMIT, PERSONA_LABEL,
    PERSONA_LIMIT,
};
use super::{AgentError, AgentResult};

/// What the operator asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    Create,
    Modify,
}

/// One remote call of a plan, used to report progress and failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileStep {
    CreateAgent,
    UpdateAgent,
    UpdateMemoryBlock(String),
    AttachTool(String),
}

impl fmt::Display for ReconcileStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateAgent => write!(f, "create agent"),
            Self::UpdateAgent => write!(f, "update agent"),
            Self::UpdateMemoryBlock(label) => write!(f, "update memory block '{}'", label),
            Self::AttachTool(tool_id) => write!(f, "attach tool {}", tool_id),
        }
    }
}

/// Everything derived from a spec, independent of the action.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedConfig {
    pub memory_blocks: Vec<MemoryBlock>,
    pub llm_config: LlmConfig,
    pub embedding_config: EmbeddingConfig,
    pub tags: Vec<String>,
    pub tools: Vec<String>,
}

impl DerivedConfig {
    /// Pure derivation from an already validated spec.
    pub fn derive(spec: &AgentSpec, level: Level, catalog: &Catalog) -> Self {
        let memory_blocks = vec![
            MemoryBlock {
                label: JOB_DIRECTIVES_LABEL.to_string(),
                value: spec.job_directives.clone(),
                limit: Some(JOB_DIRECTIVES_LIMIT),
            },
            MemoryBlock {
                label: PERSONA_LABEL.to_string(),
                value: spec.persona.clone(),
                limit: Some(PERSONA_LIMIT),
            },
        ];

        let llm_config = LlmConfig {
            model: spec.model.clone(),
            model_endpoint_type: spec.provider.as_str().to_string(),
            model_endpoint: catalog.endpoint(spec.provider).map(str::to_string),
            context_window: spec.context_window,
            temperature: spec.temperature,
        };

        Self {
            memory_blocks,
            llm_config,
            embedding_config: catalog.embedding_config(spec.provider),
            tags: spec.tags(),
            tools: derive_tools(level),
        }
    }
}

/// The call that creates or updates the agent record itself.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimaryCall {
    Create(CreateAgentRequest),
    Update {
        agent_id: String,
        request: UpdateAgentRequest,
    },
}

/// Calls that follow an update, all against the same agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUpCall {
    UpdateMemoryBlock { label: String, value: String },
    AttachTool { tool_id: String },
}

impl FollowUpCall {
    pub fn step(&self) -> ReconcileStep {
        match self {
            Self::UpdateMemoryBlock { label, .. } => ReconcileStep::UpdateMemoryBlock(label.clone()),
            Self::AttachTool { tool_id } => ReconcileStep::AttachTool(tool_id.clone()),
        }
    }
}

/// Ordered remote calls for one reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilePlan {
    pub derived: DerivedConfig,
    pub primary: PrimaryCall,
    pub follow_ups: Vec<FollowUpCall>,
}

impl ReconcilePlan {
    pub fn primary_step(&self) -> ReconcileStep {
        match &self.primary {
            PrimaryCall::Create(_) => ReconcileStep::CreateAgent,
            PrimaryCall::Update { .. } => ReconcileStep::UpdateAgent,
        }
    }

    pub fn steps(&self) -> Vec<ReconcileStep> {
        std::iter::once(self.primary_step())
            .chain(self.follow_ups.iter().map(FollowUpCall::step))
            .collect()
    }
}

/// Applies agent specs to the agent server.
pub struct Reconciler {
    service: Arc<dyn AgentService>,
    catalog: &'static Catalog,
    broadcast_tool_id: String,
}

impl Reconciler {
    pub fn new(service: Arc<dyn AgentService>, config: &Config) -> Self {
        Self::with_catalog(service, Catalog::builtin(), config.broadcast_tool_id.clone())
    }

    pub fn with_catalog(
        service: Arc<dyn AgentService>,
        catalog: &'static Catalog,
        broadcast_tool_id: impl Into<String>,
    ) -> Self {
        Self {
            service,
            catalog,
            broadcast_tool_id: broadcast_tool_id.into(),
        }
    }

    /// Validate a spec and work out the calls needed, without sending anything.
    ///
    /// # Preconditions
    /// - `existing_agent_id` is set (and non-empty) iff `action == Modify`
    pub fn plan(
        &self,
        action: ReconcileAction,
        spec: &AgentSpec,
        existing_agent_id: Option<&str>,
    ) -> AgentResult<ReconcilePlan> {
        match action {
            ReconcileAction::Create => {
                let level = Level::new(spec.level)?;
                if spec.supervisor_name.trim().is_empty() {
                    return Err(AgentError::MissingSupervisor);
                }
                self.check_spec(spec)?;

                let derived = DerivedConfig::derive(spec, level, self.catalog);
                let request = CreateAgentRequest {
                    name: spec.name.clone(),
                    memory_blocks: derived.memory_blocks.clone(),
                    llm_config: derived.llm_config.clone(),
                    embedding_config: derived.embedding_config.clone(),
                    tags: derived.tags.clone(),
                    tools: derived.tools.clone(),
                };
                Ok(ReconcilePlan {
                    derived,
                    primary: PrimaryCall::Create(request),
                    follow_ups: Vec::new(),
                })
            }
            ReconcileAction::Modify => {
                let agent_id = existing_agent_id
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .ok_or(AgentError::MissingAgentId)?;
                let level = Level::new(spec.level)?;
                self.check_spec(spec)?;

                let derived = DerivedConfig::derive(spec, level, self.catalog);
                let request = UpdateAgentRequest {
                    name: spec.name.clone(),
                    llm_config: derived.llm_config.clone(),
                    embedding_config: derived.embedding_config.clone(),
                    tags: derived.tags.clone(),
                };
                let mut follow_ups: Vec<FollowUpCall> = derived
                    .memory_blocks
                    .iter()
                    .map(|block| FollowUpCall::UpdateMemoryBlock {
                        label: block.label.clone(),
                        value: block.value.clone(),
                    })
                    .collect();
                if level.is_supervisor() {
                    follow_ups.push(FollowUpCall::AttachTool {
                        tool_id: self.broadcast_tool_id.clone(),
                    });
                }
                Ok(ReconcilePlan {
                    derived,
                    primary: PrimaryCall::Update {
                        agent_id: agent_id.to_string(),
                        request,
                    },
                    follow_ups,
                })
            }
        }
    }

    /// Plan and apply a spec. Returns the agent as the server last reported it.
    pub async fn reconcile(
        &self,
        action: ReconcileAction,
        spec: &AgentSpec,
        existing_agent_id: Option<&str>,
    ) -> AgentResult<AgentRecord> {
        let plan = self.plan(action, spec, existing_agent_id).map_err(|e| {
            error!("Rejected {:?} of agent '{}': {}", action, spec.name, e);
            e
        })?;
        self.execute(plan).await
    }

    pub async fn create(&self, spec: &AgentSpec) -> AgentResult<AgentRecord> {
        self.reconcile(ReconcileAction::Create, spec, None).await
    }

    pub async fn modify(&self, agent_id: &str, spec: &AgentSpec) -> AgentResult<AgentRecord> {
        self.reconcile(ReconcileAction::Modify, spec, Some(agent_id))
            .await
    }

    /// Run a plan's calls in order, stopping at the first failure.
    pub async fn execute(&self, plan: ReconcilePlan) -> AgentResult<AgentRecord> {
        let mut record = match &plan.primary {
            PrimaryCall::Create(request) => {
                let record = self.service.create_agent(request).await.map_err(|e| {
                    error!("Failed to create agent '{}': {}", request.name, e);
                    AgentError::Remote(e)
                })?;
                info!(agent_id = %record.id, name = %record.name, tags = ?record.tags, "Created agent");
                record
            }
            PrimaryCall::Update { agent_id, request } => {
                let record = self
                    .service
                    .update_agent(agent_id, request)
                    .await
                    .map_err(|e| {
                        error!("Failed to update agent {}: {}", agent_id, e);
                        AgentError::Remote(e)
                    })?;
                info!(agent_id = %agent_id, tags = ?request.tags, "Updated agent");
                record
            }
        };

        let agent_id = match &plan.primary {
            PrimaryCall::Create(_) => record.id.clone(),
            PrimaryCall::Update { agent_id, .. } => agent_id.clone(),
        };
        let mut completed = vec![plan.primary_step()];

        for call in &plan.follow_ups {
            let result = match call {
                FollowUpCall::UpdateMemoryBlock { label, value } => self
                    .service
                    .update_memory_block(&agent_id, label, value)
                    .await
                    .map(|block| replace_block(&mut record, block)),
                FollowUpCall::AttachTool { tool_id } => self
                    .service
                    .attach_tool(&agent_id, tool_id)
                    .await
                    .map(|updated| record = updated),
            };

            if let Err(source) = result {
                let failed = call.step();
                error!(
                    agent_id = %agent_id,
                    "Modify stopped at {} after {} step(s); earlier steps stay applied: {}",
                    failed,
                    completed.len(),
                    source
                );
                return Err(AgentError::PartialUpdate {
                    agent_id,
                    failed,
                    completed,
                    source,
                });
            }
            info!(agent_id = %agent_id, "Applied {}", call.step());
            completed.push(call.step());
        }

        Ok(record)
    }

    /// Reject values the catalog does not allow.
    fn check_spec(&self, spec: &AgentSpec) -> AgentResult<()> {
        if !self.catalog.supports_model(spec.provider, &spec.model) {
            return Err(AgentError::InvalidSpec(format!(
                "model '{}' is not offered for provider {} (expected one of: {})",
                spec.model,
                spec.provider,
                self.catalog.models(spec.provider).join(", ")
            )));
        }
        if !is_allowed_context_window(spec.context_window) {
            return Err(AgentError::InvalidSpec(format!(
                "context window {} is not supported",
                spec.context_window
            )));
        }
        if !(0.0..=1.0).contains(&spec.temperature) {
            return Err(AgentError::InvalidSpec(format!(
                "temperature {} must be between 0.0 and 1.0",
                spec.temperature
            )));
        }
        check_length("persona", &spec.persona, PERSONA_LIMIT)?;
        check_length("job directives", &spec.job_directives, JOB_DIRECTIVES_LIMIT)?;
        Ok(())
    }
}

fn check_length(field: &str, value: &str, limit: u32) -> AgentResult<()> {
    let len = value.chars().count();
    if len > limit as usize {
        return Err(AgentError::InvalidSpec(format!(
            "{} is {} characters long (limit {})",
            field, len, limit
        )));
    }
    Ok(())
}

/// Mirror a block update into the locally held record.
fn replace_block(record: &mut AgentRecord, block: MemoryBlock) {
    let memory = record.memory.get_or_insert_with(Memory::default);
    match memory.blocks.iter_mut().find(|b| b.label == block.label) {
        Some(existing) => *existing = block,
        None => memory.blocks.push(block),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::types::BROADCAST_TOOL_NAME;
    use crate::catalog::{Provider, OPENAI_EMBEDDING};
    use crate::client::mock::{Call, MockService, Op};

    const TOOL_ID: &str = "tool-broadcast";

    fn spec() -> AgentSpec {
        AgentSpec {
            name: "A".to_string(),
            persona: "p".to_string(),
            job_directives: "d".to_string(),
            level: 2,
            supervisor_name: "sup".to_string(),
            provider: Provider::OpenAi,
            model: "gpt-4o-mini".to_string(),
            context_window: 16000,
            temperature: 0.7,
        }
    }

    fn reconciler(service: &Arc<MockService>) -> Reconciler {
        let service: Arc<dyn AgentService> = service.clone();
        Reconciler::with_catalog(service, Catalog::builtin(), TOOL_ID)
    }

    #[tokio::test]
    async fn test_invalid_level_makes_no_remote_calls() {
        let service = Arc::new(MockService::new());
        let reconciler = reconciler(&service);

        for level in [0u8, 4, 9, u8::MAX] {
            let spec = AgentSpec { level, ..spec() };
            let err = reconciler.create(&spec).await.unwrap_err();
            assert!(matches!(err, AgentError::InvalidLevel(l) if l == level));
            let err = reconciler.modify("agent-1", &spec).await.unwrap_err();
            assert!(matches!(err, AgentError::InvalidLevel(_)));
        }
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_modify_requires_agent_id() {
        let service = Arc::new(MockService::new());
        let reconciler = reconciler(&service);

        for id in [None, Some(""), Some("   ")] {
            let err = reconciler
                .reconcile(ReconcileAction::Modify, &spec(), id)
                .await
                .unwrap_err();
            assert!(matches!(err, AgentError::MissingAgentId));
            assert!(err.is_validation());
        }
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_requires_supervisor() {
        let service = Arc::new(MockService::new());
        let spec = AgentSpec {
            supervisor_name: " ".to_string(),
            ..spec()
        };
        let err = reconciler(&service).create(&spec).await.unwrap_err();
        assert!(matches!(err, AgentError::MissingSupervisor));
        assert!(service.calls().is_empty());
    }

    #[test]
    fn test_catalog_violations_are_rejected() {
        let service = Arc::new(MockService::new());
        let reconciler = reconciler(&service);

        let cases = [
            AgentSpec {
                model: "claude-3-opus".to_string(),
                ..spec()
            },
            AgentSpec {
                context_window: 1000,
                ..spec()
            },
            AgentSpec {
                temperature: 1.5,
                ..spec()
            },
            AgentSpec {
                temperature: f64::NAN,
                ..spec()
            },
            AgentSpec {
                persona: "x".repeat(3001),
                ..spec()
            },
            AgentSpec {
                job_directives: "x".repeat(2001),
                ..spec()
            },
        ];
        for case in cases {
            let err = reconciler
                .plan(ReconcileAction::Create, &case, None)
                .unwrap_err();
            assert!(matches!(err, AgentError::InvalidSpec(_)), "{:?}", case);
        }
    }

    #[test]
    fn test_limits_are_inclusive() {
        let service = Arc::new(MockService::new());
        let spec = AgentSpec {
            persona: "é".repeat(3000),
            job_directives: "x".repeat(2000),
            ..spec()
        };
        assert!(reconciler(&service)
            .plan(ReconcileAction::Create, &spec, None)
            .is_ok());
    }

    #[test]
    fn test_create_plan_for_supervisor() {
        let service = Arc::new(MockService::new());
        let plan = reconciler(&service)
            .plan(ReconcileAction::Create, &spec(), None)
            .unwrap();

        assert_eq!(plan.derived.tags, vec!["level_2", "sup_sub"]);
        assert_eq!(plan.derived.tools, vec![BROADCAST_TOOL_NAME]);
        assert_eq!(plan.steps(), vec![ReconcileStep::CreateAgent]);

        let PrimaryCall::Create(request) = &plan.primary else {
            panic!("expected a create call");
        };
        assert_eq!(request.name, "A");
        assert_eq!(request.tools, vec![BROADCAST_TOOL_NAME]);
        assert_eq!(
            request.memory_blocks,
            vec![
                MemoryBlock {
                    label: "job_directives".to_string(),
                    value: "d".to_string(),
                    limit: Some(2000),
                },
                MemoryBlock {
                    label: "persona".to_string(),
                    value: "p".to_string(),
                    limit: Some(3000),
                },
            ]
        );
        assert_eq!(
            request.llm_config,
            LlmConfig {
                model: "gpt-4o-mini".to_string(),
                model_endpoint_type: "openai".to_string(),
                model_endpoint: Some("https://api.openai.com/v1".to_string()),
                context_window: 16000,
                temperature: 0.7,
            }
        );
        assert_eq!(request.embedding_config, OPENAI_EMBEDDING.to_config());
    }

    #[test]
    fn test_embedding_fallback_for_every_non_native_provider() {
        let catalog = Catalog::builtin();
        for provider in [Provider::Anthropic, Provider::Groq, Provider::Mistral] {
            let spec = AgentSpec {
                provider,
                model: catalog.default_model(provider).unwrap().to_string(),
                ..spec()
            };
            let derived = DerivedConfig::derive(&spec, Level::new(1).unwrap(), catalog);
            assert_eq!(derived.embedding_config.embedding_model, "text-embedding-3-small");
            assert_eq!(derived.embedding_config.embedding_endpoint_type, "openai");
            assert_eq!(derived.embedding_config.embedding_dim, 1536);
            assert_eq!(
                derived.llm_config.model_endpoint.as_deref(),
                catalog.endpoint(provider)
            );
        }
    }

    #[test]
    fn test_modify_plan_order() {
        let service = Arc::new(MockService::new());
        let reconciler = reconciler(&service);

        let plan = reconciler
            .plan(ReconcileAction::Modify, &spec(), Some("agent-1"))
            .unwrap();
        assert_eq!(
            plan.steps(),
            vec![
                ReconcileStep::UpdateAgent,
                ReconcileStep::UpdateMemoryBlock("job_directives".to_string()),
                ReconcileStep::UpdateMemoryBlock("persona".to_string()),
                ReconcileStep::AttachTool(TOOL_ID.to_string()),
            ]
        );

        let worker = AgentSpec { level: 1, ..spec() };
        let plan = reconciler
            .plan(ReconcileAction::Modify, &worker, Some("agent-1"))
            .unwrap();
        assert_eq!(plan.steps().len(), 3);
        assert!(plan.derived.tools.is_empty());
    }

    #[tokio::test]
    async fn test_create_then_retrieve_round_trip() {
        let service = Arc::new(MockService::new());
        let created = reconciler(&service).create(&spec()).await.unwrap();

        let fetched = service.retrieve_agent(&created.id).await.unwrap();
        assert_eq!(fetched.name, "A");
        let llm = fetched.llm_config.unwrap();
        assert_eq!(llm.model, "gpt-4o-mini");
        assert_eq!(llm.temperature, 0.7);
        assert_eq!(fetched.tags, vec!["level_2", "sup_sub"]);
        assert_eq!(
            service.calls()[0],
            Call::CreateAgent {
                name: "A".to_string(),
                tools: vec![BROADCAST_TOOL_NAME.to_string()],
            }
        );
    }

    #[tokio::test]
    async fn test_modify_applies_all_steps() {
        let service = Arc::new(MockService::new());
        let reconciler = reconciler(&service);
        let created = reconciler
            .create(&AgentSpec { level: 1, ..spec() })
            .await
            .unwrap();

        let updated_spec = AgentSpec {
            name: "B".to_string(),
            persona: "new persona".to_string(),
            level: 3,
            supervisor_name: "boss".to_string(),
            provider: Provider::Cohere,
            model: "command-r".to_string(),
            ..spec()
        };
        let record = reconciler.modify(&created.id, &updated_spec).await.unwrap();

        assert_eq!(record.name, "B");
        assert_eq!(record.tags, vec!["level_3", "boss_sub"]);
        assert_eq!(record.block("persona").unwrap().value, "new persona");
        assert_eq!(
            record.embedding_config.unwrap().embedding_model,
            "embed-english-v3.0"
        );

        let calls = service.calls();
        assert_eq!(
            &calls[1..],
            &[
                Call::UpdateAgent {
                    agent_id: created.id.clone(),
                    name: "B".to_string(),
                },
                Call::UpdateMemoryBlock {
                    agent_id: created.id.clone(),
                    label: "job_directives".to_string(),
                },
                Call::UpdateMemoryBlock {
                    agent_id: created.id.clone(),
                    label: "persona".to_string(),
                },
                Call::AttachTool {
                    agent_id: created.id.clone(),
                    tool_id: TOOL_ID.to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_modify_unknown_agent_is_remote_error() {
        let service = Arc::new(MockService::new());
        let err = reconciler(&service)
            .modify("agent-missing", &spec())
            .await
            .unwrap_err();

        match err {
            AgentError::Remote(e) => assert!(e.is_not_found()),
            other => panic!("expected remote error, got {:?}", other),
        }
        assert_eq!(service.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_modify_partial_failure_keeps_earlier_steps() {
        let service = Arc::new(MockService::new());
        let reconciler = reconciler(&service);
        let created = reconciler.create(&spec()).await.unwrap();

        service.fail_on(Op::UpdateMemoryBlock("persona".to_string()));
        let renamed = AgentSpec {
            name: "Renamed".to_string(),
            ..spec()
        };
        let err = reconciler.modify(&created.id, &renamed).await.unwrap_err();

        match err {
            AgentError::PartialUpdate {
                agent_id,
                failed,
                completed,
                ..
            } => {
                assert_eq!(agent_id, created.id);
                assert_eq!(failed, ReconcileStep::UpdateMemoryBlock("persona".to_string()));
                assert_eq!(
                    completed,
                    vec![
                        ReconcileStep::UpdateAgent,
                        ReconcileStep::UpdateMemoryBlock("job_directives".to_string()),
                    ]
                );
            }
            other => panic!("expected partial update, got {:?}", other),
        }

        // The rename stuck and the tool attach was never attempted.
        let current = service.retrieve_agent(&created.id).await.unwrap();
        assert_eq!(current.name, "Renamed");
        assert!(!service
            .calls()
            .iter()
            .any(|c| matches!(c, Call::AttachTool { .. })));
    }

    #[tokio::test]
    async fn test_create_remote_failure() {
        let service = Arc::new(MockService::new());
        service.fail_on(Op::CreateAgent);
        let err = reconciler(&service).create(&spec()).await.unwrap_err();
        assert!(matches!(err, AgentError::Remote(_)));
        assert!(!err.is_validation());
    }
}
