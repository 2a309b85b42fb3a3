//! Partial edits of an agent, applied on top of its current state.

use tracing::warn;

use crate::catalog::{Catalog, Provider};

use super::{AgentDirectory, AgentError, AgentResult, AgentSpec};

/// Fields an operator chose to change. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpecOverrides {
    pub name: Option<String>,
    pub persona: Option<String>,
    pub job_directives: Option<String>,
    pub level: Option<u8>,
    pub supervisor_name: Option<String>,
    pub provider: Option<Provider>,
    pub model: Option<String>,
    pub context_window: Option<u32>,
    pub temperature: Option<f64>,
}

impl SpecOverrides {
    /// True when every identity and memory field is given, so nothing of
    /// the current record would survive an update anyway.
    pub fn covers_identity(&self) -> bool {
        self.name.is_some()
            && self.persona.is_some()
            && self.job_directives.is_some()
            && self.level.is_some()
            && self.supervisor_name.is_some()
    }

    /// Overlay the given fields onto `spec`.
    ///
    /// Switching provider without naming a model picks the provider's first
    /// model when the current one is not offered by it.
    pub fn apply(self, spec: &mut AgentSpec, catalog: &Catalog) {
        if let Some(name) = self.name {
            spec.name = name;
        }
        if let Some(persona) = self.persona {
            spec.persona = persona;
        }
        if let Some(directives) = self.job_directives {
            spec.job_directives = directives;
        }
        if let Some(level) = self.level {
            spec.level = level;
        }
        if let Some(supervisor) = self.supervisor_name {
            spec.supervisor_name = supervisor;
        }
        if let Some(provider) = self.provider {
            spec.provider = provider;
        }
        match self.model {
            Some(model) => spec.model = model,
            None if !catalog.supports_model(spec.provider, &spec.model) => {
                if let Some(model) = catalog.default_model(spec.provider) {
                    spec.model = model.to_string();
                }
            }
            None => {}
        }
        if let Some(window) = self.context_window {
            spec.context_window = window;
        }
        if let Some(temperature) = self.temperature {
            spec.temperature = temperature;
        }
    }

    /// Build the desired state for updating `agent_id`.
    ///
    /// The current record is the base. If it cannot be read, the edit
    /// fallback is used only when the overrides replace every identity and
    /// memory field; otherwise the read error is returned and nothing is sent.
    pub async fn resolve_update(
        self,
        directory: &AgentDirectory,
        agent_id: &str,
        catalog: &Catalog,
    ) -> AgentResult<AgentSpec> {
        let mut spec = match directory.retrieve(agent_id).await {
            Ok(record) => AgentSpec::from_record(&record),
            Err(e) if self.covers_identity() => {
                warn!(agent_id = %agent_id, "Agent unreadable, updating from given fields only: {}", e);
                AgentSpec::edit_fallback()
            }
            Err(e) => return Err(AgentError::Remote(e)),
        };
        self.apply(&mut spec, catalog);
        Ok(spec)
    }
}
