//! Provider catalog - the fixed table of LLM providers the console can target.
//!
//! Each provider maps to its API base URL, the models an operator may pick,
//! and optionally a native embedding profile. Providers without one borrow the
//! OpenAI profile so every agent still gets usable embeddings.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::EmbeddingConfig;

/// Context window sizes an agent may be configured with.
pub const CONTEXT_WINDOWS: [u32; 6] = [4096, 8192, 16000, 32768, 128000, 200000];

/// Context window preselected for new agents.
pub const DEFAULT_CONTEXT_WINDOW: u32 = 16000;

/// LLM provider backing an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
    Groq,
    Mistral,
    Cohere,
}

impl Provider {
    pub const ALL: [Provider; 5] = [
        Provider::OpenAi,
        Provider::Anthropic,
        Provider::Groq,
        Provider::Mistral,
        Provider::Cohere,
    ];

    /// Identifier used as `model_endpoint_type` on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Groq => "groq",
            Self::Mistral => "mistral",
            Self::Cohere => "cohere",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CatalogError::UnknownProvider(s.to_string()))
    }
}

/// Embedding model/endpoint/dimension triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddingProfile {
    pub model: &'static str,
    pub endpoint_type: &'static str,
    pub endpoint: &'static str,
    pub dim: u32,
}

impl EmbeddingProfile {
    pub fn to_config(&self) -> EmbeddingConfig {
        EmbeddingConfig {
            embedding_model: self.model.to_string(),
            embedding_endpoint_type: self.endpoint_type.to_string(),
            embedding_endpoint: Some(self.endpoint.to_string()),
            embedding_dim: self.dim,
        }
    }
}

pub const OPENAI_EMBEDDING: EmbeddingProfile = EmbeddingProfile {
    model: "text-embedding-3-small",
    endpoint_type: "openai",
    endpoint: "https://api.openai.com/v1",
    dim: 1536,
};

pub const COHERE_EMBEDDING: EmbeddingProfile = EmbeddingProfile {
    model: "embed-english-v3.0",
    endpoint_type: "cohere",
    endpoint: "https://api.cohere.ai/v1",
    dim: 1024,
};

/// Catalog row for one provider.
#[derive(Debug, Clone)]
pub struct ProviderEntry {
    pub endpoint: &'static str,
    pub models: &'static [&'static str],
    pub embedding: Option<EmbeddingProfile>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Unknown provider '{0}'. Expected one of: openai, anthropic, groq, mistral, cohere")]
    UnknownProvider(String),

    #[error("Provider {0} has no catalog entry")]
    MissingEntry(Provider),

    #[error("Provider {0} has no models in the catalog")]
    NoModels(Provider),

    #[error("Fallback embedding provider {0} has no embedding profile")]
    MissingFallbackEmbedding(Provider),
}

/// Immutable provider table.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: BTreeMap<Provider, ProviderEntry>,
    fallback_embedding: Provider,
}

impl Catalog {
    /// The catalog compiled into the binary.
    pub fn builtin() -> &'static Catalog {
        static CATALOG: OnceLock<Catalog> = OnceLock::new();
        CATALOG.get_or_init(|| {
            let mut entries = BTreeMap::new();
            entries.insert(
                Provider::OpenAi,
                ProviderEntry {
                    endpoint: "https://api.openai.com/v1",
                    models: &["gpt-4o-mini", "gpt-4-turbo", "gpt-3.5-turbo"],
                    embedding: Some(OPENAI_EMBEDDING),
                },
            );
            entries.insert(
                Provider::Anthropic,
                ProviderEntry {
                    endpoint: "https://api.anthropic.com/v1",
                    models: &["claude-3-haiku", "claude-3-sonnet", "claude-3-opus"],
                    embedding: None,
                },
            );
            entries.insert(
                Provider::Groq,
                ProviderEntry {
                    endpoint: "https://api.groq.com/v1",
                    models: &["llama3-70b-8192", "llama3-8b-8192", "mixtral-8x7b-32768"],
                    embedding: None,
                },
            );
            entries.insert(
                Provider::Mistral,
                ProviderEntry {
                    endpoint: "https://api.mistral.ai/v1",
                    models: &[
                        "mistral-large-latest",
                        "mistral-medium-latest",
                        "mistral-small-latest",
                    ],
                    embedding: None,
                },
            );
            entries.insert(
                Provider::Cohere,
                ProviderEntry {
                    endpoint: "https://api.cohere.ai/v1",
                    models: &["command-r-plus", "command-r", "command"],
                    embedding: Some(COHERE_EMBEDDING),
                },
            );
            Catalog::new(entries, Provider::OpenAi)
        })
    }

    pub fn new(entries: BTreeMap<Provider, ProviderEntry>, fallback_embedding: Provider) -> Self {
        Self {
            entries,
            fallback_embedding,
        }
    }

    /// Check that every provider is fully described.
    ///
    /// Run once at startup so a missing row fails immediately instead of on
    /// the first reconciliation that touches it.
    pub fn validate(&self) -> Result<(), CatalogError> {
        for provider in Provider::ALL {
            let entry = self
                .entries
                .get(&provider)
                .ok_or(CatalogError::MissingEntry(provider))?;
            if entry.models.is_empty() {
                return Err(CatalogError::NoModels(provider));
            }
        }
        let fallback = self
            .entries
            .get(&self.fallback_embedding)
            .ok_or(CatalogError::MissingEntry(self.fallback_embedding))?;
        if fallback.embedding.is_none() {
            return Err(CatalogError::MissingFallbackEmbedding(self.fallback_embedding));
        }
        Ok(())
    }

    /// API base URL for a provider, if the catalog knows it.
    pub fn endpoint(&self, provider: Provider) -> Option<&'static str> {
        self.entries.get(&provider).map(|e| e.endpoint)
    }

    /// Models an operator may pick for a provider.
    pub fn models(&self, provider: Provider) -> &'static [&'static str] {
        self.entries.get(&provider).map(|e| e.models).unwrap_or(&[])
    }

    pub fn supports_model(&self, provider: Provider, model: &str) -> bool {
        self.models(provider).contains(&model)
    }

    /// First catalog model for a provider, used as the form default.
    pub fn default_model(&self, provider: Provider) -> Option<&'static str> {
        self.models(provider).first().copied()
    }

    /// Embedding profile for a provider, falling back to the default provider's.
    pub fn embedding_profile(&self, provider: Provider) -> EmbeddingProfile {
        self.entries
            .get(&provider)
            .and_then(|e| e.embedding)
            .or_else(|| {
                self.entries
                    .get(&self.fallback_embedding)
                    .and_then(|e| e.embedding)
            })
            .unwrap_or(OPENAI_EMBEDDING)
    }

    pub fn embedding_config(&self, provider: Provider) -> EmbeddingConfig {
        self.embedding_profile(provider).to_config()
    }

    pub fn providers(&self) -> impl Iterator<Item = (Provider, &ProviderEntry)> {
        self.entries.iter().map(|(p, e)| (*p, e))
    }
}

pub fn is_allowed_context_window(window: u32) -> bool {
    CONTEXT_WINDOWS.contains(&window)
}
