//! HTTP client for a Letta-compatible agent server.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder};
use reqwest_eventsource::{retry, Event, EventSource};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use super::{
    AgentRecord, AgentService, AgentSummary, ClientError, CreateAgentRequest, MemoryBlock,
    UpdateAgentRequest,
};
use crate::chat::{ChunkStream, StreamChunk};
use crate::config::Config;

/// SSE payload that marks the end of a streamed turn.
const STREAM_DONE: &str = "[DONE]";

/// Reply to a synchronous message create.
#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    messages: Vec<Value>,
    #[serde(default)]
    usage: Option<Value>,
}

/// Agent server client over the v1 REST API.
#[derive(Clone)]
pub struct LettaClient {
    client: Client,
    base_url: Url,
    api_token: Option<String>,
}

impl LettaClient {
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_token: config.api_token.clone(),
        })
    }

    /// Build `<base>/v1/<segments...>`, percent-encoding each segment.
    fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .push("v1")
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, ClientError> {
        let response = self.authorize(builder).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ClientError::from_status(status.as_u16(), &body))
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ClientError> {
        let response = self.send(builder).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn user_message(text: &str) -> Value {
    json!({
        "messages": [
            {
                "role": "user",
                "content": text,
            }
        ]
    })
}

#[async_trait]
impl AgentService for LettaClient {
    async fn list_agents(&self) -> Result<Vec<AgentSummary>, ClientError> {
        let url = self.url(&["agents", ""])?;
        debug!(%url, "Listing agents");
        self.send_json(self.client.get(url)).await
    }

    async fn retrieve_agent(&self, agent_id: &str) -> Result<AgentRecord, ClientError> {
        let url = self.url(&["agents", agent_id])?;
        debug!(%url, "Retrieving agent");
        self.send_json(self.client.get(url)).await
    }

    async fn delete_agent(&self, agent_id: &str) -> Result<(), ClientError> {
        let url = self.url(&["agents", agent_id])?;
        debug!(%url, "Deleting agent");
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn create_agent(&self, request: &CreateAgentRequest) -> Result<AgentRecord, ClientError> {
        let url = self.url(&["agents", ""])?;
        debug!(%url, name = %request.name, "Creating agent");
        self.send_json(self.client.post(url).json(request)).await
    }

    async fn update_agent(
        &self,
        agent_id: &str,
        request: &UpdateAgentRequest,
    ) -> Result<AgentRecord, ClientError> {
        let url = self.url(&["agents", agent_id])?;
        debug!(%url, name = %request.name, "Updating agent");
        self.send_json(self.client.patch(url).json(request)).await
    }

    async fn update_memory_block(
        &self,
        agent_id: &str,
        label: &str,
        value: &str,
    ) -> Result<MemoryBlock, ClientError> {
        let url = self.url(&["agents", agent_id, "core-memory", "blocks", label])?;
        debug!(%url, "Updating memory block");
        self.send_json(self.client.patch(url).json(&json!({ "value": value })))
            .await
    }

    async fn attach_tool(&self, agent_id: &str, tool_id: &str) -> Result<AgentRecord, ClientError> {
        let url = self.url(&["agents", agent_id, "tools", "attach", tool_id])?;
        debug!(%url, "Attaching tool");
        self.send_json(self.client.patch(url)).await
    }

    async fn send_message(
        &self,
        agent_id: &str,
        text: &str,
    ) -> Result<Vec<StreamChunk>, ClientError> {
        let url = self.url(&["agents", agent_id, "messages"])?;
        debug!(%url, "Sending message");
        let response: MessageResponse = self
            .send_json(self.client.post(url).json(&user_message(text)))
            .await?;

        let mut chunks: Vec<StreamChunk> = response
            .messages
            .into_iter()
            .map(StreamChunk::from_value)
            .collect();
        if let Some(mut usage) = response.usage {
            if let Value::Object(map) = &mut usage {
                map.entry("message_type")
                    .or_insert_with(|| Value::String("usage_statistics".to_string()));
            }
            chunks.push(StreamChunk::from_value(usage));
        }
        Ok(chunks)
    }

    async fn stream_message(&self, agent_id: &str, text: &str) -> Result<ChunkStream, ClientError> {
        let url = self.url(&["agents", agent_id, "messages", "stream"])?;
        debug!(%url, "Opening message stream");
        let builder = self.authorize(self.client.post(url).json(&user_message(text)));
        let mut source =
            EventSource::new(builder).map_err(|e| ClientError::Stream(e.to_string()))?;
        // A dropped turn is lost; reconnecting would replay the user message.
        source.set_retry_policy(Box::new(retry::Never));

        let stream = async_stream::stream! {
            while let Some(event) = source.next().await {
                match event {
                    Ok(Event::Open) => continue,
                    Ok(Event::Message(message)) => {
                        let data = message.data.trim();
                        if data == STREAM_DONE {
                            break;
                        }
                        let value = serde_json::from_str::<Value>(data)
                            .unwrap_or_else(|_| Value::String(data.to_string()));
                        yield Ok(StreamChunk::from_value(value));
                    }
                    Err(reqwest_eventsource::Error::StreamEnded) => break,
                    Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                        let body = response.text().await.unwrap_or_default();
                        yield Err(ClientError::from_status(status.as_u16(), &body));
                        break;
                    }
                    Err(e) => {
                        yield Err(ClientError::Stream(e.to_string()));
                        break;
                    }
                }
            }
            source.close();
        };

        Ok(Box::pin(stream))
    }
}

impl std::fmt::Debug for LettaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LettaClient")
            .field("base_url", &self.base_url.as_str())
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
