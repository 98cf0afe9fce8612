use super::interfaces::{ChatBackend, ChunkStream};
use crate::config::ModelSettings;
use crate::types::{BackendError, ReviewTask, StreamChunk};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{header, Client};
use reqwest_eventsource::{retry, Event, RequestBuilderExt};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Streaming client for OpenAI-compatible chat completion endpoints
/// (DashScope compatible mode by default).
pub struct OpenAiChatClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiChatClient {
    pub fn new(settings: &ModelSettings) -> Result<Self> {
        let api_key = settings
            .api_key
            .clone()
            .context("Chat backend API key not found")?;

        // Only the connection phase gets a client-level timeout; streams
        // stay open as long as the backend keeps emitting. The pipeline's
        // stage timeout bounds the total duration.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
        })
    }
}

#[async_trait]
impl ChatBackend for OpenAiChatClient {
    async fn stream_chat(&self, task: &ReviewTask) -> Result<ChunkStream, BackendError> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": task.system_prompt},
                {"role": "user", "content": task.user_message},
            ],
            "stream": true,
        });

        let role = task.role;
        debug!(%role, model = %self.model, "Opening completion stream");

        let mut source = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&body)
            .eventsource()
            .map_err(|e| BackendError::Stream(e.to_string()))?;

        // Each stage attempts exactly once; a dropped connection is a
        // stage failure, not a reconnect.
        source.set_retry_policy(Box::new(retry::Never));

        let stream = source
            .take_while(|event| {
                futures::future::ready(!matches!(
                    event,
                    Err(reqwest_eventsource::Error::StreamEnded)
                ))
            })
            .filter_map(move |event| async move {
                match event {
                    Ok(Event::Open) => None,
                    Ok(Event::Message(message)) if message.data.trim() == "[DONE]" => {
                        debug!(%role, "Completion stream finished");
                        None
                    }
                    Ok(Event::Message(message)) => match parse_chunk(&message.data) {
                        Ok(Some(chunk)) => Some(Ok(chunk)),
                        Ok(None) => None,
                        Err(err) => Some(Err(err)),
                    },
                    Err(reqwest_eventsource::Error::StreamEnded) => None,
                    Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                        let body = response.text().await.unwrap_or_default();
                        Some(Err(BackendError::Status {
                            status: status.as_u16(),
                            body,
                        }))
                    }
                    Err(err) => Some(Err(BackendError::Stream(err.to_string()))),
                }
            })
            .boxed();

        Ok(stream)
    }

    async fn health_check(&self) -> Result<bool, BackendError> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .send()
            .await?;

        Ok(response.status().is_success())
    }
}

/// One server-sent completion chunk in OpenAI wire format.
#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ChunkToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChunkToolCall {
    #[serde(default)]
    function: Option<ChunkToolFunction>,
}

#[derive(Debug, Deserialize)]
struct ChunkToolFunction {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Map one SSE data payload to a stream chunk. Payloads that carry neither
/// text nor a tool invocation (role preludes, finish markers) yield None.
fn parse_chunk(data: &str) -> Result<Option<StreamChunk>, BackendError> {
    let chunk: ChatCompletionChunk = serde_json::from_str(data)
        .map_err(|e| BackendError::Malformed(format!("{e}: {data}")))?;

    if let Some(error) = chunk.error {
        return Err(BackendError::Stream(error.message));
    }

    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(None);
    };

    let ChunkDelta { content, tool_calls } = choice.delta;

    if let Some(content) = content {
        if !content.is_empty() {
            return Ok(Some(StreamChunk::TextDelta(content)));
        }
    }

    if let Some(calls) = tool_calls {
        if let Some(name) = calls
            .into_iter()
            .filter_map(|call| call.function.and_then(|f| f.name))
            .next()
        {
            return Ok(Some(StreamChunk::ToolEvent(name)));
        }
    }

    Ok(None)
}
