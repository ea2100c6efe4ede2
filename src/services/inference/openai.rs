/// OpenAI-compatible chat-completions provider
///
/// Structured calls use `response_format: json_schema` and parse the message
/// content as JSON. Streaming calls read server-sent events until `[DONE]`.
use crate::{
    error::{AppError, AppResult},
    services::inference::{InferenceProvider, ObjectRequest, TextRequest, TextStream},
};
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

const DONE_SENTINEL: &str = "[DONE]";

#[derive(Clone)]
pub struct OpenAiCompatProvider {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    /// Bounds structured calls end to end and streamed calls until headers arrive
    request_timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
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
}

impl OpenAiCompatProvider {
    pub fn new(api_key: String, api_url: String, request_timeout: Duration) -> AppResult<Self> {
        Ok(Self {
            http_client: HttpClient::builder().build()?,
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
            request_timeout,
        })
    }

    fn messages<'a>(system: Option<&'a str>, prompt: &'a str) -> Vec<ChatMessage<'a>> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });
        messages
    }

    async fn post(
        &self,
        body: serde_json::Value,
        timeout: Option<Duration>,
    ) -> AppResult<reqwest::Response> {
        let url = format!("{}/chat/completions", self.api_url);
        let mut builder = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Upstream("Inference request timed out".to_string())
            } else {
                AppError::HttpClient(e)
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::from_status("Inference API", status, &body));
        }

        Ok(response)
    }
}

/// Extracts the text delta from one SSE payload
///
/// Returns `None` for keep-alives, role-only deltas and payloads that do not
/// parse.
fn parse_delta(data: &str) -> Option<String> {
    let chunk: ChatChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            tracing::debug!(error = %e, data = %data, "Ignoring unparseable SSE payload");
            return None;
        }
    };
    let text: String = chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.content)
        .collect();
    (!text.is_empty()).then_some(text)
}

#[async_trait::async_trait]
impl InferenceProvider for OpenAiCompatProvider {
    async fn generate_object(&self, request: ObjectRequest) -> AppResult<serde_json::Value> {
        let body = json!({
            "model": request.model,
            "messages": Self::messages(request.system.as_deref(), &request.prompt),
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": request.schema_name,
                    "schema": request.schema,
                }
            }
        });

        let response = self.post(body, Some(self.request_timeout)).await?;
        let completion: ChatCompletion = response.json().await?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::Upstream("Inference response had no content".to_string()))?;

        tracing::debug!(
            schema = request.schema_name,
            model = %request.model,
            "Structured generation completed"
        );

        serde_json::from_str(&content).map_err(|e| {
            AppError::Upstream(format!(
                "Inference response for {} was not JSON: {}",
                request.schema_name, e
            ))
        })
    }

    async fn stream_text(&self, request: TextRequest) -> AppResult<TextStream> {
        let body = json!({
            "model": request.model,
            "stream": true,
            "messages": Self::messages(Some(&request.system), &request.prompt),
        });

        // Only the wait for response headers is bounded; the body is read
        // under the pipeline's idle timeout.
        let response = tokio::time::timeout(self.request_timeout, self.post(body, None))
            .await
            .map_err(|_| {
                AppError::Upstream(format!(
                    "Narration stream did not open within {}s",
                    self.request_timeout.as_secs_f32()
                ))
            })??;

        tracing::debug!(model = %request.model, "Narration stream opened");

        let stream = response
            .bytes_stream()
            .eventsource()
            .take_while(|event| {
                let done = matches!(event, Ok(e) if e.data.trim() == DONE_SENTINEL);
                futures::future::ready(!done)
            })
            .filter_map(|event| async move {
                match event {
                    Ok(event) => parse_delta(&event.data).map(Ok),
                    Err(e) => Some(Err(AppError::Upstream(format!(
                        "Narration stream failed: {}",
                        e
                    )))),
                }
            });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_delta_text() {
        let data = r#"{"choices":[{"index":0,"delta":{"content":"**Heat**"}}]}"#;
        assert_eq!(parse_delta(data).as_deref(), Some("**Heat**"));
    }

    #[test]
    fn test_parse_delta_ignores_role_only_chunks() {
        let data = r#"{"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_delta(data), None);
    }

    #[test]
    fn test_parse_delta_ignores_garbage() {
        assert_eq!(parse_delta(": keep-alive"), None);
    }

    #[test]
    fn test_messages_include_system_first() {
        let messages = OpenAiCompatProvider::messages(Some("be brief"), "hello");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].content, "hello");

        let messages = OpenAiCompatProvider::messages(None, "hello");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
    }
}
