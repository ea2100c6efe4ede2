/// Language-model provider abstraction
///
/// Two capabilities: schema-constrained JSON generation and streamed free-form
/// text. Callers decode structured output into one Rust type per call through
/// [`generate_typed`].
use crate::error::{AppError, AppResult};
use futures::stream::BoxStream;
use serde::de::DeserializeOwned;

pub mod openai;

/// Streamed text chunks, in the order the model emits them
pub type TextStream = BoxStream<'static, AppResult<String>>;

/// A structured (non-streaming) generation request
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRequest {
    pub model: String,
    /// Identifies the schema in provider logs
    pub schema_name: &'static str,
    pub schema: serde_json::Value,
    pub system: Option<String>,
    pub prompt: String,
}

/// A free-form streaming generation request
#[derive(Debug, Clone, PartialEq)]
pub struct TextRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Generates a JSON value conforming to `request.schema`
    async fn generate_object(&self, request: ObjectRequest) -> AppResult<serde_json::Value>;

    /// Starts a streamed generation; the stream ends when the model finishes
    async fn stream_text(&self, request: TextRequest) -> AppResult<TextStream>;
}

/// Runs a structured call and decodes the result into `T`
pub async fn generate_typed<T: DeserializeOwned>(
    provider: &dyn InferenceProvider,
    request: ObjectRequest,
) -> AppResult<T> {
    let schema_name = request.schema_name;
    let value = provider.generate_object(request).await?;
    serde_json::from_value(value).map_err(|e| {
        tracing::warn!(schema = schema_name, error = %e, "Model output did not match schema");
        AppError::Upstream(format!("Model output for {} did not match schema: {}", schema_name, e))
    })
}
