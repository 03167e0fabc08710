use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
}

/// Chat completion request: one opaque instruction plus ordered messages.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub instruction: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(instruction: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            instruction: instruction.into(),
            messages,
            max_tokens: 512,
            temperature: 0.7,
        }
    }
}

/// Chat completion response.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl CompletionResponse {
    pub fn token_count(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Typed provider failure. The gateway switches on these to decide whether
/// to fall back to the next provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlmError {
    #[error("quota exceeded")]
    QuotaExceeded,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider error: {0}")]
    Unknown(String),
}

impl LlmError {
    /// Quota and transport failures are worth retrying on another provider.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::QuotaExceeded | Self::Transport(_))
    }
}

/// Trait for chat completion backends (OpenAI, Anthropic, Gemini, etc.)
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    fn complete(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + '_>>;
}

/// Mock provider for testing. Returns a fixed response.
#[derive(Debug, Clone)]
pub struct MockProvider {
    pub response: String,
}

impl MockProvider {
    pub fn new(response: impl Into<String>) -> Self {
        Self { response: response.into() }
    }
}

impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn complete(
        &self,
        _request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + '_>> {
        let content = self.response.clone();
        Box::pin(async move {
            Ok(CompletionResponse {
                content,
                input_tokens: 10,
                output_tokens: 20,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_provider_returns_response() {
        let mock = MockProvider::new("Ana: hello");
        let req = CompletionRequest::new("talk", vec![ChatMessage::user("hi")]);
        let resp = mock.complete(req).await.unwrap();
        assert_eq!(resp.content, "Ana: hello");
        assert_eq!(resp.token_count(), 30);
    }

    #[test]
    fn retryable_errors() {
        assert!(LlmError::QuotaExceeded.is_retryable());
        assert!(LlmError::Transport("reset".into()).is_retryable());
        assert!(!LlmError::Unknown("bad request".into()).is_retryable());
    }
}
