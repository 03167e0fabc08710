//! HTTP-based chat completion providers.
//!
//! Supports OpenAI-compatible APIs (OpenAI, Google Gemini, DeepSeek, local
//! servers) and Anthropic's native Messages API.

use crate::config::{ProviderConfig, ProviderKind};
use crate::provider::{CompletionRequest, CompletionResponse, LlmError, LlmProvider, Role};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

// ── OpenAI-compatible request/response types ──

#[derive(Serialize)]
struct OaiRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct OaiMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct OaiResponse {
    choices: Vec<OaiChoice>,
    usage: Option<OaiUsage>,
}

#[derive(Deserialize)]
struct OaiChoice {
    message: OaiChoiceMessage,
}

#[derive(Deserialize)]
struct OaiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OaiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

// ── Anthropic Messages API types ──

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    temperature: f32,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicResponseBlock>,
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicResponseBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

// ── Provider ──

/// HTTP-based provider. Handles both OpenAI-compatible and Anthropic APIs.
pub struct HttpProvider {
    kind: ProviderKind,
    model: String,
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpProvider {
    /// Build from model name + API key + optional base URL override.
    pub fn new(model: String, api_key: String, base_url: Option<String>) -> Self {
        let kind = ProviderKind::from_model(&model);
        Self::with_kind(kind, model, api_key, base_url)
    }

    pub fn with_kind(
        kind: ProviderKind,
        model: String,
        api_key: String,
        base_url: Option<String>,
    ) -> Self {
        let base = base_url.unwrap_or_else(|| kind.default_base_url().to_owned());
        Self {
            kind,
            model,
            client: reqwest::Client::new(),
            base_url: base.trim_end_matches('/').to_owned(),
            api_key,
        }
    }

    pub fn from_config(cfg: &ProviderConfig) -> Self {
        Self::with_kind(
            cfg.resolved_kind(),
            cfg.model.clone(),
            cfg.api_key.clone(),
            cfg.base_url.clone(),
        )
    }

    fn endpoint(&self) -> String {
        if self.kind.is_anthropic() {
            format!("{}/v1/messages", self.base_url)
        } else {
            format!("{}/chat/completions", self.base_url)
        }
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

/// Classify a non-success HTTP response.
fn check_error(status: reqwest::StatusCode, body: &str) -> LlmError {
    let lower = body.to_lowercase();
    if status.as_u16() == 429
        || lower.contains("quota")
        || lower.contains("rate limit")
        || lower.contains("rate_limit")
    {
        LlmError::QuotaExceeded
    } else if status.is_server_error() || status.as_u16() == 408 {
        LlmError::Transport(format!("{status}: {body}"))
    } else {
        LlmError::Unknown(format!("{status}: {body}"))
    }
}

fn transport(e: reqwest::Error) -> LlmError {
    LlmError::Transport(e.to_string())
}

impl LlmProvider for HttpProvider {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    fn complete(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + '_>> {
        if self.kind.is_anthropic() {
            Box::pin(self.complete_anthropic(request))
        } else {
            Box::pin(self.complete_openai(request))
        }
    }
}

impl HttpProvider {
    /// OpenAI-compatible completion. The instruction travels as a leading
    /// system message.
    async fn complete_openai(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if !request.instruction.is_empty() {
            messages.push(OaiMessage { role: "system", content: request.instruction.clone() });
        }
        messages.extend(request.messages.iter().map(|m| OaiMessage {
            role: role_str(m.role),
            content: m.content.clone(),
        }));
        let body = OaiRequest {
            model: self.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let mut req = self.client.post(self.endpoint()).json(&body);
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }
        let resp = req.send().await.map_err(transport)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(check_error(status, &text));
        }

        let api: OaiResponse = resp.json().await
            .map_err(|e| LlmError::Unknown(e.to_string()))?;

        let content = api.choices.into_iter().next()
            .and_then(|c| c.message.content).unwrap_or_default();
        let (input_tokens, output_tokens) = api.usage
            .map(|u| (u.prompt_tokens, u.completion_tokens)).unwrap_or((0, 0));

        Ok(CompletionResponse { content, input_tokens, output_tokens })
    }

    /// Anthropic Messages API completion.
    async fn complete_anthropic(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        // Anthropic puts the instruction at top level.
        let system = (!request.instruction.is_empty()).then(|| request.instruction.clone());
        let messages: Vec<AnthropicMessage> = request.messages.iter().map(|m| AnthropicMessage {
            role: role_str(m.role),
            content: m.content.clone(),
        }).collect();

        let body = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens,
            system,
            messages,
            temperature: request.temperature,
        };

        let resp = self.client
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(check_error(status, &text));
        }

        let api: AnthropicResponse = resp.json().await
            .map_err(|e| LlmError::Unknown(e.to_string()))?;

        let content: String = api.content.iter().filter_map(|b| match b {
            AnthropicResponseBlock::Text { text } => Some(text.as_str()),
            AnthropicResponseBlock::Other => None,
        }).collect::<Vec<_>>().join("");

        let (input_tokens, output_tokens) = api.usage
            .map(|u| (u.input_tokens, u.output_tokens)).unwrap_or((0, 0));

        Ok(CompletionResponse { content, input_tokens, output_tokens })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_endpoint() {
        let p = HttpProvider::new("gpt-4o".into(), "sk-test".into(), None);
        assert_eq!(p.endpoint(), "https://api.openai.com/v1/chat/completions");
        assert_eq!(p.name(), "openai");
    }

    #[test]
    fn anthropic_endpoint() {
        let p = HttpProvider::new("claude-sonnet-4-6".into(), "sk-ant-test".into(), None);
        assert_eq!(p.endpoint(), "https://api.anthropic.com/v1/messages");
        assert_eq!(p.name(), "anthropic");
    }

    #[test]
    fn local_kind_uses_local_base() {
        let p = HttpProvider::with_kind(ProviderKind::Local, "llama3".into(), String::new(), None);
        assert_eq!(p.endpoint(), "http://localhost:11434/v1/chat/completions");
        assert_eq!(p.name(), "local");
    }

    #[test]
    fn custom_base_url_override() {
        let p = HttpProvider::new(
            "gpt-4o".into(),
            "sk-test".into(),
            Some("https://my-proxy.com/v1/".into()),
        );
        assert_eq!(p.endpoint(), "https://my-proxy.com/v1/chat/completions");
    }

    #[test]
    fn status_429_is_quota() {
        let err = check_error(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert_eq!(err, LlmError::QuotaExceeded);
    }

    #[test]
    fn quota_body_is_quota() {
        let err = check_error(
            reqwest::StatusCode::FORBIDDEN,
            r#"{"error":{"message":"You exceeded your current quota"}}"#,
        );
        assert_eq!(err, LlmError::QuotaExceeded);
    }

    #[test]
    fn server_error_is_transport() {
        let err = check_error(reqwest::StatusCode::BAD_GATEWAY, "upstream down");
        assert!(matches!(err, LlmError::Transport(_)));
    }

    #[test]
    fn client_error_is_unknown() {
        let err = check_error(reqwest::StatusCode::BAD_REQUEST, "bad model");
        assert!(matches!(err, LlmError::Unknown(_)));
    }
}
