//! Provider configuration: which backends the gateway may use, in order.

use serde::{Deserialize, Serialize};

/// Provider backend family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Google,
    DeepSeek,
    /// Self-hosted OpenAI-compatible server; no API key required.
    Local,
    /// Falls back to OpenAI-compatible format.
    Unknown,
}

impl ProviderKind {
    /// Infer provider from model name prefix.
    pub fn from_model(model: &str) -> Self {
        let m = model.to_lowercase();
        if m.starts_with("gpt-")
            || m.starts_with("o1-")
            || m.starts_with("o3-")
            || m.starts_with("o4-")
        {
            Self::OpenAi
        } else if m.starts_with("claude-") {
            Self::Anthropic
        } else if m.starts_with("gemini-") {
            Self::Google
        } else if m.starts_with("deepseek-") {
            Self::DeepSeek
        } else {
            Self::Unknown
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi | Self::Unknown => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com",
            Self::Google => "https://generativelanguage.googleapis.com/v1beta/openai",
            Self::DeepSeek => "https://api.deepseek.com",
            Self::Local => "http://localhost:11434/v1",
        }
    }

    pub fn is_anthropic(self) -> bool {
        matches!(self, Self::Anthropic)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::DeepSeek => "deepseek",
            Self::Local => "local",
            Self::Unknown => "unknown",
        }
    }
}

/// One configured backend. The gateway walks these in order, skipping
/// entries that are not [`valid`](ProviderConfig::is_valid).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Explicit backend; inferred from the model name when absent.
    #[serde(default)]
    pub kind: Option<ProviderKind>,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    pub model: String,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
}

fn enabled_default() -> bool {
    true
}

impl ProviderConfig {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            kind: None,
            api_key: api_key.into(),
            base_url: None,
            model: model.into(),
            enabled: true,
        }
    }

    pub fn resolved_kind(&self) -> ProviderKind {
        self.kind.unwrap_or_else(|| ProviderKind::from_model(&self.model))
    }

    /// Enabled, has a model, and has credentials unless the backend is local.
    pub fn is_valid(&self) -> bool {
        self.enabled
            && !self.model.trim().is_empty()
            && (self.resolved_kind() == ProviderKind::Local || !self.api_key.trim().is_empty())
    }
}

/// Read provider configs from the environment.
///
/// `MURMUR_PROVIDERS` holds a JSON array of [`ProviderConfig`]. Without it,
/// falls back to a single provider from `MURMUR_LLM_MODEL`,
/// `MURMUR_LLM_API_KEY` and optionally `MURMUR_LLM_BASE_URL`.
pub fn from_env() -> Vec<ProviderConfig> {
    if let Ok(raw) = std::env::var("MURMUR_PROVIDERS") {
        match parse_list(&raw) {
            Ok(list) => return list,
            Err(e) => tracing::warn!(error = %e, "MURMUR_PROVIDERS is not a valid provider list"),
        }
    }

    let Ok(model) = std::env::var("MURMUR_LLM_MODEL") else {
        return Vec::new();
    };
    let api_key = std::env::var("MURMUR_LLM_API_KEY").unwrap_or_default();
    let base_url = std::env::var("MURMUR_LLM_BASE_URL").ok();
    vec![ProviderConfig { base_url, ..ProviderConfig::new(model, api_key) }]
}

/// Parse a JSON provider list.
pub fn parse_list(raw: &str) -> Result<Vec<ProviderConfig>, serde_json::Error> {
    serde_json::from_str(raw)
}
