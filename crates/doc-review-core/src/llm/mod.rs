mod anthropic;
mod gemini;
mod openai;
pub mod parse;
pub mod prompts;
mod settings;

use std::{fmt, str::FromStr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

pub use anthropic::AnthropicClient;
pub use gemini::GeminiClient;
pub use openai::OpenAiClient;
pub use settings::LlmSettings;

/// Documents longer than this are cut before being sent to a provider.
pub const MAX_INPUT_CHARS: usize = 30_000;
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Client abstraction for sending a document to a language model.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send the system prompt and document text, returning the raw reply.
    async fn complete(&self, system_prompt: &str, document: &str) -> Result<String>;

    /// `provider/model` label recorded on analysis results.
    fn name(&self) -> String;
}

/// Supported model providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    OpenRouter,
    Anthropic,
    Google,
    Noop,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::OpenAi,
        ProviderKind::OpenRouter,
        ProviderKind::Anthropic,
        ProviderKind::Google,
        ProviderKind::Noop,
    ];

    /// Providers exercised by `compare`.
    pub const COMPARED: [ProviderKind; 3] = [
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::Google,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::OpenRouter => "openrouter",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Google => "google",
            ProviderKind::Noop => "noop",
        }
    }

    /// Conventional environment variable holding the provider's API key.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            ProviderKind::OpenAi => Some("OPENAI_API_KEY"),
            ProviderKind::OpenRouter => Some("OPENROUTER_API_KEY"),
            ProviderKind::Anthropic => Some("ANTHROPIC_API_KEY"),
            ProviderKind::Google => Some("GOOGLE_API_KEY"),
            ProviderKind::Noop => None,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4o-mini",
            ProviderKind::OpenRouter => "openai/gpt-4o-mini",
            ProviderKind::Anthropic => "claude-3-5-haiku-20241022",
            ProviderKind::Google => "gemini-2.0-flash",
            ProviderKind::Noop => "none",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown provider `{0}` (expected openai, openrouter, anthropic, google or noop)")]
pub struct UnknownProvider(pub String);

impl FromStr for ProviderKind {
    type Err = UnknownProvider;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "openrouter" => Ok(ProviderKind::OpenRouter),
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            "google" | "gemini" => Ok(ProviderKind::Google),
            "noop" => Ok(ProviderKind::Noop),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

/// Classified provider failures surfaced to callers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{provider} rejected the credentials ({status}): {body}")]
    Auth {
        provider: String,
        status: u16,
        body: String,
    },
    #[error("{provider} rate limit exceeded: {body}")]
    RateLimited { provider: String, body: String },
    #[error("{provider} quota exhausted: {body}")]
    Quota { provider: String, body: String },
    #[error("{provider} API error ({status}): {body}")]
    Http {
        provider: String,
        status: u16,
        body: String,
    },
}

impl ProviderError {
    pub fn from_status(provider: &str, status: StatusCode, body: String) -> Self {
        let provider = provider.to_string();
        let quota_hint = {
            let lower = body.to_ascii_lowercase();
            lower.contains("quota") || lower.contains("billing") || lower.contains("credit")
        };
        match status.as_u16() {
            401 | 403 => ProviderError::Auth {
                provider,
                status: status.as_u16(),
                body,
            },
            402 => ProviderError::Quota { provider, body },
            429 if quota_hint => ProviderError::Quota { provider, body },
            429 => ProviderError::RateLimited { provider, body },
            code => ProviderError::Http {
                provider,
                status: code,
                body,
            },
        }
    }

    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::RateLimited { .. } => true,
            ProviderError::Http { status, .. } => *status >= 500,
            ProviderError::Auth { .. } | ProviderError::Quota { .. } => false,
        }
    }
}

/// Send a request, retrying transport errors and retryable statuses with
/// exponential backoff.
pub(crate) async fn send_with_retry<F>(
    provider: &str,
    max_retries: u32,
    build: F,
) -> Result<Response>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0u32;
    let mut backoff = Duration::from_millis(200);
    loop {
        let response = match build().send().await {
            Ok(resp) => resp,
            Err(err) => {
                if attempt >= max_retries {
                    return Err(err).with_context(|| format!("failed to call {provider} API"));
                }
                warn!(%provider, attempt, error = %err, "request failed; retrying");
                sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
                attempt += 1;
                continue;
            }
        };

        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let error = ProviderError::from_status(provider, status, body);
        if !error.is_retryable() || attempt >= max_retries {
            return Err(error.into());
        }
        warn!(%provider, attempt, %status, "provider returned error status; retrying");
        sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
        attempt += 1;
    }
}

/// Cut text to at most `max_chars` characters, appending an ellipsis when shortened.
pub fn truncate(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    input.chars().take(max_chars).collect::<String>() + "…"
}

/// Prompt layout shared by providers that take a single user message.
pub(crate) fn combined_prompt(system_prompt: &str, document: &str) -> String {
    format!(
        "{system_prompt}\n\n---\n\nDocument to analyze:\n\n{}",
        truncate(document, MAX_INPUT_CHARS)
    )
}

/// Offline client that always replies with an empty JSON object.
#[derive(Debug, Default, Clone)]
pub struct NoopLlmClient;

#[async_trait]
impl LlmClient for NoopLlmClient {
    async fn complete(&self, _system_prompt: &str, _document: &str) -> Result<String> {
        Ok("{}".into())
    }

    fn name(&self) -> String {
        "noop/none".into()
    }
}

/// Build a client for the configured provider.
pub fn build_client(settings: &LlmSettings) -> Result<Arc<dyn LlmClient>> {
    settings.validate()?;
    let client: Arc<dyn LlmClient> = match settings.provider {
        ProviderKind::OpenAi | ProviderKind::OpenRouter => Arc::new(OpenAiClient::new(settings)?),
        ProviderKind::Anthropic => Arc::new(AnthropicClient::new(settings)?),
        ProviderKind::Google => Arc::new(GeminiClient::new(settings)?),
        ProviderKind::Noop => Arc::new(NoopLlmClient),
    };
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_provider_aliases() {
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!("gemini".parse::<ProviderKind>().unwrap(), ProviderKind::Google);
        assert_eq!("claude".parse::<ProviderKind>().unwrap(), ProviderKind::Anthropic);
        let err = "mistral".parse::<ProviderKind>().unwrap_err();
        assert!(err.to_string().contains("mistral"));
    }

    #[test]
    fn classifies_status_codes() {
        let auth = ProviderError::from_status("openai", StatusCode::UNAUTHORIZED, "bad key".into());
        assert!(matches!(auth, ProviderError::Auth { status: 401, .. }));
        assert!(!auth.is_retryable());

        let quota = ProviderError::from_status(
            "openai",
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":{"code":"insufficient_quota"}}"#.into(),
        );
        assert!(matches!(quota, ProviderError::Quota { .. }));

        let limited =
            ProviderError::from_status("anthropic", StatusCode::TOO_MANY_REQUESTS, "slow down".into());
        assert!(matches!(limited, ProviderError::RateLimited { .. }));
        assert!(limited.is_retryable());

        let server = ProviderError::from_status("google", StatusCode::BAD_GATEWAY, String::new());
        assert!(server.is_retryable());
        let client = ProviderError::from_status("google", StatusCode::BAD_REQUEST, String::new());
        assert!(!client.is_retryable());
    }

    #[test]
    fn truncate_adds_ellipsis_when_exceeding_limit() {
        assert_eq!(truncate("abc", 10), "abc");
        assert_eq!(truncate("abcdefghijklmnopqrstuvwxyz", 5), "abcde…");
    }

    #[test]
    fn combined_prompt_truncates_document() {
        let document = "x".repeat(MAX_INPUT_CHARS + 10);
        let prompt = combined_prompt("Review this.", &document);
        assert!(prompt.starts_with("Review this.\n\n---\n\nDocument to analyze:\n\n"));
        assert!(prompt.ends_with("…"));
    }

    #[test]
    fn noop_client_returns_empty_object() {
        let client = build_client(&LlmSettings::new(ProviderKind::Noop)).unwrap();
        let reply = futures::executor::block_on(client.complete("prompt", "doc")).unwrap();
        assert_eq!(reply, "{}");
        assert_eq!(client.name(), "noop/none");
    }

    #[test]
    fn build_client_requires_api_key() {
        let err = build_client(&LlmSettings::new(ProviderKind::Anthropic))
            .err()
            .expect("missing key should error");
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }
}
