use anyhow::{bail, Result};

use super::ProviderKind;

/// Connection settings for one model provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmSettings {
    pub provider: ProviderKind,
    pub api_key: String,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_retries: u32,
}

impl LlmSettings {
    pub fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            api_key: String::new(),
            endpoint: None,
            model: None,
            timeout_secs: None,
            max_retries: 2,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Configured model, or the provider default.
    pub fn model_or_default(&self) -> String {
        self.model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }

    /// Every real provider needs a key; `noop` needs none.
    pub fn validate(&self) -> Result<()> {
        if let Some(env) = self.provider.api_key_env() {
            if self.api_key.trim().is_empty() {
                bail!(
                    "{} API key missing: set {} or providers.{}.api_key in the config file",
                    self.provider,
                    env,
                    self.provider
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_model_per_provider() {
        let settings = LlmSettings::new(ProviderKind::Google).with_api_key("k");
        assert_eq!(settings.model_or_default(), "gemini-2.0-flash");
        assert_eq!(settings.max_retries, 2);

        let mut custom = LlmSettings::new(ProviderKind::OpenRouter).with_api_key("k");
        custom.model = Some("anthropic/claude-3.5-sonnet".into());
        assert_eq!(custom.model_or_default(), "anthropic/claude-3.5-sonnet");
    }

    #[test]
    fn errors_when_api_key_missing() {
        let err = LlmSettings::new(ProviderKind::OpenAi)
            .with_api_key("  ")
            .validate()
            .expect_err("blank key should error");
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn noop_provider_allows_missing_key() {
        LlmSettings::new(ProviderKind::Noop)
            .validate()
            .expect("noop should not require key");
    }
}
