use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Generator endpoint settings
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    /// OpenAI-compatible endpoint (e.g. a local Ollama server)
    pub base_url: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl LlmConfig {
    /// OPENAI_API_KEY=sk-...
    /// OPENAI_BASE_URL=http://localhost:11434/v1
    /// OPENAI_MODEL=gpt-4o-mini
    pub fn from_env() -> Self {
        let var = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            api_key: var("OPENAI_API_KEY"),
            base_url: var("OPENAI_BASE_URL"),
            model: var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            ..Self::default()
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some() || self.base_url.is_some()
    }

    /// Bearer token; local servers accept any key
    pub fn bearer(&self) -> Option<&str> {
        match (&self.api_key, &self.base_url) {
            (Some(key), _) => Some(key.as_str()),
            (None, Some(_)) => Some("ollama"),
            (None, None) => None,
        }
    }

    pub fn chat_completions_url(&self) -> String {
        let base = self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        format!("{}/chat/completions", base.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_by_default() {
        let config = LlmConfig::default();
        assert!(!config.is_configured());
        assert_eq!(config.bearer(), None);
        assert_eq!(config.model, "gpt-4o-mini");
    }

    #[test]
    fn test_local_endpoint_gets_placeholder_key() {
        let config = LlmConfig {
            base_url: Some("http://localhost:11434/v1/".to_string()),
            ..LlmConfig::default()
        };
        assert!(config.is_configured());
        assert_eq!(config.bearer(), Some("ollama"));
        assert_eq!(
            config.chat_completions_url(),
            "http://localhost:11434/v1/chat/completions"
        );
    }

    #[test]
    fn test_hosted_endpoint() {
        let config = LlmConfig {
            api_key: Some("sk-test".to_string()),
            ..LlmConfig::default()
        };
        assert_eq!(config.bearer(), Some("sk-test"));
        assert_eq!(
            config.chat_completions_url(),
            "https://api.openai.com/v1/chat/completions"
        );
    }
}
