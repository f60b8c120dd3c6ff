//! OpenAI-compatible chat completions client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{CandidateGenerator, GenerationError, LlmConfig};

const TEMPERATURE: f32 = 0.1;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Generator backed by `POST {base}/chat/completions`
#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    http_client: reqwest::Client,
    config: LlmConfig,
}

impl OpenAiGenerator {
    pub fn new(config: LlmConfig) -> Result<Self, GenerationError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GenerationError::Configuration(e.to_string()))?;
        Ok(Self {
            http_client,
            config,
        })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }
}

/// User turn: the question, then the correction hint of earlier attempts
pub fn user_prompt(question: &str, hint: &str) -> String {
    let mut prompt = format!(
        "Translate this natural language question into a single PostgreSQL SELECT query.\n\nQuestion: {}",
        question.trim()
    );
    if !hint.trim().is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(hint.trim());
    }
    prompt
}

fn status_error(status: u16, body: String) -> GenerationError {
    if status == 429 {
        GenerationError::QuotaExceeded
    } else {
        GenerationError::Status { status, body }
    }
}

#[async_trait]
impl CandidateGenerator for OpenAiGenerator {
    async fn generate(
        &self,
        schema: &str,
        question: &str,
        hint: &str,
    ) -> Result<String, GenerationError> {
        let Some(key) = self.config.bearer() else {
            return Err(GenerationError::Configuration(
                "OPENAI_API_KEY or OPENAI_BASE_URL is not set. Set them in .env.".to_string(),
            ));
        };

        let user = user_prompt(question, hint);
        let request = ChatRequest {
            model: &self.config.model,
            temperature: TEMPERATURE,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: schema,
                },
                ChatMessage {
                    role: "user",
                    content: &user,
                },
            ],
        };

        tracing::debug!(model = %self.config.model, hinted = !hint.is_empty(), "Requesting SQL candidate");

        let response = self
            .http_client
            .post(self.config.chat_completions_url())
            .bearer_auth(key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Deserialization(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(GenerationError::EmptyResponse)
    }
}
