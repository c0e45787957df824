//! Image classifier client
//!
//! The [`Classifier`] seam returns the raw reply text; interpretation lives
//! in [`super::verdict`]. [`OpenAiClassifier`] talks to any OpenAI-compatible
//! chat-completions endpoint with vision input.

use async_trait::async_trait;
use pinscout_common::config::ClassifierConfig;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("PinScout/", env!("CARGO_PKG_VERSION"));

/// Classifier call failures
///
/// Never fatal for a batch: each one becomes a Disqualified verdict.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Empty response from classifier")]
    EmptyResponse,

    #[error("Timed out after {0}s")]
    Timeout(u64),
}

/// Scores one image against a prompt
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Raw reply text for `image_ref` judged against `prompt_text`
    async fn classify(&self, image_ref: &str, prompt_text: &str) -> Result<String, ClassifierError>;
}

/// Evaluation instructions sent with every image
pub fn evaluation_instructions(prompt_text: &str) -> String {
    format!(
        r#"Analyze this image and determine how well it matches the visual prompt: "{prompt_text}"

Consider:
1. Visual style and aesthetic
2. Content and subject matter
3. Color scheme and mood
4. Overall relevance to the prompt
5. Quality and clarity of the image
6. Specificity of match (generic vs. specific to prompt)

Be STRICT in your evaluation. Only approve images that are:
- Highly relevant to the specific prompt
- Show the exact style/aesthetic mentioned
- Have good visual quality
- Are not generic or loosely related

Provide:
1. A match score from 0.0 to 1.0 (where 1.0 is perfect match)
2. A brief explanation of your reasoning
3. Classification: "approved" if score >= 0.5, "disqualified" if score < 0.5

Format your response as JSON:
{{
    "match_score": 0.85,
    "explanation": "One or two sentences on why the image does or does not match.",
    "classification": "approved"
}}"#
    )
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize, Serialize)]
struct ChatMessage {
    content: Option<String>,
}

/// OpenAI-compatible vision classifier
pub struct OpenAiClassifier {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiClassifier {
    pub fn new(config: &ClassifierConfig, api_key: String) -> Result<Self, ClassifierError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| ClassifierError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl Classifier for OpenAiClassifier {
    async fn classify(&self, image_ref: &str, prompt_text: &str) -> Result<String, ClassifierError> {
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": evaluation_instructions(prompt_text) },
                    { "type": "image_url", "image_url": { "url": image_ref } },
                ],
            }],
        });

        tracing::debug!(model = %self.model, image = image_ref, "Requesting classification");

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClassifierError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ClassifierError::ApiError(status.as_u16(), text));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::ParseError(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(ClassifierError::EmptyResponse)
    }
}
