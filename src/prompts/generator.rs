use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::GenerationConfig;
use crate::store::PromptType;

use super::template::{build_user_prompt, SYSTEM_INSTRUCTION};

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generation: no API key configured")]
    NotConfigured,

    #[error("generation: request timed out after {0:?}")]
    Timeout(Duration),

    #[error("generation: http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("generation: provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("generation: provider returned an empty result")]
    Empty,
}

/// External text-generation service.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn model_name(&self) -> &str;

    fn is_configured(&self) -> bool {
        true
    }

    async fn generate(&self, kind: PromptType, description: &str)
        -> Result<String, GenerationError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationParams,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationParams {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate, if any.
    fn text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let text: String = parts.iter().filter_map(|p| p.text.as_deref()).collect();
        Some(text)
    }
}

/// Gemini `generateContent` client.
#[derive(Clone)]
pub struct GeminiGenerator {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    timeout: Duration,
    temperature: f32,
    max_output_tokens: u32,
}

impl GeminiGenerator {
    pub fn new(cfg: &GenerationConfig) -> Result<Self, GenerationError> {
        let timeout = Duration::from_secs(cfg.timeout_secs.max(1));
        let client = Client::builder().timeout(timeout).build()?;
        if cfg.api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY not set; generation requests will fail");
        }

        Ok(Self {
            client,
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            timeout,
            temperature: cfg.temperature,
            max_output_tokens: cfg.max_output_tokens,
        })
    }

    async fn call_api(&self, api_key: &str, user_prompt: &str) -> Result<String, GenerationError> {
        let req = GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part { text: SYSTEM_INSTRUCTION }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: user_prompt }],
            }],
            generation_config: GenerationParams {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        };

        let resp = self
            .client
            .post(format!("{}/models/{}:generateContent", self.base_url, self.model))
            .header("x-goog-api-key", api_key)
            .json(&req)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Status { status, body });
        }

        let body: GenerateContentResponse = resp.json().await?;
        match body.text() {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(GenerationError::Empty),
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate(
        &self,
        kind: PromptType,
        description: &str,
    ) -> Result<String, GenerationError> {
        let api_key = self.api_key.as_deref().ok_or(GenerationError::NotConfigured)?;
        let user_prompt = build_user_prompt(kind, description);

        tracing::debug!(model = %self.model, prompt_length = user_prompt.len(), "calling generation API");
        let started = Instant::now();
        let result = tokio::time::timeout(self.timeout, self.call_api(api_key, &user_prompt))
            .await
            .unwrap_or(Err(GenerationError::Timeout(self.timeout)));

        tracing::info!(
            service = "gemini",
            model = %self.model,
            duration_ms = started.elapsed().as_millis() as u64,
            success = result.is_ok(),
            "API call to generation service"
        );
        result
    }
}
