//! Text generation with Gemini on Vertex AI.

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::CollaboratorError;

pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 512;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Sampling limits for one generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HarmCategory {
    #[serde(rename = "HARM_CATEGORY_HARASSMENT")]
    Harassment,
    #[serde(rename = "HARM_CATEGORY_HATE_SPEECH")]
    HateSpeech,
    #[serde(rename = "HARM_CATEGORY_SEXUALLY_EXPLICIT")]
    SexuallyExplicit,
    #[serde(rename = "HARM_CATEGORY_DANGEROUS_CONTENT")]
    DangerousContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmBlockThreshold {
    BlockLowAndAbove,
    BlockMediumAndAbove,
    BlockOnlyHigh,
    BlockNone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: HarmBlockThreshold,
}

/// Medium-and-above blocking for every category.
pub fn default_safety_settings() -> Vec<SafetySetting> {
    [
        HarmCategory::Harassment,
        HarmCategory::HateSpeech,
        HarmCategory::SexuallyExplicit,
        HarmCategory::DangerousContent,
    ]
    .into_iter()
    .map(|category| SafetySetting {
        category,
        threshold: HarmBlockThreshold::BlockMediumAndAbove,
    })
    .collect()
}

/// A single prompt-in, text-out request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub config: GenerationConfig,
    pub safety_settings: Vec<SafetySetting>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            config: GenerationConfig::default(),
            safety_settings: default_safety_settings(),
        }
    }
}

/// The model's reply, as returned by `generateContent`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    /// Flattened text some endpoints return alongside the candidates.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub prompt_feedback: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: Option<String>,
}

impl GenerationResponse {
    /// First part of the first candidate, else the top-level text.
    ///
    /// `None` means the model produced nothing usable, typically because the
    /// safety filters blocked it.
    pub fn answer(&self) -> Option<&str> {
        let first_part = self
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .and_then(|c| c.parts.first())
            .and_then(|p| p.text.as_deref());

        first_part.or_else(|| self.text.as_deref().filter(|t| !t.is_empty()))
    }
}

/// A hosted text-generation model.
pub trait TextGenerator: Send + Sync + 'static {
    fn generate(
        &self,
        request: &GenerationRequest,
    ) -> impl Future<Output = Result<GenerationResponse, CollaboratorError>> + Send;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiRequest<'a> {
    contents: Vec<ApiContent<'a>>,
    generation_config: GenerationConfig,
    safety_settings: &'a [SafetySetting],
}

#[derive(Debug, Serialize)]
struct ApiContent<'a> {
    role: &'static str,
    parts: Vec<ApiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct ApiPart<'a> {
    text: &'a str,
}

impl<'a> ApiRequest<'a> {
    fn from_request(request: &'a GenerationRequest) -> Self {
        Self {
            contents: vec![ApiContent {
                role: "user",
                parts: vec![ApiPart {
                    text: &request.prompt,
                }],
            }],
            generation_config: request.config,
            safety_settings: &request.safety_settings,
        }
    }
}

/// Builder for creating a Gemini generator.
#[derive(Debug, Clone)]
pub struct GeminiGeneratorBuilder {
    project: String,
    location: String,
    model: String,
    access_token: Option<String>,
}

impl GeminiGeneratorBuilder {
    pub fn new(
        project: impl Into<String>,
        location: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            location: location.into(),
            model: model.into(),
            access_token: None,
        }
    }

    /// Bearer token sent with every request.
    pub fn access_token(mut self, token: Option<String>) -> Self {
        self.access_token = token;
        self
    }

    pub fn build(self) -> GeminiGenerator {
        GeminiGenerator {
            client: reqwest::Client::new(),
            project: self.project,
            location: self.location,
            model: self.model,
            access_token: self.access_token,
        }
    }
}

/// Gemini served from a Vertex AI regional endpoint.
pub struct GeminiGenerator {
    client: reqwest::Client,
    project: String,
    location: String,
    model: String,
    access_token: Option<String>,
}

impl GeminiGenerator {
    pub fn builder(
        project: impl Into<String>,
        location: impl Into<String>,
        model: impl Into<String>,
    ) -> GeminiGeneratorBuilder {
        GeminiGeneratorBuilder::new(project, location, model)
    }

    fn endpoint(&self) -> String {
        let (project, location, model) = (&self.project, &self.location, &self.model);
        format!(
            "https://{location}-aiplatform.googleapis.com/v1/projects/{project}\
             /locations/{location}/publishers/google/models/{model}:generateContent"
        )
    }
}

impl std::fmt::Display for GeminiGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gemini({}, {})", self.model, self.location)
    }
}

impl TextGenerator for GeminiGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, CollaboratorError> {
        let token = self.access_token.as_deref().ok_or_else(|| {
            CollaboratorError::Unavailable("Vertex AI client has no access token".into())
        })?;

        tracing::info!("Sending prompt to Gemini model: {}", self.model);

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(token)
            .json(&ApiRequest::from_request(request))
            .send()
            .await
            .map_err(|e| CollaboratorError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Api(format!("{status}: {body}")));
        }

        let body: GenerationResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::InvalidResponse(e.to_string()))?;

        tracing::info!("Received response from Gemini.");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_carries_config_and_safety() {
        let request = GenerationRequest::new("What is the cheapest item?");
        let json = serde_json::to_value(ApiRequest::from_request(&request)).unwrap();

        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "What is the cheapest item?");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 512);
        assert!((json["generationConfig"]["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);

        let safety = json["safetySettings"].as_array().unwrap();
        assert_eq!(safety.len(), 4);
        assert_eq!(safety[0]["category"], "HARM_CATEGORY_HARASSMENT");
        assert_eq!(safety[3]["category"], "HARM_CATEGORY_DANGEROUS_CONTENT");
        assert!(safety.iter().all(|s| s["threshold"] == "BLOCK_MEDIUM_AND_ABOVE"));
    }

    #[test]
    fn endpoint_is_regional() {
        let generator =
            GeminiGenerator::builder("proj", "europe-west1", "gemini-2.0-flash").build();
        assert_eq!(
            generator.endpoint(),
            "https://europe-west1-aiplatform.googleapis.com/v1/projects/proj\
             /locations/europe-west1/publishers/google/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn answer_prefers_first_candidate_part() {
        let response: GenerationResponse = serde_json::from_value(json!({
            "candidates": [
                {"content": {
                    "role": "model",
                    "parts": [{"text": "The lamp."}, {"text": "ignored"}]
                }},
                {"content": {"parts": [{"text": "second candidate"}]}}
            ],
            "text": "flattened"
        }))
        .unwrap();
        assert_eq!(response.answer(), Some("The lamp."));
    }

    #[test]
    fn answer_falls_back_to_top_level_text() {
        let response: GenerationResponse = serde_json::from_value(json!({
            "candidates": [{"finishReason": "SAFETY"}],
            "text": "flattened"
        }))
        .unwrap();
        assert_eq!(response.answer(), Some("flattened"));
    }

    #[test]
    fn blocked_response_has_no_answer() {
        let response: GenerationResponse = serde_json::from_value(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();
        assert_eq!(response.answer(), None);
        assert!(response.prompt_feedback.is_some());
    }

    #[tokio::test]
    async fn missing_token_means_unavailable() {
        let generator =
            GeminiGenerator::builder("proj", "us-west1", "gemini-1.5-flash-latest").build();
        let err = generator.generate(&GenerationRequest::new("hi")).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Unavailable(_)));
    }
}
