//! Gemini image API integration.
//!
//! Implements the GenerationGateway trait for Google's Gemini image models.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{GatewayError, GenerationGateway};
use crate::card::GeneratedImage;
use crate::core::GatewayConfig;
use crate::credentials::{EnvCredentialSource, SecretValue};
use crate::prompt::{GenerationRequest, PromptSegment};

/// Gemini API gateway.
pub struct GeminiGateway {
    client: Client,
    endpoint: String,
    model: String,
    validation_model: String,
    ambient: EnvCredentialSource,
}

impl GeminiGateway {
    /// Create a gateway from configuration.
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            validation_model: config.validation_model.clone(),
            ambient: EnvCredentialSource::new(config.api_key_env.clone()),
        })
    }

    fn url(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, model)
    }

    /// Make a request to the Gemini API.
    async fn request(
        &self,
        model: &str,
        body: &GeminiRequest,
        api_key: &SecretValue,
    ) -> Result<GeminiResponse, GatewayError> {
        let response = self
            .client
            .post(self.url(model))
            .header("x-goog-api-key", api_key.expose())
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(status, &body));
        }

        response.json::<GeminiResponse>().await.map_err(|e| GatewayError::Decode(e.to_string()))
    }
}

#[async_trait]
impl GenerationGateway for GeminiGateway {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn validate_credential(&self, credential: &SecretValue) -> bool {
        let body = GeminiRequest {
            contents: GeminiContent { parts: vec![GeminiPart::Text { text: "Test".to_string() }] },
            generation_config: None,
        };

        match self.request(&self.validation_model, &body, credential).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "API key validation failed");
                false
            }
        }
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        credential: Option<&SecretValue>,
    ) -> Result<GeneratedImage, GatewayError> {
        let ambient;
        let api_key = match credential {
            Some(key) => key,
            None => {
                ambient = self.ambient.resolve().ok_or(GatewayError::MissingCredential)?;
                &ambient
            }
        };

        let body = GeminiRequest::from_generation(request);
        tracing::debug!(
            model = %self.model,
            mode = %request.mode,
            segments = request.segments.len(),
            "Sending generation request"
        );

        let response = self.request(&self.model, &body, api_key).await?;
        response.into_image()
    }
}

/// Gemini API request structure.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: GeminiContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

impl GeminiRequest {
    fn from_generation(request: &GenerationRequest) -> Self {
        let parts = request
            .segments
            .iter()
            .map(|segment| match segment {
                PromptSegment::Text { text } => GeminiPart::Text { text: text.clone() },
                PromptSegment::Image { mime_type, data } => GeminiPart::InlineData {
                    inline_data: InlineData {
                        mime_type: mime_type.clone(),
                        data: STANDARD.encode(data),
                    },
                },
            })
            .collect();

        Self {
            contents: GeminiContent { parts },
            generation_config: Some(GenerationConfig {
                image_config: ImageConfig {
                    aspect_ratio: request.aspect_hint.clone(),
                    image_size: request.quality_hint.id().to_string(),
                },
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default = "default_image_mime")]
    mime_type: String,
    #[serde(default)]
    data: String,
}

fn default_image_mime() -> String {
    "image/png".to_string()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    image_config: ImageConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageConfig {
    aspect_ratio: String,
    image_size: String,
}

/// Gemini API response structure.
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GeminiResponse {
    /// First non-empty inline image of the first candidate.
    fn into_image(self) -> Result<GeneratedImage, GatewayError> {
        let inline = self
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .and_then(|content| {
                content
                    .parts
                    .into_iter()
                    .find_map(|part| part.inline_data.filter(|d| !d.data.is_empty()))
            })
            .ok_or(GatewayError::NoArtifact)?;

        let bytes = STANDARD
            .decode(inline.data.as_bytes())
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        Ok(GeneratedImage::new(inline.mime_type, bytes))
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    inline_data: Option<InlineData>,
}
