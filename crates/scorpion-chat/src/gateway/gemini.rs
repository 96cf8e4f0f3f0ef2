//! Gemini `generateContent` REST gateway.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use scorpion_core::config::GatewayConfig;
use scorpion_core::types::{
    GatewayReply, GroundingChunk, ImagePayload, Message, Role, WebReference,
};
use serde::{Deserialize, Serialize};

use super::{GatewayError, GatewayRequest, RequestGateway};

/// Gateway that talks to the Gemini HTTP API.
#[derive(Clone)]
pub struct GeminiGateway {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    system_instruction: Option<String>,
    search_grounding: bool,
}

impl std::fmt::Debug for GeminiGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiGateway")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("has_api_key", &self.api_key.is_some())
            .field("search_grounding", &self.search_grounding)
            .finish()
    }
}

impl GeminiGateway {
    /// Creates a gateway with the provided API key and model and no extras.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let defaults = GatewayConfig::default();
        Self {
            client: Client::new(),
            base_url: defaults.base_url,
            model: model.into(),
            api_key: Some(api_key.into()),
            system_instruction: None,
            search_grounding: false,
        }
    }

    /// Builds a gateway from configuration, reading the key from the
    /// configured environment variable.
    ///
    /// A missing key is not an error here: every call then settles with
    /// [`GatewayError::Config`], so the conversation still works end to end.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let mut builder = Client::builder();
        if config.request_timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.request_timeout_secs));
        }
        let client = builder
            .build()
            .map_err(|e| GatewayError::Config(format!("failed to build HTTP client: {e}")))?;

        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            tracing::warn!(
                env = %config.api_key_env,
                "Gemini API key not set; requests will fail until it is provided"
            );
        }

        let system_instruction = Some(config.system_instruction.clone())
            .filter(|s| !s.trim().is_empty());

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            system_instruction,
            search_grounding: config.search_grounding,
        })
    }

    /// Overrides the endpoint base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Adds a system instruction that will be sent alongside every request.
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    /// Enables the Google Search grounding tool.
    pub fn with_search_grounding(mut self, enabled: bool) -> Self {
        self.search_grounding = enabled;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", self.base_url, self.model)
    }

    fn build_request(&self, request: &GatewayRequest) -> GenerateContentRequest {
        let mut contents: Vec<Content> = request
            .history
            .iter()
            .filter_map(message_to_content)
            .collect();

        // The prompt normally arrives as the last history entry already.
        let prompt_in_history = request
            .history
            .last()
            .map(|m| m.role == Role::User && m.text == request.text)
            .unwrap_or(false);
        if !prompt_in_history {
            let mut parts = Vec::new();
            if !request.text.is_empty() {
                parts.push(Part::Text {
                    text: request.text.clone(),
                });
            }
            if let Some(image) = &request.attachment {
                parts.push(image_part(image));
            }
            if !parts.is_empty() {
                contents.push(Content {
                    role: Role::User.as_str().to_string(),
                    parts,
                });
            }
        }

        let system_instruction = self.system_instruction.as_ref().map(|text| SystemContent {
            parts: vec![Part::Text { text: text.clone() }],
        });

        let tools = if self.search_grounding {
            Some(vec![serde_json::json!({ "googleSearch": {} })])
        } else {
            None
        };

        GenerateContentRequest {
            contents,
            system_instruction,
            tools,
        }
    }

    async fn send_request(
        &self,
        api_key: &str,
        body: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GatewayError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(body)
            .send()
            .await
            .map_err(|err| GatewayError::Network(format!("Gemini API request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read Gemini error body".to_string());
            return Err(map_http_error(status, body_text));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| GatewayError::Network(format!("Failed to read Gemini reply: {err}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|err| GatewayError::Malformed(format!("Failed to parse Gemini response: {err}")))
    }
}

#[async_trait]
impl RequestGateway for GeminiGateway {
    async fn solve(&self, request: GatewayRequest) -> Result<GatewayReply, GatewayError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            GatewayError::Config("Gemini API key is not configured".to_string())
        })?;

        let body = self.build_request(&request);
        if body.contents.is_empty() {
            return Err(GatewayError::Config(
                "Gemini payload must include text or an image".to_string(),
            ));
        }

        tracing::debug!(
            model = %self.model,
            turns = body.contents.len(),
            grounding = self.search_grounding,
            "Sending generateContent request"
        );

        let parsed = self.send_request(api_key, &body).await?;
        extract_reply(parsed)
    }
}

fn message_to_content(message: &Message) -> Option<Content> {
    // System messages are local notices; the instruction travels separately.
    if message.role == Role::System {
        return None;
    }
    let mut parts = Vec::new();
    if !message.text.is_empty() {
        parts.push(Part::Text {
            text: message.text.clone(),
        });
    }
    if let Some(image) = &message.image {
        parts.push(image_part(image));
    }
    if parts.is_empty() {
        return None;
    }
    Some(Content {
        role: message.role.as_str().to_string(),
        parts,
    })
}

fn image_part(image: &ImagePayload) -> Part {
    Part::InlineData {
        inline_data: InlineDataPayload {
            mime_type: image.media_type.clone(),
            data: image.to_base64(),
        },
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct SystemContent {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineDataPayload,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineDataPayload {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<ContentResponse>,
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Debug, Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunkResponse>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunkResponse {
    web: Option<WebResponse>,
}

#[derive(Debug, Deserialize)]
struct WebResponse {
    uri: Option<String>,
    title: Option<String>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

fn extract_reply(response: GenerateContentResponse) -> Result<GatewayReply, GatewayError> {
    let candidate = response
        .candidates
        .and_then(|candidates| candidates.into_iter().next())
        .ok_or_else(|| {
            GatewayError::Malformed("Gemini API returned no response candidates".to_string())
        })?;

    let text = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .filter(|text| !text.is_empty());

    if text.is_none() {
        tracing::warn!(
            finish_reason = candidate.finish_reason.as_deref().unwrap_or("unknown"),
            "Gemini candidate carried no text"
        );
    }

    let grounding_urls = candidate
        .grounding_metadata
        .map(|meta| {
            meta.grounding_chunks
                .into_iter()
                .map(|chunk| GroundingChunk {
                    web: chunk.web.and_then(|web| {
                        web.uri.map(|uri| WebReference {
                            title: web.title.unwrap_or_else(|| uri.clone()),
                            uri,
                        })
                    }),
                })
                .collect::<Vec<_>>()
        })
        .filter(|chunks| !chunks.is_empty());

    Ok(GatewayReply {
        role: Some(Role::Model),
        text,
        grounding_urls,
        sources: None,
    })
}

fn map_http_error(status: StatusCode, body: String) -> GatewayError {
    let message = serde_json::from_str::<ErrorWrapper>(&body)
        .map(|wrapper| {
            let status_text = wrapper.error.status.unwrap_or_default();
            let msg = wrapper.error.message.unwrap_or_else(|| body.clone());
            if status_text.is_empty() {
                msg
            } else {
                format!("{status_text}: {msg}")
            }
        })
        .unwrap_or_else(|_| body.clone());

    GatewayError::Status {
        status: status.as_u16(),
        body: message,
    }
}
