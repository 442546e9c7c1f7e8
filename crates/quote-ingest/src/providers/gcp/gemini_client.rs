//! Gemini client for structured data extraction
//!
//! Sends the document inline (base64) with an extraction prompt to the
//! Generative Language `generateContent` endpoint. One call per attempt; the
//! retry policy lives in `ExtractionClient`.

use async_trait::async_trait;
use base64::Engine;

use crate::config::ExtractionConfig;
use crate::error::{Error, ExtractionError, Result};
use crate::providers::extraction::ExtractionProvider;
use crate::types::ExtractedContent;

const DOCUMENT_PREAMBLE: &str = "Here's the document content in base64 format:";

/// Longest error body kept in an error message
const MAX_ERROR_BODY: usize = 500;

/// Gemini extraction client
pub struct GeminiExtractor {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    prompt: String,
}

impl GeminiExtractor {
    /// Create a new Gemini extractor
    ///
    /// # Arguments
    /// * `http` - Shared HTTP client
    /// * `config` - Extraction settings; `api_key` must be set
    pub fn new(http: reqwest::Client, config: &ExtractionConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Config("GEMINI_API_KEY is not set".into()))?;

        Ok(Self {
            http,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            prompt: config.prompt.clone(),
        })
    }

    /// Get the API endpoint URL
    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    fn build_request(&self, document: &[u8], media_type: &str) -> GenerateRequest {
        let data = base64::engine::general_purpose::STANDARD.encode(document);

        GenerateRequest {
            contents: vec![
                Content {
                    role: "user".to_string(),
                    parts: vec![Part::Text {
                        text: self.prompt.clone(),
                    }],
                },
                Content {
                    role: "user".to_string(),
                    parts: vec![
                        Part::Text {
                            text: DOCUMENT_PREAMBLE.to_string(),
                        },
                        Part::InlineData {
                            inline_data: InlineData {
                                mime_type: media_type.to_string(),
                                data,
                            },
                        },
                    ],
                },
            ],
            generation_config: GenerationConfig {
                temperature: 1.0,
                top_p: 0.95,
                top_k: 64,
                max_output_tokens: 8192,
            },
        }
    }
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(serde::Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(serde::Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(serde::Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(serde::Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(serde::Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(serde::Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[async_trait]
impl ExtractionProvider for GeminiExtractor {
    async fn extract_once(
        &self,
        document: &[u8],
        media_type: &str,
    ) -> std::result::Result<ExtractedContent, ExtractionError> {
        let request = self.build_request(document, media_type);

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ExtractionError::Unclassified(format!("Gemini request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::from_status(
                status.as_u16(),
                truncate(&body).to_string(),
            ));
        }

        let gen_response: GenerateResponse = response.json().await.map_err(|e| {
            ExtractionError::Unclassified(format!("Failed to parse Gemini response: {}", e))
        })?;

        let text: String = gen_response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ExtractionError::Unclassified(
                "No text in Gemini response".to_string(),
            ));
        }

        Ok(ExtractedContent::new(text))
    }

    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
