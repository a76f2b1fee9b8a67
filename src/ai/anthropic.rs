//! Anthropic messages API client.
//!
//! File content travels inline: base64 document blocks for PDFs, base64
//! image blocks for images, plain text blocks for textual MIME types.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::credentials::CredentialStore;
use super::{BackendError, ClassificationBackend, ClassifyRequest};
use crate::ai::prompts::CLASSIFY_SYSTEM_PROMPT;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 512;

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ContentBlock {
    Text { text: String },
    Image { source: MediaSource },
    Document { source: MediaSource },
}

#[derive(Serialize)]
struct MediaSource {
    #[serde(rename = "type")]
    source_type: &'static str,
    media_type: String,
    data: String,
}

impl MediaSource {
    fn base64(media_type: &str, bytes: &[u8]) -> Self {
        Self {
            source_type: "base64",
            media_type: media_type.to_string(),
            data: BASE64.encode(bytes),
        }
    }
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    system: &'static str,
    messages: Vec<Message>,
}

#[derive(Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

pub struct AnthropicBackend {
    client: Client,
    credentials: Arc<dyn CredentialStore>,
    model: String,
}

impl AnthropicBackend {
    pub fn new(credentials: Arc<dyn CredentialStore>, model: String) -> Self {
        Self {
            client: Client::new(),
            credentials,
            model,
        }
    }

    /// Inline representation of the file, chosen by MIME type.
    fn content_block(request: &ClassifyRequest) -> ContentBlock {
        let mime = request.mime_type.as_str();
        if mime == "application/pdf" {
            ContentBlock::Document {
                source: MediaSource::base64(mime, &request.content),
            }
        } else if mime.starts_with("image/") {
            ContentBlock::Image {
                source: MediaSource::base64(mime, &request.content),
            }
        } else if is_textual(mime) {
            ContentBlock::Text {
                text: String::from_utf8_lossy(&request.content).to_string(),
            }
        } else {
            ContentBlock::Text {
                text: format!(
                    "FILE CONTENT ({}, base64):\n{}",
                    mime,
                    BASE64.encode(&request.content)
                ),
            }
        }
    }
}

fn is_textual(mime: &str) -> bool {
    mime.starts_with("text/")
        || mime == "application/json"
        || mime == "application/xml"
        || mime == "application/javascript"
}

#[async_trait::async_trait]
impl ClassificationBackend for AnthropicBackend {
    fn provider(&self) -> &'static str {
        "anthropic"
    }

    async fn classify(&self, request: &ClassifyRequest) -> Result<String, BackendError> {
        let api_key = self
            .credentials
            .api_key(self.provider())
            .map_err(|_| BackendError::MissingCredentials(self.provider()))?;

        let body = ApiRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            system: CLASSIFY_SYSTEM_PROMPT,
            messages: vec![Message {
                role: "user",
                content: vec![
                    Self::content_block(request),
                    ContentBlock::Text {
                        text: request.prompt.clone(),
                    },
                ],
            }],
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&error_text)
                .map(|e| e.error.message)
                .unwrap_or(error_text);
            return Err(BackendError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Envelope(e.to_string()))?;

        let text = api_response
            .content
            .iter()
            .filter_map(|block| {
                if block.block_type == "text" {
                    block.text.clone()
                } else {
                    None
                }
            })
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(BackendError::Envelope("no text blocks in reply".to_string()));
        }
        Ok(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(mime: &str, content: &[u8]) -> ClassifyRequest {
        ClassifyRequest {
            prompt: "classify".to_string(),
            file_name: "f".to_string(),
            mime_type: mime.to_string(),
            content: content.to_vec(),
        }
    }

    #[test]
    fn test_pdf_becomes_document_block() {
        let block = AnthropicBackend::content_block(&request("application/pdf", b"%PDF"));
        assert!(matches!(block, ContentBlock::Document { .. }));
    }

    #[test]
    fn test_image_becomes_image_block() {
        let block = AnthropicBackend::content_block(&request("image/png", &[1, 2, 3]));
        assert!(matches!(block, ContentBlock::Image { .. }));
    }

    #[test]
    fn test_text_stays_text() {
        let block = AnthropicBackend::content_block(&request("text/plain", b"hello"));
        match block {
            ContentBlock::Text { text } => assert_eq!(text, "hello"),
            _ => panic!("expected text block"),
        }
    }

    #[test]
    fn test_binary_is_base64_text() {
        let block =
            AnthropicBackend::content_block(&request("application/octet-stream", &[0, 255]));
        match block {
            ContentBlock::Text { text } => assert!(text.contains("base64")),
            _ => panic!("expected text block"),
        }
    }
}
