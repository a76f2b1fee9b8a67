//! OpenAI chat-completions client.
//!
//! Same classify contract as the Anthropic client. Chat completions
//! take no binary attachments here, so non-text content is embedded as
//! base64 inside the user message.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::credentials::CredentialStore;
use super::{BackendError, ClassificationBackend, ClassifyRequest};
use crate::ai::prompts::CLASSIFY_SYSTEM_PROMPT;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const MAX_TOKENS: u32 = 512;

#[derive(Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

pub struct OpenAiBackend {
    client: Client,
    credentials: Arc<dyn CredentialStore>,
    model: String,
}

impl OpenAiBackend {
    pub fn new(credentials: Arc<dyn CredentialStore>, model: String) -> Self {
        Self {
            client: Client::new(),
            credentials,
            model,
        }
    }

    fn user_message(request: &ClassifyRequest) -> String {
        let mime = request.mime_type.as_str();
        let rendered = if mime.starts_with("text/")
            || mime == "application/json"
            || mime == "application/xml"
        {
            String::from_utf8_lossy(&request.content).to_string()
        } else {
            format!("(base64, {})\n{}", mime, BASE64.encode(&request.content))
        };
        format!("{}\n\nFILE CONTENT:\n---\n{}\n---", request.prompt, rendered)
    }
}

#[async_trait::async_trait]
impl ClassificationBackend for OpenAiBackend {
    fn provider(&self) -> &'static str {
        "openai"
    }

    async fn classify(&self, request: &ClassifyRequest) -> Result<String, BackendError> {
        let api_key = self
            .credentials
            .api_key(self.provider())
            .map_err(|_| BackendError::MissingCredentials(self.provider()))?;

        let body = ApiRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            messages: vec![
                Message {
                    role: "system",
                    content: CLASSIFY_SYSTEM_PROMPT.to_string(),
                },
                Message {
                    role: "user",
                    content: Self::user_message(request),
                },
            ],
        };

        let response = self
            .client
            .post(OPENAI_API_URL)
            .bearer_auth(&api_key)
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

        api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| BackendError::Envelope("no content in reply".to_string()))
    }
}
