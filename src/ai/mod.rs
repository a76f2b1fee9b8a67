//! Classification backend: prompt construction, API clients, response
//! validation and the deterministic fallback.

pub mod anthropic;
pub mod credentials;
pub mod openai;
pub mod prompts;
pub mod response;

pub use anthropic::AnthropicBackend;
pub use openai::OpenAiBackend;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Which backend the pipeline sends classification calls to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Anthropic,
    Openai,
}

impl Provider {
    /// Credential-store account name for this provider.
    pub fn key_name(&self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::Openai => "openai",
        }
    }
}

/// One classification request: the instruction prompt plus the file's
/// raw content.
#[derive(Debug, Clone)]
pub struct ClassifyRequest {
    pub prompt: String,
    pub file_name: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("api key not configured for {0}")]
    MissingCredentials(&'static str),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("malformed api response: {0}")]
    Envelope(String),
}

/// A backend that accepts a prompt plus file content and returns the
/// raw model reply text. Parsing and validation happen in
/// [`response`], not here.
#[async_trait]
pub trait ClassificationBackend: Send + Sync {
    /// Provider key name, used for the pipeline's credential pre-check.
    fn provider(&self) -> &'static str;

    async fn classify(&self, request: &ClassifyRequest) -> Result<String, BackendError>;
}
