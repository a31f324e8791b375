use async_trait::async_trait;
use krishi_core::errors::ApplicationError;
use serde_json::Value;
use thiserror::Error;

/// Base64 image attached to a generation request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

impl InlineImage {
    pub const DEFAULT_MIME_TYPE: &'static str = "image/jpeg";

    /// Accepts raw base64 or a `data:<mime>;base64,<payload>` URL.
    ///
    /// A MIME type embedded in the data URL is used only when `mime_type` is absent.
    pub fn from_payload(payload: &str, mime_type: Option<&str>) -> Self {
        let payload = payload.trim();
        let (embedded_mime, data) = match payload.strip_prefix("data:") {
            Some(rest) => match rest.split_once(',') {
                Some((header, data)) => {
                    let mime = header.split(';').next().filter(|mime| !mime.is_empty());
                    (mime, data)
                }
                None => (None, rest),
            },
            None => (None, payload),
        };

        let mime_type = mime_type
            .map(str::trim)
            .filter(|mime| !mime.is_empty())
            .or(embedded_mime)
            .unwrap_or(Self::DEFAULT_MIME_TYPE);

        Self { mime_type: mime_type.to_string(), data: data.trim().to_string() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub image: Option<InlineImage>,
}

impl GenerationRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), image: None }
    }

    pub fn with_image(prompt: impl Into<String>, image: InlineImage) -> Self {
        Self { prompt: prompt.into(), image: Some(image) }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("generative model is not configured")]
    NotConfigured,
    #[error("model transport failed: {0}")]
    Transport(String),
    #[error("model returned an error (status {status}): {message}")]
    Upstream { status: u16, message: String },
    #[error("model response was malformed: {0}")]
    Malformed(String),
}

impl From<ModelError> for ApplicationError {
    fn from(error: ModelError) -> Self {
        match error {
            ModelError::NotConfigured => Self::Configuration(error.to_string()),
            ModelError::Transport(_) | ModelError::Upstream { .. } => {
                Self::Integration(error.to_string())
            }
            ModelError::Malformed(_) => Self::MalformedResponse(error.to_string()),
        }
    }
}

#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Returns the provider's raw JSON body.
    async fn generate(&self, request: &GenerationRequest) -> Result<Value, ModelError>;

    fn is_configured(&self) -> bool {
        true
    }

    /// Returns the first text part of the first candidate.
    async fn complete(&self, request: &GenerationRequest) -> Result<String, ModelError> {
        let body = self.generate(request).await?;
        candidate_text(&body)
    }
}

/// Reads `candidates[0].content.parts[0].text`.
pub fn candidate_text(body: &Value) -> Result<String, ModelError> {
    body.pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ModelError::Malformed("response carried no candidate text".to_string()))
}

/// Stand-in used when no API key is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledModel;

#[async_trait]
impl GenerativeModel for DisabledModel {
    async fn generate(&self, _request: &GenerationRequest) -> Result<Value, ModelError> {
        Err(ModelError::NotConfigured)
    }

    fn is_configured(&self) -> bool {
        false
    }
}
