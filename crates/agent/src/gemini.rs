use std::time::Duration;

use async_trait::async_trait;
use krishi_core::config::LlmConfig;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::llm::{GenerationRequest, GenerativeModel, ModelError};

pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    vision_model: String,
}

impl GeminiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        model: impl Into<String>,
        vision_model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| ModelError::Transport(format!("http client setup failed: {error}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            vision_model: vision_model.into(),
        })
    }

    /// Returns `Ok(None)` when no API key is configured.
    pub fn from_config(config: &LlmConfig) -> Result<Option<Self>, ModelError> {
        let Some(api_key) = config.api_key.clone().filter(|_| config.has_api_key()) else {
            return Ok(None);
        };

        Self::new(
            config.base_url.clone(),
            api_key,
            config.model.clone(),
            config.vision_model.clone(),
            Duration::from_secs(config.timeout_secs),
        )
        .map(Some)
    }

    fn model_for(&self, request: &GenerationRequest) -> &str {
        if request.image.is_some() {
            &self.vision_model
        } else {
            &self.model
        }
    }

    /// Endpoint without the key query parameter.
    pub fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{model}:generateContent", self.base_url)
    }
}

pub fn request_body(request: &GenerationRequest) -> Value {
    let mut parts = vec![json!({ "text": request.prompt })];
    if let Some(image) = &request.image {
        parts.push(json!({
            "inline_data": { "mime_type": image.mime_type, "data": image.data }
        }));
    }
    json!({ "contents": [{ "parts": parts }] })
}

fn upstream_message(body: &Value) -> Option<String> {
    let error = body.get("error")?;
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string());
    Some(message)
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<Value, ModelError> {
        let model = self.model_for(request);
        debug!(
            event_name = "llm.gemini.request",
            model = %model,
            has_image = request.image.is_some(),
            "sending generation request"
        );

        let response = self
            .client
            .post(self.endpoint(model))
            .query(&[("key", self.api_key.expose_secret())])
            .json(&request_body(request))
            .send()
            .await
            .map_err(|error| {
                // reqwest errors echo the URL, which carries the key
                let error = error.without_url();
                warn!(
                    event_name = "llm.gemini.transport_error",
                    model = %model,
                    error = %error,
                    "generation request failed"
                );
                ModelError::Transport(error.to_string())
            })?;

        let status = response.status();
        let body: Value = response.json().await.map_err(|error| {
            ModelError::Malformed(format!("response was not JSON: {}", error.without_url()))
        })?;

        if let Some(message) = upstream_message(&body) {
            warn!(
                event_name = "llm.gemini.upstream_error",
                model = %model,
                status = status.as_u16(),
                "model returned an error object"
            );
            return Err(ModelError::Upstream { status: status.as_u16(), message });
        }
        if !status.is_success() {
            return Err(ModelError::Upstream {
                status: status.as_u16(),
                message: format!("unexpected status {status}"),
            });
        }

        Ok(body)
    }
}
