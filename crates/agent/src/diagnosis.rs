use std::sync::Arc;

use krishi_core::diagnosis::{fallback_for_image, reference_lookup, Diagnosis, DiagnosisDraft};
use krishi_core::errors::ApplicationError;
use serde::Serialize;
use tracing::{info, warn};

use crate::extract::extract_as;
use crate::llm::{GenerationRequest, GenerativeModel, InlineImage, ModelError};
use crate::prompts;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiagnosisRequest {
    pub crop: Option<String>,
    pub symptom: Option<String>,
    pub image_base64: Option<String>,
    pub mime_type: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosisSource {
    Model,
    ImageFallback,
    Reference,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnosed {
    pub diagnosis: Diagnosis,
    pub source: DiagnosisSource,
}

pub struct Diagnostician {
    model: Arc<dyn GenerativeModel>,
}

impl Diagnostician {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self { model }
    }

    pub async fn diagnose(&self, request: &DiagnosisRequest) -> Result<Diagnosed, ApplicationError> {
        let crop = non_empty(&request.crop);
        let symptom = non_empty(&request.symptom);

        if let Some(payload) = non_empty(&request.image_base64) {
            let image = InlineImage::from_payload(payload, request.mime_type.as_deref());
            return Ok(self.diagnose_image(image, crop).await);
        }

        if crop.is_none() && symptom.is_none() {
            return Err(ApplicationError::invalid_input(
                "provide an image or at least a crop or symptom",
            ));
        }

        self.diagnose_symptoms(crop.unwrap_or_default(), symptom.unwrap_or_default()).await
    }

    async fn ask(&self, request: GenerationRequest) -> Result<Diagnosis, ModelError> {
        let text = self.model.complete(&request).await?;
        Ok(extract_as::<DiagnosisDraft>(&text)?.complete())
    }

    async fn diagnose_image(&self, image: InlineImage, crop: Option<&str>) -> Diagnosed {
        let fingerprint = image.data.clone();
        let request = GenerationRequest::with_image(prompts::diagnose_image(crop), image);

        match self.ask(request).await {
            Ok(diagnosis) => Diagnosed { diagnosis, source: DiagnosisSource::Model },
            Err(error) => {
                warn!(
                    event_name = "diagnosis.image.fallback",
                    error = %error,
                    "image diagnosis unavailable; using deterministic fallback"
                );
                Diagnosed {
                    diagnosis: fallback_for_image(&fingerprint, crop),
                    source: DiagnosisSource::ImageFallback,
                }
            }
        }
    }

    async fn diagnose_symptoms(
        &self,
        crop: &str,
        symptom: &str,
    ) -> Result<Diagnosed, ApplicationError> {
        let request = GenerationRequest::text(prompts::diagnose_symptoms(crop, symptom));

        match self.ask(request).await {
            Ok(diagnosis) => Ok(Diagnosed { diagnosis, source: DiagnosisSource::Model }),
            Err(error) => match reference_lookup(crop, symptom) {
                Some(entry) => {
                    info!(
                        event_name = "diagnosis.symptoms.reference",
                        crop = %crop,
                        symptom = %symptom,
                        error = %error,
                        "model unavailable; serving reference table entry"
                    );
                    Ok(Diagnosed {
                        diagnosis: entry.into_diagnosis(),
                        source: DiagnosisSource::Reference,
                    })
                }
                None => Err(error.into()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use krishi_core::errors::ApplicationError;
    use serde_json::{json, Value};

    use super::{DiagnosisRequest, DiagnosisSource, Diagnostician};
    use crate::llm::{DisabledModel, GenerationRequest, GenerativeModel, ModelError};

    struct Replying(Result<String, ModelError>);

    #[async_trait]
    impl GenerativeModel for Replying {
        async fn generate(&self, request: &GenerationRequest) -> Result<Value, ModelError> {
            let text = self.0.clone()?;
            let text = match &request.image {
                Some(image) => text.replace("{mime}", &image.mime_type),
                None => text,
            };
            Ok(json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] }))
        }
    }

    fn diagnostician(reply: Result<&str, ModelError>) -> Diagnostician {
        Diagnostician::new(Arc::new(Replying(reply.map(str::to_string))))
    }

    fn image_request(data: &str) -> DiagnosisRequest {
        DiagnosisRequest {
            crop: Some("Tomato".to_string()),
            image_base64: Some(data.to_string()),
            ..DiagnosisRequest::default()
        }
    }

    #[tokio::test]
    async fn empty_request_is_rejected() {
        let result = diagnostician(Ok("{}")).diagnose(&DiagnosisRequest::default()).await;

        assert!(matches!(
            result,
            Err(ApplicationError::Domain(krishi_core::DomainError::InvalidInput(_)))
        ));
    }

    #[tokio::test]
    async fn image_diagnosis_uses_model_answer_with_defaults() {
        let diagnostician =
            diagnostician(Ok("```json\n{\"name\": \"Late Blight ({mime})\", \"confidence\": 0.9}\n```"));

        let diagnosed = diagnostician
            .diagnose(&image_request("data:image/png;base64,AAAA"))
            .await
            .expect("image diagnosis never fails");

        assert_eq!(diagnosed.source, DiagnosisSource::Model);
        assert_eq!(diagnosed.diagnosis.name, "Late Blight (image/png)");
        assert_eq!(diagnosed.diagnosis.confidence, "90%");
        assert_eq!(diagnosed.diagnosis.chemical, "Consult local agronomist");
    }

    #[tokio::test]
    async fn image_diagnosis_falls_back_deterministically() {
        let diagnostician = Diagnostician::new(Arc::new(DisabledModel));

        let first = diagnostician.diagnose(&image_request("AAAABBBB")).await.expect("fallback");
        let second = diagnostician
            .diagnose(&image_request("data:image/jpeg;base64,AAAABBBB"))
            .await
            .expect("fallback");

        assert_eq!(first.source, DiagnosisSource::ImageFallback);
        assert_eq!(first, second, "data URL prefix does not change the fingerprint");
        assert!(!first.diagnosis.steps.is_empty());
    }

    #[tokio::test]
    async fn unparseable_image_answer_also_falls_back() {
        let diagnostician = diagnostician(Ok("I am not sure what this is."));

        let diagnosed = diagnostician.diagnose(&image_request("CCCC")).await.expect("fallback");

        assert_eq!(diagnosed.source, DiagnosisSource::ImageFallback);
    }

    #[tokio::test]
    async fn symptom_diagnosis_falls_back_to_reference_table() {
        let diagnostician =
            diagnostician(Err(ModelError::Upstream { status: 429, message: "quota".to_string() }));
        let request = DiagnosisRequest {
            crop: Some("Wheat".to_string()),
            symptom: Some("yellowing".to_string()),
            ..DiagnosisRequest::default()
        };

        let diagnosed = diagnostician.diagnose(&request).await.expect("reference entry");

        assert_eq!(diagnosed.source, DiagnosisSource::Reference);
        assert_eq!(diagnosed.diagnosis.name, "Yellow Rust");
        assert_eq!(diagnosed.diagnosis.severity, "Moderate");
    }

    #[tokio::test]
    async fn symptom_diagnosis_surfaces_upstream_errors_without_reference() {
        let diagnostician = diagnostician(Ok("no json here"));
        let request = DiagnosisRequest {
            crop: Some("Millet".to_string()),
            symptom: Some("wilting".to_string()),
            ..DiagnosisRequest::default()
        };

        let result = diagnostician.diagnose(&request).await;

        assert!(matches!(result, Err(ApplicationError::MalformedResponse(_))));
    }
}
