//! Core lookup traits backed by the generative model.

use std::sync::Arc;

use async_trait::async_trait;
use krishi_core::errors::ApplicationError;
use krishi_core::market::{MarketSnapshot, PriceEstimator};
use krishi_core::spoilage::{CropBiologyProfile, ProfileSource};
use serde::Deserialize;

use crate::extract::extract_as;
use crate::llm::{GenerationRequest, GenerativeModel};
use crate::prompts;

pub struct ModelProfileSource {
    model: Arc<dyn GenerativeModel>,
}

impl ModelProfileSource {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl ProfileSource for ModelProfileSource {
    async fn fetch_profile(
        &self,
        crop_name: &str,
    ) -> Result<CropBiologyProfile, ApplicationError> {
        let request = GenerationRequest::text(prompts::crop_biology(crop_name));
        let text = self.model.complete(&request).await?;
        Ok(extract_as::<CropBiologyProfile>(&text)?)
    }
}

#[derive(Debug, Deserialize)]
struct PriceDraft {
    current: f64,
    peak: f64,
    trend: Vec<f64>,
}

pub struct ModelPriceEstimator {
    model: Arc<dyn GenerativeModel>,
    currency_unit: String,
}

impl ModelPriceEstimator {
    pub fn new(model: Arc<dyn GenerativeModel>, currency_unit: impl Into<String>) -> Self {
        Self { model, currency_unit: currency_unit.into() }
    }
}

#[async_trait]
impl PriceEstimator for ModelPriceEstimator {
    async fn estimate_prices(
        &self,
        crop_name: &str,
        region_name: &str,
    ) -> Result<MarketSnapshot, ApplicationError> {
        if !self.model.is_configured() {
            return Err(ApplicationError::NotFound(format!(
                "no market baseline for `{crop_name}` in `{region_name}`"
            )));
        }

        let request = GenerationRequest::text(prompts::market_prices(
            crop_name,
            region_name,
            &self.currency_unit,
        ));
        let text = self.model.complete(&request).await?;
        let draft = extract_as::<PriceDraft>(&text)?;

        MarketSnapshot::try_from_parts(draft.current, draft.peak, &draft.trend)
            .map_err(|error| ApplicationError::MalformedResponse(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use krishi_core::cache::BoundedCache;
    use krishi_core::errors::ApplicationError;
    use krishi_core::market::{MarketSnapshotCache, PriceEstimator};
    use krishi_core::spoilage::{ProfileOrigin, ProfileResolver, ProfileSource};
    use serde_json::{json, Value};

    use super::{ModelPriceEstimator, ModelProfileSource};
    use crate::llm::{DisabledModel, GenerationRequest, GenerativeModel, ModelError};

    struct ScriptedModel {
        text: String,
        calls: AtomicUsize,
        last_prompt: Mutex<Option<String>>,
    }

    impl ScriptedModel {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                text: text.to_string(),
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl GenerativeModel for ScriptedModel {
        async fn generate(&self, request: &GenerationRequest) -> Result<Value, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().expect("prompt lock") = Some(request.prompt.clone());
            Ok(json!({ "candidates": [{ "content": { "parts": [{ "text": self.text }] } }] }))
        }
    }

    #[tokio::test]
    async fn profile_source_parses_short_field_names() {
        let model = ScriptedModel::replying(
            "```json\n{\"tIdeal\": 8, \"hIdeal\": 85, \"tSens\": 0.12, \"hSens\": 0.07, \"shelfLife\": 45}\n```",
        );
        let source = ModelProfileSource::new(model.clone());

        let profile = source.fetch_profile("Dragon Fruit").await.expect("profile");

        assert_eq!(profile.ideal_temperature_c, 8.0);
        assert_eq!(profile.shelf_life_days, 45.0);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn resolver_memoizes_model_profiles() {
        let model = ScriptedModel::replying(
            "{\"tIdeal\": 8, \"hIdeal\": 85, \"tSens\": 0.12, \"hSens\": 0.07, \"shelfLife\": 45}",
        );
        let resolver = ProfileResolver::new(
            ModelProfileSource::new(model.clone()),
            BoundedCache::new(8, None),
            true,
        );

        assert_eq!(resolver.resolve("Dragon Fruit").await.origin, ProfileOrigin::Model);
        assert_eq!(resolver.resolve("dragon fruit").await.origin, ProfileOrigin::Memoized);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn price_estimator_keeps_last_seven_trend_points() {
        let model = ScriptedModel::replying(
            "Here you go: {\"current\": 1800, \"peak\": 1950, \"trend\": [1, 2, 1700, 1720, 1750, 1780, 1800, 1900, 1950]}",
        );
        let estimator = ModelPriceEstimator::new(model, "INR per quintal");

        let snapshot = estimator.estimate_prices("Onion", "Lasalgaon").await.expect("snapshot");

        assert_eq!(snapshot.trend, [1700.0, 1720.0, 1750.0, 1780.0, 1800.0, 1900.0, 1950.0]);
    }

    #[tokio::test]
    async fn price_prompt_names_the_configured_currency_unit() {
        let model = ScriptedModel::replying(
            "{\"current\": 210, \"peak\": 230, \"trend\": [200, 205, 210, 215, 220, 225, 230]}",
        );
        let estimator = ModelPriceEstimator::new(model.clone(), "USD per tonne");

        estimator.estimate_prices("Onion", "Lasalgaon").await.expect("snapshot");

        let prompt = model.last_prompt.lock().expect("prompt lock").clone().expect("prompt sent");
        assert!(prompt.contains("Prices are in USD per tonne."));
        assert!(!prompt.contains("INR per quintal"));
    }

    #[tokio::test]
    async fn short_trends_are_malformed() {
        let model =
            ScriptedModel::replying("{\"current\": 1800, \"peak\": 1950, \"trend\": [1800, 1900]}");
        let estimator = ModelPriceEstimator::new(model, "INR per quintal");

        let result = estimator.estimate_prices("Onion", "Lasalgaon").await;

        assert!(matches!(result, Err(ApplicationError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn estimated_snapshots_are_cached_for_the_day() {
        let model = ScriptedModel::replying(
            "{\"current\": 1800, \"peak\": 1950, \"trend\": [1700, 1720, 1750, 1780, 1800, 1900, 1950]}",
        );
        let cache = MarketSnapshotCache::new(
            ModelPriceEstimator::new(model.clone(), "INR per quintal"),
            BoundedCache::new(8, None),
            20,
            true,
        );
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).expect("date");

        let first = cache.get_snapshot("Onion", "Lasalgaon", date).await.expect("first");
        let second = cache.get_snapshot("Onion", "Lasalgaon", date).await.expect("second");

        assert_eq!(first, second);
        assert_eq!(first.current, 1800.0, "estimates are not jittered");
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_pairs_are_not_found_without_a_model() {
        let estimator = ModelPriceEstimator::new(Arc::new(DisabledModel), "INR per quintal");

        let result = estimator.estimate_prices("Onion", "Lasalgaon").await;

        assert!(matches!(result, Err(ApplicationError::NotFound(_))));
    }
}
