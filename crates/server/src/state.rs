use std::sync::Arc;
use std::time::Duration;

use krishi_agent::{Diagnostician, GenerativeModel, ModelPriceEstimator, ModelProfileSource};
use krishi_core::cache::BoundedCache;
use krishi_core::config::AppConfig;
use krishi_core::market::MarketSnapshotCache;
use krishi_core::spoilage::{ProfileResolver, SpoilageEstimator};

use crate::weather::WeatherClient;

/// Shared handler state. Cloning is cheap; all members are reference counted.
#[derive(Clone)]
pub struct AppState {
    pub spoilage: Arc<SpoilageEstimator>,
    pub profiles: Arc<ProfileResolver<ModelProfileSource>>,
    pub market: Arc<MarketSnapshotCache<ModelPriceEstimator>>,
    pub diagnostician: Arc<Diagnostician>,
    pub model: Arc<dyn GenerativeModel>,
    pub weather: WeatherClient,
}

impl AppState {
    pub fn new(config: &AppConfig, model: Arc<dyn GenerativeModel>) -> Result<Self, reqwest::Error> {
        let dedupe = config.cache.dedupe_in_flight;

        let profiles = ProfileResolver::new(
            ModelProfileSource::new(model.clone()),
            BoundedCache::new(config.cache.profile_max_entries, None),
            dedupe,
        );
        let market = MarketSnapshotCache::new(
            ModelPriceEstimator::new(model.clone(), config.market.currency_unit.clone()),
            BoundedCache::new(config.cache.market_max_entries, config.cache.market_ttl()),
            config.market.jitter_bound,
            dedupe,
        );
        let weather = WeatherClient::new(
            &config.weather.base_url,
            Duration::from_secs(config.weather.timeout_secs),
        )?;

        Ok(Self {
            spoilage: Arc::new(SpoilageEstimator::new(config.spoilage)),
            profiles: Arc::new(profiles),
            market: Arc::new(market),
            diagnostician: Arc::new(Diagnostician::new(model.clone())),
            model,
            weather,
        })
    }
}

#[cfg(test)]
pub mod tests {
    use std::sync::Arc;

    use krishi_agent::{DisabledModel, GenerativeModel};
    use krishi_core::config::AppConfig;

    use super::AppState;

    pub fn state_with_model(model: Arc<dyn GenerativeModel>) -> AppState {
        AppState::new(&AppConfig::default(), model).expect("state should build")
    }

    pub fn state_with_weather(base_url: &str) -> AppState {
        let mut config = AppConfig::default();
        config.weather.base_url = base_url.to_string();
        config.weather.timeout_secs = 2;
        AppState::new(&config, Arc::new(DisabledModel)).expect("state should build")
    }

    pub fn disabled_state() -> AppState {
        state_with_model(Arc::new(DisabledModel))
    }
}
