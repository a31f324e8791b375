use krishi_core::cache::BoundedCache;
use krishi_core::config::{AppConfig, LoadOptions};
use krishi_core::spoilage::{ProfileResolver, SpoilageEstimator, SpoilageReading, StaticOnly};
use serde_json::json;

use crate::commands::{block_on, CommandResult, EXIT_CONFIG, EXIT_INVALID_INPUT};

const COMMAND: &str = "spoilage";

/// Offline estimate: crops missing from the built-in table use the default profile.
pub fn run(crop: &str, temp: f64, humidity: f64, days: f64) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "config_validation",
                error.to_string(),
                EXIT_CONFIG,
            )
        }
    };

    let reading = match SpoilageReading::from_raw(crop, temp, humidity, days) {
        Ok(reading) => reading,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "invalid_input",
                error.to_string(),
                EXIT_INVALID_INPUT,
            )
        }
    };

    let memo = BoundedCache::new(config.cache.profile_max_entries, None);
    let resolver = ProfileResolver::new(StaticOnly, memo, false);
    let resolved = match block_on(COMMAND, resolver.resolve(&reading.crop_name)) {
        Ok(resolved) => resolved,
        Err(failure) => return failure,
    };

    let estimator = SpoilageEstimator::new(config.spoilage);
    let assessment = estimator.estimate(&reading, &resolved.profile);
    let recommendation = estimator.recommendation(&reading, &resolved.profile, &assessment);

    let message =
        format!("{}: risk {:.1}% ({})", reading.crop_name, assessment.risk, recommendation);
    let data = json!({
        "risk": assessment.risk,
        "isHighRisk": assessment.is_high_risk,
        "recommendation": recommendation,
        "meta": {
            "tIdeal": resolved.profile.ideal_temperature_c,
            "hIdeal": resolved.profile.ideal_humidity_pct,
            "shelfLife": resolved.profile.shelf_life_days,
            "profileSource": resolved.origin,
        },
    });

    CommandResult::success(COMMAND, message, Some(data))
}
