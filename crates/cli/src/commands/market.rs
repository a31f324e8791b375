use chrono::{NaiveDate, Utc};
use krishi_core::cache::BoundedCache;
use krishi_core::config::{AppConfig, LoadOptions};
use krishi_core::errors::{ApplicationError, DomainError};
use krishi_core::market::{BaselinesOnly, MarketSnapshot, MarketSnapshotCache};
use serde::Serialize;

use crate::commands::{
    block_on, CommandResult, EXIT_CONFIG, EXIT_INVALID_INPUT, EXIT_NOT_FOUND, EXIT_RUNTIME,
};

const COMMAND: &str = "market";

#[derive(Debug, Serialize)]
struct MarketReport<'a> {
    date: String,
    crop: &'a str,
    region: &'a str,
    #[serde(flatten)]
    snapshot: &'a MarketSnapshot,
    unit: &'a str,
}

pub fn run(crop: &str, region: &str, date: Option<&str>) -> CommandResult {
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

    let date = match date {
        Some(raw) => match NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
            Ok(date) => date,
            Err(error) => {
                return CommandResult::failure(
                    COMMAND,
                    "invalid_input",
                    format!("date must be YYYY-MM-DD: {error}"),
                    EXIT_INVALID_INPUT,
                )
            }
        },
        None => Utc::now().date_naive(),
    };

    let markets = MarketSnapshotCache::new(
        BaselinesOnly,
        BoundedCache::new(config.cache.market_max_entries, config.cache.market_ttl()),
        config.market.jitter_bound,
        false,
    );
    let snapshot = match block_on(COMMAND, markets.get_snapshot(crop, region, date)) {
        Ok(Ok(snapshot)) => snapshot,
        Ok(Err(error)) => return failure_for(error),
        Err(failure) => return failure,
    };

    let message = format!(
        "{} at {} on {date}: {:.0} {} (peak {:.0})",
        crop.trim(),
        region.trim(),
        snapshot.current,
        config.market.currency_unit,
        snapshot.peak
    );
    let report = MarketReport {
        date: date.to_string(),
        crop: crop.trim(),
        region: region.trim(),
        snapshot: &snapshot,
        unit: &config.market.currency_unit,
    };
    match serde_json::to_value(&report) {
        Ok(data) => CommandResult::success(COMMAND, message, Some(data)),
        Err(error) => {
            CommandResult::failure(COMMAND, "serialization", error.to_string(), EXIT_RUNTIME)
        }
    }
}

fn failure_for(error: ApplicationError) -> CommandResult {
    match error {
        ApplicationError::Domain(DomainError::InvalidInput(message)) => {
            CommandResult::failure(COMMAND, "invalid_input", message, EXIT_INVALID_INPUT)
        }
        ApplicationError::NotFound(message) => {
            CommandResult::failure(COMMAND, "not_found", message, EXIT_NOT_FOUND)
        }
        other => CommandResult::failure(COMMAND, "market_lookup", other.to_string(), EXIT_RUNTIME),
    }
}
