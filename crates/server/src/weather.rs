use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::api::{ApiError, ApiResult};
use crate::state::AppState;

const CURRENT_FIELDS: &str = "temperature_2m,relative_humidity_2m";

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("weather request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("weather service returned {0}")]
    Status(u16),
    #[error("weather response was not JSON: {0}")]
    Decode(#[source] reqwest::Error),
}

#[derive(Clone)]
pub struct WeatherClient {
    client: Client,
    base_url: String,
}

impl WeatherClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    pub async fn current_conditions(&self, lat: f64, lng: f64) -> Result<Value, WeatherError> {
        let response = self
            .client
            .get(format!("{}/v1/forecast", self.base_url))
            .query(&[
                ("latitude", lat.to_string()),
                ("longitude", lng.to_string()),
                ("current", CURRENT_FIELDS.to_string()),
            ])
            .send()
            .await
            .map_err(WeatherError::Transport)?;

        if !response.status().is_success() {
            return Err(WeatherError::Status(response.status().as_u16()));
        }

        response.json().await.map_err(WeatherError::Decode)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct WeatherQuery {
    pub lat: Option<String>,
    pub lng: Option<String>,
}

fn coordinate(raw: Option<&str>, name: &str, limit: f64) -> Result<f64, String> {
    let value = raw
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| format!("{name} is required"))?
        .parse::<f64>()
        .map_err(|_| format!("{name} must be a number"))?;

    if !value.is_finite() || value.abs() > limit {
        return Err(format!("{name} must be between -{limit} and {limit}"));
    }
    Ok(value)
}

pub async fn weather(
    State(state): State<AppState>,
    Query(query): Query<WeatherQuery>,
) -> ApiResult<Value> {
    let bad_request =
        |message: String| (StatusCode::BAD_REQUEST, Json(ApiError { error: message }));
    let lat = coordinate(query.lat.as_deref(), "lat", 90.0).map_err(bad_request)?;
    let lng = coordinate(query.lng.as_deref(), "lng", 180.0).map_err(bad_request)?;

    match state.weather.current_conditions(lat, lng).await {
        Ok(body) => Ok(Json(body)),
        Err(error) => {
            warn!(
                event_name = "api.weather.upstream_error",
                correlation_id = "weather",
                error = %error,
                "weather proxy failed"
            );
            Err((
                StatusCode::BAD_GATEWAY,
                Json(ApiError { error: "Weather service unavailable".to_string() }),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        extract::{Query, State},
        http::StatusCode,
        Json,
    };

    use super::{coordinate, weather, WeatherQuery};
    use crate::state::tests::state_with_weather;

    fn query(lat: &str, lng: &str) -> Query<WeatherQuery> {
        Query(WeatherQuery { lat: Some(lat.to_string()), lng: Some(lng.to_string()) })
    }

    #[test]
    fn coordinates_are_range_checked() {
        assert_eq!(coordinate(Some("28.61"), "lat", 90.0), Ok(28.61));
        assert!(coordinate(Some("91"), "lat", 90.0).is_err());
        assert!(coordinate(Some("north"), "lat", 90.0).is_err());
        assert!(coordinate(None, "lng", 180.0).is_err());
    }

    #[tokio::test]
    async fn invalid_coordinates_are_bad_requests() {
        let state = state_with_weather("http://127.0.0.1:9");
        let result = weather(State(state), query("120", "77.2")).await;

        let Err((status, Json(body))) = result else {
            panic!("expected an error response");
        };
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.error.contains("lat"));
    }

    #[tokio::test]
    async fn unreachable_upstream_is_a_bad_gateway() {
        let state = state_with_weather("http://127.0.0.1:9");
        let result = weather(State(state), query("28.61", "77.2")).await;

        let Err((status, Json(body))) = result else {
            panic!("expected an error response");
        };
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body.error, "Weather service unavailable");
    }
}
