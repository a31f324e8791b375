use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CacheUsage {
    pub entries: usize,
    pub capacity: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CacheReport {
    pub profiles: CacheUsage,
    pub market: CacheUsage,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub model: HealthCheck,
    pub caches: CacheReport,
    pub checked_at: String,
}

pub fn router(state: AppState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

/// The service is ready without a model; model-backed lookups fall back or report 404.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let model = if state.model.is_configured() {
        HealthCheck { status: "ready", detail: "generative model configured".to_string() }
    } else {
        HealthCheck {
            status: "disabled",
            detail: "no API key configured; using static tables and fallbacks".to_string(),
        }
    };

    let payload = HealthResponse {
        status: "ready",
        service: HealthCheck {
            status: "ready",
            detail: "krishi-server runtime initialized".to_string(),
        },
        model,
        caches: CacheReport {
            profiles: CacheUsage {
                entries: state.profiles.memoized().await,
                capacity: state.profiles.memo_capacity(),
            },
            market: CacheUsage {
                entries: state.market.cached().await,
                capacity: state.market.capacity(),
            },
        },
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{extract::State, http::StatusCode, Json};
    use chrono::NaiveDate;
    use krishi_agent::{GenerationRequest, GenerativeModel, ModelError};
    use serde_json::Value;

    use crate::health::health;
    use crate::state::tests::{disabled_state, state_with_model};

    struct Unreachable;

    #[async_trait]
    impl GenerativeModel for Unreachable {
        async fn generate(&self, _request: &GenerationRequest) -> Result<Value, ModelError> {
            Err(ModelError::Transport("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn health_is_ready_without_a_model() {
        let (status, Json(payload)) = health(State(disabled_state())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.model.status, "disabled");
        assert_eq!(payload.caches.market.entries, 0);
        assert_eq!(payload.caches.market.capacity, 1024);
    }

    #[tokio::test]
    async fn health_reports_model_and_cache_usage() {
        let state = state_with_model(Arc::new(Unreachable));
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).expect("date");
        state.market.get_snapshot("Rice", "Azadpur (Delhi)", date).await.expect("baseline");

        let (_, Json(payload)) = health(State(state)).await;

        assert_eq!(payload.model.status, "ready");
        assert_eq!(payload.caches.market.entries, 1);
        assert_eq!(payload.caches.profiles.entries, 0);
    }
}
