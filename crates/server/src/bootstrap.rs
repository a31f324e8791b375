use std::sync::Arc;

use axum::Router;
use krishi_agent::{DisabledModel, GeminiClient, GenerativeModel, ModelError};
use krishi_core::config::{AppConfig, ConfigError, LoadOptions};
use thiserror::Error;
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::{info, warn};

use crate::state::AppState;
use crate::{api, health};

pub struct Application {
    pub config: AppConfig,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("generative model client setup failed: {0}")]
    Model(#[source] ModelError),
    #[error("http client setup failed: {0}")]
    HttpClient(#[source] reqwest::Error),
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let model: Arc<dyn GenerativeModel> =
        match GeminiClient::from_config(&config.llm).map_err(BootstrapError::Model)? {
            Some(client) => {
                info!(
                    event_name = "system.bootstrap.model_configured",
                    correlation_id = "bootstrap",
                    model = %config.llm.model,
                    vision_model = %config.llm.vision_model,
                    "generative model client configured"
                );
                Arc::new(client)
            }
            None => {
                warn!(
                    event_name = "system.bootstrap.model_disabled",
                    correlation_id = "bootstrap",
                    "no llm api key configured; model-backed lookups use fallbacks"
                );
                Arc::new(DisabledModel)
            }
        };

    let state = AppState::new(&config, model).map_err(BootstrapError::HttpClient)?;
    Ok(Application { config, state })
}

impl Application {
    pub fn router(&self) -> Router {
        let router =
            api::router(self.state.clone()).merge(health::router(self.state.clone()));

        let router = match &self.config.server.static_dir {
            Some(dir) => router.fallback_service(ServeDir::new(dir)),
            None => router,
        };

        router.layer(CorsLayer::permissive())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use krishi_core::config::AppConfig;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::bootstrap_with_config;

    #[test]
    fn bootstrap_without_api_key_disables_the_model() {
        let app = bootstrap_with_config(AppConfig::default()).expect("bootstrap");

        assert!(!app.state.model.is_configured());
    }

    #[test]
    fn bootstrap_with_api_key_configures_the_model() {
        let mut config = AppConfig::default();
        config.llm.api_key = Some("test-key".to_string().into());

        let app = bootstrap_with_config(config).expect("bootstrap");

        assert!(app.state.model.is_configured());
    }

    #[tokio::test]
    async fn router_serves_static_files_health_and_cors() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(dir.path().join("index.html"), "<h1>Krishi</h1>").expect("write index");
        let mut config = AppConfig::default();
        config.server.static_dir = Some(dir.path().to_path_buf());
        let app = bootstrap_with_config(config).expect("bootstrap");

        let page = app
            .router()
            .oneshot(Request::builder().uri("/").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(page.status(), StatusCode::OK);
        let bytes = to_bytes(page.into_body(), usize::MAX).await.expect("body");
        assert_eq!(&bytes[..], b"<h1>Krishi</h1>");

        let health = app
            .router()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("origin", "http://localhost:5173")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(health.status(), StatusCode::OK);
        assert!(health.headers().contains_key("access-control-allow-origin"));
    }
}
