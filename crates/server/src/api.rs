//! JSON endpoints consumed by the dashboard.
//!
//! Every failure is answered with `{"error": message}`. Validation and lookup failures
//! echo their message; upstream and internal failures are logged with a correlation id
//! and answered generically.

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use krishi_agent::{DiagnosisRequest, GenerationRequest};
use krishi_core::diagnosis::{reference_lookup, Diagnosis, ReferenceDisease};
use krishi_core::errors::{ApplicationError, InterfaceError};
use krishi_core::market::MarketSnapshot;
use krishi_core::spoilage::{ProfileOrigin, RiskAssessment, SpoilageReading};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::state::AppState;
use crate::weather;

/// Base64 photos from phone cameras are routinely several megabytes.
const MAX_DIAGNOSE_BODY_BYTES: usize = 12 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}

pub type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/predict-spoilage", post(predict_spoilage))
        .route("/api/market", get(market))
        .route(
            "/api/diagnose",
            post(diagnose).layer(DefaultBodyLimit::max(MAX_DIAGNOSE_BODY_BYTES)),
        )
        .route("/api/disease", get(disease))
        .route("/api/weather", get(weather::weather))
        .route("/api/ai/analyze", post(ai_analyze))
        .with_state(state)
}

fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

fn status_for(error: &InterfaceError) -> StatusCode {
    match error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(
    error: ApplicationError,
    correlation_id: &str,
    event_name: &'static str,
) -> (StatusCode, Json<ApiError>) {
    let interface = error.into_interface(correlation_id);
    let status = status_for(&interface);
    warn!(
        event_name,
        correlation_id = %interface.correlation_id(),
        status = status.as_u16(),
        error = %interface,
        "request failed"
    );
    (status, Json(ApiError { error: interface.user_message() }))
}

fn body_or_reject<T>(
    payload: Result<Json<T>, JsonRejection>,
    correlation_id: &str,
    event_name: &'static str,
) -> Result<T, (StatusCode, Json<ApiError>)> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        let message = format!("invalid JSON body: {}", rejection.body_text());
        reject(ApplicationError::invalid_input(message), correlation_id, event_name)
    })
}

/// Accepts JSON numbers and numeric strings, as submitted by HTML form fields.
fn number_field(value: Option<&Value>, name: &str) -> Result<f64, ApplicationError> {
    let parsed = match value {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) if !text.trim().is_empty() => text.trim().parse::<f64>().ok(),
        None | Some(Value::Null) | Some(Value::String(_)) => {
            return Err(ApplicationError::invalid_input(format!("{name} is required")))
        }
        Some(_) => None,
    };
    parsed.ok_or_else(|| ApplicationError::invalid_input(format!("{name} must be a number")))
}

fn required_text<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, ApplicationError> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApplicationError::invalid_input(format!("{name} is required")))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpoilageRequest {
    pub crop_type: Option<String>,
    pub temp: Option<Value>,
    pub humidity: Option<Value>,
    pub days: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpoilageMeta {
    pub t_ideal: f64,
    pub h_ideal: f64,
    pub shelf_life: f64,
    pub profile_source: ProfileOrigin,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpoilageResponse {
    #[serde(flatten)]
    pub assessment: RiskAssessment,
    pub recommendation: String,
    pub meta: SpoilageMeta,
}

fn parse_reading(body: &SpoilageRequest) -> Result<SpoilageReading, ApplicationError> {
    let crop = required_text(body.crop_type.as_deref(), "cropType")?;
    let temp = number_field(body.temp.as_ref(), "temp")?;
    let humidity = number_field(body.humidity.as_ref(), "humidity")?;
    let days = number_field(body.days.as_ref(), "days")?;
    Ok(SpoilageReading::from_raw(crop, temp, humidity, days)?)
}

pub async fn predict_spoilage(
    State(state): State<AppState>,
    payload: Result<Json<SpoilageRequest>, JsonRejection>,
) -> ApiResult<SpoilageResponse> {
    let correlation_id = new_correlation_id();
    let event_name = "api.spoilage.failed";
    let body = body_or_reject(payload, &correlation_id, event_name)?;
    let reading =
        parse_reading(&body).map_err(|error| reject(error, &correlation_id, event_name))?;

    let resolved = state.profiles.resolve(&reading.crop_name).await;
    let assessment = state.spoilage.estimate(&reading, &resolved.profile);
    let recommendation = state.spoilage.recommendation(&reading, &resolved.profile, &assessment);

    info!(
        event_name = "api.spoilage.estimated",
        correlation_id = %correlation_id,
        crop = %reading.crop_name,
        profile_source = ?resolved.origin,
        risk = assessment.risk,
        is_high_risk = assessment.is_high_risk,
        "spoilage risk estimated"
    );

    Ok(Json(SpoilageResponse {
        assessment,
        recommendation,
        meta: SpoilageMeta {
            t_ideal: resolved.profile.ideal_temperature_c,
            h_ideal: resolved.profile.ideal_humidity_pct,
            shelf_life: resolved.profile.shelf_life_days,
            profile_source: resolved.origin,
        },
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct MarketQuery {
    pub crop: Option<String>,
    pub region: Option<String>,
}

pub async fn market(
    State(state): State<AppState>,
    Query(query): Query<MarketQuery>,
) -> ApiResult<MarketSnapshot> {
    let correlation_id = new_correlation_id();
    let event_name = "api.market.failed";
    let today = Utc::now().date_naive();

    let fail = |error| reject(error, &correlation_id, event_name);

    let crop = required_text(query.crop.as_deref(), "crop").map_err(fail)?;
    let region = required_text(query.region.as_deref(), "region").map_err(fail)?;
    let snapshot = state.market.get_snapshot(crop, region, today).await.map_err(fail)?;

    Ok(Json(snapshot))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnoseRequest {
    pub crop: Option<String>,
    pub symptom: Option<String>,
    #[serde(alias = "image")]
    pub image_base64: Option<String>,
    pub mime_type: Option<String>,
}

pub async fn diagnose(
    State(state): State<AppState>,
    payload: Result<Json<DiagnoseRequest>, JsonRejection>,
) -> ApiResult<Diagnosis> {
    let correlation_id = new_correlation_id();
    let event_name = "api.diagnose.failed";
    let body = body_or_reject(payload, &correlation_id, event_name)?;

    let request = DiagnosisRequest {
        crop: body.crop,
        symptom: body.symptom,
        image_base64: body.image_base64,
        mime_type: body.mime_type,
    };
    let diagnosed = state
        .diagnostician
        .diagnose(&request)
        .await
        .map_err(|error| reject(error, &correlation_id, event_name))?;

    info!(
        event_name = "api.diagnose.completed",
        correlation_id = %correlation_id,
        source = ?diagnosed.source,
        disease = %diagnosed.diagnosis.name,
        "diagnosis completed"
    );
    Ok(Json(diagnosed.diagnosis))
}

#[derive(Debug, Default, Deserialize)]
pub struct DiseaseQuery {
    pub crop: Option<String>,
    pub symptom: Option<String>,
}

pub async fn disease(Query(query): Query<DiseaseQuery>) -> ApiResult<ReferenceDisease> {
    let crop = query.crop.as_deref().unwrap_or_default();
    let symptom = query.symptom.as_deref().unwrap_or_default();

    reference_lookup(crop, symptom).map(Json).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ApiError { error: "Disease not found in database".to_string() }),
        )
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeRequest {
    pub prompt: Option<String>,
}

pub async fn ai_analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let correlation_id = new_correlation_id();
    let event_name = "api.analyze.failed";
    let body = body_or_reject(payload, &correlation_id, event_name)?;
    let prompt = required_text(body.prompt.as_deref(), "prompt")
        .map_err(|error| reject(error, &correlation_id, event_name))?;

    let response = state
        .model
        .generate(&GenerationRequest::text(prompt))
        .await
        .map_err(|error| reject(error.into(), &correlation_id, event_name))?;
    Ok(Json(response))
}
