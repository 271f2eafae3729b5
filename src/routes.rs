use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::aggregate::{AggregatedResult, aggregate, nearest};
use crate::centers::{Category, LatLng, Registry, RegistryError};
use crate::config::Config;
use crate::error::ApiError;
use crate::provider::DistanceProvider;

const SERVICE_NAME: &str = "flash.ai GIS Calculator API";

// Shared by every request. The registry is re-read per request, not held here.
pub struct AppState {
    pub config: Config,
    pub provider: Arc<dyn DistanceProvider>,
}

pub fn router(state: Arc<AppState>) -> Router {
    // Any origin, so the dashboard and automation tools can call us directly.
    let cors = CorsLayer::new()
        .allow_methods(tower_http::cors::Any)
        .allow_origin(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    Router::new()
        .route("/", get(home))
        .route("/calculate", post(calculate))
        .route("/stations", get(list_stations))
        .route("/health", get(health))
        .route("/EmergencyCenters.json", get(raw_centers))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// --- API DTOs ---

#[derive(Debug, Clone, Copy, PartialEq)]
struct CalculateRequest {
    origin: LatLng,
    category: Category,
}

impl CalculateRequest {
    fn from_json(body: &Value) -> Result<Self, ApiError> {
        let Some(fields) = body.as_object() else {
            return Err(ApiError::Validation("No JSON data provided".to_string()));
        };

        let present = |key: &str| fields.get(key).filter(|v| !v.is_null());
        let (Some(lat), Some(lng)) = (present("latitude"), present("longitude")) else {
            return Err(ApiError::Validation(
                "Missing required parameters: latitude and longitude".to_string(),
            ));
        };

        let lat = lat
            .as_f64()
            .ok_or_else(|| ApiError::Validation("latitude must be a number".to_string()))?;
        let lng = lng
            .as_f64()
            .ok_or_else(|| ApiError::Validation("longitude must be a number".to_string()))?;
        if !(-90.0..=90.0).contains(&lat) {
            return Err(ApiError::Validation(
                "latitude must be between -90 and 90".to_string(),
            ));
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(ApiError::Validation(
                "longitude must be between -180 and 180".to_string(),
            ));
        }

        let category = match present("emergencyType") {
            None => Category::Fire,
            Some(Value::String(raw)) => Category::parse(raw).ok_or_else(|| {
                ApiError::Validation(format!(
                    "Invalid emergencyType: {}. Must be fire, police, or hospital",
                    raw.to_lowercase()
                ))
            })?,
            Some(_) => {
                return Err(ApiError::Validation(
                    "emergencyType must be a string".to_string(),
                ));
            }
        };

        Ok(Self {
            origin: LatLng::new(lat, lng),
            category,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CalculateResponse {
    success: bool,
    nearest_unit: String,
    distance: String,
    eta: String,
    unit_location: LatLng,
    all_stations: AggregatedResult,
    emergency_type: Category,
    incident_location: LatLng,
}

#[derive(Deserialize)]
struct StationsQuery {
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    google_maps_api: &'static str,
    emergency_centers: &'static str,
    total_centers: usize,
    version: &'static str,
}

// --- Handlers ---

async fn home() -> Json<Value> {
    Json(json!({
        "status": "online",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "/calculate": "POST - Calculate distances to emergency centers",
            "/stations": "GET - List emergency centers (optional ?type=fire|police|hospital)",
            "/health": "GET - Health check",
        }
    }))
}

async fn calculate(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<CalculateResponse>, ApiError> {
    let body: Value = serde_json::from_slice(&body)
        .map_err(|_| ApiError::Validation("No JSON data provided".to_string()))?;
    let request = CalculateRequest::from_json(&body)?;

    info!(
        category = %request.category,
        lat = request.origin.lat,
        lng = request.origin.lng,
        "calculating distances"
    );

    let registry = Registry::load(&state.config.centers_path)?;
    let all_stations = aggregate(
        request.origin,
        request.category,
        &registry,
        state.provider.as_ref(),
        state.config.failure_policy,
    )
    .await?;

    if all_stations.is_empty() {
        return Err(ApiError::NotFound(format!(
            "No {} stations found in database",
            request.category
        )));
    }

    let best = nearest(&all_stations).ok_or_else(|| {
        ApiError::Internal("no station returned a comparable distance".to_string())
    })?;

    info!(
        stations = all_stations.len(),
        station = %best.name,
        distance = %best.result.distance,
        duration = %best.result.duration,
        "nearest station selected"
    );

    let nearest_unit = best.name.clone();
    let distance = best.result.distance.clone();
    let eta = best.result.duration.clone();
    let unit_location = best.location;

    Ok(Json(CalculateResponse {
        success: true,
        nearest_unit,
        distance,
        eta,
        unit_location,
        all_stations,
        emergency_type: request.category,
        incident_location: request.origin,
    }))
}

async fn list_stations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StationsQuery>,
) -> Result<Json<Value>, ApiError> {
    let registry = Registry::load(&state.config.centers_path)?;

    // An unrecognised type lists everything.
    match query.kind.as_deref().and_then(Category::parse) {
        Some(category) => Ok(Json(json!({
            "type": category,
            "stations": registry.category_json(category),
        }))),
        None => Ok(Json(registry.to_json())),
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let (emergency_centers, total_centers) = match Registry::load(&state.config.centers_path) {
        Ok(registry) => ("loaded", registry.total()),
        Err(_) => ("missing", 0),
    };

    Json(HealthResponse {
        status: "healthy",
        google_maps_api: if state.config.has_credential() {
            "configured"
        } else {
            "missing"
        },
        emergency_centers,
        total_centers,
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// The registry file as-is, for the dashboard map.
async fn raw_centers(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let path = &state.config.centers_path;
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| RegistryError::Unreadable {
            path: path.clone(),
            source,
        })?;
    Ok(([(header::CONTENT_TYPE, "application/json")], text))
}
