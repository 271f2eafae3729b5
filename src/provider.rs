//! Driving distance lookups against an external routing service.
//!
//! The only implementation talks to the Google Distance Matrix API, one
//! origin and one destination per call. Distance and duration come back as
//! the provider's own display text ("3.2 km", "6 mins") and are passed
//! through untouched.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::centers::LatLng;
use crate::config::Config;

/// One successful origin/destination lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistanceQueryResult {
    pub distance: String,
    pub duration: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("routing provider credential is not configured")]
    MissingCredential,

    #[error("request to routing provider failed: {0}")]
    Transport(String),

    #[error("routing provider returned status {status}{}", .message.as_deref().map(|m| format!(": {}", m)).unwrap_or_default())]
    Status {
        status: String,
        message: Option<String>,
    },

    #[error("routing provider could not compute a route: {0}")]
    Element(String),

    #[error("unexpected routing provider response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait DistanceProvider: Send + Sync {
    /// Driving distance and duration from `origin` to `destination`.
    async fn distance(
        &self,
        origin: LatLng,
        destination: LatLng,
    ) -> Result<DistanceQueryResult, ProviderError>;
}

pub const DISTANCE_MATRIX_URL: &str = "https://maps.googleapis.com/maps/api/distancematrix/json";

pub struct GoogleDistanceMatrix {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl GoogleDistanceMatrix {
    pub fn new(
        api_key: Option<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            api_key,
            base_url: base_url.into(),
        })
    }

    pub fn from_config(config: &Config) -> reqwest::Result<Self> {
        Self::new(
            config.maps_api_key.clone(),
            config.distance_matrix_url.clone(),
            config.provider_timeout,
        )
    }
}

#[async_trait]
impl DistanceProvider for GoogleDistanceMatrix {
    async fn distance(
        &self,
        origin: LatLng,
        destination: LatLng,
    ) -> Result<DistanceQueryResult, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ProviderError::MissingCredential)?;

        debug!(%origin, %destination, "querying distance matrix");

        let origins = origin.to_string();
        let destinations = destination.to_string();

        // Strip the URL from transport errors, it carries the key.
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("origins", origins.as_str()),
                ("destinations", destinations.as_str()),
                ("mode", "driving"),
                ("key", api_key),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Transport(e.without_url().to_string()))?;

        if !status.is_success() {
            warn!(%status, body = %body, "distance matrix returned non-success status");
            return Err(ProviderError::Status {
                status: status.to_string(),
                message: None,
            });
        }

        let matrix: MatrixResponse =
            serde_json::from_str(&body).map_err(|e| ProviderError::Malformed(e.to_string()))?;
        matrix.into_result()
    }
}

#[derive(Debug, Deserialize)]
struct MatrixResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    rows: Vec<MatrixRow>,
}

#[derive(Debug, Deserialize)]
struct MatrixRow {
    #[serde(default)]
    elements: Vec<MatrixElement>,
}

#[derive(Debug, Deserialize)]
struct MatrixElement {
    status: String,
    distance: Option<TextValue>,
    duration: Option<TextValue>,
}

#[derive(Debug, Deserialize)]
struct TextValue {
    text: String,
}

impl MatrixResponse {
    fn into_result(self) -> Result<DistanceQueryResult, ProviderError> {
        if self.status != "OK" || self.rows.is_empty() {
            return Err(ProviderError::Status {
                status: self.status,
                message: self.error_message,
            });
        }

        let element = self
            .rows
            .into_iter()
            .next()
            .and_then(|row| row.elements.into_iter().next())
            .ok_or_else(|| ProviderError::Malformed("no elements in first row".to_string()))?;

        if element.status != "OK" {
            return Err(ProviderError::Element(element.status));
        }

        match (element.distance, element.duration) {
            (Some(distance), Some(duration)) => Ok(DistanceQueryResult {
                distance: distance.text,
                duration: duration.text,
            }),
            _ => Err(ProviderError::Malformed(
                "element is missing distance or duration".to_string(),
            )),
        }
    }
}
