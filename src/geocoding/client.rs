use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, trace};

use super::outcome::GeocodeOutcome;
use crate::config::GeocodingConfig;
use crate::error::{EnrichError, Result};
use crate::models::Coordinates;

/// A single geocoding attempt. Implementations never fail; every problem is
/// folded into the returned outcome.
#[async_trait]
pub trait GeocodeLookup: Send + Sync {
    async fn lookup(&self, query: &str) -> GeocodeOutcome;

    /// Whether a lookup costs a provider request. Local lookups bypass
    /// pacing and are not counted as requests.
    fn is_remote(&self) -> bool {
        true
    }
}

/// HTTP client for OpenCage-compatible forward geocoding endpoints.
pub struct OpenCageClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
}

impl OpenCageClient {
    pub fn new(endpoint: impl Into<String>, api_key: SecretString, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EnrichError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_key,
        })
    }

    pub fn from_config(config: &GeocodingConfig) -> Result<Self> {
        let key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| EnrichError::Config("geocoding api_key is not set".to_string()))?;

        Self::new(
            config.endpoint.clone(),
            SecretString::from(key),
            config.request_timeout(),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl GeocodeLookup for OpenCageClient {
    async fn lookup(&self, query: &str) -> GeocodeOutcome {
        let request = self.http.get(&self.endpoint).query(&[
            ("q", query),
            ("key", self.api_key.expose_secret()),
            ("limit", "1"),
            ("no_annotations", "1"),
        ]);

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => return transport_outcome(&err),
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => return transport_outcome(&err),
        };

        let outcome = classify_response(status, &body);
        trace!(query, %status, outcome = outcome.label(), "geocoding response");
        outcome
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    results: Vec<GeocodeCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeocodeCandidate {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    lat: f64,
    lng: f64,
}

/// Map an HTTP status and body to an outcome.
pub fn classify_response(status: StatusCode, body: &str) -> GeocodeOutcome {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return GeocodeOutcome::Transient(format!("HTTP {}", status));
    }
    if !status.is_success() {
        return GeocodeOutcome::Failed(format!("HTTP {}", status));
    }

    let parsed: GeocodeResponse = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(err) => return GeocodeOutcome::Failed(format!("malformed response: {}", err)),
    };

    match parsed.results.first() {
        None => GeocodeOutcome::NotFound,
        Some(candidate) => {
            let coordinates = Coordinates::new(candidate.geometry.lat, candidate.geometry.lng);
            if coordinates.is_on_earth() {
                GeocodeOutcome::Resolved(coordinates)
            } else {
                GeocodeOutcome::Failed(format!("candidate out of range: {}", coordinates))
            }
        }
    }
}

fn transport_outcome(err: &reqwest::Error) -> GeocodeOutcome {
    if err.is_builder() {
        GeocodeOutcome::Failed(format!("invalid request: {}", err))
    } else if err.is_timeout() {
        GeocodeOutcome::Transient("request timed out".to_string())
    } else {
        GeocodeOutcome::Transient(format!("transport error: {}", err))
    }
}

/// Lookup used when no credential is configured: answers every query with
/// `Failed` without touching the network.
#[derive(Debug, Default)]
pub struct DisabledLookup;

#[async_trait]
impl GeocodeLookup for DisabledLookup {
    async fn lookup(&self, query: &str) -> GeocodeOutcome {
        debug!(query, "geocoding disabled; not issuing request");
        GeocodeOutcome::Failed("geocoding credential not configured".to_string())
    }

    fn is_remote(&self) -> bool {
        false
    }
}

/// Lookup backed by a fixed query table. Unknown queries are `NotFound`.
/// Counts calls so callers can assert how many lookups were issued.
#[derive(Debug, Default)]
pub struct StaticLookup {
    responses: HashMap<String, GeocodeOutcome>,
    calls: AtomicUsize,
}

impl StaticLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, query: impl Into<String>, outcome: GeocodeOutcome) -> Self {
        self.responses.insert(query.into(), outcome);
        self
    }

    pub fn with_coordinates(self, query: impl Into<String>, lat: f64, lng: f64) -> Self {
        self.with_response(query, GeocodeOutcome::Resolved(Coordinates::new(lat, lng)))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeocodeLookup for StaticLookup {
    async fn lookup(&self, query: &str) -> GeocodeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .get(query)
            .cloned()
            .unwrap_or(GeocodeOutcome::NotFound)
    }
}
