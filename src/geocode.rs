use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::outcome::{Outcome, PlaceMatch};

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &str) -> AppResult<Outcome>;
}

pub struct GeocodingClient {
    http: Client,
    endpoint: String,
    api_key: SecretString,
    region: String,
    language: String,
}

impl GeocodingClient {
    pub fn new(http: Client, config: &AppConfig, api_key: SecretString) -> Self {
        Self {
            http,
            endpoint: config.geocode_endpoint.clone(),
            api_key,
            region: config.region.clone(),
            language: config.language.clone(),
        }
    }
}

#[async_trait]
impl Geocoder for GeocodingClient {
    async fn geocode(&self, address: &str) -> AppResult<Outcome> {
        let address = address.trim();
        if address.is_empty() {
            return Ok(Outcome::NotFound);
        }

        let response = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("address", address),
                ("key", self.api_key.expose_secret()),
                ("region", self.region.as_str()),
                ("language", self.language.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::LookupTransport {
                status: status.as_u16(),
                body,
            });
        }

        let payload: GeocodeResponse = response.json().await?;
        payload.into_outcome()
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: GeocodeGeometry,
    #[serde(default)]
    place_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeGeometry {
    location: GeocodeLocation,
}

#[derive(Debug, Deserialize)]
struct GeocodeLocation {
    lat: f64,
    lng: f64,
}

impl GeocodeResponse {
    fn into_outcome(self) -> AppResult<Outcome> {
        let message = self.error_message.unwrap_or_default();
        let status = self.status;
        match status.as_str() {
            "OK" => match self.results.into_iter().next() {
                Some(result) => Ok(Outcome::Found(PlaceMatch::new(
                    result.geometry.location.lat,
                    result.geometry.location.lng,
                    result.place_id,
                ))),
                None => Err(AppError::UnexpectedProviderStatus {
                    status: status.clone(),
                    message: "status OK without results".into(),
                }),
            },
            "ZERO_RESULTS" | "NOT_FOUND" => Ok(Outcome::NotFound),
            "OVER_DAILY_LIMIT" | "OVER_QUERY_LIMIT" | "REQUEST_DENIED" => {
                Err(AppError::QuotaOrPermission {
                    status: status.clone(),
                    message,
                })
            }
            _ => Err(AppError::UnexpectedProviderStatus {
                status: status.clone(),
                message,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn interpret(value: serde_json::Value) -> AppResult<Outcome> {
        serde_json::from_value::<GeocodeResponse>(value)
            .unwrap()
            .into_outcome()
    }

    #[test]
    fn ok_takes_first_result_with_place_id() {
        let outcome = interpret(json!({
            "status": "OK",
            "results": [
                {"geometry": {"location": {"lat": 35.66, "lng": 139.70}}, "place_id": "abc123"},
                {"geometry": {"location": {"lat": 0.0, "lng": 0.0}}, "place_id": "other"}
            ]
        }))
        .unwrap();
        assert_eq!(
            outcome,
            Outcome::Found(PlaceMatch::new(35.66, 139.70, Some("abc123".into())))
        );
    }

    #[test]
    fn ok_without_place_id_is_still_found() {
        let outcome = interpret(json!({
            "status": "OK",
            "results": [{"geometry": {"location": {"lat": 1.0, "lng": 2.0}}}]
        }))
        .unwrap();
        assert_eq!(outcome, Outcome::Found(PlaceMatch::new(1.0, 2.0, None)));
    }

    #[test]
    fn empty_statuses_are_not_found() {
        for status in ["ZERO_RESULTS", "NOT_FOUND"] {
            let outcome = interpret(json!({"status": status, "results": []})).unwrap();
            assert_eq!(outcome, Outcome::NotFound);
        }
    }

    #[test]
    fn quota_and_permission_statuses_abort() {
        for status in ["OVER_DAILY_LIMIT", "OVER_QUERY_LIMIT", "REQUEST_DENIED"] {
            let err = interpret(json!({"status": status, "error_message": "nope"})).unwrap_err();
            assert!(err.is_batch_fatal());
            match err {
                AppError::QuotaOrPermission { status: got, message } => {
                    assert_eq!(got, status);
                    assert_eq!(message, "nope");
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[test]
    fn unknown_status_and_empty_ok_are_unexpected() {
        let err = interpret(json!({"status": "INVALID_REQUEST"})).unwrap_err();
        assert!(matches!(err, AppError::UnexpectedProviderStatus { .. }));

        let err = interpret(json!({"status": "OK", "results": []})).unwrap_err();
        assert!(matches!(err, AppError::UnexpectedProviderStatus { .. }));
    }
}
