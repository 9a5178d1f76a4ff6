use std::fmt;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::outcome::PlaceMatch;

const PLACE_RESOURCE_PREFIX: &str = "places/";
const TEXT_SEARCH_FIELD_MASK: &str = "places.id,places.name,places.location";
const FIND_PLACE_FIELDS: &str = "place_id,geometry";

#[derive(Debug, Clone, PartialEq)]
pub enum TierResult {
    Hit(PlaceMatch),
    Miss(MissReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissReason {
    NoCandidates,
    Incomplete(&'static str),
    ProviderStatus(String),
    HttpStatus(u16),
    Transport(String),
}

impl MissReason {
    /// True when the provider could not answer, as opposed to answering "nothing here".
    pub fn is_failure(&self) -> bool {
        match self {
            MissReason::NoCandidates | MissReason::Incomplete(_) => false,
            MissReason::ProviderStatus(status) => {
                !matches!(status.as_str(), "ZERO_RESULTS" | "NOT_FOUND")
            }
            MissReason::HttpStatus(_) | MissReason::Transport(_) => true,
        }
    }
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissReason::NoCandidates => write!(f, "no candidates"),
            MissReason::Incomplete(what) => write!(f, "first candidate missing {what}"),
            MissReason::ProviderStatus(status) => write!(f, "provider status {status}"),
            MissReason::HttpStatus(code) => write!(f, "HTTP {code}"),
            MissReason::Transport(message) => write!(f, "transport error: {message}"),
        }
    }
}

/// One place search strategy. Never fails; problems come back as a
/// [`TierResult::Miss`] carrying the reason.
#[async_trait]
pub trait PlaceSearch: Send + Sync {
    fn name(&self) -> &'static str;
    async fn search(&self, query: &str) -> TierResult;
}

/// Strips the `places/` resource prefix the structured endpoint puts on ids.
pub fn normalize_place_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let id = trimmed
        .strip_prefix(PLACE_RESOURCE_PREFIX)
        .unwrap_or(trimmed)
        .trim();
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

pub struct TextSearchClient {
    http: Client,
    endpoint: String,
    api_key: SecretString,
    language: String,
    region: String,
}

impl TextSearchClient {
    pub fn new(http: Client, config: &AppConfig, api_key: SecretString) -> Self {
        Self {
            http,
            endpoint: config.text_search_endpoint.clone(),
            api_key,
            language: config.language.clone(),
            region: config.region.clone(),
        }
    }

    async fn fetch(&self, query: &str) -> Result<TierResult, reqwest::Error> {
        let body = TextSearchRequest {
            text_query: query,
            language_code: &self.language,
            region_code: &self.region,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .header("X-Goog-Api-Key", self.api_key.expose_secret())
            .header("X-Goog-FieldMask", TEXT_SEARCH_FIELD_MASK)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Ok(TierResult::Miss(MissReason::HttpStatus(status.as_u16())));
        }

        let parsed: TextSearchResponse = response.json().await?;
        Ok(parsed.into_tier_result())
    }
}

#[async_trait]
impl PlaceSearch for TextSearchClient {
    fn name(&self) -> &'static str {
        "text_search"
    }

    async fn search(&self, query: &str) -> TierResult {
        if query.trim().is_empty() {
            return TierResult::Miss(MissReason::NoCandidates);
        }
        self.fetch(query)
            .await
            .unwrap_or_else(|err| TierResult::Miss(MissReason::Transport(err.to_string())))
    }
}

#[derive(Serialize)]
struct TextSearchRequest<'a> {
    #[serde(rename = "textQuery")]
    text_query: &'a str,
    #[serde(rename = "languageCode")]
    language_code: &'a str,
    #[serde(rename = "regionCode")]
    region_code: &'a str,
}

#[derive(Deserialize)]
struct TextSearchResponse {
    #[serde(default)]
    places: Vec<TextSearchPlace>,
}

#[derive(Deserialize)]
struct TextSearchPlace {
    id: Option<String>,
    name: Option<String>,
    location: Option<TextSearchLocation>,
}

#[derive(Deserialize)]
struct TextSearchLocation {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl TextSearchResponse {
    fn into_tier_result(self) -> TierResult {
        let Some(place) = self.places.into_iter().next() else {
            return TierResult::Miss(MissReason::NoCandidates);
        };

        let coordinates = place
            .location
            .and_then(|loc| loc.latitude.zip(loc.longitude))
            .filter(|(lat, lng)| lat.is_finite() && lng.is_finite());
        let Some((lat, lng)) = coordinates else {
            return TierResult::Miss(MissReason::Incomplete("location"));
        };

        let place_id = place
            .id
            .as_deref()
            .and_then(normalize_place_id)
            .or_else(|| place.name.as_deref().and_then(normalize_place_id));
        let Some(place_id) = place_id else {
            return TierResult::Miss(MissReason::Incomplete("place id"));
        };

        TierResult::Hit(PlaceMatch::new(lat, lng, Some(place_id)))
    }
}

pub struct FindPlaceClient {
    http: Client,
    endpoint: String,
    api_key: SecretString,
    language: String,
}

impl FindPlaceClient {
    pub fn new(http: Client, config: &AppConfig, api_key: SecretString) -> Self {
        Self {
            http,
            endpoint: config.find_place_endpoint.clone(),
            api_key,
            language: config.language.clone(),
        }
    }

    async fn fetch(&self, query: &str) -> Result<TierResult, reqwest::Error> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("input", query),
                ("inputtype", "textquery"),
                ("fields", FIND_PLACE_FIELDS),
                ("language", self.language.as_str()),
                ("key", self.api_key.expose_secret()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Ok(TierResult::Miss(MissReason::HttpStatus(status.as_u16())));
        }

        let parsed: FindPlaceResponse = response.json().await?;
        Ok(parsed.into_tier_result())
    }
}

#[async_trait]
impl PlaceSearch for FindPlaceClient {
    fn name(&self) -> &'static str {
        "find_place"
    }

    async fn search(&self, query: &str) -> TierResult {
        if query.trim().is_empty() {
            return TierResult::Miss(MissReason::NoCandidates);
        }
        self.fetch(query)
            .await
            .unwrap_or_else(|err| TierResult::Miss(MissReason::Transport(err.to_string())))
    }
}

#[derive(Deserialize)]
struct FindPlaceResponse {
    status: String,
    #[serde(default)]
    candidates: Vec<FindPlaceCandidate>,
}

#[derive(Deserialize)]
struct FindPlaceCandidate {
    place_id: Option<String>,
    geometry: Option<FindPlaceGeometry>,
}

#[derive(Deserialize)]
struct FindPlaceGeometry {
    location: Option<LatLng>,
}

#[derive(Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

impl FindPlaceResponse {
    fn into_tier_result(self) -> TierResult {
        if self.status != "OK" {
            return TierResult::Miss(MissReason::ProviderStatus(self.status));
        }
        let Some(candidate) = self.candidates.into_iter().next() else {
            return TierResult::Miss(MissReason::NoCandidates);
        };
        match candidate.geometry.and_then(|geometry| geometry.location) {
            Some(location) => TierResult::Hit(PlaceMatch::new(
                location.lat,
                location.lng,
                candidate.place_id,
            )),
            None => TierResult::Miss(MissReason::Incomplete("geometry")),
        }
    }
}
