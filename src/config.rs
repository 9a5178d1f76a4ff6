use std::path::PathBuf;
use std::{env, io};

use secrecy::SecretString;
use serde::Serialize;
use tracing::debug;

use crate::errors::{AppError, AppResult};

pub const DEFAULT_GEOCODE_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/geocode/json";
pub const DEFAULT_TEXT_SEARCH_ENDPOINT: &str = "https://places.googleapis.com/v1/places:searchText";
pub const DEFAULT_FIND_PLACE_ENDPOINT: &str =
    "https://maps.googleapis.com/maps/api/place/findplacefromtext/json";
const DEFAULT_CACHE_PATH: &str = "data/geocode_cache.json";
const DEFAULT_THROTTLE_SECS: f64 = 0.25;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api_key: Option<SecretString>,
    pub language: String,
    pub region: String,
    pub throttle_secs: f64,
    pub cache_path: PathBuf,
    pub request_timeout_secs: u64,
    pub upgrade_missing_place_id: bool,
    pub geocode_endpoint: String,
    pub text_search_endpoint: String,
    pub find_place_endpoint: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicAppConfig {
    pub language: String,
    pub region: String,
    pub throttle_secs: f64,
    pub cache_path: String,
    pub request_timeout_secs: u64,
    pub upgrade_missing_place_id: bool,
    pub geocode_endpoint: String,
    pub text_search_endpoint: String,
    pub find_place_endpoint: String,
    pub has_api_key: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            language: "ja".to_string(),
            region: "jp".to_string(),
            throttle_secs: DEFAULT_THROTTLE_SECS,
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            upgrade_missing_place_id: true,
            geocode_endpoint: DEFAULT_GEOCODE_ENDPOINT.to_string(),
            text_search_endpoint: DEFAULT_TEXT_SEARCH_ENDPOINT.to_string(),
            find_place_endpoint: DEFAULT_FIND_PLACE_ENDPOINT.to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv();
        let defaults = Self::default();
        Self {
            api_key: env::var("GOOGLE_MAPS_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from),
            language: parse_string("GEOCODE_LANGUAGE", defaults.language),
            region: parse_string("GEOCODE_REGION", defaults.region),
            throttle_secs: parse_f64("GEOCODE_THROTTLE_SECS", defaults.throttle_secs),
            cache_path: env::var("GEOCODE_CACHE_PATH")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_path),
            request_timeout_secs: parse_u64(
                "GEOCODE_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            )
            .max(1),
            upgrade_missing_place_id: parse_bool(
                "GEOCODE_UPGRADE_MISSING_PLACE_ID",
                defaults.upgrade_missing_place_id,
            ),
            geocode_endpoint: parse_string("GOOGLE_GEOCODE_ENDPOINT", defaults.geocode_endpoint),
            text_search_endpoint: parse_string(
                "GOOGLE_PLACES_TEXT_SEARCH_ENDPOINT",
                defaults.text_search_endpoint,
            ),
            find_place_endpoint: parse_string(
                "GOOGLE_FIND_PLACE_ENDPOINT",
                defaults.find_place_endpoint,
            ),
        }
    }

    /// Returns the credential, or a configuration error when none was supplied.
    pub fn require_api_key(&self) -> AppResult<SecretString> {
        self.api_key.clone().ok_or_else(|| {
            AppError::Config(
                "Google Maps API key is required. Pass --api-key or set GOOGLE_MAPS_API_KEY."
                    .into(),
            )
        })
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        PublicAppConfig {
            language: self.language.clone(),
            region: self.region.clone(),
            throttle_secs: self.throttle_secs,
            cache_path: self.cache_path.to_string_lossy().to_string(),
            request_timeout_secs: self.request_timeout_secs,
            upgrade_missing_place_id: self.upgrade_missing_place_id,
            geocode_endpoint: self.geocode_endpoint.clone(),
            text_search_endpoint: self.text_search_endpoint.clone(),
            find_place_endpoint: self.find_place_endpoint.clone(),
            has_api_key: self.api_key.is_some(),
        }
    }
}

fn load_dotenv() {
    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn parse_string(key: &str, default: String) -> String {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .unwrap_or(default)
}
