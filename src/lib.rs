mod batch;
mod cache;
mod config;
mod errors;
mod geocode;
mod outcome;
mod places;
mod resolver;
mod table;
mod throttle;

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use reqwest::Client;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use batch::{enrich, CacheSession, LookupRequest, QueryBuilder, ResultMerger};
pub use cache::{GeocodeCache, LookupKey, PLACE_KEY_PREFIX};
pub use config::{AppConfig, PublicAppConfig};
pub use errors::{AppError, AppResult};
pub use geocode::{Geocoder, GeocodingClient};
pub use outcome::{Outcome, PlaceMatch};
pub use places::{
    normalize_place_id, FindPlaceClient, MissReason, PlaceSearch, TextSearchClient, TierResult,
};
pub use resolver::{PlaceResolver, ResolutionStats, StalePolicy};
pub use table::{CsvColumns, CsvLayout, CsvTable, TableRow, OUTPUT_COLUMNS};
pub use throttle::Throttle;

/// The live lookup services a resolver needs, built from configuration.
pub struct LookupClients {
    pub strategies: Vec<Arc<dyn PlaceSearch>>,
    pub geocoder: Arc<dyn Geocoder>,
    pub throttle: Throttle,
    pub stale_policy: StalePolicy,
}

impl LookupClients {
    /// Fails fast on a missing credential or an invalid throttle.
    pub fn from_config(config: &AppConfig, place_search: bool) -> AppResult<Self> {
        let api_key = config.require_api_key()?;
        let throttle = Throttle::from_secs(config.throttle_secs)?;
        let http = http_client(config)?;

        let strategies: Vec<Arc<dyn PlaceSearch>> = if place_search {
            vec![
                Arc::new(TextSearchClient::new(http.clone(), config, api_key.clone())),
                Arc::new(FindPlaceClient::new(http.clone(), config, api_key.clone())),
            ]
        } else {
            Vec::new()
        };
        let geocoder = Arc::new(GeocodingClient::new(http, config, api_key));
        let stale_policy = if config.upgrade_missing_place_id {
            StalePolicy::Upgrade
        } else {
            StalePolicy::Reuse
        };

        debug!(
            strategies = strategies.len(),
            throttle_ms = throttle.delay().as_millis() as u64,
            ?stale_policy,
            "lookup clients ready"
        );
        Ok(Self {
            strategies,
            geocoder,
            throttle,
            stale_policy,
        })
    }

    pub fn resolver<'c>(&self, cache: &'c mut GeocodeCache) -> PlaceResolver<'c> {
        PlaceResolver::new(
            cache,
            self.strategies.clone(),
            Arc::clone(&self.geocoder),
            self.throttle,
        )
        .with_stale_policy(self.stale_policy)
    }
}

fn http_client(config: &AppConfig) -> AppResult<Client> {
    let http = Client::builder()
        .user_agent(concat!("place-geocoder/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()?;
    Ok(http)
}

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,place_geocoder=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    });
}
