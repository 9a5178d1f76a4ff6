use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use secrecy::SecretString;
use tracing::{error, info};

use place_geocoder::{
    enrich, init_tracing, AppConfig, AppError, CacheSession, CsvColumns, CsvTable, LookupClients,
};

/// Add latitude, longitude and place id columns to a CSV of places.
///
/// Each row is looked up by name through place search first, then by address
/// through the geocoding API. Every answer, including "not found", is kept in
/// a JSON cache so later runs only pay for new rows.
///
/// Examples:
///   place-geocoder --input data/restaurants.csv --output data/restaurants_geocoded.csv
///   place-geocoder -i shops.csv -o shops_geocoded.csv --address-column 住所 --no-place-search
#[derive(Parser)]
#[command(name = "place-geocoder", version, about, long_about = None)]
struct Cli {
    /// CSV file to enrich.
    #[arg(long, short = 'i')]
    input: PathBuf,

    /// Where to write the enriched CSV.
    #[arg(long, short = 'o')]
    output: PathBuf,

    /// Persistent cache file (default: GEOCODE_CACHE_PATH or data/geocode_cache.json).
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Seconds to sleep after each live request (default: 0.25).
    #[arg(long)]
    throttle: Option<f64>,

    /// Google Maps API key (defaults to GOOGLE_MAPS_API_KEY).
    #[arg(long)]
    api_key: Option<String>,

    /// Language hint sent with every request.
    #[arg(long)]
    language: Option<String>,

    /// Region hint sent with every request.
    #[arg(long)]
    region: Option<String>,

    /// Column holding the place name.
    #[arg(long, default_value = "show_name")]
    name_column: String,

    /// Column holding the postal address.
    #[arg(long, default_value = "address")]
    address_column: String,

    /// Skip place search and geocode addresses only.
    #[arg(long)]
    no_place_search: bool,

    /// Never refresh cached matches that lack a place id.
    #[arg(long)]
    no_upgrade: bool,
}

impl Cli {
    fn apply(&self, mut config: AppConfig) -> AppConfig {
        if let Some(key) = self.api_key.clone().filter(|k| !k.trim().is_empty()) {
            config.api_key = Some(SecretString::from(key));
        }
        if let Some(cache) = &self.cache {
            config.cache_path = cache.clone();
        }
        if let Some(throttle) = self.throttle {
            config.throttle_secs = throttle;
        }
        if let Some(language) = &self.language {
            config.language = language.clone();
        }
        if let Some(region) = &self.region {
            config.region = region.clone();
        }
        if self.no_upgrade {
            config.upgrade_missing_place_id = false;
        }
        config
    }

    fn columns(&self) -> CsvColumns {
        CsvColumns {
            name: self.name_column.clone(),
            address: self.address_column.clone(),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let config = cli.apply(AppConfig::from_env());

    match run(&cli, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            let is_config = matches!(
                err.downcast_ref::<AppError>(),
                Some(AppError::Config(_))
            );
            if is_config {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run(cli: &Cli, config: &AppConfig) -> anyhow::Result<()> {
    info!(config = ?config.public_profile(), "starting geocoding run");
    let clients = LookupClients::from_config(config, !cli.no_place_search)?;
    let mut table = CsvTable::read_path(&cli.input, &cli.columns())?;
    let mut session = CacheSession::open(&config.cache_path)?;

    let result = {
        let mut resolver = clients.resolver(session.cache_mut());
        enrich(&mut resolver, &mut table.rows, &table.layout).await
    };
    let stats = session
        .close(result)
        .with_context(|| format!("geocoding {} failed", cli.input.display()))?;

    table
        .write_path(&cli.output)
        .with_context(|| format!("writing {}", cli.output.display()))?;

    info!(
        records = stats.records,
        resolved = stats.resolved,
        unresolved = stats.unresolved,
        cache_hits = stats.cache_hits,
        live_calls = stats.live_calls,
        output = %cli.output.display(),
        "geocoding complete"
    );
    Ok(())
}
