use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use itertools::Itertools;
use tracing::{info, warn};

use geocsv::{
    config::{
        sibling_path, ApiConfig, EnrichPolicy, GeoJsonConfig, GeocodeConfig, MissingCoordinates,
        OnError, ProjectOptions, DEFAULT_API_BASE_URL, DEFAULT_URL_BASE,
    },
    enrich::Enricher,
    features,
    geocoding::Geoapify,
    logging, table,
};

#[derive(Debug, Parser)]
#[command(name = "geocsv", version, about = "Geocode a CSV of places and export it as GeoJSON")]
struct Cli {
    /// Log every request and per-row decision.
    #[arg(short, long, global = true)]
    debug: bool,

    /// Only log warnings and errors.
    #[arg(short, long, global = true, conflicts_with = "debug")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Add `lat`/`lon` columns to every row with a country and region.
    Geocode(GeocodeArgs),
    /// Convert a geocoded CSV into a GeoJSON FeatureCollection.
    Geojson(GeoJsonArgs),
}

#[derive(Debug, Args)]
struct GeocodeArgs {
    input: PathBuf,

    /// Defaults to `<input>_geo.csv`.
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long, env = "GEOAPIFY_API_ROOT", default_value = DEFAULT_API_BASE_URL)]
    api_base_url: String,

    #[arg(long, env = "GEOAPIFY_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Per-request timeout, 0 to wait forever.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Minimum pause between two lookups.
    #[arg(long, default_value_t = 0)]
    interval_ms: u64,

    #[arg(long, value_enum, default_value_t = OnError::Abort)]
    on_error: OnError,

    /// Treat a best match below this confidence (0 to 1) as no match.
    #[arg(long, value_parser = parse_confidence)]
    min_confidence: Option<f64>,
}

impl GeocodeArgs {
    fn into_config(self) -> GeocodeConfig {
        GeocodeConfig {
            output_path: self
                .output
                .unwrap_or_else(|| sibling_path(&self.input, "_geo.csv")),
            input_path: self.input,
            api: ApiConfig {
                base_url: self.api_base_url,
                api_key: self.api_key,
                timeout: (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs)),
            },
            policy: EnrichPolicy {
                on_error: self.on_error,
                min_confidence: self.min_confidence,
                interval: Duration::from_millis(self.interval_ms),
            },
        }
    }
}

#[derive(Debug, Args)]
struct GeoJsonArgs {
    input: PathBuf,

    /// Defaults to `<input>.geojson`.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Prefix of the `url` property, followed by the row's `Page ID`.
    #[arg(long, env = "GEOCSV_URL_BASE", default_value = DEFAULT_URL_BASE)]
    url_base: String,

    #[arg(long, value_enum, default_value_t = MissingCoordinates::Null)]
    missing_coordinates: MissingCoordinates,
}

impl GeoJsonArgs {
    fn into_config(self) -> GeoJsonConfig {
        GeoJsonConfig {
            output_path: self
                .output
                .unwrap_or_else(|| sibling_path(&self.input, ".geojson")),
            input_path: self.input,
            project: ProjectOptions {
                url_base: self.url_base,
                missing: self.missing_coordinates,
            },
        }
    }
}

fn parse_confidence(s: &str) -> Result<f64, String> {
    match s.parse::<f64>() {
        Ok(x) if (0.0..=1.0).contains(&x) => Ok(x),
        _ => Err(format!("{s} is not a number between 0 and 1")),
    }
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    logging::init(cli.debug, cli.quiet);

    match cli.command {
        Command::Geocode(args) => geocode(args.into_config())?,
        Command::Geojson(args) => geojson(args.into_config())?,
    }

    Ok(())
}

fn geocode(config: GeocodeConfig) -> Result<()> {
    let rows = table::read(&config.input_path)?;
    info!("Geocoding {} rows from {}", rows.len(), config.input_path.display());

    let geocoder = Geoapify::new(&config.api)?;
    let enrichment = Enricher::new(geocoder, config.policy).run(rows)?;
    table::write(&config.output_path, &enrichment.rows)?;

    let report = &enrichment.report;
    info!(
        "Wrote {}: {} geocoded, {} already located, {} without country or region",
        config.output_path.display(),
        report.enriched,
        report.located,
        report.ineligible
    );
    if !report.failed.is_empty() {
        warn!(
            "{} rows left unenriched: {}",
            report.failed.len(),
            report.failed.iter().map(|x| x.row).join(", ")
        );
    }

    Ok(())
}

fn geojson(config: GeoJsonConfig) -> Result<()> {
    let rows = table::read(&config.input_path)?;
    let collection = features::collect(&config.input_path, &rows, &config.project)?;
    features::write(&config.output_path, &collection)?;
    info!(
        "Wrote {} features to {}",
        collection.features.len(),
        config.output_path.display()
    );

    Ok(())
}
