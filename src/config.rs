use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use clap::ValueEnum;

pub const DEFAULT_API_BASE_URL: &str = "https://api.geoapify.com/v1";
pub const DEFAULT_URL_BASE: &str = "https://www.notion.so/march-am";

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Option<Duration>,
}

/// Everything the enrichment stage needs; built once at the boundary.
#[derive(Clone, Debug)]
pub struct GeocodeConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub api: ApiConfig,
    pub policy: EnrichPolicy,
}

#[derive(Clone, Debug, Default)]
pub struct EnrichPolicy {
    pub on_error: OnError,
    /// Reject the best candidate when its confidence is below this.
    pub min_confidence: Option<f64>,
    /// Minimum time between the start of two lookups.
    pub interval: Duration,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OnError {
    /// Stop at the first failed row and write nothing.
    #[default]
    Abort,
    /// Leave rows that found no match or hit a network error unenriched.
    Skip,
}

#[derive(Clone, Debug)]
pub struct GeoJsonConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub project: ProjectOptions,
}

#[derive(Clone, Debug)]
pub struct ProjectOptions {
    pub url_base: String,
    pub missing: MissingCoordinates,
}

impl Default for ProjectOptions {
    fn default() -> Self {
        Self {
            url_base: DEFAULT_URL_BASE.to_string(),
            missing: MissingCoordinates::default(),
        }
    }
}

/// What to do with rows that carry no coordinates.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum MissingCoordinates {
    /// Keep the feature with a null geometry.
    #[default]
    Null,
    Skip,
    Fail,
}

/// `bands.csv` becomes `bands{suffix}` in the same directory.
pub fn sibling_path(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|x| x.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{stem}{suffix}"))
}
