use serde::Deserialize;
use tracing::info;
use ureq::{Agent, AgentBuilder};
use url::Url;

use crate::{
    config::ApiConfig,
    error::{Error, Result},
};

use super::{Candidate, GeoQuery, GeocodeError, Geocoder};

const API_KEY_PARAM: &str = "apiKey";

/// Client for the Geoapify geocoding search endpoint. Every lookup is one
/// blocking request.
pub struct Geoapify {
    agent: Agent,
    endpoint: Url,
    api_key: String,
}

impl Geoapify {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let endpoint = format!("{}/geocode/search", config.base_url.trim_end_matches('/'));
        let endpoint = Url::parse(&endpoint)
            .map_err(|e| Error::Config(format!("bad api base url {}: {e}", config.base_url)))?;
        if config.api_key.is_empty() {
            return Err(Error::Config("api key is empty".into()));
        }

        let mut agent = AgentBuilder::new().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(timeout) = config.timeout {
            agent = agent.timeout(timeout);
        }

        Ok(Self {
            agent: agent.build(),
            endpoint,
            api_key: config.api_key.clone(),
        })
    }

    fn request_url(&self, query: &GeoQuery) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair(API_KEY_PARAM, &self.api_key)
            .extend_pairs(query.params());
        url
    }
}

impl Geocoder for Geoapify {
    fn lookup(&self, query: &GeoQuery) -> Result<Vec<Candidate>, GeocodeError> {
        let url = self.request_url(query);
        let shown = redacted(&url);
        info!(url = %shown, "fetch");

        let response = match self.agent.get(url.as_str()).call() {
            Ok(x) => x,
            Err(ureq::Error::Status(status, _)) => {
                return Err(GeocodeError::Status { url: shown, status })
            }
            Err(ureq::Error::Transport(e)) => {
                return Err(GeocodeError::Network {
                    url: shown,
                    source: Box::new(e),
                })
            }
        };

        let body = response.into_string().map_err(|e| GeocodeError::Network {
            url: shown.clone(),
            source: Box::new(e),
        })?;
        let response: SearchResponse = serde_json::from_str(&body)
            .map_err(|source| GeocodeError::Body { url: shown, source })?;

        Ok(response
            .features
            .into_iter()
            .map(RawFeature::refine)
            .collect())
    }
}

/// The request url with the credential masked, for logs and errors.
fn redacted(url: &Url) -> String {
    let mut url = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == API_KEY_PARAM {
                "REDACTED".to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), v)
        })
        .collect();
    url.query_pairs_mut().clear().extend_pairs(pairs);
    url.to_string()
}

#[derive(Deserialize)]
struct SearchResponse {
    features: Vec<RawFeature>,
}

#[derive(Deserialize)]
struct RawFeature {
    properties: RawProperties,
}

#[derive(Deserialize)]
struct RawProperties {
    lat: f64,
    lon: f64,
    formatted: Option<String>,
    rank: Option<RawRank>,
}

#[derive(Deserialize)]
struct RawRank {
    confidence: Option<f64>,
}

impl RawFeature {
    fn refine(self) -> Candidate {
        let RawProperties {
            lat,
            lon,
            formatted,
            rank,
        } = self.properties;
        Candidate {
            point: geo::Point::new(lon, lat),
            confidence: rank.and_then(|x| x.confidence),
            formatted,
        }
    }
}
