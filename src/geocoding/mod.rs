use std::fmt;

use geo::Point;
use thiserror::Error;

mod client;

pub use client::Geoapify;

/// What to search for. The pipeline only issues structured queries, the
/// free-text form is for ad hoc addresses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GeoQuery {
    Text(String),
    Structured {
        country: String,
        state: String,
        city: Option<String>,
    },
}

impl GeoQuery {
    /// Query parameters in the order they are sent. Empty values are left
    /// out since the service treats them differently from absent ones.
    pub fn params(&self) -> Vec<(&'static str, &str)> {
        let params = match self {
            Self::Text(text) => vec![("text", text.as_str())],
            Self::Structured {
                country,
                state,
                city,
            } => {
                let mut params = vec![("country", country.as_str()), ("state", state.as_str())];
                if let Some(city) = city {
                    params.push(("city", city.as_str()));
                }
                params
            }
        };
        params.into_iter().filter(|(_, v)| !v.is_empty()).collect()
    }
}

impl fmt::Display for GeoQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, v) in self.params() {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{k}={v:?}")?;
        }
        Ok(())
    }
}

/// One match returned by the service. `point` is `(lon, lat)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub point: Point,
    pub confidence: Option<f64>,
    pub formatted: Option<String>,
}

impl Candidate {
    pub fn lat(&self) -> f64 {
        self.point.y()
    }

    pub fn lon(&self) -> f64 {
        self.point.x()
    }
}

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("request to {url} did not complete")]
    Network {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{url} did not return a geocoding result")]
    Body {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl GeocodeError {
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}

/// Resolves a query into candidates, best match first. An empty list means
/// nothing matched and is not an error.
pub trait Geocoder {
    fn lookup(&self, query: &GeoQuery) -> Result<Vec<Candidate>, GeocodeError>;
}

impl<G: Geocoder + ?Sized> Geocoder for &G {
    fn lookup(&self, query: &GeoQuery) -> Result<Vec<Candidate>, GeocodeError> {
        (**self).lookup(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_params() {
        let query = GeoQuery::Structured {
            country: "United Kingdom".into(),
            state: "England".into(),
            city: None,
        };
        assert_eq!(
            query.params(),
            vec![("country", "United Kingdom"), ("state", "England")]
        );
        assert_eq!(
            query.to_string(),
            "country=\"United Kingdom\", state=\"England\""
        );

        let query = GeoQuery::Structured {
            country: "Japan".into(),
            state: "Tokyo".into(),
            city: Some(String::new()),
        };
        assert_eq!(query.params(), vec![("country", "Japan"), ("state", "Tokyo")]);
    }

    #[test]
    fn text_params() {
        let query = GeoQuery::Text("Cambridge, UK".into());
        assert_eq!(query.params(), vec![("text", "Cambridge, UK")]);
    }
}
