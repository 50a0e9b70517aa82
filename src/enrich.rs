use std::{
    thread,
    time::{Duration, Instant},
};

use indicatif::ProgressIterator;
use tracing::{debug, warn};

use crate::{
    config::{EnrichPolicy, OnError},
    error::{Error, Result},
    geocoding::{Candidate, GeoQuery, Geocoder},
    table::{Row, LAT, LON},
    utils::progress_bar,
};

pub const COUNTRY: &str = "Country";
pub const STATE: &str = "State/Region/Province";
pub const CITY: &str = "City";

pub struct Enrichment {
    pub rows: Vec<Row>,
    pub report: Report,
}

#[derive(Debug, Default)]
pub struct Report {
    pub enriched: usize,
    /// Rows that already had both coordinates.
    pub located: usize,
    pub ineligible: usize,
    pub failed: Vec<RowFailure>,
}

#[derive(Debug)]
pub struct RowFailure {
    /// 1-based, not counting the header.
    pub row: usize,
    pub reason: String,
}

/// Adds coordinates to rows one lookup at a time, in input order. Only one
/// request is ever in flight so the service's rate limit is respected.
pub struct Enricher<G> {
    geocoder: G,
    policy: EnrichPolicy,
}

impl<G: Geocoder> Enricher<G> {
    pub fn new(geocoder: G, policy: EnrichPolicy) -> Self {
        Self { geocoder, policy }
    }

    pub fn run(&self, rows: Vec<Row>) -> Result<Enrichment> {
        let mut output = Vec::with_capacity(rows.len());
        let mut report = Report::default();
        let mut last_lookup = None;

        let pb = progress_bar(rows.len() as u64);
        for (index, row) in rows.into_iter().enumerate().progress_with(pb.clone()) {
            let number = index + 1;
            if row.non_empty(LAT).is_some() && row.non_empty(LON).is_some() {
                debug!(row = number, "already has coordinates, passing through");
                report.located += 1;
                output.push(row);
                continue;
            }

            let Some(query) = query_for(&row) else {
                debug!(row = number, "no country or region, passing through");
                report.ineligible += 1;
                output.push(row);
                continue;
            };

            pace(&mut last_lookup, self.policy.interval);
            match self.locate(number, &query) {
                Ok(candidate) => {
                    output.push(merge(row, &candidate));
                    report.enriched += 1;
                }
                Err(e) if self.policy.on_error == OnError::Skip && e.is_row_level() => {
                    warn!(row = number, error = %e, "leaving row unenriched");
                    report.failed.push(RowFailure {
                        row: number,
                        reason: e.to_string(),
                    });
                    output.push(row);
                }
                Err(e) => return Err(e),
            }
        }
        pb.finish_and_clear();

        Ok(Enrichment {
            rows: output,
            report,
        })
    }

    /// The first-ranked candidate is the most related one; the rest are
    /// ignored.
    fn locate(&self, row: usize, query: &GeoQuery) -> Result<Candidate> {
        let candidates = self
            .geocoder
            .lookup(query)
            .map_err(|e| Error::lookup(row, e))?;
        let no_match = || Error::NoMatch {
            row,
            query: query.to_string(),
        };

        let best = candidates.into_iter().next().ok_or_else(no_match)?;
        if let Some(min) = self.policy.min_confidence {
            if best.confidence.map_or(true, |x| x < min) {
                debug!(row, confidence = ?best.confidence, "best match below threshold");
                return Err(no_match());
            }
        }

        debug!(row, formatted = ?best.formatted, "matched");
        Ok(best)
    }
}

/// Rows need both a country and a region to be looked up. The city narrows
/// the search only when present.
pub fn query_for(row: &Row) -> Option<GeoQuery> {
    let country = row.non_empty(COUNTRY)?;
    let state = row.non_empty(STATE)?;
    Some(GeoQuery::Structured {
        country: country.to_string(),
        state: state.to_string(),
        city: row.non_empty(CITY).map(str::to_string),
    })
}

fn merge(mut row: Row, candidate: &Candidate) -> Row {
    row.insert(LAT, candidate.lat().to_string());
    row.insert(LON, candidate.lon().to_string());
    row
}

fn pace(last: &mut Option<Instant>, interval: Duration) {
    if let Some(x) = last {
        let elapsed = x.elapsed();
        if elapsed < interval {
            thread::sleep(interval - elapsed);
        }
    }
    *last = Some(Instant::now());
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, io};

    use geo::Point;

    use super::*;
    use crate::geocoding::GeocodeError;

    type Response = std::result::Result<Vec<Candidate>, GeocodeError>;

    struct FakeGeocoder<F> {
        respond: F,
        queries: RefCell<Vec<GeoQuery>>,
    }

    impl<F: Fn(&GeoQuery) -> Response> FakeGeocoder<F> {
        fn new(respond: F) -> Self {
            Self {
                respond,
                queries: RefCell::new(Vec::new()),
            }
        }
    }

    impl<F: Fn(&GeoQuery) -> Response> Geocoder for FakeGeocoder<F> {
        fn lookup(&self, query: &GeoQuery) -> Response {
            self.queries.borrow_mut().push(query.clone());
            (self.respond)(query)
        }
    }

    fn candidate(lat: f64, lon: f64, confidence: Option<f64>) -> Candidate {
        Candidate {
            point: Point::new(lon, lat),
            confidence,
            formatted: None,
        }
    }

    fn cambridge() -> Response {
        Ok(vec![
            candidate(52.2055314, 0.1186637, Some(1.0)),
            candidate(42.3736, -71.1056, Some(0.5)),
        ])
    }

    fn refused() -> Response {
        Err(GeocodeError::Network {
            url: "http://localhost/geocode/search".into(),
            source: Box::new(io::Error::from(io::ErrorKind::ConnectionRefused)),
        })
    }

    fn row(country: &str, state: &str, city: &str, page: &str) -> Row {
        [
            ("Artist", "Band"),
            (COUNTRY, country),
            (STATE, state),
            (CITY, city),
            ("Page ID", page),
        ]
        .into_iter()
        .collect()
    }

    fn skip() -> EnrichPolicy {
        EnrichPolicy {
            on_error: OnError::Skip,
            ..Default::default()
        }
    }

    #[test]
    fn enriches_eligible_row() {
        let geocoder = FakeGeocoder::new(|_| cambridge());
        let input = row("United Kingdom", "England", "Cambridge", "abc123");
        let enrichment = Enricher::new(&geocoder, EnrichPolicy::default())
            .run(vec![input.clone()])
            .unwrap();

        assert_eq!(
            *geocoder.queries.borrow(),
            vec![GeoQuery::Structured {
                country: "United Kingdom".into(),
                state: "England".into(),
                city: Some("Cambridge".into()),
            }]
        );

        let output = &enrichment.rows[0];
        assert_eq!(output.get(LAT), Some("52.2055314"));
        assert_eq!(output.get(LON), Some("0.1186637"));
        assert_eq!(output.len(), input.len() + 2);
        for (k, v) in input.iter() {
            assert_eq!(output.get(k), Some(v));
        }
        let columns: Vec<_> = output.columns().collect();
        assert_eq!(&columns[5..], &[LAT, LON]);
        assert_eq!(enrichment.report.enriched, 1);
    }

    #[test]
    fn city_is_optional() {
        let geocoder = FakeGeocoder::new(|_| cambridge());
        Enricher::new(&geocoder, EnrichPolicy::default())
            .run(vec![row("Japan", "Tokyo", "", "x")])
            .unwrap();

        assert_eq!(
            *geocoder.queries.borrow(),
            vec![GeoQuery::Structured {
                country: "Japan".into(),
                state: "Tokyo".into(),
                city: None,
            }]
        );
    }

    #[test]
    fn ineligible_rows_pass_through() {
        let geocoder = FakeGeocoder::new(|_| cambridge());
        let input = vec![
            row("", "England", "Cambridge", "a"),
            row("United Kingdom", "", "Cambridge", "b"),
            row("United Kingdom", "England", "Cambridge", "c"),
        ];
        let enrichment = Enricher::new(&geocoder, EnrichPolicy::default())
            .run(input.clone())
            .unwrap();

        assert_eq!(geocoder.queries.borrow().len(), 1);
        assert_eq!(enrichment.rows[0], input[0]);
        assert_eq!(enrichment.rows[1], input[1]);
        assert_eq!(enrichment.rows[2].get("Page ID"), Some("c"));
        assert_eq!(enrichment.rows[2].get(LAT), Some("52.2055314"));
        assert_eq!(enrichment.report.ineligible, 2);
        assert_eq!(enrichment.report.enriched, 1);
    }

    #[test]
    fn rerun_keeps_existing_coordinates() {
        let geocoder = FakeGeocoder::new(|_| cambridge());
        let mut located = row("United Kingdom", "England", "Cambridge", "a");
        located.insert(LAT, "51.5");
        located.insert(LON, "-0.12");
        let mut blank = row("United Kingdom", "England", "Cambridge", "b");
        blank.insert(LAT, "");
        blank.insert(LON, "");

        let enrichment = Enricher::new(&geocoder, EnrichPolicy::default())
            .run(vec![located.clone(), blank])
            .unwrap();

        assert_eq!(geocoder.queries.borrow().len(), 1);
        assert_eq!(enrichment.rows[0], located);
        assert_eq!(enrichment.rows[1].get(LAT), Some("52.2055314"));
        let columns: Vec<_> = enrichment.rows[1].columns().collect();
        assert_eq!(&columns[5..], &[LAT, LON]);
        assert_eq!(enrichment.report.located, 1);
        assert_eq!(enrichment.report.enriched, 1);
    }

    #[test]
    fn no_match_aborts() {
        let geocoder = FakeGeocoder::new(|_| Ok(Vec::new()));
        let input = vec![
            row("France", "Bretagne", "", "a"),
            row("France", "Normandie", "", "b"),
        ];
        let err = Enricher::new(&geocoder, EnrichPolicy::default())
            .run(input)
            .err()
            .unwrap();

        assert!(matches!(err, Error::NoMatch { row: 1, .. }));
        assert_eq!(geocoder.queries.borrow().len(), 1);
    }

    #[test]
    fn skip_policy_keeps_going() {
        let geocoder = FakeGeocoder::new(|query| match query.params()[1].1 {
            "Bretagne" => Ok(Vec::new()),
            "Normandie" => refused(),
            _ => cambridge(),
        });
        let input = vec![
            row("France", "Bretagne", "", "a"),
            row("France", "Normandie", "", "b"),
            row("United Kingdom", "England", "Cambridge", "c"),
        ];
        let enrichment = Enricher::new(&geocoder, skip()).run(input.clone()).unwrap();

        assert_eq!(enrichment.rows[0], input[0]);
        assert_eq!(enrichment.rows[1], input[1]);
        assert_eq!(enrichment.rows[2].get(LON), Some("0.1186637"));
        let failed: Vec<_> = enrichment.report.failed.iter().map(|x| x.row).collect();
        assert_eq!(failed, vec![1, 2]);
    }

    #[test]
    fn invalid_response_is_always_fatal() {
        let geocoder = FakeGeocoder::new(|_| {
            Err(GeocodeError::Status {
                url: "http://localhost/geocode/search".into(),
                status: 401,
            })
        });
        let err = Enricher::new(&geocoder, skip())
            .run(vec![row("France", "Bretagne", "", "a")])
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidResponse { row: 1, .. }));
    }

    #[test]
    fn network_error_aborts_by_default() {
        let geocoder = FakeGeocoder::new(|_| refused());
        let err = Enricher::new(&geocoder, EnrichPolicy::default())
            .run(vec![row("France", "Bretagne", "", "a")])
            .err()
            .unwrap();
        assert!(matches!(err, Error::Network { row: 1, .. }));
    }

    #[test]
    fn confidence_threshold() {
        let geocoder = FakeGeocoder::new(|query| match query.params()[1].1 {
            "Bretagne" => Ok(vec![candidate(48.2, -2.9, Some(0.3))]),
            "Normandie" => Ok(vec![candidate(49.1, 0.1, None)]),
            _ => cambridge(),
        });
        let policy = EnrichPolicy {
            min_confidence: Some(0.5),
            ..skip()
        };
        let enrichment = Enricher::new(&geocoder, policy)
            .run(vec![
                row("France", "Bretagne", "", "a"),
                row("France", "Normandie", "", "b"),
                row("United Kingdom", "England", "Cambridge", "c"),
            ])
            .unwrap();

        assert_eq!(enrichment.rows[0].get(LAT), None);
        assert_eq!(enrichment.rows[1].get(LAT), None);
        assert_eq!(enrichment.rows[2].get(LAT), Some("52.2055314"));
        assert_eq!(enrichment.report.failed.len(), 2);
    }

    #[test]
    fn paces_lookups() {
        let geocoder = FakeGeocoder::new(|_| cambridge());
        let policy = EnrichPolicy {
            interval: Duration::from_millis(30),
            ..Default::default()
        };
        let started = Instant::now();
        Enricher::new(&geocoder, policy)
            .run(vec![
                row("United Kingdom", "England", "", "a"),
                row("United Kingdom", "England", "", "b"),
                row("United Kingdom", "England", "", "c"),
            ])
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(60));
    }
}
