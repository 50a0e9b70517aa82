use std::path::Path;

use geo::Point;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::{
    config::{MissingCoordinates, ProjectOptions},
    error::{Error, Result},
    table::{Row, LAT, LON},
    utils::write_atomically,
};

pub const PAGE_ID: &str = "Page ID";
pub const URL: &str = "url";

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub struct Feature {
    pub geometry: Option<Geometry>,
    pub properties: Map<String, Value>,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: [f64; 2] },
}

impl From<Point> for Geometry {
    fn from(point: Point) -> Self {
        Self::Point {
            coordinates: [point.x(), point.y()],
        }
    }
}

/// Coordinates are missing when both cells are absent or blank. Anything
/// else that doesn't parse is an error.
fn coordinates(row: &Row) -> Result<Option<Point>, String> {
    let cell = |column: &str| row.get(column).map(str::trim).filter(|x| !x.is_empty());
    let parse = |column: &str, value: &str| match value.parse::<f64>() {
        Ok(x) if x.is_finite() => Ok(x),
        _ => Err(format!("{column} {value:?} is not a number")),
    };

    match (cell(LAT), cell(LON)) {
        (None, None) => Ok(None),
        (Some(lat), Some(lon)) => Ok(Some(Point::new(parse(LON, lon)?, parse(LAT, lat)?))),
        (Some(_), None) => Err(format!("{LAT} is set but {LON} is not")),
        (None, Some(_)) => Err(format!("{LON} is set but {LAT} is not")),
    }
}

/// Builds the feature for one row. Returns `Ok(None)` when the row has no
/// coordinates and the options say to skip it. `Err` carries a message for
/// the caller to attach a location to.
pub fn project(row: &Row, options: &ProjectOptions) -> Result<Option<Feature>, String> {
    let point = coordinates(row)?;
    if point.is_none() {
        match options.missing {
            MissingCoordinates::Null => {}
            MissingCoordinates::Skip => return Ok(None),
            MissingCoordinates::Fail => return Err("no coordinates".into()),
        }
    }

    let mut properties: Map<String, Value> = row
        .iter()
        .map(|(k, v)| (k.to_string(), Value::from(v)))
        .collect();
    properties.insert(LAT.into(), point.map_or(Value::Null, |x| x.y().into()));
    properties.insert(LON.into(), point.map_or(Value::Null, |x| x.x().into()));
    if let Some(id) = row.get(PAGE_ID) {
        properties.insert(
            URL.into(),
            format!("{}/{id}", options.url_base.trim_end_matches('/')).into(),
        );
    }

    Ok(Some(Feature {
        geometry: point.map(Geometry::from),
        properties,
    }))
}

pub fn collect(path: &Path, rows: &[Row], options: &ProjectOptions) -> Result<FeatureCollection> {
    let mut features = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        let number = index + 1;
        match project(row, options).map_err(|e| Error::parse(path, format!("row {number}: {e}")))? {
            Some(x) => features.push(x),
            None => warn!(row = number, "no coordinates, skipping"),
        }
    }

    Ok(FeatureCollection { features })
}

pub fn write(path: &Path, collection: &FeatureCollection) -> Result<()> {
    let contents =
        serde_json::to_vec(collection).map_err(|e| Error::io(path, e.into()))?;
    write_atomically(path, &contents)
}
