//! Adds coordinates to a table of places by looking each row up with a
//! geocoding service, and turns the result into a GeoJSON point layer.

pub mod config;
pub mod enrich;
pub mod error;
pub mod features;
pub mod geocoding;
pub mod logging;
pub mod table;
pub mod utils;

pub use error::{Error, Result};
