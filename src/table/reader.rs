use std::{fs, path::Path};

use csv::ReaderBuilder;

use crate::error::{Error, Result};

use super::{Row, BOM};

pub fn read(path: &Path) -> Result<Vec<Row>> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    let text = String::from_utf8(bytes).map_err(|e| Error::parse(path, e.to_string()))?;
    parse(&text).map_err(|e| Error::parse(path, e))
}

/// Headers come from the first line; a leading byte-order-mark is dropped.
pub fn parse(text: &str) -> Result<Vec<Row>, String> {
    let text = text.strip_prefix(BOM).unwrap_or(text);
    if let Some(line) = unterminated_quote(text) {
        return Err(format!("quote opened on line {line} is never closed"));
    }
    records(text).map_err(|e| e.to_string())
}

fn records(text: &str) -> csv::Result<Vec<Row>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(headers.iter().zip(record.iter()).collect());
    }

    Ok(rows)
}

/// The csv reader accepts a quote still open at end of input and folds the
/// rest of the file into that one cell. Returns the line the quote opened on.
fn unterminated_quote(text: &str) -> Option<usize> {
    let mut line = 1;
    let mut opened_at = None;
    let mut field_start = true;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match (opened_at, c) {
            // escaped quote
            (Some(_), '"') if chars.peek() == Some(&'"') => {
                chars.next();
            }
            (Some(_), '"') => opened_at = None,
            (None, '"') if field_start => {
                opened_at = Some(line);
                field_start = false;
            }
            (None, ',' | '\r' | '\n') => field_start = true,
            _ => field_start = false,
        }
        if c == '\n' {
            line += 1;
        }
    }

    opened_at
}
