use std::{io, path::Path};

use csv::{Terminator, WriterBuilder};
use itertools::Itertools;

use crate::{
    error::{Error, Result},
    utils::write_atomically,
};

use super::{Row, BOM};

pub fn write(path: &Path, rows: &[Row]) -> Result<()> {
    let contents = serialize(rows).map_err(|e| Error::io(path, e))?;
    write_atomically(path, &contents)
}

/// The header is every column seen across all rows, in first-seen order.
/// Cells a row has no value for are left empty.
pub fn serialize(rows: &[Row]) -> io::Result<Vec<u8>> {
    let mut output = Vec::new();
    output.extend_from_slice(BOM.to_string().as_bytes());

    let headers: Vec<&str> = rows.iter().flat_map(Row::columns).unique().collect();
    if headers.is_empty() {
        return Ok(output);
    }

    let mut writer = WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .from_writer(output);
    writer.write_record(&headers)?;
    for row in rows {
        writer.write_record(headers.iter().map(|x| row.get(x).unwrap_or_default()))?;
    }

    writer.into_inner().map_err(|e| e.into_error())
}
