//! CSV lookup tables for reclassification and thresholding
//!
//! The first column holds integer base codes, the following one or two
//! columns hold target values. A header row is expected.

use crate::core::reclassify::LookupTable;
use crate::types::{RasterError, RasterResult};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;

/// One row of a lookup table
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TableRow {
    pub code: i64,
    pub value: f64,
    #[serde(default)]
    pub extra: Option<f64>,
}

/// Which value column feeds the lookup table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueColumn {
    /// Second column
    #[default]
    First,
    /// Third column; rows without it are rejected
    Second,
}

/// Read all rows of a lookup table CSV
pub fn read_table_rows<R: Read>(reader: R) -> RasterResult<Vec<TableRow>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        // Headers of the input are arbitrary, so deserialize positionally
        let row: TableRow = record.deserialize(None)?;
        rows.push(row);
    }
    Ok(rows)
}

/// Build a [`LookupTable`] from CSV data
pub fn lookup_table_from_reader<R: Read>(reader: R, column: ValueColumn) -> RasterResult<LookupTable> {
    let rows = read_table_rows(reader)?;
    let pairs = rows
        .into_iter()
        .map(|row| match column {
            ValueColumn::First => Ok((row.code, row.value)),
            ValueColumn::Second => row.extra.map(|v| (row.code, v)).ok_or_else(|| {
                RasterError::InvalidInput(format!("Lookup row for code {} has no third column", row.code))
            }),
        })
        .collect::<RasterResult<Vec<_>>>()?;
    Ok(LookupTable::from_pairs(pairs))
}

/// Read a lookup table CSV from disk
pub fn read_lookup_table<P: AsRef<Path>>(path: P, column: ValueColumn) -> RasterResult<LookupTable> {
    log::info!("Reading lookup table from: {}", path.as_ref().display());
    let file = std::fs::File::open(path.as_ref())?;
    let table = lookup_table_from_reader(file, column)?;
    log::debug!("Lookup table has {} codes", table.len());
    Ok(table)
}
