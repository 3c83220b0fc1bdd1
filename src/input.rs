//! Target lists from spreadsheet, CSV or JSON files.
//!
//! Tabular files are read without assuming a fixed layout: the header row
//! is searched for among the first five rows, and the company and address
//! columns are picked by keyword.

use crate::model::Target;
use crate::{Error, Result};
use calamine::{open_workbook_auto, Reader};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

const HEADER_SCAN_ROWS: usize = 5;
const COMPANY_KEYS: &[&str] = &["entreprise", "company", "nom"];
const ADDRESS_KEYS: &[&str] = &["ville", "city", "adresse", "address"];
const MISSING_COLUMNS: &str = "Could not find 'Company' and 'Address' columns in the file";

/// Load targets, picking the parser from the file extension.
pub fn load_targets<P: AsRef<Path>>(path: P) -> Result<Vec<Target>> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    let targets = match extension.as_deref() {
        Some("json") => parse_json(&std::fs::read_to_string(path)?)?,
        Some("csv") | Some("txt") => parse_csv(&std::fs::read_to_string(path)?)?,
        Some("xlsx") | Some("xlsm") | Some("xls") | Some("ods") => read_workbook(path)?,
        other => {
            return Err(Error::Input(format!(
                "unsupported target file type: {}",
                other.unwrap_or("(none)")
            )))
        }
    };
    info!("Loaded {} targets from {}", targets.len(), path.display());
    Ok(targets)
}

/// Read targets from the first worksheet of a workbook.
pub fn read_workbook(path: &Path) -> Result<Vec<Target>> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| Error::Input(format!("{} has no worksheet", path.display())))??;
    let rows: Vec<Vec<String>> = range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect();
    targets_from_rows(&rows)
}

/// Parse a CSV target list.
pub fn parse_csv(content: &str) -> Result<Vec<Target>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }
    targets_from_rows(&rows)
}

fn targets_from_rows(rows: &[Vec<String>]) -> Result<Vec<Target>> {
    fn cell(row: &[String], col: usize) -> &str {
        row.get(col).map(|c| c.trim()).unwrap_or("")
    }

    let (header_row, company_col, address_col) =
        find_columns(rows).ok_or_else(|| Error::Input(MISSING_COLUMNS.into()))?;
    debug!(
        "header at row {}, company column {}, address column {}",
        header_row, company_col, address_col
    );

    Ok(rows
        .iter()
        .skip(header_row + 1)
        .filter_map(|row| {
            let company = cell(row, company_col);
            let address = cell(row, address_col);
            (!company.is_empty() && !address.is_empty()).then(|| Target::new(company, address))
        })
        .collect())
}

/// Header row index plus company and address column indices.
///
/// Within a row the rightmost matching cell wins; scanning stops at the
/// first row where both columns have been seen.
fn find_columns(rows: &[Vec<String>]) -> Option<(usize, usize, usize)> {
    let mut header_row = 0;
    let mut company = None;
    let mut address = None;
    for (i, row) in rows.iter().take(HEADER_SCAN_ROWS).enumerate() {
        for (j, cell) in row.iter().enumerate() {
            let cell = cell.trim().to_lowercase();
            if COMPANY_KEYS.iter().any(|k| cell.contains(k)) {
                company = Some(j);
                header_row = i;
            }
            if ADDRESS_KEYS.iter().any(|k| cell.contains(k)) {
                address = Some(j);
                header_row = i;
            }
        }
        if company.is_some() && address.is_some() {
            break;
        }
    }
    Some((header_row, company?, address?))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonTargets {
    List(Vec<Target>),
    Wrapped { targets: Vec<Target> },
}

/// Parse a JSON target list: an array of `{company, address}` objects, or
/// an object holding such an array under `targets`.
pub fn parse_json(content: &str) -> Result<Vec<Target>> {
    let targets = match serde_json::from_str::<JsonTargets>(content)? {
        JsonTargets::List(targets) | JsonTargets::Wrapped { targets } => targets,
    };
    Ok(targets
        .into_iter()
        .map(|t| Target::new(t.company.trim(), t.address.trim()))
        .filter(|t| !t.company.is_empty() && !t.address.is_empty())
        .collect())
}
