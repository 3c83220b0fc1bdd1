//! Procedures table analysis: find the most recent "Permis délivré" date.
//!
//! Two paths share one rule set. When the header names a start-date column
//! and a status column, rows are read by column. Otherwise every row whose
//! text mentions the delivered status contributes the first date it
//! contains. Dates are compared as calendar dates; the raw `DD/MM/YYYY`
//! text of the winner is what gets reported.

use crate::page::{TableRow, TableSnapshot};
use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

/// Status text of a delivered permit, matched literally.
pub const PERMIT_DELIVERED: &str = "Permis délivré";

fn date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d{2}/\d{2}/\d{4}").expect("date pattern compiles"))
}

/// A date as written on the portal plus its calendar value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermitDate {
    pub raw: String,
    pub date: NaiveDate,
}

impl PermitDate {
    /// First `DD/MM/YYYY` token in `text` that is a real calendar date.
    pub fn find(text: &str) -> Option<Self> {
        date_pattern().find_iter(text).find_map(|m| {
            NaiveDate::parse_from_str(m.as_str(), "%d/%m/%Y")
                .ok()
                .map(|date| Self {
                    raw: m.as_str().to_string(),
                    date,
                })
        })
    }
}

/// Positions of the columns the column path reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Columns {
    pub date: usize,
    pub status: usize,
}

/// How the winning date was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Columns(Columns),
    FreeText,
}

/// Result of analysing one procedures table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub latest: Option<PermitDate>,
    pub method: Method,
    /// Rows that carried the delivered status, dated or not.
    pub delivered_rows: usize,
}

/// Find the start-date and status columns in a header row.
///
/// When several cells match, the rightmost one is used.
pub fn locate_columns(header: &[String]) -> Option<Columns> {
    let position = |needles: &[&str]| {
        header.iter().rposition(|cell| {
            let cell = cell.trim().to_lowercase();
            needles.iter().any(|n| cell.contains(n))
        })
    };
    let date = position(&["date de début", "date de debut"])?;
    let status = position(&["statut", "status"])?;
    Some(Columns { date, status })
}

fn later(current: Option<PermitDate>, candidate: PermitDate) -> Option<PermitDate> {
    match current {
        Some(best) if best.date >= candidate.date => Some(best),
        _ => Some(candidate),
    }
}

fn data_rows(table: &TableSnapshot) -> impl Iterator<Item = &TableRow> {
    table.rows.iter().filter(|r| !r.header)
}

/// Analyse a procedures table.
pub fn latest_delivered(table: &TableSnapshot) -> Extraction {
    match locate_columns(&table.header) {
        Some(columns) => by_columns(table, columns),
        None => by_text(table),
    }
}

fn by_columns(table: &TableSnapshot, columns: Columns) -> Extraction {
    let mut latest = None;
    let mut delivered_rows = 0;
    for row in data_rows(table) {
        let (Some(status), Some(date)) = (row.cells.get(columns.status), row.cells.get(columns.date))
        else {
            continue;
        };
        if !status.contains(PERMIT_DELIVERED) {
            continue;
        }
        delivered_rows += 1;
        if let Some(found) = PermitDate::find(date.trim()) {
            latest = later(latest, found);
        }
    }
    Extraction {
        latest,
        method: Method::Columns(columns),
        delivered_rows,
    }
}

fn by_text(table: &TableSnapshot) -> Extraction {
    let mut latest = None;
    let mut delivered_rows = 0;
    for row in data_rows(table) {
        if !row.text.contains(PERMIT_DELIVERED) {
            continue;
        }
        delivered_rows += 1;
        if let Some(found) = PermitDate::find(&row.text) {
            latest = later(latest, found);
        }
    }
    Extraction {
        latest,
        method: Method::FreeText,
        delivered_rows,
    }
}
