//! Batch reports in JSON, CSV and Excel.

use crate::model::{OutcomeStatus, PermitResult};
use crate::{Error, Result};
use csv::Writer;
use rust_xlsxwriter::{Format, Workbook};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

const REPORT_HEADER: [&str; 6] = [
    "Company",
    "Address",
    "Latest Delivered Permit Date",
    "Permit Page Link",
    "Status",
    "Error Message",
];

/// Write the results as a pretty-printed JSON array.
pub fn write_json<W: Write>(results: &[PermitResult], mut out: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut out, results)?;
    out.write_all(b"\n")?;
    Ok(())
}

/// Write one CSV row per result.
pub fn write_csv<W: Write>(results: &[PermitResult], out: W) -> Result<()> {
    let mut wtr = Writer::from_writer(out);
    wtr.write_record(REPORT_HEADER)?;
    for result in results {
        wtr.write_record(report_row(result))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write a single-sheet workbook with the same columns as the CSV report.
pub fn write_xlsx<P: AsRef<Path>>(results: &[PermitResult], path: P) -> Result<()> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Results")?;
    for (col, title) in REPORT_HEADER.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, &bold)?;
    }
    for (i, result) in results.iter().enumerate() {
        let row = i as u32 + 1;
        for (col, value) in report_row(result).iter().enumerate() {
            sheet.write_string(row, col as u16, *value)?;
        }
    }
    workbook.save(path.as_ref())?;
    Ok(())
}

fn report_row(result: &PermitResult) -> [&str; 6] {
    [
        result.company.as_str(),
        result.address.as_str(),
        result.latest_permit_date.as_deref().unwrap_or(""),
        result.permit_page_link.as_deref().unwrap_or(""),
        result.status.as_str(),
        result.error_message.as_deref().unwrap_or(""),
    ]
}

/// Write a report file; the format follows the extension (`.json`, `.csv` or `.xlsx`).
pub fn export<P: AsRef<Path>>(results: &[PermitResult], path: P) -> Result<()> {
    let path = path.as_ref();
    debug!("Exporting {} results to {}", results.len(), path.display());
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => write_json(results, File::create(path)?)?,
        Some(ext) if ext.eq_ignore_ascii_case("csv") => write_csv(results, File::create(path)?)?,
        Some(ext) if ext.eq_ignore_ascii_case("xlsx") => write_xlsx(results, path)?,
        _ => {
            return Err(Error::Input(format!(
                "report must end in .json, .csv or .xlsx: {}",
                path.display()
            )))
        }
    }
    info!("Wrote {} results to {}", results.len(), path.display());
    Ok(())
}

/// Count results per status, every status present.
pub fn tally(results: &[PermitResult]) -> BTreeMap<&'static str, usize> {
    let mut counts: BTreeMap<&'static str, usize> =
        OutcomeStatus::ALL.iter().map(|s| (s.as_str(), 0)).collect();
    for result in results {
        *counts.entry(result.status.as_str()).or_default() += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{StepRecord, StepStatus};

    fn result(company: &str, status: OutcomeStatus, date: Option<&str>, error: Option<&str>) -> PermitResult {
        PermitResult {
            company: company.into(),
            address: "Rue de la Station 1, Herve".into(),
            latest_permit_date: date.map(Into::into),
            permit_page_link: date.map(|_| "https://bdes.example/parcel/1".to_string()),
            status,
            resolution: status,
            parcel_count: Some(1),
            error_message: error.map(Into::into),
            steps: vec![StepRecord::new("Navigate to portal", StepStatus::Success, "")],
        }
    }

    #[test]
    fn csv_has_report_columns() {
        let results = vec![
            result("Acme", OutcomeStatus::Success, Some("15/06/2022"), None),
            result("Beta, SA", OutcomeStatus::NoPermitData, None, Some("Procédures tab not found")),
        ];
        let mut buf = Vec::new();
        write_csv(&results, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "Company,Address,Latest Delivered Permit Date,Permit Page Link,Status,Error Message"
        );
        assert_eq!(
            lines[1],
            "Acme,\"Rue de la Station 1, Herve\",15/06/2022,https://bdes.example/parcel/1,SUCCESS,"
        );
        assert!(lines[2].starts_with("\"Beta, SA\""));
        assert!(lines[2].ends_with("NO_PERMIT_DATA,Procédures tab not found"));
    }

    #[test]
    fn json_report_is_an_array() {
        let results = vec![result("Acme", OutcomeStatus::Success, Some("15/06/2022"), None)];
        let mut buf = Vec::new();
        write_json(&results, &mut buf).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value[0]["status"], "SUCCESS");
        assert_eq!(value[0]["latestPermitDate"], "15/06/2022");
    }

    #[test]
    fn export_picks_format_from_extension() {
        let dir = tempfile::tempdir().unwrap();
        let results = vec![result("Acme", OutcomeStatus::Error, None, Some("boom"))];
        export(&results, dir.path().join("out.CSV")).unwrap();
        export(&results, dir.path().join("out.json")).unwrap();
        assert!(export(&results, dir.path().join("out.ods")).is_err());
        let csv = std::fs::read_to_string(dir.path().join("out.CSV")).unwrap();
        assert!(csv.contains("ERROR,boom"));
    }

    #[test]
    fn xlsx_report_has_report_columns() {
        use calamine::{open_workbook_auto, Reader};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.xlsx");
        let results = vec![
            result("Acme", OutcomeStatus::Success, Some("15/06/2022"), None),
            result("Beta", OutcomeStatus::NoPermitData, None, Some("Procédures tab not found")),
        ];
        export(&results, &path).unwrap();

        let mut workbook = open_workbook_auto(&path).unwrap();
        assert_eq!(workbook.sheet_names(), vec!["Results".to_string()]);
        let range = workbook.worksheet_range_at(0).unwrap().unwrap();
        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], REPORT_HEADER.map(String::from).to_vec());
        assert_eq!(rows[1][2], "15/06/2022");
        assert_eq!(rows[2][4], "NO_PERMIT_DATA");
        assert_eq!(rows[2][5], "Procédures tab not found");
    }

    #[test]
    fn tally_counts_every_status() {
        let results = vec![
            result("A", OutcomeStatus::Success, Some("01/01/2020"), None),
            result("B", OutcomeStatus::Success, Some("01/01/2021"), None),
            result("C", OutcomeStatus::MultipleParcels, None, None),
        ];
        let counts = tally(&results);
        assert_eq!(counts.len(), 5);
        assert_eq!(counts["SUCCESS"], 2);
        assert_eq!(counts["MULTIPLE_PARCELS"], 1);
        assert_eq!(counts["ERROR"], 0);
    }
}
