//! Fetch functions - read the comparable-sales table from disk

use crate::analysis::error::{AnalysisError, Result};
use crate::analysis::types::{RawData, RawTable};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::{Days, NaiveDate};
use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::info;

/// Read a sales export (CSV, zipped CSV or spreadsheet) into a raw table
pub fn read_sales_table(path: &Path) -> Result<RawTable> {
    let raw = fetch_raw(path)?;
    info!("Read {} bytes from {:?}", raw.len(), path);

    match raw {
        RawData::Csv(bytes) => parse_csv_table(&bytes),
        RawData::Workbook(bytes) => parse_workbook_table(bytes),
    }
}

/// Load the file and tag it by format
pub fn fetch_raw(path: &Path) -> Result<RawData> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "csv" | "txt" => Ok(RawData::Csv(fs::read(path)?)),
        "zip" => Ok(RawData::Csv(extract_csv_from_zip(path)?)),
        "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Ok(RawData::Workbook(fs::read(path)?)),
        _ => Err(AnalysisError::UnsupportedFormat(path.display().to_string())),
    }
}

/// Extract the first CSV member of a ZIP archive into memory
pub fn extract_csv_from_zip(zip_path: &Path) -> Result<Vec<u8>> {
    info!("Extracting CSV from {:?}", zip_path);

    let file = fs::File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let filename = file.name().to_string();

        if filename.to_lowercase().ends_with(".csv") {
            info!("Found CSV file: {}", filename);
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes)?;
            return Ok(bytes);
        }
    }

    Err(AnalysisError::NoCsvInArchive)
}

/// Parse CSV bytes; cells are decoded lossily so cp1252 exports still load
pub fn parse_csv_table(bytes: &[u8]) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .byte_headers()?
        .iter()
        .map(|h| {
            String::from_utf8_lossy(h)
                .trim_start_matches('\u{feff}')
                .trim()
                .to_string()
        })
        .collect();

    let mut rows = Vec::new();
    for record in reader.byte_records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|cell| String::from_utf8_lossy(cell).into_owned())
                .collect(),
        );
    }

    info!("Parsed {} rows x {} columns from CSV", rows.len(), headers.len());

    Ok(RawTable::new(headers, rows))
}

/// Parse the first worksheet of a workbook; first row is the header
pub fn parse_workbook_table(bytes: Vec<u8>) -> Result<RawTable> {
    let cursor = Cursor::new(bytes);
    let mut workbook = open_workbook_auto_from_rs(cursor)?;

    let sheet_names = workbook.sheet_names();
    let sheet_name = sheet_names.first().ok_or(AnalysisError::EmptyWorkbook)?;
    info!("Reading sheet: {}", sheet_name);

    let range = workbook.worksheet_range(sheet_name)?;
    let mut rows = range.rows().map(|row| row.iter().map(cell_text).collect::<Vec<_>>());

    let headers: Vec<String> = rows
        .next()
        .unwrap_or_default()
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect();
    let rows: Vec<Vec<String>> = rows.collect();

    info!(
        "Parsed {} rows x {} columns from workbook",
        rows.len(),
        headers.len()
    );

    Ok(RawTable::new(headers, rows))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64())
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(_) | Data::Empty => String::new(),
    }
}

/// Excel serial day number (1900 date system) to a calendar date
fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    // Day 0 is 1899-12-30 once Excel's phantom 1900-02-29 is accounted for
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_days(Days::new(serial.trunc() as u64))
}
