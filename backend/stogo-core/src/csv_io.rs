// src/csv_io.rs
//! File adapters used by the command-line runs. The transforms themselves only
//! ever see decoded rows.

use csv::{ReaderBuilder, Trim, WriterBuilder};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::debug;

use crate::payroll::PayrollOutputRecord;
use crate::records::{FieldValue, Row};
use crate::{io_context, AppError};

/// Reads a headered CSV file into rows keyed by header name. Every non-blank
/// cell is kept as text; blank cells become `FieldValue::Empty`.
pub fn read_rows<P: AsRef<Path>>(path: P) -> Result<Vec<Row>, AppError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| io_context(e, format!("Failed to open {:?}", path)))?;
    let mut reader = ReaderBuilder::new()
        .trim(Trim::Headers)
        .flexible(true)
        .from_reader(file);

    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: Row = headers
            .iter()
            .zip(record.iter())
            .map(|(header, value)| (header.to_string(), FieldValue::from(value)))
            .collect();
        rows.push(row);
    }
    debug!("Read {} rows from {:?}", rows.len(), path);
    Ok(rows)
}

/// Writes `rows` under a header line of `columns`.
pub fn write_records<P, I>(path: P, columns: &[&str], rows: I) -> Result<usize, AppError>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = Vec<String>>,
{
    let path = path.as_ref();
    let file =
        File::create(path).map_err(|e| io_context(e, format!("Failed to create {:?}", path)))?;
    let mut writer = WriterBuilder::new().from_writer(file);

    writer.write_record(columns)?;
    let mut written = 0usize;
    for row in rows {
        writer.write_record(&row)?;
        written += 1;
    }
    writer
        .flush()
        .map_err(|e| io_context(e, format!("Failed to flush {:?}", path)))?;
    debug!("Wrote {} rows to {:?}", written, path);
    Ok(written)
}

/// Writes `value` as pretty-printed JSON.
pub fn write_json<P: AsRef<Path>, T: Serialize + ?Sized>(
    path: P,
    value: &T,
) -> Result<(), AppError> {
    let path = path.as_ref();
    let file =
        File::create(path).map_err(|e| io_context(e, format!("Failed to create {:?}", path)))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)?;
    debug!("Wrote JSON to {:?}", path);
    Ok(())
}

/// Reads one period of payroll records. A `.json` file holds the full records
/// (incentive flags and display names included); anything else is read as the
/// exported payroll CSV.
pub fn read_payroll_records<P: AsRef<Path>>(
    path: P,
) -> Result<Vec<PayrollOutputRecord>, AppError> {
    let path = path.as_ref();
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if !is_json {
        let rows = read_rows(path)?;
        return Ok(rows.iter().map(PayrollOutputRecord::from_row).collect());
    }

    let file = File::open(path).map_err(|e| io_context(e, format!("Failed to open {:?}", path)))?;
    let records: Vec<PayrollOutputRecord> = serde_json::from_reader(BufReader::new(file))?;
    debug!("Read {} payroll records from {:?}", records.len(), path);
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_file(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("stogo_csv_{}_{}.csv", name, std::process::id()))
    }

    #[test]
    fn test_read_rows_keys_by_header() {
        let path = temp_file("read");
        fs::write(
            &path,
            "EmployeeID, Hours ,UserShiftAnswer-OutClocking\nN-1001,12.5,Yes\nN-1002,,\n",
        )
        .unwrap();

        let rows = read_rows(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["EmployeeID"], FieldValue::text("N-1001"));
        assert_eq!(rows[0]["Hours"], FieldValue::text("12.5"));
        assert_eq!(rows[1]["Hours"], FieldValue::Empty);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_write_then_read_back() {
        let path = temp_file("write");
        let written = write_records(
            &path,
            &["Stogo EID", "Pay Hours"],
            vec![
                vec!["2001".to_string(), "12.00".to_string()],
                vec!["2002".to_string(), "8.00".to_string()],
            ],
        )
        .unwrap();
        assert_eq!(written, 2);

        let rows = read_rows(&path).unwrap();
        assert_eq!(rows[1]["Stogo EID"], FieldValue::text("2002"));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_payroll_json_keeps_flags_and_names() {
        let path = std::env::temp_dir()
            .join(format!("stogo_payroll_{}.json", std::process::id()));
        let record = PayrollOutputRecord {
            stogo_eid: "2001".to_string(),
            timecard_id: "TC-7".to_string(),
            pay_hours: rust_decimal_macros::dec!(12.00),
            has_incentive: true,
            employee_name: "Jane Doe".to_string(),
            incentive_description: "Cedar Crest night incentive".to_string(),
            ..Default::default()
        };
        write_json(&path, &[record.clone()]).unwrap();

        let records = read_payroll_records(&path).unwrap();
        assert_eq!(records, vec![record]);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_payroll_csv_read_through_rows() {
        let path = temp_file("payroll");
        fs::write(&path, "Stogo EID,Pay Hours,Timecard ID\n2001,12.00,TC-7\n").unwrap();

        let records = read_payroll_records(&path).unwrap();
        assert_eq!(records[0].stogo_eid, "2001");
        assert_eq!(records[0].timecard_id, "TC-7");
        assert!(!records[0].has_incentive);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = read_rows("./definitely_missing_timecards.csv");
        assert!(matches!(result, Err(AppError::Io { .. })));
    }
}
