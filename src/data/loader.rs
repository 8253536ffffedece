use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use log::{debug, warn};

use super::model::Trace;
use crate::error::{PmdError, Result};

/// What to do with a row that does not parse as `wavelength;intensity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowPolicy {
    /// Fail the whole trace on the first malformed row.
    #[default]
    Abort,
    /// Log the row and continue with the next one.
    Skip,
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a trace from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv` / `.txt` – header row, then `wavelength_nm;intensity_db` rows
/// * `.json`         – `{ "wavelength_nm": [...], "intensity_db": [...] }`
///
/// The returned trace is labelled with the file name.
pub fn load_trace(path: &Path, policy: RowPolicy) -> Result<Trace> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let trace = match ext.as_str() {
        "csv" | "txt" => read_csv(File::open(path)?, policy)?,
        "json" => read_json(File::open(path)?)?,
        other => return Err(PmdError::UnsupportedFormat(other.to_string())),
    };

    let label = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    debug!("loaded {} samples from {label}", trace.len());
    Ok(trace.with_label(label))
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

/// Parse a `;`-delimited trace.
///
/// Layout:
/// ```text
/// Wavelength [nm];Intensity [dBm]
/// 1580.000;-42.17
/// 1580.050;-41.98
/// ```
/// The first row is a free-form header and is never parsed. Every data row
/// must hold exactly two finite numbers; a trailing empty field (a dangling
/// `;`) is tolerated.
pub fn read_csv<R: Read>(reader: R, policy: RowPolicy) -> Result<Trace> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut wavelength_nm = Vec::new();
    let mut intensity_db = Vec::new();
    let mut skipped = 0usize;

    // Byte records so a row that is not UTF-8 goes through the row policy.
    for (row_no, result) in reader.byte_records().enumerate() {
        let record = result?;
        // Header is line 1; fall back to counting when the reader has no position.
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(row_no + 2);

        match parse_row(&record) {
            Ok((x, y)) => {
                wavelength_nm.push(x);
                intensity_db.push(y);
            }
            Err(reason) => {
                let content = record
                    .iter()
                    .map(String::from_utf8_lossy)
                    .collect::<Vec<_>>()
                    .join(";");
                match policy {
                    RowPolicy::Abort => {
                        return Err(PmdError::MalformedRow {
                            line,
                            content,
                            reason,
                        })
                    }
                    RowPolicy::Skip => {
                        warn!("skipping malformed row at line {line}: '{content}' ({reason})");
                        skipped += 1;
                    }
                }
            }
        }
    }

    if skipped > 0 {
        debug!("skipped {skipped} malformed rows");
    }
    if wavelength_nm.is_empty() {
        return Err(PmdError::NoUsableData("trace has no data rows".into()));
    }
    Trace::new(wavelength_nm, intensity_db)
}

fn parse_row(record: &csv::ByteRecord) -> std::result::Result<(f64, f64), String> {
    let mut fields: Vec<&[u8]> = record.iter().collect();
    if fields.len() > 2 && fields[2..].iter().all(|f| f.is_empty()) {
        fields.truncate(2);
    }
    if fields.len() != 2 {
        return Err(format!("expected 2 fields, found {}", fields.len()));
    }
    Ok((parse_field(fields[0], "wavelength")?, parse_field(fields[1], "intensity")?))
}

fn parse_field(raw: &[u8], what: &str) -> std::result::Result<f64, String> {
    let tok = std::str::from_utf8(raw).map_err(|_| format!("{what} is not valid UTF-8"))?;
    let v: f64 = tok
        .parse()
        .map_err(|_| format!("{what} '{tok}' is not a number"))?;
    if !v.is_finite() {
        return Err(format!("{what} '{tok}' is not finite"));
    }
    Ok(v)
}

/// Write a trace in the same `;`-delimited layout [`read_csv`] accepts.
pub fn write_csv<W: Write>(trace: &Trace, writer: W) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_writer(writer);
    writer.write_record(["Wavelength [nm]", "Intensity [dB]"])?;
    for (x, y) in trace.wavelength_nm.iter().zip(&trace.intensity_db) {
        writer.write_record([format!("{x:.4}"), format!("{y:.4}")])?;
    }
    writer.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

/// Expected JSON schema:
///
/// ```json
/// { "wavelength_nm": [1580.0, 1580.05, ...], "intensity_db": [-42.1, -41.9, ...] }
/// ```
pub fn read_json<R: Read>(reader: R) -> Result<Trace> {
    let trace: Trace = serde_json::from_reader(reader)?;
    trace.check()?;
    Ok(trace)
}
