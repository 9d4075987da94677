//! CSV ingest and validation.
//!
//! This module turns a ball-drop CSV into a clean, ordered list of
//! `Observation`s that are safe to calibrate against.
//!
//! Design goals:
//! - **Tolerant schema**: a header row is optional; columns are resolved by
//!   name when present, otherwise by position
//! - **Row-level validation** (skip bad rows, but report what happened)
//! - **Deterministic behavior**: rows keep their file order
//! - **Separation of concerns**: no calibration logic here

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;

use crate::domain::Observation;
use crate::error::AppError;

/// Summary stats about the observations actually used.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetStats {
    pub n_points: usize,
    pub time_min: f64,
    pub time_max: f64,
    pub height_min: f64,
    pub height_max: f64,
}

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    /// 1-based line number in the file.
    pub line: usize,
    pub message: String,
}

/// Where each field lives in a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    pub index: Option<usize>,
    pub time: usize,
    pub height: usize,
    pub has_header: bool,
}

/// Ingest output: observations + stats + row errors.
#[derive(Debug, Clone)]
pub struct IngestedData {
    pub source: String,
    pub observations: Vec<Observation>,
    pub stats: DatasetStats,
    pub layout: ColumnLayout,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
    pub rows_used: usize,
}

impl IngestedData {
    /// Wrap in-memory observations (e.g. a synthetic sample).
    pub fn from_observations(source: impl Into<String>, observations: Vec<Observation>) -> Result<Self, AppError> {
        let stats = compute_stats(&observations).ok_or_else(|| AppError::data("No observations to use."))?;
        let n = observations.len();
        Ok(Self {
            source: source.into(),
            observations,
            stats,
            layout: ColumnLayout {
                index: Some(0),
                time: 1,
                height: 2,
                has_header: true,
            },
            row_errors: Vec::new(),
            rows_read: n,
            rows_used: n,
        })
    }
}

/// Load observations from a CSV file.
pub fn load_observations(path: &Path) -> Result<IngestedData, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::input(format!("Failed to open CSV '{}': {e}", path.display())))?;
    let data = read_observations(file, &path.display().to_string())?;

    tracing::info!(
        path = %path.display(),
        rows_read = data.rows_read,
        rows_used = data.rows_used,
        row_errors = data.row_errors.len(),
        "loaded observations"
    );
    for err in &data.row_errors {
        tracing::warn!(line = err.line, "{}", err.message);
    }

    Ok(data)
}

/// Parse observations from any CSV reader.
pub fn read_observations<R: Read>(reader: R, source: &str) -> Result<IngestedData, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut records = reader.records();
    let first = match records.next() {
        Some(Ok(r)) => r,
        Some(Err(e)) => return Err(AppError::input(format!("Failed to read CSV '{source}': {e}"))),
        None => return Err(AppError::data(format!("CSV '{source}' is empty."))),
    };

    let layout = resolve_layout(&first)?;

    let mut observations = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    if !layout.has_header {
        rows_read += 1;
        push_row(1, &first, &layout, &mut observations, &mut row_errors);
    }

    for (idx, result) in records.enumerate() {
        // The first record was consumed above; lines are 1-based.
        let line = idx + 2;
        rows_read += 1;
        match result {
            Ok(record) => push_row(line, &record, &layout, &mut observations, &mut row_errors),
            Err(e) => row_errors.push(RowError {
                line,
                message: format!("CSV parse error: {e}"),
            }),
        }
    }

    let rows_used = observations.len();
    let stats = compute_stats(&observations)
        .ok_or_else(|| AppError::data(format!("No valid rows in '{source}'.")))?;

    Ok(IngestedData {
        source: source.to_string(),
        observations,
        stats,
        layout,
        row_errors,
        rows_read,
        rows_used,
    })
}

fn push_row(
    line: usize,
    record: &StringRecord,
    layout: &ColumnLayout,
    observations: &mut Vec<Observation>,
    row_errors: &mut Vec<RowError>,
) {
    match parse_row(record, layout, observations.len()) {
        Ok(o) => observations.push(o),
        Err(message) => row_errors.push(RowError { line, message }),
    }
}

fn resolve_layout(first: &StringRecord) -> Result<ColumnLayout, AppError> {
    let has_header = first
        .iter()
        .enumerate()
        .any(|(i, field)| !(field.parse::<f64>().is_ok() || (i == 0 && field.is_empty())));

    if has_header {
        let names: Vec<String> = first.iter().map(normalize_header_name).collect();
        let find = |aliases: &[&str]| names.iter().position(|n| aliases.contains(&n.as_str()));

        if let (Some(time), Some(height)) = (find(&["time", "t"]), find(&["height", "h"])) {
            let index = find(&["index", "i", ""]).filter(|&i| i != time && i != height);
            return Ok(ColumnLayout {
                index,
                time,
                height,
                has_header,
            });
        }
    }

    match first.len() {
        0 | 1 => Err(AppError::input(
            "CSV needs `time` and `height` columns (or 2-3 unnamed columns).",
        )),
        2 => Ok(ColumnLayout {
            index: None,
            time: 0,
            height: 1,
            has_header,
        }),
        _ => Ok(ColumnLayout {
            index: Some(0),
            time: 1,
            height: 2,
            has_header,
        }),
    }
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes prefix the first header with a BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn parse_row(record: &StringRecord, layout: &ColumnLayout, position: usize) -> Result<Observation, String> {
    let time = parse_field(record, layout.time, "time")?;
    let height = parse_field(record, layout.height, "height")?;

    if time < 0.0 {
        return Err(format!("Negative time {time}."));
    }

    let index = match layout.index.and_then(|i| record.get(i)).filter(|s| !s.is_empty()) {
        Some(raw) => parse_index(raw)?,
        None => position,
    };

    Ok(Observation { index, time, height })
}

fn parse_field(record: &StringRecord, idx: usize, name: &str) -> Result<f64, String> {
    let raw = record
        .get(idx)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing `{name}` value."))?;
    let v = raw
        .parse::<f64>()
        .map_err(|_| format!("Invalid `{name}` value '{raw}'."))?;
    if v.is_finite() {
        Ok(v)
    } else {
        Err(format!("Non-finite `{name}` value."))
    }
}

fn parse_index(raw: &str) -> Result<usize, String> {
    if let Ok(i) = raw.parse::<usize>() {
        return Ok(i);
    }
    // Some writers emit integral indices as floats ("3.0").
    match raw.parse::<f64>() {
        Ok(v) if v >= 0.0 && v.fract() == 0.0 && v <= usize::MAX as f64 => Ok(v as usize),
        _ => Err(format!("Invalid `index` value '{raw}'.")),
    }
}

pub fn compute_stats(observations: &[Observation]) -> Option<DatasetStats> {
    if observations.is_empty() {
        return None;
    }
    let mut time_min = f64::INFINITY;
    let mut time_max = f64::NEG_INFINITY;
    let mut height_min = f64::INFINITY;
    let mut height_max = f64::NEG_INFINITY;

    for o in observations {
        time_min = time_min.min(o.time);
        time_max = time_max.max(o.time);
        height_min = height_min.min(o.height);
        height_max = height_max.max(o.height);
    }

    Some(DatasetStats {
        n_points: observations.len(),
        time_min,
        time_max,
        height_min,
        height_max,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(text: &str) -> Result<IngestedData, AppError> {
        read_observations(text.as_bytes(), "test")
    }

    #[test]
    fn reads_pandas_style_header() {
        let data = read(",time,height\n0,0.0,46.0\n1,0.5,44.8\n2,1.0,41.1\n").unwrap();
        assert!(data.layout.has_header);
        assert_eq!(data.layout.index, Some(0));
        assert_eq!(data.rows_used, 3);
        assert_eq!(data.observations[1], Observation { index: 1, time: 0.5, height: 44.8 });
    }

    #[test]
    fn resolves_columns_by_name_in_any_order() {
        let data = read("h,t\n46.0,0.0\n41.0,1.0\n").unwrap();
        assert_eq!(data.layout.time, 1);
        assert_eq!(data.layout.height, 0);
        assert_eq!(data.observations[1].time, 1.0);
        assert_eq!(data.observations[1].height, 41.0);
        assert_eq!(data.observations[1].index, 1);
    }

    #[test]
    fn reads_headerless_files() {
        let three = read("0,0.0,46.0\n1,0.5,44.8\n").unwrap();
        assert!(!three.layout.has_header);
        assert_eq!(three.rows_used, 2);

        let two = read("0.0,46.0\n0.5,44.8\n1.0,41.0\n").unwrap();
        assert_eq!(two.layout.index, None);
        assert_eq!(two.observations[2].index, 2);
    }

    #[test]
    fn collects_row_errors_without_failing() {
        let data = read(",time,height\n0,0.0,46.0\n1,abc,44.8\n2,-1.0,40.0\n3,1.0,NaN\n4,1.5,35.0\n").unwrap();
        assert_eq!(data.rows_read, 5);
        assert_eq!(data.rows_used, 2);
        assert_eq!(data.row_errors.len(), 3);
        assert_eq!(data.row_errors[0].line, 3);
    }

    #[test]
    fn no_usable_rows_is_fatal() {
        let err = read("time,height\nx,y\n").unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert_eq!(read("").unwrap_err().exit_code(), 3);
    }

    #[test]
    fn single_column_is_rejected() {
        assert_eq!(read("height\n1.0\n").unwrap_err().exit_code(), 2);
    }

    #[test]
    fn load_from_file() {
        let path = std::env::temp_dir().join(format!("balldrop-ingest-{}.csv", std::process::id()));
        std::fs::write(&path, ",time,height\n0,0.0,46.0\n1,1.0,41.1\n2,2.0,26.4\n").unwrap();
        let data = load_observations(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(data.stats.n_points, 3);
        assert_eq!(data.stats.time_max, 2.0);
        assert_eq!(data.stats.height_min, 26.4);
    }

    #[test]
    fn missing_file_is_input_error() {
        let err = load_observations(Path::new("/nonexistent/balldrop.csv")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
