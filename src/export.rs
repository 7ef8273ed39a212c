//! Date-range filtering and CSV export of the feature table.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use crate::config::DATE_FORMAT;
use crate::features::{ColumnKind, FeatureColumn, FeatureSchema, Granularity};
use crate::merge::{FeatureRow, GroupFeatures};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to flush CSV buffer: {0}")]
    Flush(#[source] std::io::Error),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid output path: {0}")]
    InvalidPath(PathBuf),
    #[error("schema column '{0}' has no value mapping")]
    UnmappedColumn(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportReport {
    pub path: PathBuf,
    pub min_date: NaiveDate,
    pub max_date: NaiveDate,
    pub rows_written: u64,
    /// SHA-256 of the artifact bytes.
    pub sha256: String,
}

/// Rows with `min_date <= date <= max_date`, in input order.
pub fn filter_date_range(
    rows: &[FeatureRow],
    min_date: NaiveDate,
    max_date: NaiveDate,
) -> Vec<&FeatureRow> {
    rows.iter()
        .filter(|row| row.fact.date >= min_date && row.fact.date <= max_date)
        .collect()
}

/// Serializes `rows` projected onto `schema` with a header row.
///
/// Missing rolling-mean or lag values become empty fields.
pub fn render_features_csv(
    schema: &FeatureSchema,
    rows: &[&FeatureRow],
) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(schema.column_names())?;

    let mut record = Vec::with_capacity(schema.columns.len());
    for row in rows {
        record.clear();
        for column in &schema.columns {
            record.push(column_value(column, row)?);
        }
        writer.write_record(&record)?;
    }

    writer
        .into_inner()
        .map_err(|err| ExportError::Flush(err.into_error()))
}

/// Filters, renders and writes the feature table in one step.
///
/// The artifact is rendered fully in memory, written to a sibling `.tmp`
/// file and renamed into place, so `path` never holds a truncated table.
pub fn export_features(
    path: &Path,
    schema: &FeatureSchema,
    rows: &[FeatureRow],
    min_date: NaiveDate,
    max_date: NaiveDate,
) -> Result<ExportReport, ExportError> {
    let selected = filter_date_range(rows, min_date, max_date);
    let bytes = render_features_csv(schema, &selected)?;
    let sha256 = hex::encode(Sha256::digest(&bytes));

    write_atomic(path, &bytes)?;

    let report = ExportReport {
        path: path.to_path_buf(),
        min_date,
        max_date,
        rows_written: selected.len() as u64,
        sha256,
    };

    info!(
        component = "export",
        event = "export.finish",
        path = %path.display(),
        min_date = %min_date,
        max_date = %max_date,
        rows_in = rows.len(),
        rows_written = report.rows_written,
        sha256 = %report.sha256
    );

    Ok(report)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ExportError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| ExportError::InvalidPath(path.to_path_buf()))?;
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));
    let write_err = |source: std::io::Error| ExportError::Write {
        path: tmp_path.clone(),
        source,
    };

    {
        let mut file = fs::File::create(&tmp_path).map_err(write_err)?;
        file.write_all(bytes).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
    }

    if let Err(source) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(ExportError::Write {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

fn column_value(column: &FeatureColumn, row: &FeatureRow) -> Result<String, ExportError> {
    let value = match (column.kind, column.granularity) {
        (ColumnKind::Date, _) => row.fact.date.format(DATE_FORMAT).to_string(),
        (ColumnKind::Key, _) => match column.name.as_str() {
            "product_id" => row.fact.product_id.clone(),
            "store_id" => row.fact.store_id.clone(),
            "brand_id" => row.fact.brand_id.clone(),
            other => return Err(ExportError::UnmappedColumn(other.to_string())),
        },
        (ColumnKind::Sales, Some(g)) => format_number(group(row, g).sales),
        (ColumnKind::RollingMean, Some(g)) => format_optional(group(row, g).rolling_mean),
        (ColumnKind::Lag, Some(g)) => format_optional(group(row, g).lag),
        _ => return Err(ExportError::UnmappedColumn(column.name.clone())),
    };
    Ok(value)
}

fn group(row: &FeatureRow, granularity: Granularity) -> &GroupFeatures {
    match granularity {
        Granularity::Product => &row.product,
        Granularity::Brand => &row.brand,
        Granularity::Store => &row.store,
    }
}

fn format_number(value: f64) -> String {
    value.to_string()
}

fn format_optional(value: Option<f64>) -> String {
    value.map(format_number).unwrap_or_default()
}
