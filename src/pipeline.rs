//! End-to-end batch run: load → join → aggregate ×3 → merge → export → WMAPE.

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ConfigError, FeatureWindows, PipelineConfig};
use crate::export::{export_features, filter_date_range, ExportError, ExportReport};
use crate::features::{aggregate, build_feature_schema, FeatureError, Granularity};
use crate::join::{join_sales, JoinReport};
use crate::loader::{load_tables, LoadError, RawTables};
use crate::merge::{merge_features, FeatureRow};
use crate::ranking::{wmape_report, WmapeReport};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct GroupCounts {
    pub product: u64,
    pub brand: u64,
    pub store: u64,
}

/// In-memory result of the aggregation stages.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    pub rows: Vec<FeatureRow>,
    pub join: JoinReport,
    pub groups: GroupCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    pub products: u64,
    pub brands: u64,
    pub stores: u64,
    pub join: JoinReport,
    pub groups: GroupCounts,
    pub feature_rows: u64,
    pub schema_fingerprint: String,
    pub export: ExportReport,
    pub wmape: WmapeReport,
}

/// Joins the raw tables and computes all three feature granularities.
///
/// The aggregations share the fact table read-only and run concurrently;
/// their outputs do not depend on scheduling.
pub fn compute_features(
    tables: &RawTables,
    windows: &FeatureWindows,
) -> Result<FeatureTable, PipelineError> {
    let joined = join_sales(tables);
    let facts = joined.facts.as_slice();

    // rayon workers do not inherit the caller's scoped subscriber
    let dispatch = tracing::dispatcher::get_default(|current| current.clone());
    let run = |granularity| {
        tracing::dispatcher::with_default(&dispatch, || aggregate(facts, granularity, windows))
    };

    let (product, (brand, store)) = rayon::join(
        || run(Granularity::Product),
        || rayon::join(|| run(Granularity::Brand), || run(Granularity::Store)),
    );

    let rows = merge_features(facts, &product, &brand, &store)?;

    Ok(FeatureTable {
        rows,
        join: joined.report,
        groups: GroupCounts {
            product: product.group_count() as u64,
            brand: brand.group_count() as u64,
            store: store.group_count() as u64,
        },
    })
}

/// Runs the whole job for `config`. Nothing is written unless every stage
/// before export succeeds.
pub fn run_pipeline(config: &PipelineConfig) -> Result<PipelineReport, PipelineError> {
    config.validate()?;

    info!(
        component = "pipeline",
        event = "pipeline.run.start",
        data_dir = %config.data_dir.display(),
        output_path = %config.output_path.display(),
        min_date = %config.min_date,
        max_date = %config.max_date
    );

    let tables = load_tables(&config.data_dir)?;
    let table = compute_features(&tables, &config.windows)?;
    let schema = build_feature_schema(&config.windows);

    let export = export_features(
        &config.output_path,
        &schema,
        &table.rows,
        config.min_date,
        config.max_date,
    )?;

    let exported = filter_date_range(&table.rows, config.min_date, config.max_date);
    let wmape = wmape_report(&exported, config.top);

    let report = PipelineReport {
        products: tables.products.len() as u64,
        brands: tables.brands.len() as u64,
        stores: tables.stores.len() as u64,
        join: table.join,
        groups: table.groups,
        feature_rows: table.rows.len() as u64,
        schema_fingerprint: schema.fingerprint,
        export,
        wmape,
    };

    let report_json = serde_json::to_string(&report).unwrap_or_else(|err| {
        warn!(
            component = "pipeline",
            event = "pipeline.report.encode_failed",
            error = %err
        );
        String::new()
    });

    info!(
        component = "pipeline",
        event = "pipeline.run.finish",
        feature_rows = report.feature_rows,
        rows_written = report.export.rows_written,
        sales_dropped = report.join.sales_without_product,
        report = %report_json
    );

    Ok(report)
}
