//! Sales feature pipeline.
//!
//! Loads product, brand, store and sales tables, joins them into one fact
//! table, derives rolling-mean and lag features at product, brand and store
//! level, and exports a date-filtered feature table as CSV.

pub mod cli;
mod config;
mod export;
mod features;
mod join;
mod loader;
mod merge;
mod observability;
mod pipeline;
mod ranking;

pub use config::{
    parse_date, ConfigError, FeatureWindows, PipelineConfig, DATA_DIR_DEFAULT, DATE_FORMAT,
    MAX_DATE_DEFAULT, MIN_DATE_DEFAULT, OUTPUT_PATH_DEFAULT, TOP_DEFAULT,
};
pub use export::{
    export_features, filter_date_range, render_features_csv, ExportError, ExportReport,
};
pub use features::{
    aggregate, build_feature_schema, lag, rolling_mean, AggregatePoint, ColumnKind, EntityKey,
    FeatureColumn, FeatureError, FeatureSchema, Granularity, GroupAggregate,
    FEATURE_SCHEMA_VERSION,
};
pub use join::{join_sales, DenormalizedFact, JoinOutput, JoinReport};
pub use loader::{
    canonical_headers, load_brands, load_products, load_sales, load_stores, load_tables, Brand,
    LoadError, Product, RawTables, SalesRecord, Store, Table, BRAND_FILE, PRODUCT_FILE,
    SALES_FILE, STORE_FILE,
};
pub use merge::{merge_features, FeatureRow, GroupFeatures};
pub use observability::{
    init_logging, log_app_failure, log_app_start, log_run_config, logging_config_from_env,
    LogFormat, LoggingConfig, LoggingInitError, LOG_FORMAT_ENV, LOG_LEVEL_ENV, LOG_TARGET_ENV,
};
pub use pipeline::{
    compute_features, run_pipeline, FeatureTable, GroupCounts, PipelineError, PipelineReport,
};
pub use ranking::{wmape_report, WmapeEntry, WmapeReport};
