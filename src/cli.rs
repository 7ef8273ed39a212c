//! Command-line arguments for the `sales-features` binary.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Parser;

use crate::config::{
    parse_date, FeatureWindows, PipelineConfig, DATA_DIR_DEFAULT, MAX_DATE_DEFAULT,
    MIN_DATE_DEFAULT, OUTPUT_PATH_DEFAULT, TOP_DEFAULT,
};

#[derive(Debug, Clone, Parser)]
#[command(
    name = "sales-features",
    version,
    about = "Build rolling and lagged sales features per product, brand and store"
)]
pub struct Cli {
    /// Start of the exported date range (inclusive), YYYY-MM-DD.
    #[arg(long, value_parser = parse_date, default_value = MIN_DATE_DEFAULT)]
    pub min_date: NaiveDate,

    /// End of the exported date range (inclusive), YYYY-MM-DD.
    #[arg(long, value_parser = parse_date, default_value = MAX_DATE_DEFAULT)]
    pub max_date: NaiveDate,

    /// Number of rows in the WMAPE report (worst MA7_P forecasts first).
    #[arg(long, default_value_t = TOP_DEFAULT)]
    pub top: usize,

    /// Directory containing product.csv, brand.csv, store.csv and sales.csv.
    #[arg(long, default_value = DATA_DIR_DEFAULT)]
    pub data_dir: PathBuf,

    /// Output path of the feature table.
    #[arg(long, default_value = OUTPUT_PATH_DEFAULT)]
    pub output: PathBuf,
}

impl Cli {
    pub fn into_config(self) -> PipelineConfig {
        PipelineConfig {
            data_dir: self.data_dir,
            output_path: self.output,
            min_date: self.min_date,
            max_date: self.max_date,
            top: self.top,
            windows: FeatureWindows::default(),
        }
    }
}
