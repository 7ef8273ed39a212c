//! Run configuration for the feature pipeline.

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const MIN_DATE_DEFAULT: &str = "2021-01-08";
pub const MAX_DATE_DEFAULT: &str = "2021-05-30";
pub const TOP_DEFAULT: usize = 5;
pub const DATA_DIR_DEFAULT: &str = "input_data/data";
pub const OUTPUT_PATH_DEFAULT: &str = "features.csv";

/// Window sizes shared by all three granularities.
///
/// Both sizes count recorded observations in an entity's date series, not
/// calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureWindows {
    pub rolling_window: usize,
    pub lag_periods: usize,
}

impl Default for FeatureWindows {
    fn default() -> Self {
        Self {
            rolling_window: 7,
            lag_periods: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Directory holding `product.csv`, `brand.csv`, `store.csv` and `sales.csv`.
    pub data_dir: PathBuf,
    /// Destination of the feature table.
    pub output_path: PathBuf,
    /// Inclusive lower bound on exported dates.
    pub min_date: NaiveDate,
    /// Inclusive upper bound on exported dates.
    pub max_date: NaiveDate,
    /// Number of rows in the WMAPE report.
    pub top: usize,
    pub windows: FeatureWindows,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DATA_DIR_DEFAULT),
            output_path: PathBuf::from(OUTPUT_PATH_DEFAULT),
            min_date: default_date(MIN_DATE_DEFAULT),
            max_date: default_date(MAX_DATE_DEFAULT),
            top: TOP_DEFAULT,
            windows: FeatureWindows::default(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid date '{value}', expected YYYY-MM-DD")]
    InvalidDate { value: String },
    #[error("invalid date range: min_date {min_date} is after max_date {max_date}")]
    InvertedDateRange {
        min_date: NaiveDate,
        max_date: NaiveDate,
    },
    #[error("invalid feature windows: {0}")]
    InvalidWindows(String),
}

impl PipelineConfig {
    /// Rejects configurations that cannot produce a meaningful export.
    ///
    /// An inverted date range is refused up front instead of silently
    /// producing an empty artifact.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_date > self.max_date {
            return Err(ConfigError::InvertedDateRange {
                min_date: self.min_date,
                max_date: self.max_date,
            });
        }

        if self.windows.rolling_window == 0 {
            return Err(ConfigError::InvalidWindows(
                "rolling_window must be > 0".to_string(),
            ));
        }
        if self.windows.lag_periods == 0 {
            return Err(ConfigError::InvalidWindows(
                "lag_periods must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(|_| ConfigError::InvalidDate {
        value: raw.to_string(),
    })
}

fn default_date(raw: &str) -> NaiveDate {
    parse_date(raw).expect("default dates are valid YYYY-MM-DD literals")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.min_date, NaiveDate::from_ymd_opt(2021, 1, 8).unwrap());
        assert_eq!(cfg.max_date, NaiveDate::from_ymd_opt(2021, 5, 30).unwrap());
        assert_eq!(cfg.top, 5);
        assert_eq!(cfg.output_path, PathBuf::from("features.csv"));
        assert_eq!(cfg.windows, FeatureWindows::default());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn inverted_date_range_is_rejected() {
        let cfg = PipelineConfig {
            min_date: NaiveDate::from_ymd_opt(2021, 3, 1).unwrap(),
            max_date: NaiveDate::from_ymd_opt(2021, 2, 1).unwrap(),
            ..PipelineConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvertedDateRange { .. })
        ));
    }

    #[test]
    fn single_day_range_is_valid() {
        let day = NaiveDate::from_ymd_opt(2021, 2, 1).unwrap();
        let cfg = PipelineConfig {
            min_date: day,
            max_date: day,
            ..PipelineConfig::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_windows_are_rejected() {
        let cfg = PipelineConfig {
            windows: FeatureWindows {
                rolling_window: 0,
                lag_periods: 7,
            },
            ..PipelineConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidWindows(_))));

        let cfg = PipelineConfig {
            windows: FeatureWindows {
                rolling_window: 7,
                lag_periods: 0,
            },
            ..PipelineConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidWindows(_))));
    }

    #[test]
    fn parse_date_rejects_other_formats() {
        assert!(parse_date("2021-02-01").is_ok());
        assert!(matches!(
            parse_date("01/02/2021"),
            Err(ConfigError::InvalidDate { .. })
        ));
    }
}
