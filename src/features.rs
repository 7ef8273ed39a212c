//! Grouped daily totals with rolling-mean and lag features.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use crate::config::FeatureWindows;
use crate::join::DenormalizedFact;

pub const FEATURE_SCHEMA_VERSION: u32 = 1;

const KEY_COLUMNS: [&str; 4] = ["product_id", "store_id", "brand_id", "date"];

/// Aggregation level. Each level groups on its key columns plus `date`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Granularity {
    Product,
    Brand,
    Store,
}

impl Granularity {
    pub const ALL: [Granularity; 3] = [Self::Product, Self::Brand, Self::Store];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Brand => "brand",
            Self::Store => "store",
        }
    }

    /// Grouping key in grouping order; `date` is always last.
    pub fn key_columns(self) -> &'static [&'static str] {
        match self {
            Self::Product => &["store_id", "product_id", "brand_id", "date"],
            Self::Brand => &["brand_id", "store_id", "date"],
            Self::Store => &["store_id", "date"],
        }
    }

    fn column_suffix(self) -> &'static str {
        match self {
            Self::Product => "P",
            Self::Brand => "B",
            Self::Store => "S",
        }
    }

    pub fn entity_key(self, fact: &DenormalizedFact) -> EntityKey {
        let parts = match self {
            Self::Product => vec![
                fact.store_id.clone(),
                fact.product_id.clone(),
                fact.brand_id.clone(),
            ],
            Self::Brand => vec![fact.brand_id.clone(), fact.store_id.clone()],
            Self::Store => vec![fact.store_id.clone()],
        };
        EntityKey(parts)
    }
}

/// Grouping key without the date component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey(pub Vec<String>);

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregatePoint {
    pub date: NaiveDate,
    pub sum_quantity: f64,
    pub rolling_mean: Option<f64>,
    pub lag: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupAggregate {
    pub granularity: Granularity,
    /// Per-entity series, each strictly date-ascending.
    pub series: BTreeMap<EntityKey, Vec<AggregatePoint>>,
}

impl GroupAggregate {
    pub fn group_count(&self) -> usize {
        self.series.len()
    }

    pub fn point_count(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }

    pub fn get(&self, key: &EntityKey, date: NaiveDate) -> Option<&AggregatePoint> {
        let points = self.series.get(key)?;
        points
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .map(|idx| &points[idx])
    }

    pub fn lookup(&self, fact: &DenormalizedFact) -> Option<&AggregatePoint> {
        self.get(&self.granularity.entity_key(fact), fact.date)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Key,
    Date,
    Sales,
    RollingMean,
    Lag,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureColumn {
    pub name: String,
    pub kind: ColumnKind,
    pub granularity: Option<Granularity>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSchema {
    pub version: u32,
    pub fingerprint: String,
    pub columns: Vec<FeatureColumn>,
}

impl FeatureSchema {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("no {granularity:?} aggregate for key {key} on {date}")]
    MissingAggregate {
        granularity: Granularity,
        key: EntityKey,
        date: NaiveDate,
    },
    #[error("expected a {expected:?} aggregate, got {actual:?}")]
    GranularityMismatch {
        expected: Granularity,
        actual: Granularity,
    },
}

/// Builds the ordered export column list for the given windows.
///
/// With default windows this is exactly:
/// `product_id, store_id, brand_id, date, sales_product, MA7_P, LAG7_P,
/// sales_brand, MA7_B, LAG7_B, sales_store, MA7_S, LAG7_S`.
pub fn build_feature_schema(windows: &FeatureWindows) -> FeatureSchema {
    let mut columns: Vec<FeatureColumn> = KEY_COLUMNS
        .iter()
        .map(|name| FeatureColumn {
            name: name.to_string(),
            kind: if *name == "date" {
                ColumnKind::Date
            } else {
                ColumnKind::Key
            },
            granularity: None,
        })
        .collect();

    for granularity in Granularity::ALL {
        let suffix = granularity.column_suffix();
        columns.push(FeatureColumn {
            name: format!("sales_{}", granularity.as_str()),
            kind: ColumnKind::Sales,
            granularity: Some(granularity),
        });
        columns.push(FeatureColumn {
            name: format!("MA{}_{suffix}", windows.rolling_window),
            kind: ColumnKind::RollingMean,
            granularity: Some(granularity),
        });
        columns.push(FeatureColumn {
            name: format!("LAG{}_{suffix}", windows.lag_periods),
            kind: ColumnKind::Lag,
            granularity: Some(granularity),
        });
    }

    let fingerprint = schema_fingerprint(windows, &columns);

    info!(
        component = "features",
        event = "features.schema.built",
        version = FEATURE_SCHEMA_VERSION,
        rolling_window = windows.rolling_window,
        lag_periods = windows.lag_periods,
        column_count = columns.len(),
        fingerprint = fingerprint
    );

    FeatureSchema {
        version: FEATURE_SCHEMA_VERSION,
        fingerprint,
        columns,
    }
}

/// Sums quantity per (entity, date) and derives rolling-mean and lag series
/// per entity.
///
/// Each entity's series is put in ascending date order before any window is
/// applied, whatever the order of `facts`. Windows count recorded dates only:
/// a date with no sales for an entity is simply absent from its series.
pub fn aggregate(
    facts: &[DenormalizedFact],
    granularity: Granularity,
    windows: &FeatureWindows,
) -> GroupAggregate {
    let mut daily: BTreeMap<EntityKey, BTreeMap<NaiveDate, f64>> = BTreeMap::new();
    for fact in facts {
        *daily
            .entry(granularity.entity_key(fact))
            .or_default()
            .entry(fact.date)
            .or_insert(0.0) += fact.quantity;
    }

    let series: BTreeMap<EntityKey, Vec<AggregatePoint>> = daily
        .into_iter()
        .map(|(key, by_date)| {
            let (dates, totals): (Vec<NaiveDate>, Vec<f64>) = by_date.into_iter().unzip();
            let means = rolling_mean(&totals, windows.rolling_window);
            let lags = lag(&totals, windows.lag_periods);
            let points = dates
                .into_iter()
                .zip(totals)
                .zip(means.into_iter().zip(lags))
                .map(|((date, sum_quantity), (rolling_mean, lag))| AggregatePoint {
                    date,
                    sum_quantity,
                    rolling_mean,
                    lag,
                })
                .collect();
            (key, points)
        })
        .collect();

    let out = GroupAggregate {
        granularity,
        series,
    };

    info!(
        component = "features",
        event = "aggregate.finish",
        granularity = granularity.as_str(),
        keys = ?granularity.key_columns(),
        groups = out.group_count(),
        points = out.point_count()
    );

    out
}

/// Mean of each value and the `window - 1` values before it; `None` until a
/// full window is available.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }
    (0..values.len())
        .map(|idx| {
            if idx + 1 < window {
                return None;
            }
            let slice = &values[idx + 1 - window..=idx];
            Some(slice.iter().sum::<f64>() / window as f64)
        })
        .collect()
}

/// Value `periods` positions earlier; `None` for the first `periods` positions.
pub fn lag(values: &[f64], periods: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|idx| idx.checked_sub(periods).map(|src| values[src]))
        .collect()
}

fn schema_fingerprint(windows: &FeatureWindows, columns: &[FeatureColumn]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("version:{FEATURE_SCHEMA_VERSION};"));
    hasher.update(format!(
        "rolling_window:{};lag_periods:{};",
        windows.rolling_window, windows.lag_periods
    ));
    hasher.update("columns:");
    for column in columns {
        hasher.update(column.name.as_bytes());
        hasher.update(format!(":{:?};", column.kind));
    }
    hex::encode(hasher.finalize())
}
