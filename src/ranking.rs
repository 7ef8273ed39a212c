//! WMAPE report of the product-level rolling mean over the exported window.
//!
//! `MA7_P` is scored as a forecast of `sales_product` for each
//! (product, store) pair: WMAPE = Σ|actual − forecast| / Σ|actual|.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::merge::FeatureRow;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WmapeEntry {
    pub product_id: String,
    pub store_id: String,
    pub wmape: f64,
    /// Days with both an actual and a rolling-mean forecast.
    pub scored_days: u64,
    pub abs_error: f64,
    pub abs_actual: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct WmapeReport {
    /// Worst-forecast pairs first, at most `top` entries.
    pub entries: Vec<WmapeEntry>,
    /// Pairs with no rolling-mean value in the window.
    pub pairs_without_forecast: u64,
    /// Pairs whose actual sales sum to zero, leaving WMAPE undefined.
    pub pairs_with_zero_actual: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct ErrorSums {
    abs_error: f64,
    abs_actual: f64,
    scored_days: u64,
}

/// Scores every (product, store) pair in `rows` and keeps the `top` highest
/// WMAPE values.
///
/// `sales_product` repeats on every fact row of the same day, so each
/// (product, store, date) is scored once. Ties are broken by ascending
/// (product_id, store_id).
pub fn wmape_report(rows: &[&FeatureRow], top: usize) -> WmapeReport {
    let mut seen_days: BTreeSet<(&str, &str, NaiveDate)> = BTreeSet::new();
    let mut sums: BTreeMap<(&str, &str), ErrorSums> = BTreeMap::new();

    for row in rows {
        let fact = &row.fact;
        if !seen_days.insert((fact.product_id.as_str(), fact.store_id.as_str(), fact.date)) {
            continue;
        }
        let entry = sums
            .entry((fact.product_id.as_str(), fact.store_id.as_str()))
            .or_default();
        let Some(forecast) = row.product.rolling_mean else {
            continue;
        };
        let actual = row.product.sales;
        entry.abs_error += (actual - forecast).abs();
        entry.abs_actual += actual.abs();
        entry.scored_days += 1;
    }

    let mut report = WmapeReport::default();
    for ((product_id, store_id), s) in sums {
        if s.scored_days == 0 {
            report.pairs_without_forecast += 1;
            continue;
        }
        if s.abs_actual == 0.0 {
            report.pairs_with_zero_actual += 1;
            continue;
        }
        report.entries.push(WmapeEntry {
            product_id: product_id.to_string(),
            store_id: store_id.to_string(),
            wmape: s.abs_error / s.abs_actual,
            scored_days: s.scored_days,
            abs_error: s.abs_error,
            abs_actual: s.abs_actual,
        });
    }

    // stable sort keeps the key order from the BTreeMap for equal scores
    report.entries.sort_by(|a, b| b.wmape.total_cmp(&a.wmape));
    report.entries.truncate(top);

    info!(
        component = "ranking",
        event = "ranking.finish",
        top = top,
        ranked = report.entries.len(),
        pairs_without_forecast = report.pairs_without_forecast,
        pairs_with_zero_actual = report.pairs_with_zero_actual
    );

    report
}
