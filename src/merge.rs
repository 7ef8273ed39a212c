//! Joins the three aggregates back onto the fact table.

use tracing::info;

use crate::features::{AggregatePoint, FeatureError, Granularity, GroupAggregate};
use crate::join::DenormalizedFact;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupFeatures {
    pub sales: f64,
    pub rolling_mean: Option<f64>,
    pub lag: Option<f64>,
}

impl From<&AggregatePoint> for GroupFeatures {
    fn from(point: &AggregatePoint) -> Self {
        Self {
            sales: point.sum_quantity,
            rolling_mean: point.rolling_mean,
            lag: point.lag,
        }
    }
}

/// A fact row widened with product-, brand- and store-level features.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub fact: DenormalizedFact,
    pub product: GroupFeatures,
    pub brand: GroupFeatures,
    pub store: GroupFeatures,
}

/// Exact-match join of every fact row against each aggregate.
///
/// The aggregates are derived from `facts`, so a row without a matching
/// aggregate is an internal inconsistency and fails the whole merge.
pub fn merge_features(
    facts: &[DenormalizedFact],
    product: &GroupAggregate,
    brand: &GroupAggregate,
    store: &GroupAggregate,
) -> Result<Vec<FeatureRow>, FeatureError> {
    expect_granularity(product, Granularity::Product)?;
    expect_granularity(brand, Granularity::Brand)?;
    expect_granularity(store, Granularity::Store)?;

    let mut rows = Vec::with_capacity(facts.len());
    for fact in facts {
        rows.push(FeatureRow {
            fact: fact.clone(),
            product: lookup(product, fact)?,
            brand: lookup(brand, fact)?,
            store: lookup(store, fact)?,
        });
    }

    info!(
        component = "merge",
        event = "merge.finish",
        rows = rows.len()
    );

    Ok(rows)
}

fn lookup(agg: &GroupAggregate, fact: &DenormalizedFact) -> Result<GroupFeatures, FeatureError> {
    agg.lookup(fact)
        .map(GroupFeatures::from)
        .ok_or_else(|| FeatureError::MissingAggregate {
            granularity: agg.granularity,
            key: agg.granularity.entity_key(fact),
            date: fact.date,
        })
}

fn expect_granularity(agg: &GroupAggregate, expected: Granularity) -> Result<(), FeatureError> {
    if agg.granularity != expected {
        return Err(FeatureError::GranularityMismatch {
            expected,
            actual: agg.granularity,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeatureWindows;
    use crate::features::aggregate;
    use chrono::NaiveDate;

    fn fact(product: &str, store: &str, d: u32, quantity: f64) -> DenormalizedFact {
        DenormalizedFact {
            product_id: product.to_string(),
            store_id: store.to_string(),
            brand_id: "b1".to_string(),
            brand: "Acme".to_string(),
            date: NaiveDate::from_ymd_opt(2021, 1, d).unwrap(),
            quantity,
        }
    }

    fn aggregates(
        facts: &[DenormalizedFact],
    ) -> (GroupAggregate, GroupAggregate, GroupAggregate) {
        let windows = FeatureWindows::default();
        (
            aggregate(facts, Granularity::Product, &windows),
            aggregate(facts, Granularity::Brand, &windows),
            aggregate(facts, Granularity::Store, &windows),
        )
    }

    #[test]
    fn every_fact_row_gets_three_feature_groups() {
        let facts = vec![
            fact("p1", "s1", 1, 2.0),
            fact("p2", "s1", 1, 3.0),
            fact("p1", "s1", 1, 4.0),
        ];
        let (p, b, s) = aggregates(&facts);
        let rows = merge_features(&facts, &p, &b, &s).unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].product.sales, 6.0);
        assert_eq!(rows[1].product.sales, 3.0);
        assert_eq!(rows[0].brand.sales, 9.0);
        assert_eq!(rows[2].store.sales, 9.0);
        assert_eq!(rows[2].fact.quantity, 4.0);
    }

    #[test]
    fn missing_aggregate_is_fatal() {
        let facts = vec![fact("p1", "s1", 1, 2.0)];
        let (p, b, s) = aggregates(&facts);
        let stray = vec![fact("p1", "s2", 1, 2.0)];

        match merge_features(&stray, &p, &b, &s) {
            Err(FeatureError::MissingAggregate { granularity, .. }) => {
                assert_eq!(granularity, Granularity::Product);
            }
            other => panic!("expected missing aggregate, got {other:?}"),
        }
    }

    #[test]
    fn swapped_aggregates_are_rejected() {
        let facts = vec![fact("p1", "s1", 1, 2.0)];
        let (p, b, s) = aggregates(&facts);
        assert!(matches!(
            merge_features(&facts, &p, &s, &b),
            Err(FeatureError::GranularityMismatch {
                expected: Granularity::Brand,
                actual: Granularity::Store,
            })
        ));
    }
}
