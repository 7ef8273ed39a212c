//! Inner joins from raw tables to the denormalized fact table.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::loader::{Brand, Product, RawTables, SalesRecord, Store};

/// One sales observation carrying its product, brand and store identifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct DenormalizedFact {
    pub product_id: String,
    pub store_id: String,
    pub brand_id: String,
    pub brand: String,
    pub date: NaiveDate,
    pub quantity: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct JoinReport {
    pub products_in: u64,
    pub products_without_brand: u64,
    pub sales_in: u64,
    pub sales_without_product: u64,
    /// Kept rows whose store is absent from the store table.
    pub unknown_store_rows: u64,
    pub facts_out: u64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct JoinOutput {
    pub facts: Vec<DenormalizedFact>,
    pub report: JoinReport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ProductBrand<'a> {
    brand_id: &'a str,
    brand: &'a str,
}

/// Joins products to brands on the brand name, then sales to products on
/// `product_id`.
///
/// Both joins are inner joins: unmatched rows are dropped and counted in the
/// report. Output order follows the sales table.
pub fn join_sales(tables: &RawTables) -> JoinOutput {
    let mut report = JoinReport {
        products_in: tables.products.len() as u64,
        sales_in: tables.sales.len() as u64,
        ..JoinReport::default()
    };

    let product_brands = join_products_to_brands(&tables.products, &tables.brands, &mut report);
    let known_stores = store_index(&tables.stores);

    let mut facts = Vec::with_capacity(tables.sales.len());
    for sale in &tables.sales {
        let Some(pb) = product_brands.get(sale.product_id.as_str()) else {
            report.sales_without_product += 1;
            debug!(
                component = "join",
                event = "join.sales.dropped",
                product_id = %sale.product_id,
                store_id = %sale.store_id,
                date = %sale.date
            );
            continue;
        };

        if !known_stores.contains(sale.store_id.as_str()) {
            report.unknown_store_rows += 1;
        }

        facts.push(denormalize(sale, pb));
    }

    report.facts_out = facts.len() as u64;

    if report.sales_without_product > 0 || report.products_without_brand > 0 {
        warn!(
            component = "join",
            event = "join.rows_dropped",
            products_without_brand = report.products_without_brand,
            sales_without_product = report.sales_without_product
        );
    }
    if report.unknown_store_rows > 0 {
        warn!(
            component = "join",
            event = "join.unknown_store",
            unknown_store_rows = report.unknown_store_rows
        );
    }

    info!(
        component = "join",
        event = "join.finish",
        sales_in = report.sales_in,
        facts_out = report.facts_out
    );

    JoinOutput { facts, report }
}

fn join_products_to_brands<'a>(
    products: &'a [Product],
    brands: &'a [Brand],
    report: &mut JoinReport,
) -> HashMap<&'a str, ProductBrand<'a>> {
    let by_name: HashMap<&str, &Brand> = brands.iter().map(|b| (b.brand.as_str(), b)).collect();

    let mut out = HashMap::with_capacity(products.len());
    for product in products {
        match by_name.get(product.brand.as_str()) {
            Some(brand) => {
                out.insert(
                    product.product_id.as_str(),
                    ProductBrand {
                        brand_id: brand.brand_id.as_str(),
                        brand: brand.brand.as_str(),
                    },
                );
            }
            None => {
                report.products_without_brand += 1;
                debug!(
                    component = "join",
                    event = "join.product.dropped",
                    product_id = %product.product_id,
                    brand = %product.brand
                );
            }
        }
    }
    out
}

fn store_index(stores: &[Store]) -> HashSet<&str> {
    stores.iter().map(|s| s.store_id.as_str()).collect()
}

fn denormalize(sale: &SalesRecord, pb: &ProductBrand<'_>) -> DenormalizedFact {
    DenormalizedFact {
        product_id: sale.product_id.clone(),
        store_id: sale.store_id.clone(),
        brand_id: pb.brand_id.to_string(),
        brand: pb.brand.to_string(),
        date: sale.date,
        quantity: sale.quantity,
    }
}
