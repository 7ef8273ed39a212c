//! Raw table loading and column normalization.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use csv::StringRecord;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::DATE_FORMAT;

pub const PRODUCT_FILE: &str = "product.csv";
pub const BRAND_FILE: &str = "brand.csv";
pub const STORE_FILE: &str = "store.csv";
pub const SALES_FILE: &str = "sales.csv";

/// Source header → canonical join-key name, per table.
const PRODUCT_RENAMES: &[(&str, &str)] = &[("id", "product_id")];
const BRAND_RENAMES: &[(&str, &str)] = &[("id", "brand_id"), ("name", "brand")];
const STORE_RENAMES: &[(&str, &str)] = &[("id", "store_id")];
const SALES_RENAMES: &[(&str, &str)] = &[("product", "product_id"), ("store", "store_id")];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Product,
    Brand,
    Store,
    Sales,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Brand => "brand",
            Self::Store => "store",
            Self::Sales => "sales",
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            Self::Product => PRODUCT_FILE,
            Self::Brand => BRAND_FILE,
            Self::Store => STORE_FILE,
            Self::Sales => SALES_FILE,
        }
    }

    fn renames(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Product => PRODUCT_RENAMES,
            Self::Brand => BRAND_RENAMES,
            Self::Store => STORE_RENAMES,
            Self::Sales => SALES_RENAMES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub product_id: String,
    /// Brand name; joins against [`Brand::brand`].
    pub brand: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Brand {
    pub brand_id: String,
    pub brand: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Store {
    pub store_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SalesRecord {
    pub product_id: String,
    pub store_id: String,
    pub date: NaiveDate,
    pub quantity: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawTables {
    pub products: Vec<Product>,
    pub brands: Vec<Brand>,
    pub stores: Vec<Store>,
    pub sales: Vec<SalesRecord>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("missing {table} table at {path}")]
    MissingFile { table: &'static str, path: PathBuf },
    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("{table} table has no '{column}' column (headers: {headers:?})")]
    MissingColumn {
        table: &'static str,
        column: &'static str,
        headers: Vec<String>,
    },
    #[error("failed to parse {table}.{field} value '{value}' on line {line}")]
    ParseField {
        table: &'static str,
        field: &'static str,
        value: String,
        line: u64,
    },
    #[error("duplicate {column} '{key}' in {table} table")]
    DuplicateKey {
        table: &'static str,
        column: &'static str,
        key: String,
    },
}

/// Loads the four source tables from `data_dir` with canonical column names.
pub fn load_tables(data_dir: &Path) -> Result<RawTables, LoadError> {
    info!(
        component = "loader",
        event = "load.start",
        data_dir = %data_dir.display()
    );

    let products = load_products(&data_dir.join(Table::Product.file_name()))?;
    let brands = load_brands(&data_dir.join(Table::Brand.file_name()))?;
    let stores = load_stores(&data_dir.join(Table::Store.file_name()))?;
    let sales = load_sales(&data_dir.join(Table::Sales.file_name()))?;

    info!(
        component = "loader",
        event = "load.finish",
        products = products.len(),
        brands = brands.len(),
        stores = stores.len(),
        sales = sales.len()
    );

    Ok(RawTables {
        products,
        brands,
        stores,
        sales,
    })
}

pub fn load_products(path: &Path) -> Result<Vec<Product>, LoadError> {
    let table = Table::Product;
    let (headers, records) = read_table(path, table)?;
    let id_idx = column_index(&headers, table, "product_id")?;
    let brand_idx = column_index(&headers, table, "brand")?;

    let mut out = Vec::with_capacity(records.len());
    for record in &records {
        out.push(Product {
            product_id: text_field(record, id_idx),
            brand: text_field(record, brand_idx),
        });
    }

    ensure_unique(table, "product_id", out.iter().map(|p| p.product_id.as_str()))?;
    Ok(out)
}

pub fn load_brands(path: &Path) -> Result<Vec<Brand>, LoadError> {
    let table = Table::Brand;
    let (headers, records) = read_table(path, table)?;
    let id_idx = column_index(&headers, table, "brand_id")?;
    let name_idx = column_index(&headers, table, "brand")?;

    let mut out = Vec::with_capacity(records.len());
    for record in &records {
        out.push(Brand {
            brand_id: text_field(record, id_idx),
            brand: text_field(record, name_idx),
        });
    }

    ensure_unique(table, "brand_id", out.iter().map(|b| b.brand_id.as_str()))?;
    ensure_unique(table, "brand", out.iter().map(|b| b.brand.as_str()))?;
    Ok(out)
}

pub fn load_stores(path: &Path) -> Result<Vec<Store>, LoadError> {
    let table = Table::Store;
    let (headers, records) = read_table(path, table)?;
    let id_idx = column_index(&headers, table, "store_id")?;

    let out: Vec<Store> = records
        .iter()
        .map(|record| Store {
            store_id: text_field(record, id_idx),
        })
        .collect();

    ensure_unique(table, "store_id", out.iter().map(|s| s.store_id.as_str()))?;
    Ok(out)
}

pub fn load_sales(path: &Path) -> Result<Vec<SalesRecord>, LoadError> {
    let table = Table::Sales;
    let (headers, records) = read_table(path, table)?;
    let product_idx = column_index(&headers, table, "product_id")?;
    let store_idx = column_index(&headers, table, "store_id")?;
    let date_idx = column_index(&headers, table, "date")?;
    let quantity_idx = column_index(&headers, table, "quantity")?;

    let mut out = Vec::with_capacity(records.len());
    for record in &records {
        out.push(SalesRecord {
            product_id: text_field(record, product_idx),
            store_id: text_field(record, store_idx),
            date: parse_date_field(record, date_idx, table, "date")?,
            quantity: parse_quantity_field(record, quantity_idx, table, "quantity")?,
        });
    }

    Ok(out)
}

/// Returns a new header record with source names replaced by canonical ones.
pub fn canonical_headers(headers: &StringRecord, renames: &[(&str, &str)]) -> StringRecord {
    headers
        .iter()
        .map(|name| {
            let name = name.trim();
            renames
                .iter()
                .find(|(source, _)| *source == name)
                .map(|(_, canonical)| *canonical)
                .unwrap_or(name)
        })
        .collect()
}

fn read_table(path: &Path, table: Table) -> Result<(StringRecord, Vec<StringRecord>), LoadError> {
    if !path.is_file() {
        return Err(LoadError::MissingFile {
            table: table.as_str(),
            path: path.to_path_buf(),
        });
    }

    let csv_err = |source: csv::Error| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_err)?;

    let source_headers = reader.headers().map_err(csv_err)?.clone();
    let headers = canonical_headers(&source_headers, table.renames());

    let mut records = Vec::new();
    for record in reader.records() {
        records.push(record.map_err(csv_err)?);
    }

    debug!(
        component = "loader",
        event = "load.table.read",
        table = table.as_str(),
        path = %path.display(),
        rows = records.len()
    );

    Ok((headers, records))
}

fn column_index(
    headers: &StringRecord,
    table: Table,
    column: &'static str,
) -> Result<usize, LoadError> {
    headers
        .iter()
        .position(|name| name == column)
        .ok_or_else(|| LoadError::MissingColumn {
            table: table.as_str(),
            column,
            headers: headers.iter().map(str::to_string).collect(),
        })
}

fn text_field(record: &StringRecord, idx: usize) -> String {
    record.get(idx).unwrap_or_default().to_string()
}

fn record_line(record: &StringRecord) -> u64 {
    record.position().map(|pos| pos.line()).unwrap_or_default()
}

fn parse_date_field(
    record: &StringRecord,
    idx: usize,
    table: Table,
    field: &'static str,
) -> Result<NaiveDate, LoadError> {
    let raw = record.get(idx).unwrap_or_default();
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|_| LoadError::ParseField {
        table: table.as_str(),
        field,
        value: raw.to_string(),
        line: record_line(record),
    })
}

fn parse_quantity_field(
    record: &StringRecord,
    idx: usize,
    table: Table,
    field: &'static str,
) -> Result<f64, LoadError> {
    let raw = record.get(idx).unwrap_or_default();
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(LoadError::ParseField {
            table: table.as_str(),
            field,
            value: raw.to_string(),
            line: record_line(record),
        }),
    }
}

fn ensure_unique<'a>(
    table: Table,
    column: &'static str,
    keys: impl Iterator<Item = &'a str>,
) -> Result<(), LoadError> {
    let mut seen = HashSet::new();
    for key in keys {
        if !seen.insert(key) {
            return Err(LoadError::DuplicateKey {
                table: table.as_str(),
                column,
                key: key.to_string(),
            });
        }
    }
    Ok(())
}
