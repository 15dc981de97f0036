use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::catalog::ingest::RawProduct;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("could not read catalog file `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not parse catalog from {origin}: {message}")]
    Parse { origin: String, message: String },
    #[error("catalog from {origin} has a non-object record at position {position}")]
    InvalidRecord { origin: String, position: usize },
    #[error("could not fetch catalog from {origin}: {message}")]
    Fetch { origin: String, message: String },
}

/// Bulk product source. Records come back in source order, optionally truncated.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    fn describe(&self) -> String;

    async fn load_records(&self) -> Result<Vec<RawProduct>, CatalogError>;
}

#[derive(Clone, Debug)]
pub struct JsonFileCatalogSource {
    path: PathBuf,
    max_products: Option<usize>,
}

impl JsonFileCatalogSource {
    pub fn new(path: impl Into<PathBuf>, max_products: Option<usize>) -> Self {
        Self { path: path.into(), max_products }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CatalogSource for JsonFileCatalogSource {
    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }

    async fn load_records(&self) -> Result<Vec<RawProduct>, CatalogError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| CatalogError::Read { path: self.path.clone(), source })?;
        parse_records(&raw, &self.describe(), self.max_products)
    }
}

/// Accepts a JSON array of objects, an object wrapping a `products` array, or JSON lines.
pub fn parse_records(
    raw: &str,
    origin: &str,
    max_products: Option<usize>,
) -> Result<Vec<RawProduct>, CatalogError> {
    let trimmed = raw.trim_start_matches('\u{feff}').trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let values = match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Array(items)) => items,
        Ok(Value::Object(mut object)) => match object.remove("products") {
            Some(Value::Array(items)) => items,
            Some(other) => {
                object.insert("products".to_string(), other);
                vec![Value::Object(object)]
            }
            None => vec![Value::Object(object)],
        },
        Ok(_) => {
            return Err(CatalogError::Parse {
                origin: origin.to_string(),
                message: "expected an array of product objects".to_string(),
            })
        }
        Err(error) if trimmed.starts_with('[') => {
            return Err(CatalogError::Parse {
                origin: origin.to_string(),
                message: error.to_string(),
            })
        }
        Err(_) => parse_json_lines(trimmed, origin)?,
    };

    let limit = max_products.unwrap_or(usize::MAX);
    values
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(position, value)| match value {
            Value::Object(record) => Ok(record),
            _ => Err(CatalogError::InvalidRecord { origin: origin.to_string(), position }),
        })
        .collect()
}

fn parse_json_lines(raw: &str, origin: &str) -> Result<Vec<Value>, CatalogError> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(line_number, line)| {
            serde_json::from_str::<Value>(line).map_err(|error| CatalogError::Parse {
                origin: origin.to_string(),
                message: format!("line {}: {error}", line_number + 1),
            })
        })
        .collect()
}
