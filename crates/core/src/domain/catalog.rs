use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::language::Language;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductId(pub String);

/// One searchable row of the catalog.
///
/// A logical product with several language variants is expanded into one entry per
/// variant; every entry of the same product shares its `product_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub product_id: ProductId,
    pub language: Language,
    pub display_name: String,
    pub description: String,
    pub price: Option<Decimal>,
    pub currency: String,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub media_url: Option<String>,
    pub product_url: Option<String>,
}

impl CatalogEntry {
    /// Text submitted to the embedder for this row.
    pub fn search_text(&self) -> String {
        let description = self.description.trim();
        if description.is_empty() {
            self.display_name.trim().to_string()
        } else {
            format!("{} - {}", self.display_name.trim(), description)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CatalogEntry, ProductId};
    use crate::domain::language::Language;

    fn entry(description: &str) -> CatalogEntry {
        CatalogEntry {
            product_id: ProductId("p-1".to_string()),
            language: Language::English,
            display_name: "Red Shoes ".to_string(),
            description: description.to_string(),
            price: None,
            currency: "AED".to_string(),
            category: None,
            brand: None,
            media_url: None,
            product_url: None,
        }
    }

    #[test]
    fn search_text_joins_name_and_description() {
        assert_eq!(
            entry("Leather running shoes").search_text(),
            "Red Shoes - Leather running shoes"
        );
    }

    #[test]
    fn search_text_without_description_is_the_name() {
        assert_eq!(entry("  ").search_text(), "Red Shoes");
    }
}
