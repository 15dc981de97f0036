//! Maps loosely-typed product objects onto [`CatalogEntry`] rows.
//!
//! Field precedence is fixed here and nowhere else: for every canonical field the first
//! source key holding a non-empty value wins. A product yields one row per language
//! variant that has a name, English before Arabic, all sharing the product id.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::domain::catalog::{CatalogEntry, ProductId};
use crate::domain::language::Language;

pub type RawProduct = Map<String, Value>;

pub const DEFAULT_CURRENCY: &str = "AED";

const ID_KEYS: &[&str] = &["id", "product_id", "asin", "sku"];
const NAME_EN_KEYS: &[&str] = &["name_en", "name", "title"];
const DESC_EN_KEYS: &[&str] = &["desc_en", "description_en", "description", "desc"];
const NAME_AR_KEYS: &[&str] = &["name_ar", "title_ar"];
const DESC_AR_KEYS: &[&str] = &["desc_ar", "description_ar"];
const CATEGORY_KEYS: &[&str] = &["category", "main_category"];
const BRAND_KEYS: &[&str] = &["brand"];
const MEDIA_KEYS: &[&str] = &["media_url", "image_url", "imUrl", "image"];
const LINK_KEYS: &[&str] = &["affiliate_url", "url"];

struct Variant {
    language: Language,
    name_keys: &'static [&'static str],
    description_keys: &'static [&'static str],
}

fn variants() -> [Variant; 2] {
    [
        Variant {
            language: Language::English,
            name_keys: NAME_EN_KEYS,
            description_keys: DESC_EN_KEYS,
        },
        Variant {
            language: Language::Arabic,
            name_keys: NAME_AR_KEYS,
            description_keys: DESC_AR_KEYS,
        },
    ]
}

/// Expands every record into its searchable rows, preserving source order.
pub fn normalize_records(records: &[RawProduct]) -> Vec<CatalogEntry> {
    records
        .iter()
        .enumerate()
        .flat_map(|(position, record)| normalize_record(position, record))
        .collect()
}

pub fn normalize_record(position: usize, record: &RawProduct) -> Vec<CatalogEntry> {
    let product_id =
        ProductId(first_text(record, ID_KEYS).unwrap_or_else(|| format!("row-{position}")));
    let price = record.get("price").and_then(parse_price);
    let currency =
        first_text(record, &["currency"]).unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
    let category = first_text(record, CATEGORY_KEYS);
    let brand = first_text(record, BRAND_KEYS);
    let media_url = first_text(record, MEDIA_KEYS);
    let product_url = first_text(record, LINK_KEYS);

    variants()
        .into_iter()
        .filter_map(|variant| {
            let display_name = first_text(record, variant.name_keys)?;
            Some(CatalogEntry {
                product_id: product_id.clone(),
                language: variant.language,
                display_name,
                description: first_text(record, variant.description_keys).unwrap_or_default(),
                price,
                currency: currency.clone(),
                category: category.clone(),
                brand: brand.clone(),
                media_url: media_url.clone(),
                product_url: product_url.clone(),
            })
        })
        .collect()
}

/// Number of rows [`normalize_records`] produces for `records`; the reference count for
/// index staleness checks.
pub fn expected_entry_count(records: &[RawProduct]) -> usize {
    records
        .iter()
        .map(|record| {
            variants()
                .iter()
                .filter(|variant| first_text(record, variant.name_keys).is_some())
                .count()
        })
        .sum()
}

fn first_text(record: &RawProduct, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| record.get(*key).and_then(text_value))
}

fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => {
            let trimmed = text.trim();
            // CSV exports write missing cells as `nan`.
            (!trimmed.is_empty() && !trimmed.eq_ignore_ascii_case("nan"))
                .then(|| trimmed.to_string())
        }
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn parse_price(value: &Value) -> Option<Decimal> {
    let raw = match value {
        Value::Number(number) => number.to_string(),
        Value::String(text) => {
            text.chars().filter(|ch| !matches!(ch, '$' | ',') && !ch.is_whitespace()).collect()
        }
        _ => return None,
    };
    if raw.is_empty() {
        return None;
    }

    let parsed = Decimal::from_str(&raw).or_else(|_| Decimal::from_scientific(&raw)).ok()?;
    (!parsed.is_sign_negative()).then_some(parsed)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::{json, Value};

    use super::{expected_entry_count, normalize_records, RawProduct};
    use crate::domain::catalog::ProductId;
    use crate::domain::language::Language;

    fn records(value: Value) -> Vec<RawProduct> {
        value
            .as_array()
            .map(|items| items.iter().filter_map(|item| item.as_object().cloned()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn bilingual_product_expands_into_two_rows_with_shared_id() {
        let input = records(json!([{
            "id": 7,
            "name_en": "Desk Lamp",
            "desc_en": "Warm LED light",
            "name_ar": "مصباح مكتب",
            "desc_ar": "ضوء دافئ",
            "price": "$1,249.50",
            "brand": "Lumo"
        }]));

        let entries = normalize_records(&input);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].language, Language::English);
        assert_eq!(entries[1].language, Language::Arabic);
        assert_eq!(entries[0].product_id, ProductId("7".to_string()));
        assert_eq!(entries[0].product_id, entries[1].product_id);
        assert_eq!(entries[1].display_name, "مصباح مكتب");
        assert_eq!(entries[0].price, Some(Decimal::new(124950, 2)));
        assert_eq!(entries[0].currency, "AED");
        assert_eq!(expected_entry_count(&input), 2);
    }

    #[test]
    fn first_non_empty_field_wins() {
        let input = records(json!([{
            "asin": "B00X",
            "name_en": "  ",
            "name": "",
            "title": "Travel Mug",
            "description": "Keeps coffee hot",
            "desc": "ignored",
            "main_category": "Kitchen",
            "imUrl": "https://img.example/mug.jpg",
            "url": "https://shop.example/mug",
            "currency": "USD",
            "price": 12.5
        }]));

        let entries = normalize_records(&input);

        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.product_id, ProductId("B00X".to_string()));
        assert_eq!(entry.display_name, "Travel Mug");
        assert_eq!(entry.description, "Keeps coffee hot");
        assert_eq!(entry.category.as_deref(), Some("Kitchen"));
        assert_eq!(entry.media_url.as_deref(), Some("https://img.example/mug.jpg"));
        assert_eq!(entry.product_url.as_deref(), Some("https://shop.example/mug"));
        assert_eq!(entry.currency, "USD");
        assert_eq!(entry.price, Some(Decimal::new(125, 1)));
    }

    #[test]
    fn nameless_records_yield_no_rows_and_missing_ids_use_position() {
        let input = records(json!([
            {"description": "no name at all", "price": "n/a"},
            {"name_ar": "سماعات", "price": "nan"}
        ]));

        let entries = normalize_records(&input);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].product_id, ProductId("row-1".to_string()));
        assert_eq!(entries[0].language, Language::Arabic);
        assert_eq!(entries[0].price, None);
        assert_eq!(expected_entry_count(&input), entries.len());
    }
}
