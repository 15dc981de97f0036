pub mod ingest;
pub mod source;

pub use ingest::{expected_entry_count, normalize_records, RawProduct, DEFAULT_CURRENCY};
pub use source::{parse_records, CatalogError, CatalogSource, JsonFileCatalogSource};

use crate::domain::catalog::CatalogEntry;

/// Immutable, ordered catalog rows. Row `i` is bound to index ordinal `i`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CatalogStore {
    entries: Vec<CatalogEntry>,
    expected_entries: usize,
}

impl CatalogStore {
    pub fn from_entries(entries: Vec<CatalogEntry>) -> Self {
        let expected_entries = entries.len();
        Self { entries, expected_entries }
    }

    pub fn from_records(records: &[RawProduct]) -> Self {
        let entries = normalize_records(records);
        let expected_entries = expected_entry_count(records);
        if expected_entries != entries.len() {
            tracing::warn!(
                event_name = "catalog.expansion_mismatch",
                expected = expected_entries,
                actual = entries.len(),
                "catalog expansion produced an unexpected number of rows"
            );
        }
        Self { entries, expected_entries }
    }

    pub async fn load(source: &dyn CatalogSource) -> Result<Self, CatalogError> {
        let records = source.load_records().await?;
        let store = Self::from_records(&records);
        tracing::info!(
            event_name = "catalog.loaded",
            source = %source.describe(),
            records = records.len(),
            entries = store.len(),
            "catalog loaded"
        );
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Row count the raw records call for; a persisted index with any other count is stale.
    pub fn expected_entries(&self) -> usize {
        self.expected_entries
    }

    pub fn get(&self, ordinal: usize) -> Option<&CatalogEntry> {
        self.entries.get(ordinal)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn search_texts(&self) -> Vec<String> {
        self.entries.iter().map(CatalogEntry::search_text).collect()
    }
}
