use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::catalog::{CatalogSource, CatalogStore};
use crate::domain::catalog::CatalogEntry;
use crate::retrieval::embedder::Embedder;
use crate::retrieval::index::{FlatIndex, Neighbor};
use crate::retrieval::store::{IndexLoad, IndexStore, StaleReason};
use crate::retrieval::{RetrievalError, Retriever};

/// Catalog rows and the index built over them, swapped together.
#[derive(Debug)]
pub struct RetrievalSnapshot {
    catalog: CatalogStore,
    index: FlatIndex,
    load: IndexLoad,
}

impl RetrievalSnapshot {
    pub fn catalog(&self) -> &CatalogStore {
        &self.catalog
    }

    pub fn index(&self) -> &FlatIndex {
        &self.index
    }

    pub fn load(&self) -> &IndexLoad {
        &self.load
    }
}

/// Embedder + index + catalog behind one `search`.
///
/// The snapshot is built on first use. Rebuilds hold `rebuild_lock` for their whole
/// duration so at most one is in flight; searches only hold the read lock long enough to
/// clone the snapshot `Arc`.
pub struct RetrievalService {
    source: Arc<dyn CatalogSource>,
    embedder: Arc<dyn Embedder>,
    store: IndexStore,
    snapshot: RwLock<Option<Arc<RetrievalSnapshot>>>,
    rebuild_lock: Mutex<()>,
}

impl RetrievalService {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        embedder: Arc<dyn Embedder>,
        store: IndexStore,
    ) -> Self {
        Self { source, embedder, store, snapshot: RwLock::new(None), rebuild_lock: Mutex::new(()) }
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn index_store(&self) -> &IndexStore {
        &self.store
    }

    pub async fn is_initialized(&self) -> bool {
        self.snapshot.read().await.is_some()
    }

    /// Current snapshot, initializing it on first call.
    pub async fn get_index(&self) -> Result<Arc<RetrievalSnapshot>, RetrievalError> {
        if let Some(snapshot) = self.snapshot.read().await.as_ref() {
            return Ok(snapshot.clone());
        }

        let _rebuild = self.rebuild_lock.lock().await;
        if let Some(snapshot) = self.snapshot.read().await.as_ref() {
            return Ok(snapshot.clone());
        }
        self.refresh_locked(false).await
    }

    /// Re-reads the catalog and re-checks the persisted index against it.
    pub async fn reload(&self) -> Result<Arc<RetrievalSnapshot>, RetrievalError> {
        let _rebuild = self.rebuild_lock.lock().await;
        self.refresh_locked(false).await
    }

    /// Re-embeds the whole catalog regardless of the persisted blob.
    pub async fn rebuild(&self) -> Result<Arc<RetrievalSnapshot>, RetrievalError> {
        let _rebuild = self.rebuild_lock.lock().await;
        self.refresh_locked(true).await
    }

    async fn refresh_locked(&self, force: bool) -> Result<Arc<RetrievalSnapshot>, RetrievalError> {
        let catalog = CatalogStore::load(self.source.as_ref()).await?;
        let (index, load) = if force {
            let index = self.store.rebuild(&catalog, self.embedder.as_ref()).await?;
            (index, IndexLoad::Rebuilt(StaleReason::Requested))
        } else {
            self.store.load_or_rebuild(&catalog, self.embedder.as_ref()).await?
        };

        let snapshot = Arc::new(RetrievalSnapshot { catalog, index, load });
        *self.snapshot.write().await = Some(snapshot.clone());
        Ok(snapshot)
    }

    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<CatalogEntry>, RetrievalError> {
        let snapshot = self.get_index().await?;
        if top_k == 0 || snapshot.catalog.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(query).await?;
        let neighbors = snapshot.index.search(&query_vector, top_k)?;
        let results = bind_ordinals(&snapshot.catalog, &neighbors);

        if results.len() < neighbors.len() {
            tracing::warn!(
                event_name = "retrieval.search.ordinals_dropped",
                dropped = neighbors.len() - results.len(),
                catalog_entries = snapshot.catalog.len(),
                "index returned ordinals outside the catalog"
            );
        }
        tracing::debug!(
            event_name = "retrieval.search.completed",
            top_k,
            results = results.len(),
            "search completed"
        );
        Ok(results)
    }
}

/// Maps neighbors back to catalog rows, dropping ordinals the catalog does not have.
fn bind_ordinals(catalog: &CatalogStore, neighbors: &[Neighbor]) -> Vec<CatalogEntry> {
    neighbors.iter().filter_map(|neighbor| catalog.get(neighbor.ordinal).cloned()).collect()
}

#[async_trait]
impl Retriever for RetrievalService {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<CatalogEntry>, RetrievalError> {
        RetrievalService::search(self, query, top_k).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;

    use super::{bind_ordinals, RetrievalService};
    use crate::catalog::{
        CatalogError, CatalogSource, CatalogStore, JsonFileCatalogSource, RawProduct,
    };
    use crate::retrieval::embedder::{Embedder, EmbeddingError, EmbeddingVector, HashingEmbedder};
    use crate::retrieval::index::{FlatIndex, Neighbor};
    use crate::retrieval::store::{IndexLoad, IndexStore, StaleReason};

    struct CountingEmbedder {
        inner: HashingEmbedder,
        batches: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        fn model_id(&self) -> &str {
            self.inner.model_id()
        }

        async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
            self.inner.embed(text).await
        }

        async fn embed_batch(
            &self,
            texts: &[String],
        ) -> Result<Vec<EmbeddingVector>, EmbeddingError> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.inner.embed_batch(texts).await
        }
    }

    struct StaticSource(Vec<RawProduct>);

    #[async_trait]
    impl CatalogSource for StaticSource {
        fn describe(&self) -> String {
            "static".to_string()
        }

        async fn load_records(&self) -> Result<Vec<RawProduct>, CatalogError> {
            Ok(self.0.clone())
        }
    }

    fn records(value: serde_json::Value) -> Vec<RawProduct> {
        value
            .as_array()
            .map(|items| items.iter().filter_map(|item| item.as_object().cloned()).collect())
            .unwrap_or_default()
    }

    fn shoes_catalog() -> Vec<RawProduct> {
        records(json!([
            {"id": 1, "name_en": "Red Shoes"},
            {"id": 2, "name_en": "Blue Shoes"},
            {"id": 3, "name_en": "Laptop"}
        ]))
    }

    fn counting_embedder() -> Arc<CountingEmbedder> {
        Arc::new(CountingEmbedder {
            inner: HashingEmbedder::new(384).expect("embedder"),
            batches: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn shoes_query_returns_both_shoes_and_not_the_laptop() {
        let dir = TempDir::new().expect("tempdir");
        let service = RetrievalService::new(
            Arc::new(StaticSource(shoes_catalog())),
            counting_embedder(),
            IndexStore::new(dir.path().join("products.index")),
        );

        let results = service.search("shoes", 2).await.expect("search");
        let mut ids: Vec<_> = results.iter().map(|entry| entry.product_id.0.clone()).collect();
        ids.sort();

        assert_eq!(ids, vec!["1".to_string(), "2".to_string()]);
        assert_eq!(service.search("shoes", 2).await.expect("search"), results);
    }

    #[tokio::test]
    async fn results_are_bounded_by_k_and_catalog_size() {
        let dir = TempDir::new().expect("tempdir");
        let service = RetrievalService::new(
            Arc::new(StaticSource(shoes_catalog())),
            counting_embedder(),
            IndexStore::new(dir.path().join("products.index")),
        );

        for k in 1..=5 {
            let results = service.search("anything at all", k).await.expect("search");
            assert!(results.len() <= k);
            assert!(results.len() <= 3);
        }
        assert_eq!(service.search("anything", 10).await.expect("search").len(), 3);
    }

    #[tokio::test]
    async fn empty_catalog_returns_no_results() {
        let dir = TempDir::new().expect("tempdir");
        let service = RetrievalService::new(
            Arc::new(StaticSource(Vec::new())),
            counting_embedder(),
            IndexStore::new(dir.path().join("products.index")),
        );

        assert!(service.search("shoes", 3).await.expect("search").is_empty());
    }

    #[tokio::test]
    async fn concurrent_first_searches_build_once() {
        let dir = TempDir::new().expect("tempdir");
        let embedder = counting_embedder();
        let service = Arc::new(RetrievalService::new(
            Arc::new(StaticSource(shoes_catalog())),
            embedder.clone(),
            IndexStore::new(dir.path().join("products.index")),
        ));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let service = service.clone();
            handles.push(tokio::spawn(async move { service.search("laptop", 1).await }));
        }
        for handle in handles {
            let results = handle.await.expect("join").expect("search");
            assert_eq!(results.len(), 1);
        }

        assert_eq!(embedder.batches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_persisted_index_self_heals_on_next_get_index() {
        let dir = TempDir::new().expect("tempdir");
        let catalog_path = dir.path().join("products.json");
        let index_path = dir.path().join("products.index");
        std::fs::write(&catalog_path, r#"[{"name_en":"Red Shoes"},{"name_en":"Laptop"}]"#)
            .expect("write catalog");

        let first = RetrievalService::new(
            Arc::new(JsonFileCatalogSource::new(&catalog_path, None)),
            counting_embedder(),
            IndexStore::new(&index_path),
        );
        assert_eq!(first.get_index().await.expect("initial").index().count(), 2);

        std::fs::write(
            &catalog_path,
            r#"[{"name_en":"Red Shoes","name_ar":"حذاء أحمر"},{"name_en":"Laptop"},{"name_en":"Mug"}]"#,
        )
        .expect("rewrite catalog");

        let second = RetrievalService::new(
            Arc::new(JsonFileCatalogSource::new(&catalog_path, None)),
            counting_embedder(),
            IndexStore::new(&index_path),
        );
        let snapshot = second.get_index().await.expect("self heal");

        assert_eq!(snapshot.index().count(), 4);
        assert!(matches!(snapshot.load(), IndexLoad::Rebuilt(_)));
        let persisted = FlatIndex::from_bytes(&std::fs::read(&index_path).expect("read"))
            .expect("valid blob");
        assert_eq!(persisted.count(), 4);

        let reloaded = first.reload().await.expect("reload");
        assert_eq!(reloaded.index().count(), 4);
        assert_eq!(reloaded.load(), &IndexLoad::Loaded);
    }

    #[test]
    fn out_of_range_ordinals_are_dropped() {
        let catalog = CatalogStore::from_records(&shoes_catalog());
        let neighbors = [
            Neighbor { ordinal: 2, distance: 0.1 },
            Neighbor { ordinal: 7, distance: 0.2 },
            Neighbor { ordinal: 0, distance: 0.3 },
        ];

        let bound = bind_ordinals(&catalog, &neighbors);

        let names: Vec<_> = bound.iter().map(|entry| entry.display_name.as_str()).collect();
        assert_eq!(names, vec!["Laptop", "Red Shoes"]);
    }

    #[tokio::test]
    async fn forced_rebuild_re_embeds_the_catalog() {
        let dir = TempDir::new().expect("tempdir");
        let embedder = counting_embedder();
        let service = RetrievalService::new(
            Arc::new(StaticSource(shoes_catalog())),
            embedder.clone(),
            IndexStore::new(dir.path().join("products.index")),
        );

        service.get_index().await.expect("initial build");
        let snapshot = service.rebuild().await.expect("forced rebuild");

        assert_eq!(snapshot.load(), &IndexLoad::Rebuilt(StaleReason::Requested));
        assert_eq!(embedder.batches.load(Ordering::SeqCst), 2);
    }
}
