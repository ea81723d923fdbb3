//! Typed, cache-aside access to entity tables.
//!
//! Reads check the [`CacheLayer`] first and fall through to the [`Store`].
//! Writes go to the store first and then invalidate every cache entry of the
//! table that could embed the written row. Write methods return `false`
//! instead of an error so callers can decide whether to retry.

mod entity;
mod page;

pub use entity::{Entity, EntityId};
pub use page::{Filter, PageRequest, PagedResult};

use std::marker::PhantomData;
use std::time::Duration;

use crate::cache::{CacheKey, CacheLayer};
use crate::changelog::{self, ChangeType};
use crate::store::{Row, Select, Store, StoreError, Value};

/// Cache-aside repository for one entity type.
pub struct Repository<T: Entity> {
    store: Store,
    cache: CacheLayer,
    ttl: Option<Duration>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            cache: self.cache.clone(),
            ttl: self.ttl,
            _entity: PhantomData,
        }
    }
}

struct PreparedWrite {
    id: String,
    key: Value,
    row: Row,
    change: Option<serde_json::Value>,
}

impl<T: Entity> Repository<T> {
    pub fn new(store: Store, cache: CacheLayer) -> Self {
        Self {
            store,
            cache,
            ttl: None,
            _entity: PhantomData,
        }
    }

    /// Overrides the cache TTL for entries this repository creates.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn cache(&self) -> &CacheLayer {
        &self.cache
    }

    fn key_filter() -> String {
        format!("{} = ?", T::ID_COLUMN)
    }

    pub async fn find_by_id(&self, id: &T::Id) -> Result<Option<T>, StoreError> {
        let key = CacheKey::entity(T::TABLE, id);
        if let Some(entity) = self.cache.get::<T>(&key) {
            return Ok(Some(entity));
        }

        let key_value: Value = id.clone().into();
        let select = Select::from(T::TABLE)
            .filter(Self::key_filter(), vec![key_value])
            .limit(1);
        let entity = match self.store.query(&select).await?.first() {
            Some(row) => T::from_row(row)?,
            None => return Ok(None),
        };

        self.cache.put(key, entity.clone(), self.ttl);
        Ok(Some(entity))
    }

    pub async fn find_all(&self, page: &PageRequest) -> Result<Vec<T>, StoreError> {
        let key = CacheKey::query(T::TABLE, format!("all:{}", page.fingerprint()));
        if let Some(items) = self.cache.get::<Vec<T>>(&key) {
            return Ok(items);
        }

        let order_by = page
            .order_by
            .clone()
            .unwrap_or_else(|| T::ID_COLUMN.to_string());
        let mut select = Select::from(T::TABLE).order_by(order_by);
        select.limit = page.limit;
        select.offset = page.offset;

        let items = self.map_rows(self.store.query(&select).await?)?;
        self.cache.put(key, items.clone(), self.ttl);
        Ok(items)
    }

    /// Always reads the store.
    pub async fn find_where(&self, filter: &Filter) -> Result<Vec<T>, StoreError> {
        let mut select = Select::from(T::TABLE).filter(filter.clause.clone(), filter.args.clone());
        select.order_by = filter.order_by.clone();
        select.limit = filter.limit;
        select.offset = filter.offset;
        self.map_rows(self.store.query(&select).await?)
    }

    /// Number of rows, optionally filtered. Cached; may lag a concurrent
    /// writer by at most one TTL.
    pub async fn count(&self, filter: Option<&Filter>) -> Result<i64, StoreError> {
        let fp = filter.map(Filter::fingerprint).unwrap_or_default();
        let key = CacheKey::query(T::TABLE, format!("count:{}", fp));
        if let Some(n) = self.cache.get::<i64>(&key) {
            return Ok(n);
        }

        let (clause, args) = match filter {
            Some(f) => (format!(" WHERE {}", f.clause), f.args.as_slice()),
            None => (String::new(), &[][..]),
        };
        let sql = format!("SELECT COUNT(*) AS n FROM {}{}", T::TABLE, clause);
        let rows = self.store.raw_query(&sql, args).await?;
        let n = rows.first().map(|r| r.i64("n")).transpose()?.unwrap_or(0);

        self.cache.put(key, n, self.ttl);
        Ok(n)
    }

    /// One 1-based page. `page` and `size` are clamped to at least 1. The
    /// filter's own limit and offset are ignored.
    pub async fn find_paged(
        &self,
        page: u32,
        size: u32,
        filter: Option<&Filter>,
    ) -> Result<PagedResult<T>, StoreError> {
        let page = page.max(1);
        let size = size.max(1);
        let order_by = filter
            .and_then(|f| f.order_by.clone())
            .unwrap_or_else(|| T::ID_COLUMN.to_string());
        let fp = filter.map(Filter::fingerprint).unwrap_or_default();

        let key = CacheKey::query(T::TABLE, format!("page:{}:{}:{}:{}", page, size, fp, order_by));
        if let Some(result) = self.cache.get::<PagedResult<T>>(&key) {
            return Ok(result);
        }

        let total = self.count(filter).await?;

        let mut select = Select::from(T::TABLE)
            .order_by(order_by)
            .limit(i64::from(size))
            .offset(i64::from(page - 1) * i64::from(size));
        if let Some(f) = filter {
            select = select.filter(f.clause.clone(), f.args.clone());
        }
        let items = self.map_rows(self.store.query(&select).await?)?;

        let result = PagedResult::new(items, page, size, total);
        self.cache.put(key, result.clone(), self.ttl);
        Ok(result)
    }

    pub async fn save(&self, entity: &T) -> bool {
        self.save_all(std::slice::from_ref(entity)).await
    }

    /// Upserts all entities in one transaction.
    pub async fn save_all(&self, entities: &[T]) -> bool {
        if entities.is_empty() {
            return true;
        }
        let writes = match Self::prepare(entities) {
            Ok(writes) => writes,
            Err(e) => {
                tracing::warn!(table = T::TABLE, error = %e, "failed to encode records");
                return false;
            }
        };
        let ids: Vec<String> = writes.iter().map(|w| w.id.clone()).collect();

        let result = self
            .store
            .transaction(move |tx| {
                Box::pin(async move {
                    for write in &writes {
                        let existed = match &write.change {
                            Some(_) => tx
                                .find_row(T::TABLE, T::ID_COLUMN, write.key.clone())
                                .await?
                                .is_some(),
                            None => false,
                        };
                        tx.insert(T::TABLE, &write.row).await?;
                        if let Some(data) = &write.change {
                            let change_type = if existed {
                                ChangeType::Update
                            } else {
                                ChangeType::Insert
                            };
                            changelog::record(tx, change_type, T::TABLE, &write.id, data).await?;
                        }
                    }
                    Ok(())
                })
            })
            .await;

        match result {
            Ok(()) => {
                self.invalidate(&ids);
                true
            }
            Err(e) => {
                tracing::warn!(table = T::TABLE, error = %e, "save failed");
                false
            }
        }
    }

    /// Overwrites an existing row. Returns `false` if it does not exist.
    pub async fn update(&self, entity: &T) -> bool {
        let mut writes = match Self::prepare(std::slice::from_ref(entity)) {
            Ok(writes) => writes,
            Err(e) => {
                tracing::warn!(table = T::TABLE, error = %e, "failed to encode record");
                return false;
            }
        };
        let Some(write) = writes.pop() else {
            return false;
        };
        let id = write.id.clone();

        let result = self
            .store
            .transaction(move |tx| {
                Box::pin(async move {
                    let changed = tx
                        .update(
                            T::TABLE,
                            &write.row,
                            &Self::key_filter(),
                            std::slice::from_ref(&write.key),
                        )
                        .await?;
                    if changed == 0 {
                        return Ok(false);
                    }
                    if let Some(data) = &write.change {
                        changelog::record(tx, ChangeType::Update, T::TABLE, &write.id, data)
                            .await?;
                    }
                    Ok(true)
                })
            })
            .await;

        match result {
            Ok(true) => {
                self.invalidate(std::slice::from_ref(&id));
                true
            }
            Ok(false) => false,
            Err(e) => {
                tracing::warn!(table = T::TABLE, id = %id, error = %e, "update failed");
                false
            }
        }
    }

    /// Returns `true` if a row was removed.
    pub async fn delete(&self, id: &T::Id) -> bool {
        matches!(self.remove(std::slice::from_ref(id)).await, Some(n) if n > 0)
    }

    /// Removes every listed id in one transaction. Missing ids are ignored.
    pub async fn delete_all(&self, ids: &[T::Id]) -> bool {
        self.remove(ids).await.is_some()
    }

    async fn remove(&self, ids: &[T::Id]) -> Option<u64> {
        let targets: Vec<(String, Value)> = ids
            .iter()
            .map(|id| (id.to_string(), id.clone().into()))
            .collect();
        let names: Vec<String> = targets.iter().map(|(name, _)| name.clone()).collect();

        let result = self
            .store
            .transaction(move |tx| {
                Box::pin(async move {
                    let mut removed = 0;
                    for (name, key) in &targets {
                        let previous = if T::TRACK_CHANGES {
                            tx.find_row(T::TABLE, T::ID_COLUMN, key.clone()).await?
                        } else {
                            None
                        };
                        let n = tx
                            .delete(T::TABLE, &Self::key_filter(), std::slice::from_ref(key))
                            .await?;
                        if n > 0 {
                            if let Some(row) = previous {
                                let data = serde_json::to_value(T::from_row(&row)?)?;
                                changelog::record(tx, ChangeType::Delete, T::TABLE, name, &data)
                                    .await?;
                            }
                        }
                        removed += n;
                    }
                    Ok(removed)
                })
            })
            .await;

        match result {
            Ok(removed) => {
                self.invalidate(&names);
                Some(removed)
            }
            Err(e) => {
                tracing::warn!(table = T::TABLE, error = %e, "delete failed");
                None
            }
        }
    }

    fn prepare(entities: &[T]) -> Result<Vec<PreparedWrite>, serde_json::Error> {
        entities
            .iter()
            .map(|entity| -> Result<PreparedWrite, serde_json::Error> {
                let id = entity.id();
                let change = if T::TRACK_CHANGES {
                    Some(serde_json::to_value(entity)?)
                } else {
                    None
                };
                Ok(PreparedWrite {
                    id: id.to_string(),
                    key: id.into(),
                    row: entity.to_row(),
                    change,
                })
            })
            .collect()
    }

    fn invalidate(&self, ids: &[String]) {
        for id in ids {
            self.cache.invalidate_entity(T::TABLE, id);
        }
    }

    fn map_rows(&self, rows: Vec<Row>) -> Result<Vec<T>, StoreError> {
        rows.iter()
            .map(|row| T::from_row(row).map_err(StoreError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::changelog::ChangeStatus;
    use crate::models::{DivinationCase, DivinationMethod, Hexagram, Setting};
    use serde_json::json;

    async fn setup() -> (Store, CacheLayer) {
        let store = Store::open_in_memory().await.unwrap();
        let cache = CacheLayer::new(&CacheConfig::default());
        (store, cache)
    }

    fn hexagram(id: i64, name: &str) -> Hexagram {
        Hexagram::new(id, name, format!("{:06b}", id), 1, 1)
    }

    #[tokio::test]
    async fn test_find_by_id_populates_cache() {
        let (store, cache) = setup().await;
        let repo: Repository<Hexagram> = Repository::new(store, cache.clone());

        assert!(repo.save(&hexagram(1, "Qian")).await);
        assert_eq!(repo.find_by_id(&1).await.unwrap().unwrap().name, "Qian");
        assert!(cache.contains(&CacheKey::entity("hexagrams", 1)));

        assert_eq!(repo.find_by_id(&99).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_is_visible_to_next_read() {
        let (store, cache) = setup().await;
        let repo: Repository<Setting> = Repository::new(store, cache);

        assert!(repo.save(&Setting::new("theme", "dark")).await);
        assert_eq!(repo.find_by_id(&"theme".to_string()).await.unwrap().unwrap().value, "dark");

        assert!(repo.save(&Setting::new("theme", "light")).await);
        assert_eq!(repo.find_by_id(&"theme".to_string()).await.unwrap().unwrap().value, "light");
    }

    #[tokio::test]
    async fn test_write_invalidates_lists_and_counts() {
        let (store, cache) = setup().await;
        let repo: Repository<Hexagram> = Repository::new(store, cache);

        repo.save_all(&[hexagram(1, "Qian"), hexagram(2, "Kun")]).await;
        assert_eq!(repo.find_all(&PageRequest::new()).await.unwrap().len(), 2);
        assert_eq!(repo.count(None).await.unwrap(), 2);

        repo.save(&hexagram(3, "Zhun")).await;
        assert_eq!(repo.find_all(&PageRequest::new()).await.unwrap().len(), 3);
        assert_eq!(repo.count(None).await.unwrap(), 3);

        assert!(repo.delete(&1).await);
        assert_eq!(repo.count(None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_find_all_paging_and_order() {
        let (store, cache) = setup().await;
        let repo: Repository<Hexagram> = Repository::new(store, cache);
        let all: Vec<Hexagram> = (1..=5).map(|i| hexagram(i, &format!("H{}", i))).collect();
        repo.save_all(&all).await;

        let page = repo
            .find_all(&PageRequest::new().order_by("id DESC").limit(2).offset(1))
            .await
            .unwrap();
        let ids: Vec<i64> = page.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![4, 3]);
    }

    #[tokio::test]
    async fn test_find_where_bypasses_cache() {
        let (store, cache) = setup().await;
        let repo: Repository<Hexagram> = Repository::new(store, cache.clone());
        repo.save_all(&[hexagram(1, "Qian"), hexagram(2, "Kun")]).await;
        cache.clear();

        let found = repo
            .find_where(&Filter::new("name = ?", vec![Value::from("Kun")]))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_find_paged() {
        let (store, cache) = setup().await;
        let repo: Repository<Hexagram> = Repository::new(store, cache);
        let all: Vec<Hexagram> = (1..=5).map(|i| hexagram(i, "H")).collect();
        repo.save_all(&all).await;

        let first = repo.find_paged(1, 2, None).await.unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.total, 5);
        assert_eq!(first.total_pages, 3);
        assert!(first.has_next);

        let last = repo.find_paged(3, 2, None).await.unwrap();
        assert_eq!(last.items.len(), 1);
        assert_eq!(last.items[0].id, 5);
        assert!(!last.has_next);

        let filtered = repo
            .find_paged(0, 0, Some(&Filter::new("id > ?", vec![Value::from(3i64)])))
            .await
            .unwrap();
        assert_eq!(filtered.page, 1);
        assert_eq!(filtered.page_size, 1);
        assert_eq!(filtered.total, 2);
    }

    #[tokio::test]
    async fn test_update_missing_returns_false() {
        let (store, cache) = setup().await;
        let repo: Repository<Hexagram> = Repository::new(store, cache);

        assert!(!repo.update(&hexagram(7, "Shi")).await);

        repo.save(&hexagram(7, "Shi")).await;
        repo.find_by_id(&7).await.unwrap();
        assert!(repo.update(&hexagram(7, "Army")).await);
        assert_eq!(repo.find_by_id(&7).await.unwrap().unwrap().name, "Army");
    }

    #[tokio::test]
    async fn test_delete_missing_returns_false() {
        let (store, cache) = setup().await;
        let repo: Repository<Hexagram> = Repository::new(store, cache);
        assert!(!repo.delete(&42).await);
        assert!(repo.delete_all(&[41, 42]).await);
    }

    #[tokio::test]
    async fn test_tracked_writes_append_change_log() {
        let (store, cache) = setup().await;
        let repo: Repository<DivinationCase> = Repository::new(store.clone(), cache);

        let case = DivinationCase::new(DivinationMethod::Liuyao, "Move?")
            .with_id("abc123")
            .with_payload(json!({"lines": [7, 8, 9, 6, 7, 8]}));
        assert!(repo.save(&case).await);

        let mut edited = case.clone();
        edited.title = "Move house?".into();
        assert!(repo.update(&edited).await);
        assert!(repo.save(&edited).await);
        assert!(repo.delete(&"abc123".to_string()).await);

        let log = changelog::pending(&store, 10).await.unwrap();
        let kinds: Vec<ChangeType> = log.iter().map(|c| c.change_type).collect();
        assert_eq!(
            kinds,
            vec![ChangeType::Insert, ChangeType::Update, ChangeType::Update, ChangeType::Delete]
        );
        assert!(log.iter().all(|c| c.record_id == "abc123" && c.table_name == "cases"));
        assert!(log.iter().all(|c| c.sync_status == ChangeStatus::Pending));
        assert_eq!(log[3].record_data["title"], "Move house?");
    }

    #[tokio::test]
    async fn test_untracked_writes_skip_change_log() {
        let (store, cache) = setup().await;
        let repo: Repository<Setting> = Repository::new(store.clone(), cache);
        repo.save(&Setting::new("theme", "dark")).await;

        assert!(changelog::pending(&store, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_returns_false() {
        let (store, cache) = setup().await;
        let repo: Repository<Setting> = Repository::new(store.clone(), cache);

        store.pool().close().await;

        assert!(!repo.save(&Setting::new("theme", "dark")).await);
        assert!(!repo.delete(&"theme".to_string()).await);
    }
}
