//! SQLite-backed `ResponseCache`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::connection::SqliteStore;
use super::error_mapping::map_diesel_error;
use super::models::{CacheEntryRow, NewCacheEntryRow};
use super::schema::cache_entries;
use crate::domain::http::HeaderList;
use crate::domain::ports::{CacheNamespace, CachedResponse, ResponseCache, ResponseCacheError};

/// Response cache stored in the `cache_entries` table.
#[derive(Clone)]
pub struct SqliteResponseCache {
    store: SqliteStore,
}

impl SqliteResponseCache {
    pub fn new(store: SqliteStore) -> Self {
        Self { store }
    }
}

fn map_error(error: diesel::result::Error) -> ResponseCacheError {
    map_diesel_error(error, ResponseCacheError::backend, ResponseCacheError::backend)
}

fn decode(row: CacheEntryRow) -> Result<CachedResponse, ResponseCacheError> {
    let headers: HeaderList = serde_json::from_str(&row.headers)
        .map_err(|err| ResponseCacheError::serialization(format!("cached headers: {err}")))?;
    let status = u16::try_from(row.status)
        .map_err(|_| ResponseCacheError::serialization(format!("status {}", row.status)))?;
    let stored_at = DateTime::parse_from_rfc3339(&row.stored_at)
        .map_err(|err| ResponseCacheError::serialization(format!("stored_at: {err}")))?
        .with_timezone(&Utc);
    Ok(CachedResponse {
        status,
        headers,
        body: row.body,
        stored_at,
    })
}

#[async_trait]
impl ResponseCache for SqliteResponseCache {
    async fn get(
        &self,
        namespace: &CacheNamespace,
        url: &str,
    ) -> Result<Option<CachedResponse>, ResponseCacheError> {
        let mut conn = self.store.connection().await;
        let row: Option<CacheEntryRow> = cache_entries::table
            .filter(cache_entries::namespace.eq(namespace.as_str()))
            .filter(cache_entries::url.eq(url))
            .select(CacheEntryRow::as_select())
            .first(&mut *conn)
            .await
            .optional()
            .map_err(map_error)?;
        row.map(decode).transpose()
    }

    async fn put(
        &self,
        namespace: &CacheNamespace,
        url: &str,
        response: &CachedResponse,
    ) -> Result<(), ResponseCacheError> {
        let headers = serde_json::to_string(&response.headers)
            .map_err(|err| ResponseCacheError::serialization(err.to_string()))?;
        let row = NewCacheEntryRow {
            namespace: namespace.as_str(),
            url,
            status: i32::from(response.status),
            headers,
            body: &response.body,
            stored_at: response.stored_at.to_rfc3339(),
        };
        let mut conn = self.store.connection().await;
        diesel::replace_into(cache_entries::table)
            .values(&row)
            .execute(&mut *conn)
            .await
            .map(drop)
            .map_err(map_error)
    }

    async fn namespaces(&self) -> Result<Vec<CacheNamespace>, ResponseCacheError> {
        let mut conn = self.store.connection().await;
        let names: Vec<String> = cache_entries::table
            .select(cache_entries::namespace)
            .distinct()
            .order(cache_entries::namespace.asc())
            .load(&mut *conn)
            .await
            .map_err(map_error)?;
        Ok(names.into_iter().map(CacheNamespace::new).collect())
    }

    async fn purge(&self, namespace: &CacheNamespace) -> Result<u64, ResponseCacheError> {
        let mut conn = self.store.connection().await;
        let removed = diesel::delete(
            cache_entries::table.filter(cache_entries::namespace.eq(namespace.as_str())),
        )
        .execute(&mut *conn)
        .await
        .map_err(map_error)?;
        Ok(u64::try_from(removed).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::domain::http::AgentResponse;
    use crate::outbound::persistence::StoreConfig;

    async fn cache() -> (tempfile::TempDir, SqliteResponseCache) {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let store = SqliteStore::open(StoreConfig::new(dir.path().join("cache.db")))
            .await
            .expect("open store");
        (dir, SqliteResponseCache::new(store))
    }

    fn entry(body: &str) -> CachedResponse {
        CachedResponse::capture(
            &AgentResponse::new(200, body.to_owned()).with_header("content-type", "application/json"),
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).single().expect("ts"),
        )
    }

    #[tokio::test]
    async fn stores_and_replaces_by_exact_url() {
        let (_dir, cache) = cache().await;
        let ns = CacheNamespace::api_for("v2.2.5");
        let url = "http://localhost:8000/api/v1/items?page=2";

        cache.put(&ns, url, &entry(r#"{"v":1}"#)).await.expect("put");
        cache.put(&ns, url, &entry(r#"{"v":2}"#)).await.expect("replace");

        assert_eq!(
            cache.get(&ns, url).await.expect("get"),
            Some(entry(r#"{"v":2}"#))
        );
        assert_eq!(
            cache
                .get(&ns, "http://localhost:8000/api/v1/items")
                .await
                .expect("get"),
            None
        );
    }

    #[tokio::test]
    async fn namespaces_are_listed_and_purged_independently() {
        let (_dir, cache) = cache().await;
        let old = CacheNamespace::static_for("v2.2.4");
        let current = CacheNamespace::static_for("v2.2.5");
        cache.put(&old, "http://localhost:5173/", &entry("a")).await.expect("put");
        cache.put(&old, "http://localhost:5173/offline.html", &entry("b")).await.expect("put");
        cache.put(&current, "http://localhost:5173/", &entry("c")).await.expect("put");

        assert_eq!(cache.namespaces().await.expect("list"), vec![old.clone(), current.clone()]);
        assert_eq!(cache.purge(&old).await.expect("purge"), 2);
        assert_eq!(cache.namespaces().await.expect("list"), vec![current.clone()]);
        assert!(cache.get(&current, "http://localhost:5173/").await.expect("get").is_some());
    }
}
