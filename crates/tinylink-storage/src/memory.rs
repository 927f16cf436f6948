use crate::table::LinkTable;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tinylink_core::{
    DeleteRequest, LinkError, LinkRecord, LinkStore, NewLink, PutOutcome, Result,
};

/// In-memory implementation of [`LinkStore`].
///
/// The whole table sits behind one `RwLock`: every dedup check runs under
/// the same write guard as the insert it protects, so concurrent `put`s of
/// a new pair have exactly one winner.
#[derive(Debug)]
pub struct InMemoryStore {
    table: RwLock<LinkTable>,
    open: AtomicBool,
}

impl InMemoryStore {
    /// Creates a new, open, empty store.
    pub fn new() -> Self {
        Self {
            table: RwLock::new(LinkTable::new()),
            open: AtomicBool::new(true),
        }
    }

    /// Number of stored records, tombstones included.
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(LinkError::NotInitialized)
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LinkStore for InMemoryStore {
    async fn put(&self, link: NewLink) -> Result<()> {
        self.ensure_open()?;
        let mut table = self.table.write();
        table.check_insert(&link)?;
        table.insert(link);
        Ok(())
    }

    async fn put_batch(&self, links: &[NewLink]) -> Result<Vec<PutOutcome>> {
        self.ensure_open()?;
        let mut table = self.table.write();
        let plan = table.plan_batch(links)?;
        table.apply_batch(plan.inserts);
        Ok(plan.outcomes)
    }

    async fn get(&self, code: &str) -> Result<LinkRecord> {
        self.ensure_open()?;
        if code.is_empty() {
            return Err(LinkError::EmptyKey);
        }
        self.table
            .read()
            .get(code)
            .cloned()
            .ok_or(LinkError::NotFound)
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<LinkRecord>> {
        self.ensure_open()?;
        if owner_id.is_empty() {
            return Err(LinkError::EmptyUserId);
        }
        let records = self.table.read().list_by_owner(owner_id);
        if records.is_empty() {
            return Err(LinkError::NotFound);
        }
        Ok(records)
    }

    async fn mark_deleted(&self, codes: &[String], owner_id: &str) -> Result<u64> {
        self.ensure_open()?;
        let mut table = self.table.write();
        let deletable = table.deletable(codes, owner_id);
        Ok(table.tombstone(&deletable))
    }

    async fn mark_deleted_many(&self, requests: &[DeleteRequest]) -> Result<u64> {
        self.ensure_open()?;
        let mut table = self.table.write();
        let deletable = table.deletable_many(requests);
        Ok(table.tombstone(&deletable))
    }

    async fn ping(&self) -> Result<()> {
        self.ensure_open()
    }

    async fn close(&self) -> Result<()> {
        self.open.store(false, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn link(code: &str, url: &str, owner: &str) -> NewLink {
        NewLink::new(code, url, owner)
    }

    fn codes(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[tokio::test]
    async fn put_and_get() {
        let store = InMemoryStore::new();

        store
            .put(link("abc123", "https://example.com", "u1"))
            .await
            .unwrap();

        let record = store.get("abc123").await.unwrap();
        assert_eq!(record.original_url, "https://example.com");
        assert_eq!(record.owner_id, "u1");
        assert!(!record.deleted);
    }

    #[tokio::test]
    async fn get_unknown_code() {
        let store = InMemoryStore::new();
        assert_eq!(store.get("nope").await, Err(LinkError::NotFound));
    }

    #[tokio::test]
    async fn put_rejects_blank_fields() {
        let store = InMemoryStore::new();

        assert_eq!(
            store.put(link("", "https://example.com", "u1")).await,
            Err(LinkError::EmptyKey)
        );
        assert_eq!(
            store.put(link("abc", "", "u1")).await,
            Err(LinkError::EmptyValue)
        );
        assert_eq!(
            store.put(link("abc", "https://example.com", "")).await,
            Err(LinkError::EmptyUserId)
        );
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn put_same_pair_returns_existing_code() {
        let store = InMemoryStore::new();
        store
            .put(link("first", "https://example.com", "u1"))
            .await
            .unwrap();

        let err = store
            .put(link("second", "https://example.com", "u1"))
            .await
            .unwrap_err();

        assert_eq!(err, LinkError::AlreadyExists("first".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn put_same_url_for_other_owner_is_allowed() {
        let store = InMemoryStore::new();
        store
            .put(link("first", "https://example.com", "u1"))
            .await
            .unwrap();
        store
            .put(link("second", "https://example.com", "u2"))
            .await
            .unwrap();

        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn put_code_collision() {
        let store = InMemoryStore::new();
        store
            .put(link("abc", "https://one.example", "u1"))
            .await
            .unwrap();

        let err = store
            .put(link("abc", "https://two.example", "u1"))
            .await
            .unwrap_err();

        assert_eq!(err, LinkError::CodeTaken("abc".to_string()));
    }

    #[tokio::test]
    async fn put_batch_is_all_or_nothing() {
        let store = InMemoryStore::new();
        store
            .put(link("taken", "https://taken.example", "u2"))
            .await
            .unwrap();

        let err = store
            .put_batch(&[
                link("a", "https://a.example", "u1"),
                link("taken", "https://b.example", "u1"),
            ])
            .await
            .unwrap_err();

        assert_eq!(err, LinkError::CodeTaken("taken".to_string()));
        assert_eq!(store.get("a").await, Err(LinkError::NotFound));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn put_batch_resolves_existing_pairs() {
        let store = InMemoryStore::new();
        store
            .put(link("old", "https://a.example", "u1"))
            .await
            .unwrap();

        let result = store
            .put_batch(&[
                link("x", "https://a.example", "u1"),
                link("y", "https://b.example", "u1"),
            ])
            .await
            .unwrap();

        assert_eq!(
            result,
            vec![
                PutOutcome::Existing("old".to_string()),
                PutOutcome::Created("y".to_string()),
            ]
        );
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn list_by_owner_includes_tombstones() {
        let store = InMemoryStore::new();
        store.put(link("a", "https://a.example", "u1")).await.unwrap();
        store.put(link("b", "https://b.example", "u1")).await.unwrap();
        store.put(link("c", "https://c.example", "u2")).await.unwrap();
        store.mark_deleted(&codes(&["b"]), "u1").await.unwrap();

        let records = store.list_by_owner("u1").await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(!records[0].deleted);
        assert!(records[1].deleted);

        assert_eq!(store.list_by_owner("u3").await, Err(LinkError::NotFound));
    }

    #[tokio::test]
    async fn mark_deleted_only_touches_owned_codes() {
        let store = InMemoryStore::new();
        store.put(link("a", "https://a.example", "u1")).await.unwrap();
        store.put(link("b", "https://b.example", "u2")).await.unwrap();

        let deleted = store
            .mark_deleted(&codes(&["a", "b", "unknown"]), "u1")
            .await
            .unwrap();

        assert_eq!(deleted, 1);
        assert!(store.get("a").await.unwrap().deleted);
        assert!(!store.get("b").await.unwrap().deleted);
    }

    #[tokio::test]
    async fn mark_deleted_is_idempotent() {
        let store = InMemoryStore::new();
        store.put(link("a", "https://a.example", "u1")).await.unwrap();

        assert_eq!(store.mark_deleted(&codes(&["a"]), "u1").await.unwrap(), 1);
        assert_eq!(store.mark_deleted(&codes(&["a"]), "u1").await.unwrap(), 0);
        assert!(store.get("a").await.unwrap().deleted);
    }

    #[tokio::test]
    async fn mark_deleted_many_applies_every_owner() {
        let store = InMemoryStore::new();
        store.put(link("a", "https://a.example", "u1")).await.unwrap();
        store.put(link("b", "https://b.example", "u2")).await.unwrap();

        let deleted = store
            .mark_deleted_many(&[
                DeleteRequest {
                    owner_id: "u1".to_string(),
                    codes: codes(&["a", "b"]),
                },
                DeleteRequest {
                    owner_id: "u2".to_string(),
                    codes: codes(&["b"]),
                },
            ])
            .await
            .unwrap();

        assert_eq!(deleted, 2);
        assert!(store.get("a").await.unwrap().deleted);
        assert!(store.get("b").await.unwrap().deleted);
    }

    #[tokio::test]
    async fn mark_deleted_many_with_large_request() {
        let store = InMemoryStore::new();
        let mut all = Vec::new();
        for i in 0..20_000 {
            let code = format!("c{i}");
            store
                .put(link(&code, &format!("https://example.com/{i}"), "u1"))
                .await
                .unwrap();
            all.push(code);
        }

        let request = DeleteRequest {
            owner_id: "u1".to_string(),
            codes: all.clone(),
        };
        let deleted = store
            .mark_deleted_many(&[request.clone(), request])
            .await
            .unwrap();

        assert_eq!(deleted, 20_000);
        assert!(store.get("c19999").await.unwrap().deleted);
    }

    #[tokio::test]
    async fn ping_and_close() {
        let store = InMemoryStore::new();
        store.ping().await.unwrap();

        store.close().await.unwrap();
        store.close().await.unwrap();

        assert_eq!(store.ping().await, Err(LinkError::NotInitialized));
        assert_eq!(store.get("abc").await, Err(LinkError::NotInitialized));
    }

    #[tokio::test]
    async fn concurrent_puts_of_same_pair_have_one_winner() {
        let store = Arc::new(InMemoryStore::new());
        let mut handles = vec![];

        for i in 0..16u32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .put(link(&format!("code-{i:02}"), "https://example.com", "u1"))
                    .await
            }));
        }

        let mut winners = vec![];
        let mut reported = vec![];
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => winners.push(()),
                Err(LinkError::AlreadyExists(code)) => reported.push(code),
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(winners.len(), 1);
        assert_eq!(reported.len(), 15);
        let winner = store.list_by_owner("u1").await.unwrap();
        assert_eq!(winner.len(), 1);
        assert!(reported.iter().all(|code| code == &winner[0].code));
    }
}
