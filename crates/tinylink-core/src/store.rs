use crate::error::Result;
use crate::record::{DeleteRequest, LinkRecord, NewLink, PutOutcome};
use async_trait::async_trait;

/// Storage contract for short links.
///
/// Implementations own their synchronization: the dedup check and the insert
/// in [`put`](LinkStore::put) and [`put_batch`](LinkStore::put_batch) must be
/// atomic with respect to concurrent callers.
#[async_trait]
pub trait LinkStore: Send + Sync + 'static {
    /// Inserts a new link.
    ///
    /// Returns `Err(AlreadyExists(existing))` if the `(original_url, owner_id)`
    /// pair already has an active code, and `Err(CodeTaken(code))` if the code
    /// belongs to another link.
    async fn put(&self, link: NewLink) -> Result<()>;

    /// Inserts a batch of links atomically and returns the outcome of every
    /// entry, in order.
    ///
    /// Entries whose pair already has an active code resolve to
    /// [`PutOutcome::Existing`] with that code. On error nothing from the
    /// batch is stored.
    async fn put_batch(&self, links: &[NewLink]) -> Result<Vec<PutOutcome>>;

    /// Fetches a record, deleted or not. Returns `Err(NotFound)` for codes
    /// that were never assigned.
    async fn get(&self, code: &str) -> Result<LinkRecord>;

    /// Lists every record of an owner, tombstones included.
    /// Returns `Err(NotFound)` if the owner has no records.
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<LinkRecord>>;

    /// Tombstones the subset of `codes` that are active and owned by `owner_id`.
    /// Other codes are ignored. Returns how many records were tombstoned.
    async fn mark_deleted(&self, codes: &[String], owner_id: &str) -> Result<u64>;

    /// Applies several deletion requests as one backend operation.
    async fn mark_deleted_many(&self, requests: &[DeleteRequest]) -> Result<u64> {
        let mut total = 0;
        for request in requests {
            total += self.mark_deleted(&request.codes, &request.owner_id).await?;
        }
        Ok(total)
    }

    /// Connectivity probe. Returns `Err(NotInitialized)` if the backend is not open.
    async fn ping(&self) -> Result<()>;

    /// Releases backend resources. Calling it again is a no-op.
    async fn close(&self) -> Result<()>;
}
