use crate::delete_pool::{DeleteWorkerPool, PoolSettings};
use std::sync::Arc;
use tinylink_core::{
    BatchEntry, BatchOutcome, BatchResult, DeleteRequest, LinkError, LinkStore, NewLink,
    PutOutcome, Result, UserLink,
};
use tinylink_generator::Generator;
use tracing::{debug, error, warn};

/// How many codes are tried for one URL before giving up. In a batch the
/// limit applies to each entry separately.
pub const MAX_ATTEMPTS: u32 = 10;

/// Orchestrates code generation, storage and asynchronous deletion.
///
/// The service keeps no mutable state of its own: share it behind an `Arc`
/// and call it from as many tasks as needed. Conflicting writes are
/// serialized by the store.
pub struct LinkService<S, G> {
    store: Arc<S>,
    generator: G,
    deleter: DeleteWorkerPool,
}

impl<S: LinkStore, G: Generator> LinkService<S, G> {
    /// Creates the service and starts its delete workers.
    /// Must be called from within a tokio runtime.
    pub fn new(store: Arc<S>, generator: G, settings: PoolSettings) -> Self {
        let deleter = DeleteWorkerPool::spawn(Arc::clone(&store), settings);
        Self {
            store,
            generator,
            deleter,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Shortens `original_url` for `owner_id`.
    ///
    /// If the owner already shortened this URL, returns
    /// `Err(AlreadyExists(code))` carrying the existing code.
    pub async fn create_short_url(&self, original_url: &str, owner_id: &str) -> Result<String> {
        if original_url.is_empty() {
            return Err(LinkError::EmptyValue);
        }
        if owner_id.is_empty() {
            return Err(LinkError::EmptyUserId);
        }

        for attempt in 0..MAX_ATTEMPTS {
            let code = self.generator.generate(original_url, attempt);
            match self
                .store
                .put(NewLink::new(code.as_str(), original_url, owner_id))
                .await
            {
                Ok(()) => {
                    debug!(code = %code, owner_id = %owner_id, attempt, "created short url");
                    return Ok(code);
                }
                Err(LinkError::CodeTaken(taken)) => {
                    warn!(code = %taken, attempt, "short code collision, retrying");
                }
                Err(err) => return Err(err),
            }
        }

        error!(
            original_url = %original_url,
            attempts = MAX_ATTEMPTS,
            "exhausted short code attempts"
        );
        Err(LinkError::GenerationFailed {
            attempts: MAX_ATTEMPTS,
        })
    }

    /// Shortens every entry or none of them.
    ///
    /// Entries already shortened by this owner, or repeated in the batch,
    /// come back with their existing code. `any_existing` reports whether
    /// some entry was already shortened before this call.
    pub async fn batch_create_short_url(
        &self,
        entries: &[BatchEntry],
        owner_id: &str,
    ) -> Result<BatchOutcome> {
        if owner_id.is_empty() {
            return Err(LinkError::EmptyUserId);
        }
        if entries.iter().any(|entry| entry.original_url.is_empty()) {
            return Err(LinkError::EmptyValue);
        }
        if entries.is_empty() {
            return Ok(BatchOutcome {
                results: Vec::new(),
                any_existing: false,
            });
        }

        let mut attempts = vec![0u32; entries.len()];
        let mut round = 0u32;
        loop {
            let links: Vec<NewLink> = entries
                .iter()
                .zip(&attempts)
                .map(|(entry, &attempt)| {
                    NewLink::new(
                        self.generator.generate(&entry.original_url, attempt),
                        entry.original_url.as_str(),
                        owner_id,
                    )
                })
                .collect();

            match self.store.put_batch(&links).await {
                Ok(outcomes) => {
                    let any_existing = outcomes.iter().any(PutOutcome::is_existing);
                    debug!(
                        owner_id = %owner_id,
                        entries = entries.len(),
                        round,
                        any_existing,
                        "created batch"
                    );
                    let results = entries
                        .iter()
                        .zip(outcomes)
                        .map(|(entry, outcome)| BatchResult {
                            correlation_id: entry.correlation_id.clone(),
                            code: outcome.into_code(),
                        })
                        .collect();
                    return Ok(BatchOutcome {
                        results,
                        any_existing,
                    });
                }
                Err(LinkError::CodeTaken(taken)) => {
                    warn!(code = %taken, round, "short code collision in batch, retrying");
                    let mut bumped = false;
                    for (link, attempt) in links.iter().zip(attempts.iter_mut()) {
                        if link.code == taken {
                            *attempt += 1;
                            bumped = true;
                        }
                    }
                    if !bumped {
                        return Err(LinkError::CodeTaken(taken));
                    }
                    if attempts.iter().any(|&attempt| attempt >= MAX_ATTEMPTS) {
                        break;
                    }
                    round += 1;
                }
                Err(err) => return Err(err),
            }
        }

        error!(
            owner_id = %owner_id,
            entries = entries.len(),
            rounds = round + 1,
            attempts = MAX_ATTEMPTS,
            "exhausted short code attempts for batch entry"
        );
        Err(LinkError::GenerationFailed {
            attempts: MAX_ATTEMPTS,
        })
    }

    /// Resolves a code. Tombstoned codes yield `Err(AlreadyDeleted)`.
    pub async fn get_long_url(&self, code: &str) -> Result<String> {
        let record = self.store.get(code).await?;
        if record.deleted {
            return Err(LinkError::AlreadyDeleted);
        }
        Ok(record.original_url)
    }

    /// Lists the owner's active links in creation order.
    pub async fn get_user_urls(&self, owner_id: &str) -> Result<Vec<UserLink>> {
        let links: Vec<UserLink> = self
            .store
            .list_by_owner(owner_id)
            .await?
            .into_iter()
            .filter(|record| !record.deleted)
            .map(UserLink::from)
            .collect();

        if links.is_empty() {
            return Err(LinkError::NotFound);
        }
        Ok(links)
    }

    /// Queues `codes` for deletion and returns without waiting for the result.
    ///
    /// Codes that are unknown, already deleted or owned by someone else are
    /// ignored when the request is applied.
    pub async fn delete_urls(&self, owner_id: &str, codes: Vec<String>) -> Result<()> {
        if owner_id.is_empty() {
            return Err(LinkError::EmptyUserId);
        }
        if codes.is_empty() {
            return Ok(());
        }

        self.deleter
            .enqueue(DeleteRequest {
                owner_id: owner_id.to_string(),
                codes,
            })
            .await
    }

    pub async fn check_db_connection(&self) -> Result<()> {
        self.store.ping().await
    }

    /// Stops accepting deletions and waits for the queued ones to be applied.
    pub async fn shutdown(&self) {
        self.deleter.shutdown().await;
    }
}
