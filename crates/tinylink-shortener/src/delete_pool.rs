use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tinylink_core::{DeleteRequest, LinkError, LinkStore, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error};
use typed_builder::TypedBuilder;

#[derive(Debug, Clone, TypedBuilder)]
pub struct PoolSettings {
    /// Number of worker tasks.
    #[builder(default = 4)]
    pub workers: usize,
    /// Requests that can wait in the queue before `enqueue` blocks.
    #[builder(default = 1024)]
    pub queue_capacity: usize,
    /// Upper bound on requests folded into one store call.
    #[builder(default = 64)]
    pub batch_size: usize,
    /// How long a worker keeps collecting after the first request of a batch.
    #[builder(default = Duration::from_millis(50))]
    pub drain_window: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<DeleteRequest>>>;

/// Background pipeline that applies deletion requests as tombstones.
///
/// Requests go through a bounded queue shared by a fixed set of workers.
/// Each worker drains whatever arrives within `drain_window`, merges the
/// requests per owner and hands them to the store in a single
/// [`LinkStore::mark_deleted_many`] call. Failures are logged and dropped.
pub struct DeleteWorkerPool {
    sender: Mutex<Option<mpsc::Sender<DeleteRequest>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl DeleteWorkerPool {
    /// Starts the workers. Must be called from within a tokio runtime.
    pub fn spawn<S: LinkStore>(store: Arc<S>, settings: PoolSettings) -> Self {
        let (sender, receiver) = mpsc::channel(settings.queue_capacity.max(1));
        let receiver: SharedReceiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let workers = (0..settings.workers.max(1))
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    Arc::clone(&store),
                    Arc::clone(&receiver),
                    settings.clone(),
                ))
            })
            .collect();

        debug!(
            workers = settings.workers.max(1),
            queue_capacity = settings.queue_capacity,
            batch_size = settings.batch_size,
            "started delete worker pool"
        );

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        }
    }

    /// Queues a request, waiting only while the queue is full.
    ///
    /// Returns `Err(NotInitialized)` once the pool has been shut down.
    pub async fn enqueue(&self, request: DeleteRequest) -> Result<()> {
        let sender = self.sender.lock().clone();
        let Some(sender) = sender else {
            error!(owner_id = %request.owner_id, "delete pool is shut down, dropping request");
            return Err(LinkError::NotInitialized);
        };

        sender.send(request).await.map_err(|err| {
            error!(owner_id = %err.0.owner_id, "delete queue closed, dropping request");
            LinkError::NotInitialized
        })
    }

    /// Stops accepting requests and waits until every queued request is applied.
    pub async fn shutdown(&self) {
        drop(self.sender.lock().take());

        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(err) = worker.await {
                error!(error = %err, "delete worker panicked");
            }
        }
    }
}

async fn run_worker<S: LinkStore>(
    worker: usize,
    store: Arc<S>,
    receiver: SharedReceiver,
    settings: PoolSettings,
) {
    while let Some(batch) = next_batch(&receiver, &settings).await {
        let requests = coalesce(batch);
        match store.mark_deleted_many(&requests).await {
            Ok(tombstoned) => {
                debug!(worker, owners = requests.len(), tombstoned, "applied delete batch")
            }
            Err(err) => {
                error!(worker, owners = requests.len(), error = %err, "failed to apply delete batch")
            }
        }
    }
    debug!(worker, "delete worker stopped");
}

/// Waits for one request, then collects more until the drain window closes
/// or the batch is full. Returns `None` once the queue is closed and empty.
async fn next_batch(
    receiver: &SharedReceiver,
    settings: &PoolSettings,
) -> Option<Vec<DeleteRequest>> {
    let mut receiver = receiver.lock().await;
    let first = receiver.recv().await?;

    let batch_size = settings.batch_size.max(1);
    let deadline = Instant::now() + settings.drain_window;
    let mut batch = vec![first];
    while batch.len() < batch_size {
        match tokio::time::timeout_at(deadline, receiver.recv()).await {
            Ok(Some(request)) => batch.push(request),
            Ok(None) | Err(_) => break,
        }
    }
    Some(batch)
}

/// Merges requests by owner, dropping repeated codes.
fn coalesce(batch: Vec<DeleteRequest>) -> Vec<DeleteRequest> {
    let mut by_owner: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for request in batch {
        by_owner
            .entry(request.owner_id)
            .or_default()
            .extend(request.codes);
    }

    by_owner
        .into_iter()
        .map(|(owner_id, codes)| DeleteRequest {
            owner_id,
            codes: codes.into_iter().collect(),
        })
        .collect()
}
