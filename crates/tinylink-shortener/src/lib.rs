//! Short-link service.
//!
//! [`LinkService`] ties a [`LinkStore`](tinylink_core::LinkStore) backend to a
//! [`Generator`](tinylink_generator::Generator) and owns the background
//! [`DeleteWorkerPool`] that applies deletions.

pub mod delete_pool;
pub mod service;

pub use delete_pool::{DeleteWorkerPool, PoolSettings};
pub use service::{LinkService, MAX_ATTEMPTS};
