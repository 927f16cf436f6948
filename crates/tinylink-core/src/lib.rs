//! Core types and traits for the tinylink URL shortener.
//!
//! This crate provides the record types, the error taxonomy and the
//! [`LinkStore`] contract shared by the storage backends and the
//! shortener service.

pub mod error;
pub mod record;
pub mod store;

pub use error::{LinkError, Result};
pub use record::{
    BatchEntry, BatchOutcome, BatchResult, DeleteRequest, LinkRecord, NewLink, PutOutcome,
    UserLink,
};
pub use store::LinkStore;
