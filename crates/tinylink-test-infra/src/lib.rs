//! Disposable containers for integration tests.

mod error;
pub mod mysql;

pub use error::{Result, TestInfraError};
