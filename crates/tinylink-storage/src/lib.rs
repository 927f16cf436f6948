//! Storage backends implementing [`LinkStore`].

pub mod file;
pub mod memory;
pub mod mysql;
pub mod table;

pub use file::FileStore;
pub use memory::InMemoryStore;
pub use mysql::MySqlStore;
pub use table::LinkTable;
pub use tinylink_core::{LinkError, LinkStore};
