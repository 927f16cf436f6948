use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;
use tinylink_shortener::PoolSettings;

pub const STORAGE_BACKEND_ENV: &str = "TINYLINK_STORAGE_BACKEND";
pub const FILE_PATH_ENV: &str = "TINYLINK_FILE_PATH";
pub const MYSQL_DSN_ENV: &str = "TINYLINK_MYSQL_DSN";
pub const CODE_LENGTH_ENV: &str = "TINYLINK_CODE_LENGTH";
pub const DELETE_WORKERS_ENV: &str = "TINYLINK_DELETE_WORKERS";
pub const DELETE_QUEUE_CAPACITY_ENV: &str = "TINYLINK_DELETE_QUEUE_CAPACITY";
pub const DELETE_BATCH_SIZE_ENV: &str = "TINYLINK_DELETE_BATCH_SIZE";
pub const DELETE_DRAIN_WINDOW_MS_ENV: &str = "TINYLINK_DELETE_DRAIN_WINDOW_MS";
pub const LOG_FORMAT_ENV: &str = "TINYLINK_LOG_FORMAT";

pub const DEFAULT_FILE_PATH: &str = "tinylink.jsonl";
pub const DEFAULT_CODE_LENGTH: usize = 8;
pub const DEFAULT_DELETE_WORKERS: usize = 4;
pub const DEFAULT_DELETE_QUEUE_CAPACITY: usize = 1024;
pub const DEFAULT_DELETE_BATCH_SIZE: usize = 64;
pub const DEFAULT_DELETE_DRAIN_WINDOW_MS: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackendArg {
    #[value(name = "in-memory")]
    InMemory,
    #[value(name = "file")]
    File,
    #[value(name = "mysql")]
    Mysql,
}

impl Display for StorageBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackendArg::InMemory => write!(f, "in-memory"),
            StorageBackendArg::File => write!(f, "file"),
            StorageBackendArg::Mysql => write!(f, "mysql"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "tinylink", about = "Shorten, resolve and delete links")]
pub struct CLI {
    #[arg(
        long,
        global = true,
        env = STORAGE_BACKEND_ENV,
        value_enum,
        default_value_t = StorageBackendArg::File
    )]
    pub storage: StorageBackendArg,

    #[arg(long, global = true, env = FILE_PATH_ENV, default_value = DEFAULT_FILE_PATH)]
    pub file_path: PathBuf,

    #[arg(long, global = true, env = MYSQL_DSN_ENV, required_if_eq("storage", "mysql"))]
    pub mysql_dsn: Option<String>,

    #[arg(long, global = true, env = CODE_LENGTH_ENV, default_value_t = DEFAULT_CODE_LENGTH)]
    pub code_length: usize,

    #[arg(long, global = true, env = DELETE_WORKERS_ENV, default_value_t = DEFAULT_DELETE_WORKERS)]
    pub delete_workers: usize,

    #[arg(
        long,
        global = true,
        env = DELETE_QUEUE_CAPACITY_ENV,
        default_value_t = DEFAULT_DELETE_QUEUE_CAPACITY
    )]
    pub delete_queue_capacity: usize,

    #[arg(
        long,
        global = true,
        env = DELETE_BATCH_SIZE_ENV,
        default_value_t = DEFAULT_DELETE_BATCH_SIZE
    )]
    pub delete_batch_size: usize,

    #[arg(
        long,
        global = true,
        env = DELETE_DRAIN_WINDOW_MS_ENV,
        default_value_t = DEFAULT_DELETE_DRAIN_WINDOW_MS
    )]
    pub delete_drain_window_ms: u64,

    #[arg(
        long,
        global = true,
        env = LOG_FORMAT_ENV,
        value_enum,
        default_value_t = LogFormatArg::Text
    )]
    pub log_format: LogFormatArg,

    #[command(subcommand)]
    pub command: Command,
}

impl CLI {
    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings::builder()
            .workers(self.delete_workers)
            .queue_capacity(self.delete_queue_capacity)
            .batch_size(self.delete_batch_size)
            .drain_window(Duration::from_millis(self.delete_drain_window_ms))
            .build()
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Shorten one URL.
    Shorten {
        #[arg(long)]
        owner: String,
        url: String,
    },
    /// Shorten a JSON array of `{"correlation_id", "original_url"}` entries.
    Batch {
        #[arg(long)]
        owner: String,
        /// Reads stdin when omitted.
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Print the original URL of a code.
    Resolve { code: String },
    /// List an owner's active links.
    List {
        #[arg(long)]
        owner: String,
    },
    /// Delete codes owned by `owner`.
    Delete {
        #[arg(long)]
        owner: String,
        #[arg(required = true)]
        codes: Vec<String>,
    },
    /// Check the storage backend.
    Ping,
}
