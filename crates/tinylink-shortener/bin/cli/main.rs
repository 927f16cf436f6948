mod cli;

use crate::cli::{Command, LogFormatArg, StorageBackendArg, CLI};
use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tinylink_core::{BatchEntry, LinkError, LinkStore};
use tinylink_generator::{Generator, HashGenerator, HashGeneratorSettings};
use tinylink_shortener::LinkService;
use tinylink_storage::{FileStore, InMemoryStore, MySqlStore};
use tokio::io::AsyncReadExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Serialize)]
struct ShortenOutput {
    code: String,
    created: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CLI::parse();
    init_tracing(config.log_format);

    info!(storage_backend = %config.storage, "starting tinylink");

    match config.storage {
        StorageBackendArg::InMemory => run(Arc::new(InMemoryStore::new()), &config).await,
        StorageBackendArg::File => {
            let store = FileStore::open(&config.file_path)
                .await
                .with_context(|| format!("opening {}", config.file_path.display()))?;
            run(Arc::new(store), &config).await
        }
        StorageBackendArg::Mysql => {
            let mysql_dsn = config
                .mysql_dsn
                .as_deref()
                .context("mysql dsn is required when storage backend is mysql")?;
            let store = MySqlStore::connect(mysql_dsn).await?;
            store.ensure_schema().await?;
            run(Arc::new(store), &config).await
        }
    }
}

fn init_tracing(format: LogFormatArg) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormatArg::Json => builder.json().init(),
        LogFormatArg::Text => builder.init(),
    }
}

async fn run<S: LinkStore>(store: Arc<S>, config: &CLI) -> anyhow::Result<()> {
    let generator = HashGenerator::new(
        HashGeneratorSettings::builder()
            .length(config.code_length)
            .build(),
    );
    let service = LinkService::new(Arc::clone(&store), generator, config.pool_settings());

    let outcome = execute(&service, &config.command).await;

    // Queued deletions must reach the store before it is closed.
    service.shutdown().await;
    store.close().await?;

    let output = outcome?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn execute<S: LinkStore, G: Generator>(
    service: &LinkService<S, G>,
    command: &Command,
) -> anyhow::Result<Value> {
    let output = match command {
        Command::Shorten { owner, url } => {
            let output = match service.create_short_url(url, owner).await {
                Ok(code) => ShortenOutput {
                    code,
                    created: true,
                },
                Err(LinkError::AlreadyExists(code)) => ShortenOutput {
                    code,
                    created: false,
                },
                Err(err) => return Err(err.into()),
            };
            serde_json::to_value(output)?
        }
        Command::Batch { owner, input } => {
            let raw = match input {
                Some(path) => tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?,
                None => {
                    let mut raw = String::new();
                    tokio::io::stdin().read_to_string(&mut raw).await?;
                    raw
                }
            };
            let entries: Vec<BatchEntry> =
                serde_json::from_str(&raw).context("parsing batch entries")?;
            serde_json::to_value(service.batch_create_short_url(&entries, owner).await?)?
        }
        Command::Resolve { code } => {
            serde_json::json!({ "original_url": service.get_long_url(code).await? })
        }
        Command::List { owner } => serde_json::to_value(service.get_user_urls(owner).await?)?,
        Command::Delete { owner, codes } => {
            service.delete_urls(owner, codes.clone()).await?;
            serde_json::json!({ "queued": codes.len() })
        }
        Command::Ping => {
            service.check_db_connection().await?;
            serde_json::json!({ "status": "ok" })
        }
    };
    Ok(output)
}
