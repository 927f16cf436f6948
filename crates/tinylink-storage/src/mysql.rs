use async_trait::async_trait;
use jiff::Timestamp;
use sha2::{Digest, Sha256};
use sqlx::mysql::MySqlRow;
use sqlx::{MySql, MySqlConnection, MySqlPool, QueryBuilder, Row};
use std::collections::HashMap;
use tinylink_core::{
    DeleteRequest, LinkError, LinkRecord, LinkStore, NewLink, PutOutcome, Result,
};
use tracing::debug;

const SCHEMA: &str = include_str!("../ddl/mysql/short_links.sql");

/// MySQL implementation of the [`LinkStore`] contract.
///
/// Soft delete is implemented with `deleted_at`. Codes are never reused,
/// tombstoned rows included. Dedup relies on the unique, nullable
/// `dedup_key` column: it holds a digest of the owner and URL while the
/// link is active and is cleared on delete, so uniqueness only applies to
/// active links.
#[derive(Debug, Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    /// Creates a store from an existing MySQL connection pool.
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Creates a store by opening a new MySQL connection pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = MySqlPool::connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Creates the `short_links` table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Distinguishes a duplicate pair from a code collision after a unique violation.
    async fn conflict_error(&self, code: &str, dedup_key: &str) -> Result<LinkError> {
        let existing = find_active_code(&self.pool, dedup_key).await?;
        Ok(match existing {
            Some(existing) => LinkError::AlreadyExists(existing),
            None => LinkError::CodeTaken(code.to_string()),
        })
    }
}

fn now_unix_seconds() -> i64 {
    Timestamp::now().as_second()
}

fn dedup_key(original_url: &str, owner_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(owner_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(original_url.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn map_sqlx_error(err: sqlx::Error) -> LinkError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolClosed => LinkError::NotInitialized,
        sqlx::Error::PoolTimedOut => LinkError::Timeout(message),
        sqlx::Error::WorkerCrashed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
            LinkError::Unavailable(message)
        }
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_) => LinkError::InvalidData(message),
        _ => LinkError::Query(message),
    }
}

fn record_from_row(row: &MySqlRow) -> Result<LinkRecord> {
    let deleted_at: Option<i64> = row.try_get("deleted_at").map_err(map_sqlx_error)?;
    Ok(LinkRecord {
        code: row.try_get("short_code").map_err(map_sqlx_error)?,
        original_url: row.try_get("original_url").map_err(map_sqlx_error)?,
        owner_id: row.try_get("owner_id").map_err(map_sqlx_error)?,
        deleted: deleted_at.is_some(),
    })
}

async fn find_active_code<'e, E>(executor: E, dedup_key: &str) -> Result<Option<String>>
where
    E: sqlx::Executor<'e, Database = MySql>,
{
    sqlx::query_scalar::<_, String>(
        r#"
        SELECT short_code
        FROM short_links
        WHERE dedup_key = ?
        LIMIT 1
        "#,
    )
    .bind(dedup_key)
    .fetch_optional(executor)
    .await
    .map_err(map_sqlx_error)
}

async fn insert_link<'e, E>(executor: E, link: &NewLink, dedup_key: &str) -> sqlx::Result<()>
where
    E: sqlx::Executor<'e, Database = MySql>,
{
    sqlx::query(
        r#"
        INSERT INTO short_links (short_code, original_url, owner_id, dedup_key, created_at, deleted_at)
        VALUES (?, ?, ?, ?, ?, NULL)
        "#,
    )
    .bind(link.code.as_str())
    .bind(link.original_url.as_str())
    .bind(link.owner_id.as_str())
    .bind(dedup_key)
    .bind(now_unix_seconds())
    .execute(executor)
    .await?;
    Ok(())
}

async fn tombstone(conn: &mut MySqlConnection, codes: &[String], owner_id: &str) -> Result<u64> {
    if codes.is_empty() {
        return Ok(0);
    }

    let mut builder = QueryBuilder::<MySql>::new("UPDATE short_links SET deleted_at = ");
    builder.push_bind(now_unix_seconds());
    builder.push(", dedup_key = NULL WHERE owner_id = ");
    builder.push_bind(owner_id);
    builder.push(" AND deleted_at IS NULL AND short_code IN (");
    let mut separated = builder.separated(", ");
    for code in codes {
        separated.push_bind(code.as_str());
    }
    separated.push_unseparated(")");

    let result = builder
        .build()
        .execute(conn)
        .await
        .map_err(map_sqlx_error)?;
    Ok(result.rows_affected())
}

#[async_trait]
impl LinkStore for MySqlStore {
    async fn put(&self, link: NewLink) -> Result<()> {
        link.validate()?;
        let key = dedup_key(&link.original_url, &link.owner_id);

        match insert_link(&self.pool, &link, &key).await {
            Ok(()) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(self.conflict_error(&link.code, &key).await?),
            Err(err) => Err(map_sqlx_error(err)),
        }
    }

    async fn put_batch(&self, links: &[NewLink]) -> Result<Vec<PutOutcome>> {
        for link in links {
            link.validate()?;
        }

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let mut outcomes = Vec::with_capacity(links.len());
        let mut seen: HashMap<String, PutOutcome> = HashMap::new();

        for link in links {
            let key = dedup_key(&link.original_url, &link.owner_id);
            if let Some(outcome) = seen.get(&key) {
                outcomes.push(outcome.clone());
                continue;
            }
            if let Some(existing) = find_active_code(&mut *tx, &key).await? {
                let outcome = PutOutcome::Existing(existing);
                seen.insert(key, outcome.clone());
                outcomes.push(outcome);
                continue;
            }
            match insert_link(&mut *tx, link, &key).await {
                Ok(()) => {
                    let outcome = PutOutcome::Created(link.code.clone());
                    seen.insert(key, outcome.clone());
                    outcomes.push(outcome);
                }
                // Either the code is taken or a concurrent writer just claimed
                // the pair. Both are resolved by the caller's next attempt,
                // which sees the winner through `find_active_code`.
                Err(err) if is_unique_violation(&err) => {
                    return Err(LinkError::CodeTaken(link.code.clone()));
                }
                Err(err) => return Err(map_sqlx_error(err)),
            }
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(outcomes)
    }

    async fn get(&self, code: &str) -> Result<LinkRecord> {
        if code.is_empty() {
            return Err(LinkError::EmptyKey);
        }

        let row = sqlx::query(
            r#"
            SELECT short_code, original_url, owner_id, deleted_at
            FROM short_links
            WHERE short_code = ?
            LIMIT 1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => record_from_row(&row),
            None => Err(LinkError::NotFound),
        }
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<LinkRecord>> {
        if owner_id.is_empty() {
            return Err(LinkError::EmptyUserId);
        }

        let rows = sqlx::query(
            r#"
            SELECT short_code, original_url, owner_id, deleted_at
            FROM short_links
            WHERE owner_id = ?
            ORDER BY id
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if rows.is_empty() {
            return Err(LinkError::NotFound);
        }
        rows.iter().map(record_from_row).collect()
    }

    async fn mark_deleted(&self, codes: &[String], owner_id: &str) -> Result<u64> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        tombstone(&mut conn, codes, owner_id).await
    }

    async fn mark_deleted_many(&self, requests: &[DeleteRequest]) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let mut total = 0;
        for request in requests {
            total += tombstone(&mut tx, &request.codes, &request.owner_id).await?;
        }
        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(requests = requests.len(), tombstoned = total, "applied delete batch");
        Ok(total)
    }

    async fn ping(&self) -> Result<()> {
        if self.pool.is_closed() {
            return Err(LinkError::NotInitialized);
        }
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
