use crate::table::LinkTable;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tinylink_core::{
    DeleteRequest, LinkError, LinkRecord, LinkStore, NewLink, PutOutcome, Result,
};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

/// One line of the journal.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum JournalEntry {
    Insert { links: Vec<NewLink> },
    Delete { codes: Vec<String> },
}

#[derive(Debug)]
struct FileState {
    table: LinkTable,
    journal: Option<File>,
    /// Journal length after the last complete line.
    len: u64,
}

/// File-backed implementation of [`LinkStore`].
///
/// Records live in memory and every mutation is appended to a JSON-lines
/// journal, which is replayed on [`open`](FileStore::open). An entry is
/// flushed to the journal before the in-memory table changes, and a write
/// that fails partway is cut back off the file, so a failed write leaves
/// both the table and the journal as they were. A batch is a single
/// journal line.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    state: Mutex<FileState>,
}

impl FileStore {
    /// Opens (or creates) the journal at `path` and replays it.
    ///
    /// A torn trailing line, left by a write that never completed, is
    /// dropped from the file. A corrupt line anywhere else fails the open.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut table = LinkTable::new();

        let tail = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => replay(&mut table, &contents)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Tail::Clean,
            Err(err) => return Err(err.into()),
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        if let Tail::Torn { valid_len } = tail {
            warn!(path = %path.display(), valid_len, "truncating torn journal tail");
            let file = OpenOptions::new().write(true).open(&path).await?;
            file.set_len(valid_len as u64).await?;
        }

        let mut journal = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        if let Tail::MissingNewline = tail {
            journal.write_all(b"\n").await?;
            journal.flush().await?;
        }
        let len = journal.metadata().await?.len();

        debug!(path = %path.display(), records = table.len(), "opened link journal");

        Ok(Self {
            path,
            state: Mutex::new(FileState {
                table,
                journal: Some(journal),
                len,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// State of the journal's last line after replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tail {
    Clean,
    MissingNewline,
    Torn { valid_len: usize },
}

fn replay(table: &mut LinkTable, contents: &str) -> Result<Tail> {
    let mut offset = 0;

    for (index, chunk) in contents.split_inclusive('\n').enumerate() {
        let complete = chunk.ends_with('\n');
        let line = chunk.trim_end();
        if !line.is_empty() {
            match serde_json::from_str::<JournalEntry>(line) {
                Ok(JournalEntry::Insert { links }) => table.apply_batch(links),
                Ok(JournalEntry::Delete { codes }) => {
                    table.tombstone(&codes);
                }
                Err(err) if !complete => {
                    warn!(error = %err, "skipping torn trailing journal line");
                    return Ok(Tail::Torn { valid_len: offset });
                }
                Err(err) => {
                    return Err(LinkError::InvalidData(format!(
                        "journal line {}: {err}",
                        index + 1
                    )))
                }
            }
        }
        offset += chunk.len();
        if !complete {
            return Ok(Tail::MissingNewline);
        }
    }

    Ok(Tail::Clean)
}

async fn write_line(journal: &mut File, line: &[u8]) -> Result<()> {
    journal.write_all(line).await?;
    journal.flush().await?;
    Ok(())
}

impl FileState {
    fn journal(&mut self) -> Result<&mut File> {
        self.journal.as_mut().ok_or(LinkError::NotInitialized)
    }

    /// Appends one entry as a complete line, or leaves the journal untouched.
    async fn append(&mut self, entry: &JournalEntry) -> Result<()> {
        let mut line =
            serde_json::to_vec(entry).map_err(|e| LinkError::InvalidData(e.to_string()))?;
        line.push(b'\n');

        let journal = self.journal()?;
        if let Err(err) = write_line(journal, &line).await {
            warn!(error = %err, "journal append failed, rolling back");
            self.rollback().await;
            return Err(err);
        }
        self.len += line.len() as u64;
        Ok(())
    }

    /// Cuts the journal back to its last complete line. If that fails the
    /// journal is closed and the store reports `NotInitialized` from then on.
    async fn rollback(&mut self) {
        let len = self.len;
        let Some(journal) = self.journal.as_mut() else {
            return;
        };
        if let Err(err) = journal.set_len(len).await {
            error!(error = %err, len, "failed to truncate torn journal line, closing journal");
            self.journal = None;
        }
    }

    async fn tombstone(&mut self, codes: Vec<String>) -> Result<u64> {
        if codes.is_empty() {
            return Ok(0);
        }
        self.append(&JournalEntry::Delete {
            codes: codes.clone(),
        })
        .await?;
        Ok(self.table.tombstone(&codes))
    }
}

#[async_trait]
impl LinkStore for FileStore {
    async fn put(&self, link: NewLink) -> Result<()> {
        let mut state = self.state.lock().await;
        state.journal()?;
        state.table.check_insert(&link)?;

        state
            .append(&JournalEntry::Insert {
                links: vec![link.clone()],
            })
            .await?;
        state.table.insert(link);
        Ok(())
    }

    async fn put_batch(&self, links: &[NewLink]) -> Result<Vec<PutOutcome>> {
        let mut state = self.state.lock().await;
        state.journal()?;
        let plan = state.table.plan_batch(links)?;
        if plan.inserts.is_empty() {
            return Ok(plan.outcomes);
        }

        state
            .append(&JournalEntry::Insert {
                links: plan.inserts.clone(),
            })
            .await?;
        state.table.apply_batch(plan.inserts);
        Ok(plan.outcomes)
    }

    async fn get(&self, code: &str) -> Result<LinkRecord> {
        if code.is_empty() {
            return Err(LinkError::EmptyKey);
        }
        let mut state = self.state.lock().await;
        state.journal()?;
        state.table.get(code).cloned().ok_or(LinkError::NotFound)
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<LinkRecord>> {
        if owner_id.is_empty() {
            return Err(LinkError::EmptyUserId);
        }
        let mut state = self.state.lock().await;
        state.journal()?;
        let records = state.table.list_by_owner(owner_id);
        if records.is_empty() {
            return Err(LinkError::NotFound);
        }
        Ok(records)
    }

    async fn mark_deleted(&self, codes: &[String], owner_id: &str) -> Result<u64> {
        let mut state = self.state.lock().await;
        state.journal()?;
        let deletable = state.table.deletable(codes, owner_id);
        state.tombstone(deletable).await
    }

    async fn mark_deleted_many(&self, requests: &[DeleteRequest]) -> Result<u64> {
        let mut state = self.state.lock().await;
        state.journal()?;
        let deletable = state.table.deletable_many(requests);
        state.tombstone(deletable).await
    }

    async fn ping(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.journal()?;
        tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| LinkError::Unavailable(format!("{}: {e}", self.path.display())))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(mut journal) = state.journal.take() {
            journal.flush().await?;
            journal.sync_all().await?;
            debug!(path = %self.path.display(), "closed link journal");
        }
        Ok(())
    }
}
