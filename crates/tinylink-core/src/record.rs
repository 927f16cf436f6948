use crate::error::{LinkError, Result};
use serde::{Deserialize, Serialize};

/// A stored short link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    /// The short code, unique for the lifetime of the store.
    pub code: String,
    /// The original URL that was shortened.
    pub original_url: String,
    /// The user that created the link.
    pub owner_id: String,
    /// Tombstone flag. Once set it is never cleared.
    pub deleted: bool,
}

/// Input for inserting a new link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLink {
    pub code: String,
    pub original_url: String,
    pub owner_id: String,
}

impl NewLink {
    pub fn new(
        code: impl Into<String>,
        original_url: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            original_url: original_url.into(),
            owner_id: owner_id.into(),
        }
    }

    /// Rejects blank fields.
    pub fn validate(&self) -> Result<()> {
        if self.code.is_empty() {
            return Err(LinkError::EmptyKey);
        }
        if self.original_url.is_empty() {
            return Err(LinkError::EmptyValue);
        }
        if self.owner_id.is_empty() {
            return Err(LinkError::EmptyUserId);
        }
        Ok(())
    }

    pub fn into_record(self) -> LinkRecord {
        LinkRecord {
            code: self.code,
            original_url: self.original_url,
            owner_id: self.owner_id,
            deleted: false,
        }
    }
}

/// A single fire-and-forget deletion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub owner_id: String,
    pub codes: Vec<String>,
}

/// One entry of a batch shortening request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub correlation_id: String,
    pub original_url: String,
}

/// The code assigned to one [`BatchEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub correlation_id: String,
    pub code: String,
}

/// Where the code of one batch entry came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    /// Inserted by the batch, or shared with an earlier entry of the same batch.
    Created(String),
    /// The `(original_url, owner_id)` pair already had this active code.
    Existing(String),
}

impl PutOutcome {
    pub fn code(&self) -> &str {
        match self {
            PutOutcome::Created(code) | PutOutcome::Existing(code) => code,
        }
    }

    pub fn is_existing(&self) -> bool {
        matches!(self, PutOutcome::Existing(_))
    }

    pub fn into_code(self) -> String {
        match self {
            PutOutcome::Created(code) | PutOutcome::Existing(code) => code,
        }
    }
}

/// Codes assigned to a batch, in request order.
///
/// `any_existing` is set when at least one entry was already shortened by
/// the owner, the batch counterpart of [`LinkError::AlreadyExists`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub results: Vec<BatchResult>,
    pub any_existing: bool,
}

/// An active link as returned to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLink {
    pub code: String,
    pub original_url: String,
}

impl From<LinkRecord> for UserLink {
    fn from(record: LinkRecord) -> Self {
        Self {
            code: record.code,
            original_url: record.original_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_complete_link() {
        let link = NewLink::new("abc12345", "https://example.com", "u1");
        assert!(link.validate().is_ok());
    }

    #[test]
    fn validate_reports_first_blank_field() {
        assert_eq!(
            NewLink::new("", "https://example.com", "u1").validate(),
            Err(LinkError::EmptyKey)
        );
        assert_eq!(
            NewLink::new("abc", "", "u1").validate(),
            Err(LinkError::EmptyValue)
        );
        assert_eq!(
            NewLink::new("abc", "https://example.com", "").validate(),
            Err(LinkError::EmptyUserId)
        );
    }

    #[test]
    fn put_outcome_exposes_code() {
        let created = PutOutcome::Created("abc".to_string());
        let existing = PutOutcome::Existing("def".to_string());

        assert_eq!(created.code(), "abc");
        assert!(!created.is_existing());
        assert!(existing.is_existing());
        assert_eq!(existing.into_code(), "def");
    }

    #[test]
    fn into_record_starts_active() {
        let record = NewLink::new("abc", "https://example.com", "u1").into_record();
        assert!(!record.deleted);
        assert_eq!(record.owner_id, "u1");
    }
}
