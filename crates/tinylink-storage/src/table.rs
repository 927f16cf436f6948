use std::collections::{HashMap, HashSet};
use tinylink_core::{DeleteRequest, LinkError, LinkRecord, NewLink, PutOutcome, Result};

type PairKey = (String, String);

fn pair_key(original_url: &str, owner_id: &str) -> PairKey {
    (original_url.to_owned(), owner_id.to_owned())
}

/// Links to insert and the outcome of every batch entry.
#[derive(Debug, Default)]
pub struct BatchPlan {
    pub outcomes: Vec<PutOutcome>,
    pub inserts: Vec<NewLink>,
}

/// Unsynchronized link index shared by the in-memory and file backends.
///
/// Holds the primary `code -> record` map, the `(url, owner) -> code` dedup
/// index for active links, and a per-owner code list in insertion order.
/// Callers provide locking; `check_*`/`plan_*` methods never mutate, so a
/// failed check leaves the table untouched.
#[derive(Debug, Default, Clone)]
pub struct LinkTable {
    records: HashMap<String, LinkRecord>,
    dedup: HashMap<PairKey, String>,
    by_owner: HashMap<String, Vec<String>>,
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, code: &str) -> Option<&LinkRecord> {
        self.records.get(code)
    }

    pub fn active_code(&self, original_url: &str, owner_id: &str) -> Option<&String> {
        self.dedup.get(&pair_key(original_url, owner_id))
    }

    pub fn list_by_owner(&self, owner_id: &str) -> Vec<LinkRecord> {
        self.by_owner
            .get(owner_id)
            .map(|codes| {
                codes
                    .iter()
                    .filter_map(|code| self.records.get(code).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Validates a single insert against the current state.
    pub fn check_insert(&self, link: &NewLink) -> Result<()> {
        link.validate()?;
        if let Some(existing) = self.active_code(&link.original_url, &link.owner_id) {
            return Err(LinkError::AlreadyExists(existing.clone()));
        }
        if self.records.contains_key(&link.code) {
            return Err(LinkError::CodeTaken(link.code.clone()));
        }
        Ok(())
    }

    /// Inserts a link that already passed [`check_insert`](Self::check_insert)
    /// or [`plan_batch`](Self::plan_batch).
    pub fn insert(&mut self, link: NewLink) {
        self.dedup.insert(
            pair_key(&link.original_url, &link.owner_id),
            link.code.clone(),
        );
        self.by_owner
            .entry(link.owner_id.clone())
            .or_default()
            .push(link.code.clone());
        self.records.insert(link.code.clone(), link.into_record());
    }

    /// Resolves a batch against the current state without applying it.
    ///
    /// Pairs that are already active, or repeated within the batch, reuse
    /// their code. Any blank field or code collision fails the whole batch.
    pub fn plan_batch(&self, links: &[NewLink]) -> Result<BatchPlan> {
        for link in links {
            link.validate()?;
        }

        let mut plan = BatchPlan::default();
        let mut pending: HashMap<PairKey, String> = HashMap::new();
        let mut claimed: HashSet<&str> = HashSet::new();

        for link in links {
            let key = pair_key(&link.original_url, &link.owner_id);
            if let Some(code) = self.dedup.get(&key) {
                plan.outcomes.push(PutOutcome::Existing(code.clone()));
                continue;
            }
            if let Some(code) = pending.get(&key) {
                plan.outcomes.push(PutOutcome::Created(code.clone()));
                continue;
            }
            if self.records.contains_key(&link.code) || claimed.contains(link.code.as_str()) {
                return Err(LinkError::CodeTaken(link.code.clone()));
            }
            claimed.insert(link.code.as_str());
            pending.insert(key, link.code.clone());
            plan.outcomes.push(PutOutcome::Created(link.code.clone()));
            plan.inserts.push(link.clone());
        }

        Ok(plan)
    }

    pub fn apply_batch(&mut self, links: Vec<NewLink>) {
        for link in links {
            self.insert(link);
        }
    }

    /// Filters `codes` down to the active ones owned by `owner_id`, without duplicates.
    pub fn deletable(&self, codes: &[String], owner_id: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut deletable = Vec::new();
        for code in codes {
            let owned_and_active = self
                .records
                .get(code)
                .is_some_and(|record| record.owner_id == owner_id && !record.deleted);
            if owned_and_active && seen.insert(code.as_str()) {
                deletable.push(code.clone());
            }
        }
        deletable
    }

    /// Collects the deletable codes of several requests.
    pub fn deletable_many(&self, requests: &[DeleteRequest]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut codes = Vec::new();
        for request in requests {
            for code in self.deletable(&request.codes, &request.owner_id) {
                if seen.insert(code.clone()) {
                    codes.push(code);
                }
            }
        }
        codes
    }

    /// Tombstones the given codes and drops them from the dedup index.
    /// Returns how many records changed state.
    pub fn tombstone(&mut self, codes: &[String]) -> u64 {
        let mut changed = 0;
        for code in codes {
            let Some(record) = self.records.get_mut(code) else {
                continue;
            };
            if record.deleted {
                continue;
            }
            record.deleted = true;
            changed += 1;

            let key = pair_key(&record.original_url, &record.owner_id);
            if self.dedup.get(&key) == Some(code) {
                self.dedup.remove(&key);
            }
        }
        changed
    }
}
