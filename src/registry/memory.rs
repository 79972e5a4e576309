use async_trait::async_trait;
use std::collections::hash_map::{DefaultHasher, Entry};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{check_owned, newest_first, paginate, InsertOutcome, Registry};
use crate::access::is_expired;
use crate::error::{CoreError, CoreResult};
use crate::model::{MediaRecord, Mutation, Page, Record, ResourceKind, Status};

const SHARDS: usize = 16;

type Shard = HashMap<(ResourceKind, String), Record>;

/// Process-local registry. Each code hashes to one shard, so writers only
/// contend with writers touching codes in the same shard.
pub struct MemoryRegistry {
    shards: Vec<Mutex<Shard>>,
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARDS).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, code: &str) -> MutexGuard<'_, Shard> {
        let mut h = DefaultHasher::new();
        code.hash(&mut h);
        let idx = (h.finish() as usize) % self.shards.len();
        self.shards[idx]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn collect<F>(&self, mut keep: F) -> Vec<Record>
    where
        F: FnMut(&Record) -> bool,
    {
        let mut out = Vec::new();
        for shard in &self.shards {
            let guard = shard.lock().unwrap_or_else(PoisonError::into_inner);
            out.extend(guard.values().filter(|r| keep(r)).cloned());
        }
        out
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn insert(&self, record: &Record) -> CoreResult<InsertOutcome> {
        let mut shard = self.shard(record.code());
        match shard.entry((record.kind(), record.code().to_string())) {
            Entry::Occupied(existing) => Ok(InsertOutcome::Occupied(existing.get().clone())),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    async fn get(&self, kind: ResourceKind, code: &str) -> CoreResult<Option<Record>> {
        let shard = self.shard(code);
        Ok(shard.get(&(kind, code.to_string())).cloned())
    }

    async fn update_owned(
        &self,
        kind: ResourceKind,
        code: &str,
        caller: &str,
        mutation: &Mutation,
        now: u64,
    ) -> CoreResult<Record> {
        let mut shard = self.shard(code);
        let record = shard
            .get_mut(&(kind, code.to_string()))
            .ok_or(CoreError::NotFound)?;
        check_owned(record, caller, now)?;
        record.apply(mutation)?;
        Ok(record.clone())
    }

    async fn transition(
        &self,
        kind: ResourceKind,
        code: &str,
        from: Status,
        to: Status,
    ) -> CoreResult<bool> {
        let mut shard = self.shard(code);
        match shard.get_mut(&(kind, code.to_string())) {
            Some(record) if record.status() == from => {
                record.set_status(to);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_owned(
        &self,
        kind: ResourceKind,
        owner: &str,
        page: u32,
        limit: u32,
        now: u64,
    ) -> CoreResult<Page> {
        let mut items = self.collect(|r| {
            r.kind() == kind
                && r.status() == Status::Active
                && !is_expired(r, now)
                && r.owner_id() == Some(owner)
        });
        newest_first(&mut items);
        Ok(paginate(items, page, limit))
    }

    async fn expired_media(&self, now: u64, limit: usize) -> CoreResult<Vec<MediaRecord>> {
        let found = self.collect(|r| r.status() == Status::Active && is_expired(r, now));
        Ok(found
            .into_iter()
            .filter_map(|r| match r {
                Record::Media(m) => Some(m),
                Record::Link(_) => None,
            })
            .take(limit)
            .collect())
    }
}
