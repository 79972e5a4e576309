//! Durable mapping `code -> record`, one collection per [`ResourceKind`].
//!
//! Backends must provide two atomic primitives: an insert that never
//! overwrites an existing code (terminal records included, so a retired
//! code is never handed out again), and a status compare-and-swap. Owner
//! mutations check ownership against the state read in the same atomic step.

use async_trait::async_trait;

use crate::access::is_expired;
use crate::error::{CoreError, CoreResult};
use crate::model::{MediaRecord, Mutation, Page, Record, ResourceKind, Status};

pub mod dynamo;
pub mod memory;

pub use dynamo::DynamoRegistry;
pub use memory::MemoryRegistry;

/// Hard cap on `limit` for owner listings.
pub const MAX_LIST_LIMIT: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The code is taken; carries whatever currently holds it.
    Occupied(Record),
}

#[async_trait]
pub trait Registry: Send + Sync {
    async fn insert(&self, record: &Record) -> CoreResult<InsertOutcome>;

    /// Returns the record whatever its status.
    async fn get(&self, kind: ResourceKind, code: &str) -> CoreResult<Option<Record>>;

    /// Apply `mutation` iff the record is live and owned by `caller`.
    async fn update_owned(
        &self,
        kind: ResourceKind,
        code: &str,
        caller: &str,
        mutation: &Mutation,
        now: u64,
    ) -> CoreResult<Record>;

    /// `from -> to` status swap. `Ok(false)` when the record was no longer in
    /// `from`, which is the expected outcome for the losing side of a race.
    async fn transition(
        &self,
        kind: ResourceKind,
        code: &str,
        from: Status,
        to: Status,
    ) -> CoreResult<bool>;

    /// Live records of `owner`, newest first. `page` is 1-indexed. Media
    /// past its expiry at `now` is left out even if no sweep has flipped it.
    async fn list_owned(
        &self,
        kind: ResourceKind,
        owner: &str,
        page: u32,
        limit: u32,
        now: u64,
    ) -> CoreResult<Page>;

    /// Active media whose expiry has passed, at most `limit` of them.
    async fn expired_media(&self, now: u64, limit: usize) -> CoreResult<Vec<MediaRecord>>;
}

/// Ownership/liveness rule shared by every backend.
pub(crate) fn check_owned(record: &Record, caller: &str, now: u64) -> CoreResult<()> {
    if record.status().is_terminal() || is_expired(record, now) {
        return Err(CoreError::NotFound);
    }
    match record.owner_id() {
        Some(owner) if owner == caller => Ok(()),
        _ => Err(CoreError::Forbidden),
    }
}

/// Slice an already newest-first list.
pub(crate) fn paginate(mut items: Vec<Record>, page: u32, limit: u32) -> Page {
    let total = items.len() as u64;
    let limit = limit.min(MAX_LIST_LIMIT) as usize;
    let start = (page.saturating_sub(1) as usize).saturating_mul(limit);
    let items = if start >= items.len() {
        Vec::new()
    } else {
        items.drain(start..).take(limit).collect()
    };
    Page { items, total }
}

pub(crate) fn newest_first(items: &mut [Record]) {
    items.sort_by(|a, b| {
        b.created_at()
            .cmp(&a.created_at())
            .then_with(|| b.code().cmp(a.code()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ShortLinkRecord;

    fn link(code: &str, owner: Option<&str>, created_at: u64) -> Record {
        Record::Link(ShortLinkRecord {
            code: code.into(),
            owner_id: owner.map(str::to_string),
            lead_url: "https://example.com".into(),
            status: Status::Active,
            display_name: None,
            created_at,
        })
    }

    #[test]
    fn anonymous_records_are_never_owned() {
        let rec = link("a", None, 1);
        assert!(matches!(check_owned(&rec, "u1", 2), Err(CoreError::Forbidden)));
    }

    #[test]
    fn terminal_beats_ownership() {
        let mut rec = link("a", Some("u1"), 1);
        rec.set_status(Status::Deleted);
        assert!(matches!(check_owned(&rec, "u2", 2), Err(CoreError::NotFound)));
    }

    #[test]
    fn paginate_slices_and_counts() {
        let mut items: Vec<Record> = (0..25).map(|i| link(&format!("c{i:02}"), Some("u"), i)).collect();
        newest_first(&mut items);
        let p1 = paginate(items.clone(), 1, 10);
        assert_eq!(p1.total, 25);
        assert_eq!(p1.items.len(), 10);
        assert_eq!(p1.items[0].created_at(), 24);
        let p3 = paginate(items.clone(), 3, 10);
        assert_eq!(p3.items.len(), 5);
        let capped = paginate(items.clone(), 1, 100);
        assert_eq!(capped.items.len(), MAX_LIST_LIMIT as usize);
        assert!(paginate(items, 9, 10).items.is_empty());
    }
}
