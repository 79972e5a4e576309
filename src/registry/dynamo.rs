//! DynamoDB backend.
//!
//! Tables are keyed by `code` (S). Listing uses a GSI on
//! `(owner_id, created_at)`; anonymous records carry no `owner_id` and so
//! never appear in it.

use async_trait::async_trait;
use aws_sdk_dynamodb as ddb;
use aws_sdk_dynamodb::error::ProvideErrorMetadata; // for .code()
use ddb::types::{AttributeValue as Av, ReturnValue};
use std::collections::HashMap;

use super::{check_owned, newest_first, paginate, InsertOutcome, Registry};
use crate::error::{CoreError, CoreResult};
use crate::model::{
    MediaRecord, MediaType, Mutation, Page, Record, ResourceKind, ShortLinkRecord, Status,
};

type Item = HashMap<String, Av>;

const CONDITION_FAILED: &str = "ConditionalCheckFailedException";

/// Active and not yet past expiry; links carry no `expires_at`.
const LIVE_FILTER: &str =
    "#st = :active AND (attribute_not_exists(expires_at) OR expires_at > :now)";

pub(crate) fn map_ddb_err<E>(op: &str, e: E) -> CoreError
where
    E: ProvideErrorMetadata + std::fmt::Debug,
{
    tracing::error!(
        "ddb {} err: code={:?} msg={:?}",
        op,
        e.code(),
        e.message()
    );
    CoreError::internal(format!("ddb {op}: {e:?}"))
}

#[derive(Clone)]
pub struct DynamoRegistry {
    ddb: ddb::Client,
    links_table: String,
    media_table: String,
    owner_index: String,
}

impl DynamoRegistry {
    pub fn new(
        ddb: ddb::Client,
        links_table: impl Into<String>,
        media_table: impl Into<String>,
        owner_index: impl Into<String>,
    ) -> Self {
        Self {
            ddb,
            links_table: links_table.into(),
            media_table: media_table.into(),
            owner_index: owner_index.into(),
        }
    }

    fn table(&self, kind: ResourceKind) -> &str {
        match kind {
            ResourceKind::Link => &self.links_table,
            ResourceKind::Media => &self.media_table,
        }
    }

    async fn get_consistent(&self, kind: ResourceKind, code: &str) -> CoreResult<Option<Record>> {
        let got = self
            .ddb
            .get_item()
            .table_name(self.table(kind))
            .key("code", Av::S(code.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| map_ddb_err("get", e))?;
        got.item().map(|item| from_item(kind, item)).transpose()
    }
}

// ---------- item mapping ----------

fn get_s<'a>(item: &'a Item, k: &str) -> Option<&'a String> {
    item.get(k).and_then(|v| v.as_s().ok())
}

fn get_n(item: &Item, k: &str) -> Option<u64> {
    item.get(k)
        .and_then(|v| v.as_n().ok())
        .and_then(|s| s.parse::<u64>().ok())
}

fn require_s(item: &Item, k: &str) -> CoreResult<String> {
    get_s(item, k)
        .cloned()
        .ok_or_else(|| CoreError::internal(format!("item missing attribute {k}")))
}

fn require_n(item: &Item, k: &str) -> CoreResult<u64> {
    get_n(item, k).ok_or_else(|| CoreError::internal(format!("item missing attribute {k}")))
}

pub(crate) fn to_item(record: &Record) -> Item {
    let mut item = HashMap::new();
    item.insert("code".into(), Av::S(record.code().to_string()));
    item.insert("status".into(), Av::S(record.status().as_str().into()));
    item.insert("created_at".into(), Av::N(record.created_at().to_string()));
    if let Some(owner) = record.owner_id() {
        item.insert("owner_id".into(), Av::S(owner.to_string()));
    }
    match record {
        Record::Link(r) => {
            item.insert("lead_url".into(), Av::S(r.lead_url.clone()));
            if let Some(name) = &r.display_name {
                item.insert("display_name".into(), Av::S(name.clone()));
            }
        }
        Record::Media(r) => {
            item.insert("media_type".into(), Av::S(r.media_type.as_str().into()));
            item.insert("storage_key".into(), Av::S(r.storage_key.clone()));
            item.insert("expires_at".into(), Av::N(r.expires_at.to_string()));
            if !r.password.is_empty() {
                item.insert("password".into(), Av::S(r.password.clone()));
            }
            if let Some(name) = &r.display_name {
                item.insert("display_name".into(), Av::S(name.clone()));
            }
        }
    }
    item
}

pub(crate) fn from_item(kind: ResourceKind, item: &Item) -> CoreResult<Record> {
    let status: Status = require_s(item, "status")?
        .parse()
        .map_err(CoreError::Internal)?;
    let code = require_s(item, "code")?;
    let owner_id = get_s(item, "owner_id").cloned();
    let display_name = get_s(item, "display_name").cloned();
    let created_at = require_n(item, "created_at")?;

    Ok(match kind {
        ResourceKind::Link => Record::Link(ShortLinkRecord {
            code,
            owner_id,
            lead_url: require_s(item, "lead_url")?,
            status,
            display_name,
            created_at,
        }),
        ResourceKind::Media => {
            let media_type: MediaType = require_s(item, "media_type")?
                .parse()
                .map_err(CoreError::Internal)?;
            Record::Media(MediaRecord {
                code,
                owner_id,
                media_type,
                storage_key: require_s(item, "storage_key")?,
                password: get_s(item, "password").cloned().unwrap_or_default(),
                expires_at: require_n(item, "expires_at")?,
                display_name,
                status,
                created_at,
            })
        }
    })
}

/// `(update expression, extra values)` for a mutation.
fn mutation_expr(mutation: &Mutation) -> (String, Vec<(&'static str, Av)>) {
    match mutation {
        Mutation::Rename(name) => (
            "SET display_name = :v".into(),
            vec![(":v", Av::S(name.clone()))],
        ),
        // `password` is a reserved word
        Mutation::SetPassword(p) if p.is_empty() => ("REMOVE #pw".into(), vec![]),
        Mutation::SetPassword(p) => ("SET #pw = :v".into(), vec![(":v", Av::S(p.clone()))]),
        Mutation::SetExpiry { expires_at } => (
            "SET expires_at = :v".into(),
            vec![(":v", Av::N(expires_at.to_string()))],
        ),
        Mutation::Delete => (
            "SET #st = :deleted".into(),
            vec![(":deleted", Av::S(Status::Deleted.as_str().into()))],
        ),
    }
}

#[async_trait]
impl Registry for DynamoRegistry {
    async fn insert(&self, record: &Record) -> CoreResult<InsertOutcome> {
        let r = self
            .ddb
            .put_item()
            .table_name(self.table(record.kind()))
            .set_item(Some(to_item(record)))
            .condition_expression("attribute_not_exists(#c)")
            .expression_attribute_names("#c", "code")
            .send()
            .await;

        match r {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(e) if e.code() == Some(CONDITION_FAILED) => {
                // records are never physically removed, so the holder is readable
                let existing = self
                    .get_consistent(record.kind(), record.code())
                    .await?
                    .ok_or_else(|| CoreError::internal("occupied code vanished"))?;
                Ok(InsertOutcome::Occupied(existing))
            }
            Err(e) => Err(map_ddb_err("put", e)),
        }
    }

    async fn get(&self, kind: ResourceKind, code: &str) -> CoreResult<Option<Record>> {
        self.get_consistent(kind, code).await
    }

    async fn update_owned(
        &self,
        kind: ResourceKind,
        code: &str,
        caller: &str,
        mutation: &Mutation,
        now: u64,
    ) -> CoreResult<Record> {
        let (expr, values) = mutation_expr(mutation);
        let mut condition =
            String::from("attribute_exists(#c) AND #st = :active AND owner_id = :caller");
        if kind == ResourceKind::Media {
            condition.push_str(" AND expires_at > :now");
        }

        let mut req = self
            .ddb
            .update_item()
            .table_name(self.table(kind))
            .key("code", Av::S(code.to_string()))
            .update_expression(expr)
            .condition_expression(condition)
            .expression_attribute_names("#c", "code")
            .expression_attribute_names("#st", "status")
            .expression_attribute_values(":active", Av::S(Status::Active.as_str().into()))
            .expression_attribute_values(":caller", Av::S(caller.to_string()))
            .return_values(ReturnValue::AllNew);
        if kind == ResourceKind::Media {
            req = req.expression_attribute_values(":now", Av::N(now.to_string()));
        }
        if matches!(mutation, Mutation::SetPassword(_)) {
            req = req.expression_attribute_names("#pw", "password");
        }
        for (k, v) in values {
            req = req.expression_attribute_values(k, v);
        }

        match req.send().await {
            Ok(out) => {
                let attrs = out
                    .attributes()
                    .ok_or_else(|| CoreError::internal("update returned no attributes"))?;
                from_item(kind, attrs)
            }
            Err(e) if e.code() == Some(CONDITION_FAILED) => {
                // work out which guard failed so the caller gets the right error
                let current = self
                    .get_consistent(kind, code)
                    .await?
                    .ok_or(CoreError::NotFound)?;
                check_owned(&current, caller, now)?;
                Err(CoreError::NotFound)
            }
            Err(e) => Err(map_ddb_err("update", e)),
        }
    }

    async fn transition(
        &self,
        kind: ResourceKind,
        code: &str,
        from: Status,
        to: Status,
    ) -> CoreResult<bool> {
        let r = self
            .ddb
            .update_item()
            .table_name(self.table(kind))
            .key("code", Av::S(code.to_string()))
            .update_expression("SET #st = :to")
            .condition_expression("#st = :from")
            .expression_attribute_names("#st", "status")
            .expression_attribute_values(":to", Av::S(to.as_str().into()))
            .expression_attribute_values(":from", Av::S(from.as_str().into()))
            .return_values(ReturnValue::None)
            .send()
            .await;

        match r {
            Ok(_) => Ok(true),
            Err(e) if e.code() == Some(CONDITION_FAILED) => Ok(false),
            Err(e) => Err(map_ddb_err("transition", e)),
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
        let mut items = Vec::new();
        let mut next: Option<Item> = None;
        loop {
            let resp = self
                .ddb
                .query()
                .table_name(self.table(kind))
                .index_name(&self.owner_index)
                .key_condition_expression("owner_id = :o")
                .filter_expression(LIVE_FILTER)
                .expression_attribute_names("#st", "status")
                .expression_attribute_values(":o", Av::S(owner.to_string()))
                .expression_attribute_values(":active", Av::S(Status::Active.as_str().into()))
                .expression_attribute_values(":now", Av::N(now.to_string()))
                .scan_index_forward(false)
                .set_exclusive_start_key(next.take())
                .send()
                .await
                .map_err(|e| map_ddb_err("query", e))?;

            for item in resp.items() {
                items.push(from_item(kind, item)?);
            }
            match resp.last_evaluated_key() {
                Some(lek) if !lek.is_empty() => next = Some(lek.clone()),
                _ => break,
            }
        }
        newest_first(&mut items);
        Ok(paginate(items, page, limit))
    }

    async fn expired_media(&self, now: u64, limit: usize) -> CoreResult<Vec<MediaRecord>> {
        let mut out = Vec::new();
        let mut next: Option<Item> = None;
        while out.len() < limit {
            let resp = self
                .ddb
                .scan()
                .table_name(&self.media_table)
                .filter_expression("#st = :active AND expires_at <= :now")
                .expression_attribute_names("#st", "status")
                .expression_attribute_values(":active", Av::S(Status::Active.as_str().into()))
                .expression_attribute_values(":now", Av::N(now.to_string()))
                .set_exclusive_start_key(next.take())
                .send()
                .await
                .map_err(|e| map_ddb_err("scan", e))?;

            for item in resp.items() {
                if out.len() >= limit {
                    break;
                }
                if let Record::Media(m) = from_item(ResourceKind::Media, item)? {
                    out.push(m);
                }
            }
            match resp.last_evaluated_key() {
                Some(lek) if !lek.is_empty() => next = Some(lek.clone()),
                _ => break,
            }
        }
        Ok(out)
    }
}
