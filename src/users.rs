//! Per-user defaults for media shared through the chat bot.
//!
//! A chat user's first message lazily creates their row; later
//! `setTime:`/`setPass:` commands update it in place.

use async_trait::async_trait;
use aws_sdk_dynamodb as ddb;
use aws_sdk_dynamodb::error::ProvideErrorMetadata; // for .code()
use ddb::types::AttributeValue as Av;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::error::CoreResult;
use crate::registry::dynamo::map_ddb_err;
use crate::util::epoch_now;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatDefaults {
    pub user_id: String,
    pub expiration_secs: u64,
    /// Empty means uploads are not gated.
    #[serde(skip_serializing)]
    pub password: String,
}

impl ChatDefaults {
    fn fresh(user_id: &str, expiration_secs: u64) -> Self {
        Self {
            user_id: user_id.to_string(),
            expiration_secs,
            password: String::new(),
        }
    }
}

#[async_trait]
pub trait DefaultsStore: Send + Sync {
    /// Load a user's defaults, creating them with `fallback_secs` and no
    /// password on first contact.
    async fn get_or_create(&self, user_id: &str, fallback_secs: u64) -> CoreResult<ChatDefaults>;

    async fn set_expiration(&self, user_id: &str, secs: u64) -> CoreResult<()>;

    async fn set_password(&self, user_id: &str, password: &str) -> CoreResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryDefaults {
    rows: Mutex<HashMap<String, ChatDefaults>>,
    fallback_secs: u64,
}

impl MemoryDefaults {
    /// `fallback_secs` seeds rows first touched by a setter.
    pub fn new(fallback_secs: u64) -> Self {
        Self {
            rows: Mutex::default(),
            fallback_secs,
        }
    }

    fn with_row<R>(&self, user_id: &str, fallback_secs: u64, f: impl FnOnce(&mut ChatDefaults) -> R) -> R {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        let row = rows
            .entry(user_id.to_string())
            .or_insert_with(|| ChatDefaults::fresh(user_id, fallback_secs));
        f(row)
    }
}

#[async_trait]
impl DefaultsStore for MemoryDefaults {
    async fn get_or_create(&self, user_id: &str, fallback_secs: u64) -> CoreResult<ChatDefaults> {
        Ok(self.with_row(user_id, fallback_secs, |row| row.clone()))
    }

    async fn set_expiration(&self, user_id: &str, secs: u64) -> CoreResult<()> {
        self.with_row(user_id, self.fallback_secs, |row| row.expiration_secs = secs);
        Ok(())
    }

    async fn set_password(&self, user_id: &str, password: &str) -> CoreResult<()> {
        self.with_row(user_id, self.fallback_secs, |row| row.password = password.to_string());
        Ok(())
    }
}

/// Table keyed by `user_id` (S).
#[derive(Clone)]
pub struct DynamoDefaults {
    ddb: ddb::Client,
    table: String,
    fallback_secs: u64,
}

impl DynamoDefaults {
    pub fn new(ddb: ddb::Client, table: impl Into<String>, fallback_secs: u64) -> Self {
        Self {
            ddb,
            table: table.into(),
            fallback_secs,
        }
    }

    fn from_item(user_id: &str, item: &HashMap<String, Av>, fallback_secs: u64) -> ChatDefaults {
        let expiration_secs = item
            .get("expiration_secs")
            .and_then(|v| v.as_n().ok())
            .and_then(|n| n.parse().ok())
            .unwrap_or(fallback_secs);
        let password = item
            .get("password")
            .and_then(|v| v.as_s().ok())
            .cloned()
            .unwrap_or_default();
        ChatDefaults {
            user_id: user_id.to_string(),
            expiration_secs,
            password,
        }
    }

    /// Upsert one attribute, seeding the rest if the row is new.
    async fn set_attr(&self, user_id: &str, name: &str, value: Option<Av>) -> CoreResult<()> {
        let now = epoch_now();
        let mut upd = self
            .ddb
            .update_item()
            .table_name(&self.table)
            .key("user_id", Av::S(user_id.to_string()))
            .expression_attribute_names("#v", name)
            .expression_attribute_values(":now", Av::N(now.to_string()));

        upd = match value {
            Some(v) if name == "expiration_secs" => upd
                .update_expression("SET #v = :v, created_at = if_not_exists(created_at, :now), updated_at = :now")
                .expression_attribute_values(":v", v),
            Some(v) => upd
                .update_expression(
                    "SET #v = :v, expiration_secs = if_not_exists(expiration_secs, :exp), \
                     created_at = if_not_exists(created_at, :now), updated_at = :now",
                )
                .expression_attribute_values(":v", v)
                .expression_attribute_values(":exp", Av::N(self.fallback_secs.to_string())),
            None => upd
                .update_expression(
                    "SET expiration_secs = if_not_exists(expiration_secs, :exp), \
                     created_at = if_not_exists(created_at, :now), updated_at = :now REMOVE #v",
                )
                .expression_attribute_values(":exp", Av::N(self.fallback_secs.to_string())),
        };

        upd.send().await.map_err(|e| map_ddb_err("defaults update", e))?;
        Ok(())
    }
}

#[async_trait]
impl DefaultsStore for DynamoDefaults {
    async fn get_or_create(&self, user_id: &str, fallback_secs: u64) -> CoreResult<ChatDefaults> {
        let now = epoch_now();
        let put = self
            .ddb
            .put_item()
            .table_name(&self.table)
            .item("user_id", Av::S(user_id.to_string()))
            .item("expiration_secs", Av::N(fallback_secs.to_string()))
            .item("created_at", Av::N(now.to_string()))
            .item("updated_at", Av::N(now.to_string()))
            .condition_expression("attribute_not_exists(user_id)")
            .send()
            .await;

        match put {
            Ok(_) => {
                tracing::info!(user_id, "chat defaults created");
                return Ok(ChatDefaults::fresh(user_id, fallback_secs));
            }
            Err(e) if e.code() == Some("ConditionalCheckFailedException") => {}
            Err(e) => return Err(map_ddb_err("defaults put", e)),
        }

        // row exists
        let got = self
            .ddb
            .get_item()
            .table_name(&self.table)
            .key("user_id", Av::S(user_id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| map_ddb_err("defaults get", e))?;
        Ok(got
            .item()
            .map(|item| Self::from_item(user_id, item, fallback_secs))
            .unwrap_or_else(|| ChatDefaults::fresh(user_id, fallback_secs)))
    }

    async fn set_expiration(&self, user_id: &str, secs: u64) -> CoreResult<()> {
        self.set_attr(user_id, "expiration_secs", Some(Av::N(secs.to_string())))
            .await
    }

    async fn set_password(&self, user_id: &str, password: &str) -> CoreResult<()> {
        let value = (!password.is_empty()).then(|| Av::S(password.to_string()));
        self.set_attr(user_id, "password", value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_stored_row() {
        let mut item = HashMap::new();
        item.insert("user_id".to_string(), Av::S("U1".into()));
        item.insert("expiration_secs".to_string(), Av::N("120".into()));
        item.insert("password".to_string(), Av::S("42".into()));
        let d = DynamoDefaults::from_item("U1", &item, 3600);
        assert_eq!(d.expiration_secs, 120);
        assert_eq!(d.password, "42");
    }

    #[test]
    fn missing_attributes_fall_back() {
        let item = HashMap::new();
        let d = DynamoDefaults::from_item("U1", &item, 3600);
        assert_eq!(d, ChatDefaults::fresh("U1", 3600));
    }

    #[tokio::test]
    async fn memory_store_creates_once() {
        let store = MemoryDefaults::new(3600);
        let first = store.get_or_create("U1", 3600).await.unwrap();
        assert_eq!(first.expiration_secs, 3600);
        store.set_expiration("U1", 60).await.unwrap();
        store.set_password("U1", "1234").await.unwrap();

        // a later first-contact call must not reset anything
        let again = store.get_or_create("U1", 3600).await.unwrap();
        assert_eq!(again.expiration_secs, 60);
        assert_eq!(again.password, "1234");

        store.set_password("U1", "").await.unwrap();
        assert!(store.get_or_create("U1", 3600).await.unwrap().password.is_empty());
    }

    #[tokio::test]
    async fn setter_before_first_contact_seeds_row() {
        let store = MemoryDefaults::new(3600);
        store.set_password("U2", "9").await.unwrap();
        let d = store.get_or_create("U2", 3600).await.unwrap();
        assert_eq!(d.expiration_secs, 3600);
        assert_eq!(d.password, "9");
    }

    #[test]
    fn password_is_not_serialized() {
        let mut d = ChatDefaults::fresh("U1", 10);
        d.password = "secret".into();
        let v = serde_json::to_value(&d).unwrap();
        assert!(v.get("password").is_none());
        assert_eq!(v["expirationSecs"], 10);
    }
}
