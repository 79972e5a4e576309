//! Chat-webhook producer.
//!
//! The platform adapter parses incoming messages into [`ChatEvent`]s; this
//! module turns each one into registry calls and a [`ChatReply`]. Everything
//! created here is owned by the chat identity.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::CoreError;
use crate::model::MediaType;
use crate::service::ResourceRegistry;
use crate::users::DefaultsStore;
use crate::util::short_url;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum ChatEvent {
    Link(String),
    #[serde(skip)]
    Image(Bytes),
    #[serde(skip)]
    Video(Bytes),
    /// Raw argument of the expiration command, unparsed.
    SetExpiration(String),
    /// Raw argument of the password command; `"none"` clears it.
    SetPassword(String),
    ShowDefaults,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChatReply {
    #[serde(rename_all = "camelCase")]
    ShortUrl {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        expires_at: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    Defaults {
        expiration_secs: u64,
        password_set: bool,
    },
    Updated { field: &'static str },
    Invalid { reason: String },
    Failed { reason: String },
}

impl ChatReply {
    /// Plain-text rendering for platforms without rich messages.
    pub fn text(&self) -> String {
        match self {
            ChatReply::ShortUrl { url, .. } => url.clone(),
            ChatReply::Defaults {
                expiration_secs,
                password_set,
            } => format!(
                "expiration: {expiration_secs}s, password: {}",
                if *password_set { "set" } else { "none" }
            ),
            ChatReply::Updated { field } => format!("{field} updated"),
            ChatReply::Invalid { reason } => format!("invalid input: {reason}"),
            ChatReply::Failed { reason } => format!("something went wrong: {reason}"),
        }
    }

    fn from_error(e: CoreError) -> Self {
        match e {
            CoreError::Validation(reason) => ChatReply::Invalid { reason },
            other => ChatReply::Failed {
                reason: other.public_message(),
            },
        }
    }
}

#[derive(Clone)]
pub struct ChatBot {
    service: ResourceRegistry,
    defaults: Arc<dyn DefaultsStore>,
    domain: String,
}

impl ChatBot {
    pub fn new(service: ResourceRegistry, defaults: Arc<dyn DefaultsStore>, domain: impl Into<String>) -> Self {
        Self {
            service,
            defaults,
            domain: domain.into(),
        }
    }

    #[tracing::instrument(skip(self, event))]
    pub async fn handle(&self, user_id: &str, event: ChatEvent) -> ChatReply {
        match event {
            ChatEvent::Link(url) => self.on_link(user_id, &url).await,
            ChatEvent::Image(bytes) => self.on_media(user_id, MediaType::Image, bytes).await,
            ChatEvent::Video(bytes) => self.on_media(user_id, MediaType::Video, bytes).await,
            ChatEvent::SetExpiration(raw) => self.on_set_expiration(user_id, &raw).await,
            ChatEvent::SetPassword(raw) => self.on_set_password(user_id, &raw).await,
            ChatEvent::ShowDefaults => self.on_show_defaults(user_id).await,
        }
    }

    async fn on_link(&self, user_id: &str, url: &str) -> ChatReply {
        match self.service.create_link(Some(user_id), url.trim()).await {
            Ok(link) => ChatReply::ShortUrl {
                url: short_url(&self.domain, &link.code),
                expires_at: None,
            },
            Err(e) => ChatReply::from_error(e),
        }
    }

    async fn on_media(&self, user_id: &str, media_type: MediaType, bytes: Bytes) -> ChatReply {
        let fallback = self.service.policy().chat_default_expiration_secs;
        let defaults = match self.defaults.get_or_create(user_id, fallback).await {
            Ok(d) => d,
            Err(e) => return ChatReply::from_error(e),
        };
        match self
            .service
            .upload_media(
                Some(user_id),
                media_type,
                bytes,
                &defaults.password,
                defaults.expiration_secs,
            )
            .await
        {
            Ok(rec) => ChatReply::ShortUrl {
                url: short_url(&self.domain, &rec.code),
                expires_at: Some(rec.expires_at),
            },
            Err(e) => ChatReply::from_error(e),
        }
    }

    async fn on_set_expiration(&self, user_id: &str, raw: &str) -> ChatReply {
        let max = self.service.policy().chat_max_expiration_secs;
        let secs = match raw.trim().parse::<u64>() {
            Ok(secs) if secs > 0 && secs < max => secs,
            _ => {
                return ChatReply::Invalid {
                    reason: format!("expiration must be a number between 1 and {}", max.saturating_sub(1)),
                }
            }
        };
        match self.defaults.set_expiration(user_id, secs).await {
            Ok(()) => ChatReply::Updated { field: "expiration" },
            Err(e) => ChatReply::from_error(e),
        }
    }

    async fn on_set_password(&self, user_id: &str, raw: &str) -> ChatReply {
        let raw = raw.trim();
        let max = self.service.policy().max_password_len;
        let password = if raw.eq_ignore_ascii_case("none") {
            ""
        } else if !raw.is_empty() && raw.len() <= max && raw.bytes().all(|b| b.is_ascii_digit()) {
            raw
        } else {
            return ChatReply::Invalid {
                reason: format!("password must be up to {max} digits, or \"none\""),
            };
        };
        match self.defaults.set_password(user_id, password).await {
            Ok(()) => ChatReply::Updated { field: "password" },
            Err(e) => ChatReply::from_error(e),
        }
    }

    async fn on_show_defaults(&self, user_id: &str) -> ChatReply {
        let fallback = self.service.policy().chat_default_expiration_secs;
        match self.defaults.get_or_create(user_id, fallback).await {
            Ok(d) => ChatReply::Defaults {
                expiration_secs: d.expiration_secs,
                password_set: !d.password.is_empty(),
            },
            Err(e) => ChatReply::from_error(e),
        }
    }
}
