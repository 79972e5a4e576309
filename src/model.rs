use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};

/// Opaque, stable identity handed to us by the authentication provider
/// (or the chat platform's user id).
pub type OwnerId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    Expired,
    Deleted,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Expired => "expired",
            Status::Deleted => "deleted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Status::Active)
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Status::Active),
            "expired" => Ok(Status::Expired),
            "deleted" => Ok(Status::Deleted),
            _ => Err(format!("unknown status: {s}")),
        }
    }
}

/// Which collection a code lives in. Codes are unique per kind, not globally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Link,
    Media,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Link => "link",
            ResourceKind::Media => "media",
        }
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "link" | "links" => Ok(ResourceKind::Link),
            "media" => Ok(ResourceKind::Media),
            _ => Err(format!("unknown resource kind: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
        }
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(MediaType::Image),
            "video" => Ok(MediaType::Video),
            _ => Err(format!("unknown media type: {s}")),
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortLinkRecord {
    pub code: String,
    pub owner_id: Option<OwnerId>,
    pub lead_url: String,
    pub status: Status,
    pub display_name: Option<String>,
    pub created_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRecord {
    pub code: String,
    pub owner_id: Option<OwnerId>,
    pub media_type: MediaType,
    pub storage_key: String,
    /// Empty means the media is not gated.
    #[serde(skip_serializing, default)]
    pub password: String,
    pub expires_at: u64,
    pub display_name: Option<String>,
    pub status: Status,
    pub created_at: u64,
}

/// A registry entry of either kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Record {
    Link(ShortLinkRecord),
    Media(MediaRecord),
}

impl Record {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Record::Link(_) => ResourceKind::Link,
            Record::Media(_) => ResourceKind::Media,
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Record::Link(r) => &r.code,
            Record::Media(r) => &r.code,
        }
    }

    pub fn owner_id(&self) -> Option<&str> {
        match self {
            Record::Link(r) => r.owner_id.as_deref(),
            Record::Media(r) => r.owner_id.as_deref(),
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Record::Link(r) => r.status,
            Record::Media(r) => r.status,
        }
    }

    pub fn created_at(&self) -> u64 {
        match self {
            Record::Link(r) => r.created_at,
            Record::Media(r) => r.created_at,
        }
    }

    /// Links never expire by time.
    pub fn expires_at(&self) -> Option<u64> {
        match self {
            Record::Link(_) => None,
            Record::Media(r) => Some(r.expires_at),
        }
    }

    pub(crate) fn set_status(&mut self, status: Status) {
        match self {
            Record::Link(r) => r.status = status,
            Record::Media(r) => r.status = status,
        }
    }

    /// True when `self` is the record an idempotent lead-URL submission by
    /// `other`'s owner would have produced.
    pub fn is_same_link(&self, other: &Record) -> bool {
        match (self, other) {
            (Record::Link(a), Record::Link(b)) => {
                a.status == Status::Active && a.lead_url == b.lead_url && a.owner_id == b.owner_id
            }
            _ => false,
        }
    }

    /// Apply a mutation in place. Callers have already checked ownership
    /// and liveness. Links have no password or expiry; asking for one is a
    /// validation error and leaves the record untouched.
    pub(crate) fn apply(&mut self, mutation: &Mutation) -> CoreResult<()> {
        match (self, mutation) {
            (Record::Link(r), Mutation::Rename(name)) => r.display_name = Some(name.clone()),
            (Record::Media(r), Mutation::Rename(name)) => r.display_name = Some(name.clone()),
            (Record::Media(r), Mutation::SetPassword(p)) => r.password = p.clone(),
            (Record::Media(r), Mutation::SetExpiry { expires_at }) => r.expires_at = *expires_at,
            (rec, Mutation::Delete) => rec.set_status(Status::Deleted),
            (Record::Link(_), Mutation::SetPassword(_) | Mutation::SetExpiry { .. }) => {
                return Err(CoreError::validation(format!(
                    "links have no {}",
                    mutation.field()
                )));
            }
        }
        Ok(())
    }
}

/// Where a resolved code points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Locator {
    LeadUrl(String),
    Blob {
        storage_key: String,
        media_type: MediaType,
    },
}

/// A single owner-initiated change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Rename(String),
    SetPassword(String),
    SetExpiry { expires_at: u64 },
    Delete,
}

impl Mutation {
    pub fn field(&self) -> &'static str {
        match self {
            Mutation::Rename(_) => "name",
            Mutation::SetPassword(_) => "password",
            Mutation::SetExpiry { .. } => "expiration",
            Mutation::Delete => "status",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub items: Vec<Record>,
    pub total: u64,
}

// ---------- request / response bodies ----------

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreateLinkReq {
    pub lead_url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreateResp {
    pub code: String,
    pub short_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

/// Owner edit; every present field is applied on its own.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReq {
    #[serde(default)]
    pub name: Option<String>,
    /// Seconds from now.
    #[serde(default)]
    pub expiration: Option<u64>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct FieldOutcome {
    pub field: &'static str,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
