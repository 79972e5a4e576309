//! Access decision for a resolve request.
//!
//! Pure: no I/O, no clock reads. Given the same record, time, password and
//! caller it always returns the same [`Decision`].

use subtle::ConstantTimeEq;

use crate::model::{Locator, Record};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow(Locator),
    NotFound,
    Forbidden,
}

/// First matching rule wins:
/// 1. terminal status -> `NotFound`
/// 2. `now >= expires_at` -> `NotFound`
/// 3. gated, wrong password, caller is not the owner -> `Forbidden`
/// 4. `Allow`
pub fn evaluate(record: &Record, now: u64, supplied_password: &str, caller: Option<&str>) -> Decision {
    if record.status().is_terminal() {
        return Decision::NotFound;
    }
    if is_expired(record, now) {
        return Decision::NotFound;
    }

    match record {
        Record::Link(link) => Decision::Allow(Locator::LeadUrl(link.lead_url.clone())),
        Record::Media(media) => {
            let gated = !media.password.is_empty();
            if gated
                && !password_matches(&media.password, supplied_password)
                && !is_owner(media.owner_id.as_deref(), caller)
            {
                return Decision::Forbidden;
            }
            Decision::Allow(Locator::Blob {
                storage_key: media.storage_key.clone(),
                media_type: media.media_type,
            })
        }
    }
}

/// Time-based expiry, independent of the stored status.
pub fn is_expired(record: &Record, now: u64) -> bool {
    record.expires_at().is_some_and(|exp| now >= exp)
}

/// An absent owner never matches, so an anonymous caller cannot bypass the
/// gate on an anonymous record.
pub fn is_owner(owner: Option<&str>, caller: Option<&str>) -> bool {
    matches!((owner, caller), (Some(o), Some(c)) if o == c)
}

pub fn password_matches(expected: &str, supplied: &str) -> bool {
    expected.as_bytes().ct_eq(supplied.as_bytes()).into()
}
