use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

/// Failures surfaced by the identifier/registry/access core.
///
/// `NotFound` and `Forbidden` intentionally carry no detail: an unknown code,
/// an expired one and a deleted one all look the same to the caller, and a
/// wrong password looks the same as a foreign owner.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found")]
    NotFound,

    #[error("forbidden")]
    Forbidden,

    #[error("could not allocate a free code after {attempts} attempts")]
    CollisionExhausted { attempts: u32 },

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        CoreError::Internal(msg.into())
    }

    /// HTTP status used by the request glue.
    pub fn status(&self) -> u16 {
        match self {
            CoreError::Validation(_) => 400,
            CoreError::Forbidden => 403,
            CoreError::NotFound => 404,
            CoreError::CollisionExhausted { .. } => 503,
            CoreError::Internal(_) => 500,
        }
    }

    /// Stable machine-readable code for JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "validation",
            CoreError::Forbidden => "forbidden",
            CoreError::NotFound => "not_found",
            CoreError::CollisionExhausted { .. } => "collision_exhausted",
            CoreError::Internal(_) => "internal",
        }
    }

    /// Message safe to show a caller. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            CoreError::Validation(msg) => msg.clone(),
            CoreError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::CollisionExhausted { .. })
    }
}

impl From<object_store::Error> for CoreError {
    fn from(e: object_store::Error) -> Self {
        CoreError::Internal(format!("blob store: {e}"))
    }
}

impl From<tokio::time::error::Elapsed> for CoreError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        CoreError::Internal("deadline exceeded".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_details_are_not_public() {
        let e = CoreError::internal("ddb put error: throttled on table media_resources");
        assert_eq!(e.status(), 500);
        assert_eq!(e.public_message(), "internal error");
    }

    #[test]
    fn collision_is_retryable_server_error() {
        let e = CoreError::CollisionExhausted { attempts: 5 };
        assert_eq!(e.status(), 503);
        assert!(e.is_retryable());
        assert!(!CoreError::NotFound.is_retryable());
    }
}
