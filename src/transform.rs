//! Media transform boundary. The real transcoder lives outside this crate;
//! the core only calls it before bytes go to the blob store.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::CoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

#[async_trait]
pub trait MediaTransform: Send + Sync {
    /// Downscale an image. Errors surface as `CoreError::Internal` on the
    /// creation path.
    async fn downscale(&self, image: Bytes) -> CoreResult<(Option<Dimensions>, Bytes)>;
}

/// Hands images through unchanged; used when no transcoder is deployed.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

#[async_trait]
impl MediaTransform for Passthrough {
    async fn downscale(&self, image: Bytes) -> CoreResult<(Option<Dimensions>, Bytes)> {
        Ok((None, image))
    }
}
