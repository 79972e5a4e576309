//! Expiry Reaper.
//!
//! Reconciles `status` with `expires_at` and reclaims blob storage. Two
//! triggers share one code path: the lazy trigger (a read observes an
//! expired-but-active record) and the periodic sweep. Both flip status with a
//! CAS, so only the winner of a race releases the blob. Blob deletion is best
//! effort: a failure is logged and the orphan is left for later.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::blob::BlobStore;
use crate::error::CoreResult;
use crate::model::{MediaRecord, ResourceKind, Status};
use crate::registry::Registry;
use crate::util::Clock;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub expired: usize,
    pub blob_failures: usize,
}

#[derive(Clone)]
pub struct Reaper {
    registry: Arc<dyn Registry>,
    blobs: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
}

impl Reaper {
    pub fn new(registry: Arc<dyn Registry>, blobs: Arc<dyn BlobStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry,
            blobs,
            clock,
        }
    }

    /// Flip one record `active -> expired`. Returns `true` if this call won
    /// the CAS (and therefore released the blob). Losing is not an error.
    pub async fn expire_one(&self, media: &MediaRecord) -> CoreResult<bool> {
        let won = self
            .registry
            .transition(ResourceKind::Media, &media.code, Status::Active, Status::Expired)
            .await?;
        if won {
            tracing::info!(code = %media.code, "media expired");
            self.release(&media.storage_key).await;
        }
        Ok(won)
    }

    /// Best-effort blob delete. Returns whether it succeeded.
    pub async fn release(&self, storage_key: &str) -> bool {
        match self.blobs.delete(storage_key).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(storage_key = %storage_key, error = %e, "blob delete failed; leaving orphan");
                false
            }
        }
    }

    /// One bulk pass over records whose expiry has passed.
    pub async fn sweep(&self, batch: usize) -> CoreResult<SweepReport> {
        let now = self.clock.now();
        let due = self.registry.expired_media(now, batch).await?;
        let mut report = SweepReport {
            scanned: due.len(),
            ..SweepReport::default()
        };
        for media in &due {
            let won = self
                .registry
                .transition(ResourceKind::Media, &media.code, Status::Active, Status::Expired)
                .await?;
            if !won {
                continue;
            }
            report.expired += 1;
            if !self.release(&media.storage_key).await {
                report.blob_failures += 1;
            }
        }
        if report.expired > 0 {
            tracing::info!(
                scanned = report.scanned,
                expired = report.expired,
                blob_failures = report.blob_failures,
                "sweep finished"
            );
        }
        Ok(report)
    }

    /// Run `sweep` every `every` until `shutdown` flips to `true`.
    ///
    /// This is the runner for long-lived hosts. The Lambda deployment has no
    /// process that outlives a request, so it sweeps from `bin/reaper.rs` on
    /// an EventBridge schedule instead.
    pub fn spawn(
        self: Arc<Self>,
        every: Duration,
        batch: usize,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep(batch).await {
                            tracing::error!(error = %e, "sweep failed");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            tracing::debug!("reaper stopping");
                            break;
                        }
                    }
                }
            }
        })
    }
}
