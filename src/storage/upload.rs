use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::fs;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::protocol::ServerEvent;
use crate::room::{BroadcastThrottle, Room};

use super::assets::AssetStore;

/// Content types accepted for upload
const ALLOWED_CONTENT_TYPES: &[&str] = &["video/mp4", "video/avi", "video/x-matroska"];

/// Throttle class for progress broadcasts
const PROGRESS_CLASS: &str = "upload-progress";

/// The one in-flight transfer. An admission token, not a queue: a second
/// admission while this exists is rejected outright.
#[derive(Debug)]
struct UploadJob {
    token: u64,
    target_name: String,
    bytes_expected: u64,
    bytes_transferred: u64,
    started_at: Instant,
    /// Previous progress sample, for instantaneous speed
    last_sample: (Instant, u64),
}

struct UploadSlot {
    job: Option<UploadJob>,
    next_token: u64,
    throttle: BroadcastThrottle,
}

/// Single-flight gate over inbound asset transfers.
///
/// Admission is atomic: a rejected request (conflict, bad type, quota)
/// leaves the slot and the disk untouched. Once admitted, the transfer's
/// progress is broadcast with per-class debouncing, and `upload-end` is
/// guaranteed to fire no matter how the transfer stops.
pub struct UploadController {
    room: Arc<Room>,
    assets: Arc<AssetStore>,
    max_total_bytes: u64,
    max_file_bytes: u64,
    slot: Mutex<UploadSlot>,
}

impl UploadController {
    pub fn new(
        room: Arc<Room>,
        assets: Arc<AssetStore>,
        max_total_bytes: u64,
        max_file_bytes: u64,
        progress_throttle: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            room,
            assets,
            max_total_bytes,
            max_file_bytes,
            slot: Mutex::new(UploadSlot {
                job: None,
                next_token: 0,
                throttle: BroadcastThrottle::new(progress_throttle),
            }),
        })
    }

    /// Admit a transfer, or reject it without side effects.
    ///
    /// The slot lock is held across the quota scan so admissions stay
    /// serialized; with a single slot there is never more than one scan
    /// in flight.
    pub async fn admit(
        self: &Arc<Self>,
        original_name: &str,
        content_type: &str,
        bytes_expected: u64,
    ) -> Result<UploadGuard> {
        if !ALLOWED_CONTENT_TYPES.contains(&content_type) {
            return Err(Error::Validation(format!(
                "unsupported content type: {content_type}"
            )));
        }
        if bytes_expected == 0 {
            return Err(Error::Validation("missing content length".to_string()));
        }
        if bytes_expected > self.max_file_bytes {
            return Err(Error::Validation("file exceeds size limit".to_string()));
        }

        let mut slot = self.slot.lock().await;

        if slot.job.is_some() {
            return Err(Error::Conflict("upload already in progress".to_string()));
        }

        let existing = self.assets.total_bytes().await?;
        if existing + bytes_expected > self.max_total_bytes {
            return Err(Error::QuotaExceeded);
        }

        let target_name = self.assets.unique_name(original_name)?;
        let token = slot.next_token;
        slot.next_token += 1;

        let now = Instant::now();
        slot.job = Some(UploadJob {
            token,
            target_name: target_name.clone(),
            bytes_expected,
            bytes_transferred: 0,
            started_at: now,
            last_sample: (now, 0),
        });
        drop(slot);

        info!(
            "upload admitted: {} ({} bytes expected)",
            target_name, bytes_expected
        );
        self.room.broadcast_all(ServerEvent::UploadStart).await;

        Ok(UploadGuard {
            controller: Arc::clone(self),
            target_name,
            token,
            settled: false,
        })
    }

    /// Account a received chunk and maybe broadcast progress
    async fn record_progress(&self, token: u64, chunk_len: u64) {
        let mut slot = self.slot.lock().await;

        let progress = match &mut slot.job {
            Some(job) if job.token == token => {
                job.bytes_transferred += chunk_len;

                let percent = if job.bytes_expected > 0 {
                    ((job.bytes_transferred * 100) / job.bytes_expected).min(100) as u8
                } else {
                    0
                };

                let now = Instant::now();
                let (sampled_at, sampled_bytes) = job.last_sample;
                let elapsed = now.duration_since(sampled_at).as_secs_f64();
                let speed_kbps = if elapsed > 0.0 {
                    let delta = job.bytes_transferred.saturating_sub(sampled_bytes) as f64;
                    (delta / elapsed / 1024.0).round() as u64
                } else {
                    0
                };
                job.last_sample = (now, job.bytes_transferred);

                Some((percent, speed_kbps))
            }
            _ => None,
        };

        let event = match progress {
            Some((percent, speed_kbps)) if slot.throttle.allow(PROGRESS_CLASS) => {
                Some(ServerEvent::UploadProgress { percent, speed_kbps })
            }
            _ => None,
        };
        drop(slot);

        if let Some(event) = event {
            self.room.broadcast_all(event).await;
        }
    }

    /// Transfer finished cleanly: free the slot, announce the new asset
    async fn finish(&self, token: u64) {
        let Some(job) = self.take(token).await else {
            return;
        };

        info!(
            "upload complete: {} ({} bytes in {:.1}s)",
            job.target_name,
            job.bytes_transferred,
            job.started_at.elapsed().as_secs_f64()
        );

        self.room
            .broadcast_all(ServerEvent::UploadEnd {
                filename: Some(job.target_name.clone()),
            })
            .await;
        self.broadcast_asset_list().await;
    }

    /// Transfer failed or was abandoned: delete the partial file, free the
    /// slot, and still announce the end so clients never stay stuck on an
    /// upload that is no longer happening.
    async fn fail(&self, token: u64) {
        let Some(job) = self.take(token).await else {
            return;
        };

        warn!(
            "upload aborted: {} after {} of {} bytes",
            job.target_name, job.bytes_transferred, job.bytes_expected
        );

        let path = self.assets.path_of(&job.target_name);
        if let Err(err) = fs::remove_file(&path).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to remove partial upload {}: {}", path.display(), err);
            }
        }

        self.room
            .broadcast_all(ServerEvent::UploadEnd { filename: None })
            .await;
    }

    /// Remove the job if `token` still owns the slot
    async fn take(&self, token: u64) -> Option<UploadJob> {
        let mut slot = self.slot.lock().await;
        match &slot.job {
            Some(job) if job.token == token => slot.job.take(),
            _ => None,
        }
    }

    pub async fn is_active(&self) -> bool {
        self.slot.lock().await.job.is_some()
    }

    /// Filename of the transfer currently being written, if any. The
    /// retention sweeper uses this to avoid evicting a file mid-write.
    pub async fn active_target(&self) -> Option<String> {
        self.slot
            .lock()
            .await
            .job
            .as_ref()
            .map(|job| job.target_name.clone())
    }

    async fn broadcast_asset_list(&self) {
        match self.assets.scan().await {
            Ok(records) => {
                let assets = records.into_iter().map(|r| r.filename).collect();
                self.room
                    .broadcast_all(ServerEvent::AssetList { assets })
                    .await;
            }
            Err(err) => warn!("failed to scan assets for broadcast: {}", err),
        }
    }
}

/// Admission token for one transfer.
///
/// Dropping the guard without calling [`UploadGuard::complete`] counts as
/// a failure and triggers partial-file cleanup. That covers the connection
/// vanishing mid-transfer, which drops the handler future.
pub struct UploadGuard {
    controller: Arc<UploadController>,
    target_name: String,
    token: u64,
    settled: bool,
}

impl UploadGuard {
    /// Storage filename this transfer writes to
    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    /// Account `chunk_len` received bytes
    pub async fn progress(&self, chunk_len: u64) {
        self.controller.record_progress(self.token, chunk_len).await;
    }

    /// Mark the transfer finished and return the stored filename
    pub async fn complete(mut self) -> String {
        self.settled = true;
        self.controller.finish(self.token).await;
        std::mem::take(&mut self.target_name)
    }
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        if !self.settled {
            let controller = Arc::clone(&self.controller);
            let token = self.token;
            tokio::spawn(async move {
                controller.fail(token).await;
            });
        }
    }
}
