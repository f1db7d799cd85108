use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::protocol::ServerEvent;
use crate::room::Room;

use super::assets::AssetStore;
use super::upload::UploadController;

/// Background eviction of assets past the retention age.
///
/// One pass enumerates the store and deletes anything old enough, always
/// skipping the file an active upload is still writing. Failures are
/// per-item: one undeletable file never aborts the rest of the sweep.
pub struct RetentionSweeper {
    assets: Arc<AssetStore>,
    uploads: Arc<UploadController>,
    room: Arc<Room>,
    max_age: chrono::Duration,
    interval: Duration,
}

impl RetentionSweeper {
    pub fn new(
        assets: Arc<AssetStore>,
        uploads: Arc<UploadController>,
        room: Arc<Room>,
        max_age: chrono::Duration,
        interval: Duration,
    ) -> Self {
        Self {
            assets,
            uploads,
            room,
            max_age,
            interval,
        }
    }

    /// Spawn the sweep loop. The returned handle is a revocable token;
    /// aborting it stops future sweeps.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                self.sweep(Utc::now()).await;
            }
        })
    }

    /// One retention pass against the given clock reading
    pub async fn sweep(&self, now: DateTime<Utc>) {
        let records = match self.assets.scan().await {
            Ok(records) => records,
            Err(err) => {
                warn!("retention sweep skipped, scan failed: {}", err);
                return;
            }
        };

        let active_target = self.uploads.active_target().await;

        for record in records {
            if now.signed_duration_since(record.created_at) < self.max_age {
                continue;
            }
            if active_target.as_deref() == Some(record.filename.as_str()) {
                // Never evict the file currently being written
                continue;
            }

            match self.assets.delete(&record.filename).await {
                Ok(()) => {
                    info!("retention: evicted {}", record.filename);
                    self.room
                        .broadcast_all(ServerEvent::AssetDeleted {
                            filename: record.filename,
                        })
                        .await;
                }
                Err(err) => {
                    warn!(
                        "retention: failed to evict {}: {}, continuing",
                        record.filename, err
                    );
                }
            }
        }
    }
}
