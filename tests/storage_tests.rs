// Integration tests for asset storage, upload admission, and retention
//
// These tests verify the single-flight upload slot, the aggregate quota
// boundary, partial-file cleanup on failure, and the retention sweeper's
// age threshold and active-target skip.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;

use watchroom::config::RoomConfig;
use watchroom::{
    AssetStore, Error, Room, RetentionSweeper, ServerEvent, UploadController,
};

fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn test_room_config() -> RoomConfig {
    RoomConfig {
        max_participants: 2,
        broadcast_throttle_ms: 0,
        call_timeout_secs: 30,
    }
}

async fn make_store() -> (TempDir, Arc<AssetStore>) {
    let dir = TempDir::new().unwrap();
    let store = AssetStore::open(dir.path()).await.unwrap();
    (dir, Arc::new(store))
}

fn make_controller(
    room: &Arc<Room>,
    assets: &Arc<AssetStore>,
    max_total: u64,
) -> Arc<UploadController> {
    UploadController::new(
        Arc::clone(room),
        Arc::clone(assets),
        max_total,
        max_total,
        Duration::ZERO,
    )
}

// ============================================================================
// Asset store
// ============================================================================

#[tokio::test]
async fn test_scan_reflects_directory_contents() {
    let (dir, store) = make_store().await;
    assert!(store.scan().await.unwrap().is_empty());

    fs::write(dir.path().join("a.mp4"), vec![0u8; 100]).unwrap();
    fs::write(dir.path().join("b.mp4"), vec![0u8; 250]).unwrap();

    let mut records = store.scan().await.unwrap();
    records.sort_by(|a, b| a.filename.cmp(&b.filename));
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].size_bytes, 100);
    assert_eq!(records[1].size_bytes, 250);
    assert_eq!(store.total_bytes().await.unwrap(), 350);
}

#[tokio::test]
async fn test_delete_missing_asset_is_not_found() {
    let (_dir, store) = make_store().await;
    let result = store.delete("nope.mp4").await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_asset_names_cannot_escape_the_store() {
    let (_dir, store) = make_store().await;
    assert!(matches!(
        store.delete("../etc/passwd").await,
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        store.unique_name("a/b.mp4"),
        Err(Error::Validation(_))
    ));

    let name = store.unique_name("movie.mp4").unwrap();
    assert!(name.ends_with("-movie.mp4"));
}

// ============================================================================
// Upload admission
// ============================================================================

#[tokio::test]
async fn test_admission_validates_content_type() {
    let (_dir, assets) = make_store().await;
    let room = Room::new(&test_room_config());
    let uploads = make_controller(&room, &assets, 1_000);

    let result = uploads.admit("notes.txt", "text/plain", 10).await;
    assert!(matches!(result, Err(Error::Validation(_))));
    assert!(!uploads.is_active().await);
}

#[tokio::test]
async fn test_quota_boundary_is_exact() {
    let (dir, assets) = make_store().await;
    let room = Room::new(&test_room_config());
    let uploads = make_controller(&room, &assets, 1_000);

    // 600 bytes already stored, 1000 byte cap
    fs::write(dir.path().join("existing.mp4"), vec![0u8; 600]).unwrap();

    // One byte over the remaining headroom is rejected
    let result = uploads.admit("big.mp4", "video/mp4", 401).await;
    assert!(matches!(result, Err(Error::QuotaExceeded)));
    assert!(!uploads.is_active().await);

    // Exactly the remaining headroom is admitted
    let guard = uploads.admit("fits.mp4", "video/mp4", 400).await.unwrap();
    guard.complete().await;
}

#[tokio::test]
async fn test_upload_slot_is_single_flight() {
    let (_dir, assets) = make_store().await;
    let room = Room::new(&test_room_config());
    let uploads = make_controller(&room, &assets, 10_000);

    let guard = uploads.admit("one.mp4", "video/mp4", 100).await.unwrap();

    let second = uploads.admit("two.mp4", "video/mp4", 100).await;
    assert!(matches!(second, Err(Error::Conflict(_))));

    // The slot frees once the active job settles
    guard.complete().await;
    let third = uploads.admit("three.mp4", "video/mp4", 100).await.unwrap();
    third.complete().await;
}

#[tokio::test]
async fn test_progress_and_lifecycle_broadcasts() {
    let (_dir, assets) = make_store().await;
    let room = Room::new(&test_room_config());
    let uploads = make_controller(&room, &assets, 10_000);

    let (tx, mut rx) = mpsc::unbounded_channel();
    room.admit("watcher", tx).await.unwrap();
    drain(&mut rx);

    let guard = uploads.admit("clip.mp4", "video/mp4", 1_000).await.unwrap();
    let events = drain(&mut rx);
    assert!(matches!(&events[0], ServerEvent::UploadStart));

    guard.progress(500).await;
    let events = drain(&mut rx);
    assert!(matches!(
        &events[0],
        ServerEvent::UploadProgress { percent: 50, .. }
    ));

    let filename = guard.complete().await;
    let events = drain(&mut rx);
    assert!(matches!(
        &events[0],
        ServerEvent::UploadEnd { filename: Some(name) } if *name == filename
    ));
    // Completion also refreshes everyone's asset list
    assert!(events
        .iter()
        .any(|e| matches!(e, ServerEvent::AssetList { .. })));
}

#[tokio::test]
async fn test_abandoned_upload_cleans_partial_file_and_frees_slot() {
    let (dir, assets) = make_store().await;
    let room = Room::new(&test_room_config());
    let uploads = make_controller(&room, &assets, 10_000);

    let (tx, mut rx) = mpsc::unbounded_channel();
    room.admit("watcher", tx).await.unwrap();
    drain(&mut rx);

    let guard = uploads.admit("clip.mp4", "video/mp4", 1_000).await.unwrap();
    let target = guard.target_name().to_string();
    fs::write(dir.path().join(&target), vec![0u8; 300]).unwrap();
    drain(&mut rx);

    // Dropping the guard models a client abort mid-transfer
    drop(guard);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!dir.path().join(&target).exists(), "partial file removed");
    assert!(!uploads.is_active().await);

    // upload-end still fires so clients never stay stuck
    let events = drain(&mut rx);
    assert!(matches!(
        &events[0],
        ServerEvent::UploadEnd { filename: None }
    ));

    let again = uploads.admit("retry.mp4", "video/mp4", 100).await.unwrap();
    again.complete().await;
}

// ============================================================================
// Retention
// ============================================================================

#[tokio::test]
async fn test_sweep_evicts_only_expired_assets() {
    let (dir, assets) = make_store().await;
    let room = Room::new(&test_room_config());
    let uploads = make_controller(&room, &assets, 10_000);

    let (tx, mut rx) = mpsc::unbounded_channel();
    room.admit("watcher", tx).await.unwrap();
    drain(&mut rx);

    fs::write(dir.path().join("old.mp4"), vec![0u8; 10]).unwrap();

    let sweeper = RetentionSweeper::new(
        Arc::clone(&assets),
        Arc::clone(&uploads),
        Arc::clone(&room),
        chrono::Duration::hours(1),
        Duration::from_secs(3600),
    );

    // Young asset: preserved
    sweeper.sweep(chrono::Utc::now()).await;
    assert!(dir.path().join("old.mp4").exists());
    assert!(drain(&mut rx).is_empty());

    // Past the threshold: evicted and announced
    sweeper.sweep(chrono::Utc::now() + chrono::Duration::hours(2)).await;
    assert!(!dir.path().join("old.mp4").exists());
    let events = drain(&mut rx);
    assert!(matches!(
        &events[0],
        ServerEvent::AssetDeleted { filename } if filename == "old.mp4"
    ));
}

#[tokio::test]
async fn test_sweep_skips_the_active_upload_target() {
    let (dir, assets) = make_store().await;
    let room = Room::new(&test_room_config());
    let uploads = make_controller(&room, &assets, 10_000);

    let guard = uploads.admit("live.mp4", "video/mp4", 100).await.unwrap();
    let target = guard.target_name().to_string();
    fs::write(dir.path().join(&target), vec![0u8; 10]).unwrap();
    fs::write(dir.path().join("stale.mp4"), vec![0u8; 10]).unwrap();

    let sweeper = RetentionSweeper::new(
        Arc::clone(&assets),
        Arc::clone(&uploads),
        Arc::clone(&room),
        chrono::Duration::hours(1),
        Duration::from_secs(3600),
    );
    sweeper.sweep(chrono::Utc::now() + chrono::Duration::hours(2)).await;

    // The file mid-write survives; everything else expired is gone
    assert!(dir.path().join(&target).exists());
    assert!(!dir.path().join("stale.mp4").exists());

    guard.complete().await;
}
