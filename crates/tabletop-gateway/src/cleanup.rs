use std::time::Duration;

use tracing::{debug, info, warn};

use tabletop_store::AssetStorage;

use crate::protocol::Gateway;

/// Background task that reclaims idle rooms.
///
/// A room goes when nobody is connected and every participant has been
/// inactive for longer than `idle_after`.
pub async fn run_cleanup_loop(
    gateway: Gateway,
    storage: AssetStorage,
    interval: Duration,
    idle_after: chrono::Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick fires immediately; a fresh server has nothing to sweep.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        match sweep_idle_rooms(&gateway, &storage, idle_after).await {
            Ok(count) => {
                if count > 0 {
                    info!("Cleanup: removed {} idle rooms", count);
                }
            }
            Err(e) => {
                warn!("Cleanup error: {:#}", e);
            }
        }
    }
}

/// One sweep over all rooms. Returns how many were deleted.
pub async fn sweep_idle_rooms(
    gateway: &Gateway,
    storage: &AssetStorage,
    idle_after: chrono::Duration,
) -> anyhow::Result<usize> {
    let rooms = gateway.rooms();
    let cutoff = rooms.clock().now() - idle_after;
    let mut removed = 0;

    for room_id in rooms.room_ids().await? {
        // Held across the check and the delete so a join cannot slip in between.
        let _guard = gateway.sequencer().lock(room_id).await;

        if gateway.registry().is_room_live(room_id).await {
            continue;
        }
        let participants = rooms.participants(room_id).await?;
        if !participants.iter().all(|p| p.last_seen < cutoff) {
            continue;
        }

        let Some(paths) = rooms.delete_room(room_id).await? else {
            continue;
        };
        debug!("Idle room {} held {} assets", room_id, paths.len());
        if let Err(e) = storage.delete_all(room_id, &paths).await {
            warn!("Failed to remove assets for room {}: {:#}", room_id, e);
        }
        removed += 1;
    }

    Ok(removed)
}
