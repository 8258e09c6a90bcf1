use crate::state::AppState;
use std::time::Duration;
use tokio::sync::watch;

/// Periodically purge tombstoned records whose grace period has passed.
pub async fn run(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let interval = Duration::from_secs(state.config.tombstone_sweep_interval_secs.max(1));

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => {
                tracing::info!("Tombstone reaper shutting down");
                return;
            }
        }

        if let Some(node) = state.store.cluster() {
            if !node.is_leader() {
                continue;
            }
        }

        match state.store.clean_tombstones().await {
            Ok(0) => {}
            Ok(purged) => tracing::info!(count = purged, "Tombstone sweep completed"),
            Err(e) => tracing::warn!(error = %e, "Tombstone sweep failed"),
        }
    }
}
