use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::engine::Engine;

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that rewrites the tenant's WAL once enough events have
/// piled up since the last compaction.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_due(&engine, threshold).await;
    }
}

/// One compactor pass. Returns whether the WAL was rewritten.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> bool {
    engine.notify.prune();
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match engine.compact_wal().await {
        Ok(()) => {
            info!("compacted WAL after {appends} appends");
            true
        }
        Err(e) => {
            warn!("WAL compaction failed: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SlotCatalog;
    use crate::model::*;
    use crate::notify::NotifyHub;
    use crate::wal::Wal;

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let dir = std::env::temp_dir().join("campus_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("threshold.wal");
        let _ = std::fs::remove_file(&path);
        let engine = Engine::new(path.clone(), Arc::new(NotifyHub::new()), SlotCatalog::standard()).unwrap();

        let vc = Actor::new("vc", UNIVERSITY, Role::Vc);
        engine.register_actor(None, vc.clone()).await.unwrap();
        for role in [Role::Faculty, Role::Hod, Role::Faculty] {
            engine
                .register_actor(Some(&vc), Actor::new("dr-kumar", "Civil", role))
                .await
                .unwrap();
        }
        assert!(!compact_if_due(&engine, 10).await);
        assert_eq!(Wal::replay(&path).unwrap().len(), 4);

        assert!(compact_if_due(&engine, 4).await);
        let replayed = Wal::replay(&path).unwrap();
        assert_eq!(replayed.len(), 2);
        assert!(replayed.contains(&Event::ActorRegistered { actor: vc }));
        assert!(replayed.contains(&Event::ActorRegistered {
            actor: Actor::new("dr-kumar", "Civil", Role::Faculty)
        }));
        assert_eq!(engine.wal_appends_since_compact().await, 0);
    }
}
