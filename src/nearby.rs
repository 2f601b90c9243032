use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SightingKind {
    Corpse,
    Stall,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyPlayer {
    pub name: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub icon_kind: SightingKind,
}

/// Players recently sighted near the local user. Not persisted.
pub struct NearbyRegistry {
    ttl: Duration,
    players: Mutex<BTreeMap<String, NearbyPlayer>>,
}

impl NearbyRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            players: Mutex::new(BTreeMap::new()),
        }
    }

    /// Records a sighting. Repeat sightings refresh the entry instead of adding
    /// a second one. Returns `true` for a player not already listed.
    pub fn observe(&self, name: &str, icon_kind: SightingKind, seen_at: DateTime<Utc>) -> bool {
        let mut players = match self.players.lock() {
            Ok(players) => players,
            Err(error) => {
                tracing::error!(lock_error = %error, "Failed to lock nearby players");
                return false;
            }
        };

        if let Some(existing) = players.get_mut(name) {
            existing.last_seen_at = existing.last_seen_at.max(seen_at);
            existing.icon_kind = icon_kind;
            return false;
        }

        players.insert(
            name.to_string(),
            NearbyPlayer {
                name: name.to_string(),
                first_seen_at: seen_at,
                last_seen_at: seen_at,
                icon_kind,
            },
        );
        true
    }

    /// Drops entries not seen within the TTL. Returns how many were removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let Ok(ttl) = chrono::Duration::from_std(self.ttl) else {
            return 0;
        };

        let mut players = match self.players.lock() {
            Ok(players) => players,
            Err(error) => {
                tracing::error!(lock_error = %error, "Failed to lock nearby players");
                return 0;
            }
        };

        let before = players.len();
        players.retain(|_, player| now - player.last_seen_at < ttl);
        before - players.len()
    }

    pub fn clear(&self) {
        if let Ok(mut players) = self.players.lock() {
            players.clear();
        }
    }

    pub fn snapshot(&self) -> Vec<NearbyPlayer> {
        match self.players.lock() {
            Ok(players) => players.values().cloned().collect(),
            Err(error) => {
                tracing::error!(lock_error = %error, "Failed to lock nearby players");
                Vec::new()
            }
        }
    }
}

/// Periodic TTL sweep, independent of the tailing loop.
pub fn spawn_sweeper(registry: Arc<NearbyRegistry>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = registry.sweep(Utc::now());
            if removed > 0 {
                tracing::debug!(removed, "Purged expired nearby players");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::{NearbyRegistry, SightingKind};
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    #[test]
    fn repeated_sightings_refresh_instead_of_duplicating() {
        let registry = NearbyRegistry::new(Duration::from_secs(300));
        let first = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2025, 1, 1, 12, 4, 0).unwrap();

        assert!(registry.observe("Pilot3", SightingKind::Corpse, first));
        assert!(!registry.observe("Pilot3", SightingKind::Stall, later));

        let players = registry.snapshot();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].first_seen_at, first);
        assert_eq!(players[0].last_seen_at, later);
        assert_eq!(players[0].icon_kind, SightingKind::Stall);
    }

    #[test]
    fn sweep_purges_entries_older_than_ttl() {
        let registry = NearbyRegistry::new(Duration::from_secs(300));
        let seen = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        registry.observe("Old", SightingKind::Corpse, seen);
        registry.observe(
            "Fresh",
            SightingKind::Corpse,
            Utc.with_ymd_and_hms(2025, 1, 1, 12, 4, 0).unwrap(),
        );

        let removed = registry.sweep(Utc.with_ymd_and_hms(2025, 1, 1, 12, 5, 30).unwrap());

        assert_eq!(removed, 1);
        let names = registry
            .snapshot()
            .into_iter()
            .map(|player| player.name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Fresh".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_runs_on_its_own_interval() {
        let registry = std::sync::Arc::new(NearbyRegistry::new(Duration::from_secs(0)));
        registry.observe("Gone", SightingKind::Corpse, Utc::now());

        let handle = super::spawn_sweeper(registry.clone(), Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        handle.abort();

        assert!(registry.snapshot().is_empty());
    }
}
