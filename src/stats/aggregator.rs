use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::{ApplyOutcome, CombatDomain, LineKey, StatEvent, StatSnapshot, StatStore};
use crate::error::{Error, Result};

type UpdateUnit = Box<dyn FnOnce(&dyn StatStore) + Send>;

/// Single-consumer FIFO queue in front of the stat store. A unit runs to
/// completion (load, mutate, save) before the next one starts reading, so
/// updates submitted from different callers cannot overwrite each other.
#[derive(Clone)]
pub struct StatAggregator {
    sender: mpsc::UnboundedSender<UpdateUnit>,
}

impl StatAggregator {
    /// Starts the worker. It stops once every handle has been dropped.
    pub fn spawn(store: Arc<dyn StatStore>) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<UpdateUnit>();

        let worker = tokio::spawn(async move {
            while let Some(unit) = receiver.recv().await {
                let store = Arc::clone(&store);
                if let Err(error) = tokio::task::spawn_blocking(move || unit(store.as_ref())).await
                {
                    tracing::error!(join_error = %error, "Stat update unit failed to complete");
                }
            }
            tracing::debug!("Stat update queue drained and closed");
        });

        (Self { sender }, worker)
    }

    /// Queues `work` behind every unit submitted before it and waits for its
    /// result.
    pub async fn submit<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn StatStore) -> Result<T> + Send + 'static,
    {
        let (reply, response) = oneshot::channel();
        let unit: UpdateUnit = Box::new(move |store: &dyn StatStore| {
            // The caller may have stopped waiting; the unit still completes.
            let _ = reply.send(work(store));
        });

        self.sender.send(unit).map_err(|_| Error::QueueClosed)?;
        response.await.map_err(|_| Error::QueueClosed)?
    }

    pub async fn apply(&self, key: LineKey, event: StatEvent) -> Result<ApplyOutcome> {
        self.submit(move |store| super::apply_event(store, &key, &event))
            .await
    }

    pub async fn reconcile_xp(&self) -> Result<Vec<CombatDomain>> {
        self.submit(super::reconcile_xp).await
    }

    pub async fn snapshot(&self) -> Result<StatSnapshot> {
        self.submit(super::snapshot).await
    }
}

#[cfg(test)]
mod tests {
    use super::StatAggregator;
    use crate::error::{Error, Result};
    use crate::stats::{
        Action, CombatDomain, CombatRecord, JsonStatStore, LineKey, LogEntry, StatEvent,
        StatStore, WeaponBook,
    };
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn combat(domain: CombatDomain, action: Action) -> StatEvent {
        StatEvent::Combat {
            domain,
            entry: LogEntry {
                timestamp: Utc::now(),
                action,
                subject_class_id: Some("Pilot2".to_string()),
                counterparty_class_id: None,
                own_ship_class_id: None,
                weapon_class_id: None,
            },
        }
    }

    /// Slows every load so overlapping units would interleave if the queue
    /// did not serialize them.
    struct SlowStore(JsonStatStore);

    impl StatStore for SlowStore {
        fn load_combat(&self, domain: CombatDomain) -> Result<CombatRecord> {
            std::thread::sleep(std::time::Duration::from_millis(5));
            self.0.load_combat(domain)
        }

        fn save_combat(&self, domain: CombatDomain, record: &CombatRecord) -> Result<()> {
            self.0.save_combat(domain, record)
        }

        fn load_weapons(&self) -> Result<WeaponBook> {
            self.0.load_weapons()
        }

        fn save_weapons(&self, weapons: &WeaponBook) -> Result<()> {
            self.0.save_weapons(weapons)
        }
    }

    /// Fails the first combat save, then behaves.
    struct FailOnceStore {
        inner: JsonStatStore,
        failed: AtomicBool,
    }

    impl StatStore for FailOnceStore {
        fn load_combat(&self, domain: CombatDomain) -> Result<CombatRecord> {
            self.inner.load_combat(domain)
        }

        fn save_combat(&self, domain: CombatDomain, record: &CombatRecord) -> Result<()> {
            if !self.failed.swap(true, Ordering::SeqCst) {
                return Err(Error::Persist {
                    target: "PVP record",
                    reason: "disk full".to_string(),
                });
            }
            self.inner.save_combat(domain, record)
        }

        fn load_weapons(&self) -> Result<WeaponBook> {
            self.inner.load_weapons()
        }

        fn save_weapons(&self, weapons: &WeaponBook) -> Result<()> {
            self.inner.save_weapons(weapons)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_submissions_never_lose_updates() {
        let temp_directory = tempfile::tempdir().expect("Failed to create temp directory");
        let store = Arc::new(SlowStore(JsonStatStore::new(temp_directory.path())));
        let (aggregator, _worker) = StatAggregator::spawn(store);

        let mut tasks = Vec::new();
        for line in 0..20u64 {
            let aggregator = aggregator.clone();
            let action = if line % 2 == 0 {
                Action::Win
            } else {
                Action::Loss
            };
            tasks.push(tokio::spawn(async move {
                aggregator
                    .apply(LineKey::new("burst", line), combat(CombatDomain::Pvp, action))
                    .await
            }));
        }
        for task in tasks {
            task.await
                .expect("Expected task to join")
                .expect("Expected update to apply");
        }

        let snapshot = aggregator.snapshot().await.expect("Expected snapshot");
        assert_eq!(snapshot.pvp.kills, 10);
        assert_eq!(snapshot.pvp.deaths, 10);
        assert_eq!(snapshot.pvp.event_log.len(), 20);
        assert_eq!(snapshot.pvp.xp, 200);
    }

    #[tokio::test]
    async fn failed_unit_can_be_replayed_without_double_counting() {
        let temp_directory = tempfile::tempdir().expect("Failed to create temp directory");
        let store = Arc::new(FailOnceStore {
            inner: JsonStatStore::new(temp_directory.path()),
            failed: AtomicBool::new(false),
        });
        let (aggregator, _worker) = StatAggregator::spawn(store);
        let key = LineKey::new("session", 3);

        let error = aggregator
            .apply(key.clone(), combat(CombatDomain::Pvp, Action::Win))
            .await
            .expect_err("Expected first save to fail");
        assert!(!error.is_line_local());

        aggregator
            .apply(key.clone(), combat(CombatDomain::Pvp, Action::Win))
            .await
            .expect("Expected replay to apply");
        let replay = aggregator
            .apply(key, combat(CombatDomain::Pvp, Action::Win))
            .await
            .expect("Expected second replay to succeed");

        assert!(!replay.applied);
        let snapshot = aggregator.snapshot().await.expect("Expected snapshot");
        assert_eq!(snapshot.pvp.kills, 1);
    }

    #[tokio::test]
    async fn reconciliation_runs_through_the_queue() {
        let temp_directory = tempfile::tempdir().expect("Failed to create temp directory");
        std::fs::write(
            temp_directory.path().join("pvp.json"),
            r#"{ "kills": 3, "deaths": 0 }"#,
        )
        .expect("Failed to write legacy PVP record");
        let (aggregator, _worker) =
            StatAggregator::spawn(Arc::new(JsonStatStore::new(temp_directory.path())));

        let reconciled = aggregator.reconcile_xp().await.expect("Expected reconciliation");

        assert_eq!(reconciled, vec![CombatDomain::Pvp]);
        assert_eq!(
            aggregator.snapshot().await.expect("Expected snapshot").pvp.xp,
            60
        );
    }
}
