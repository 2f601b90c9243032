//! Incremental tailing of the game log: detect growth or a new session, then
//! feed every unconsumed line through classification, extraction and the stat
//! aggregator, persisting the cursor after each line.

mod watch;

pub use watch::spawn_tailing_driver;

use chrono::{DateTime, Utc};
use serde_json::json;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::classifier::{classify, LineKind};
use crate::cursor::{CursorStore, LogCursor};
use crate::enrichment::{ClassKind, EnrichmentGateway};
use crate::error::{Error, Result};
use crate::events::account::{parse_account_identity, parse_game_version};
use crate::events::actor_death::{classify_actor_death, parse_actor_death, DeathOutcome, Engagement};
use crate::events::presence::{
    parse_corpse_sighting, parse_location, parse_spawn_reservation, parse_stall_sighting,
    PlayerSighting,
};
use crate::events::vehicle::{
    parse_fatal_collision, parse_vehicle_control, parse_vehicle_destruction, ControlChange,
};
use crate::events::log_timestamp;
use crate::identity::{IdentityStore, UserIdentity};
use crate::nearby::NearbyRegistry;
use crate::notifications::{dispatch_detached, NotificationKind, NotificationSink};
use crate::settings::{Settings, SettingsSource};
use crate::stats::{
    Action, ApplyOutcome, CombatDomain, LineKey, LogEntry, StatAggregator, StatEvent,
    VehicleLogEntry,
};

const SUICIDE_SUBJECT: &str = "suicide";
const CRASH_SUBJECT: &str = "crash";

/// Result of one scheduled invocation.
#[derive(Debug)]
pub enum TickOutcome {
    /// A previous pass was still in flight; this tick did nothing.
    AlreadyRunning,
    Completed(PassOutcome),
    Failed(Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    NoGrowth,
    /// The log has no content line to fingerprint yet.
    Empty,
    /// A new session was adopted; its content is consumed on the next pass.
    Rotated,
    /// Same session but shorter than recorded; retried next tick.
    Truncated,
    Drained(DrainSummary),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub processed_lines: u64,
    pub skipped_lines: u64,
    pub stat_updates: u64,
}

/// State shared by every line of one pass.
struct PassState {
    settings: Settings,
    identity: UserIdentity,
    epoch_marker: String,
}

pub struct LogTailer {
    settings: Arc<dyn SettingsSource>,
    cursor_store: Arc<dyn CursorStore>,
    identity_store: Arc<dyn IdentityStore>,
    aggregator: StatAggregator,
    gateway: Arc<dyn EnrichmentGateway>,
    notifier: Arc<dyn NotificationSink>,
    nearby: Arc<NearbyRegistry>,
    running: AtomicBool,
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl LogTailer {
    pub fn new(
        settings: Arc<dyn SettingsSource>,
        cursor_store: Arc<dyn CursorStore>,
        identity_store: Arc<dyn IdentityStore>,
        aggregator: StatAggregator,
        gateway: Arc<dyn EnrichmentGateway>,
        notifier: Arc<dyn NotificationSink>,
        nearby: Arc<NearbyRegistry>,
    ) -> Self {
        Self {
            settings,
            cursor_store,
            identity_store,
            aggregator,
            gateway,
            notifier,
            nearby,
            running: AtomicBool::new(false),
        }
    }

    /// Runs one pass unless one is already in flight. Overlapping ticks are
    /// dropped, not queued.
    pub async fn tick(&self) -> TickOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::trace!("Previous tailing pass still running, skipping tick");
            return TickOutcome::AlreadyRunning;
        }
        let _running = RunningGuard(&self.running);

        match self.run_pass().await {
            Ok(outcome) => TickOutcome::Completed(outcome),
            Err(error) => {
                tracing::error!(pass_error = %error, "Tailing pass aborted");
                TickOutcome::Failed(error)
            }
        }
    }

    async fn run_pass(&self) -> Result<PassOutcome> {
        let settings = self.settings.load()?;
        let log_path = settings.log_path()?;

        let metadata = std::fs::metadata(&log_path)
            .map_err(|error| Error::io_at("inspect game log", &log_path, error))?;
        let live_size = metadata.len();
        let last_modified_at = metadata.modified().ok().map(DateTime::<Utc>::from);

        let cursor = self.cursor_store.load();
        if live_size == cursor.file_size_bytes {
            tracing::trace!(file_size_bytes = live_size, "Game log unchanged");
            return Ok(PassOutcome::NoGrowth);
        }

        let content = read_log(&log_path)?;
        let Some(epoch_marker) = epoch_marker(&content) else {
            tracing::debug!(log_path = %log_path.display(), "Game log has no content yet");
            return Ok(PassOutcome::Empty);
        };

        if cursor.epoch_marker.is_empty() || cursor.epoch_marker != epoch_marker {
            self.rotate(&cursor, epoch_marker, last_modified_at)?;
            return Ok(PassOutcome::Rotated);
        }

        if live_size < cursor.file_size_bytes {
            tracing::warn!(
                log_path = %log_path.display(),
                stored_size_bytes = cursor.file_size_bytes,
                live_size_bytes = live_size,
                "Game log is shorter than recorded, retrying next tick"
            );
            return Ok(PassOutcome::Truncated);
        }

        let mut state = PassState {
            settings,
            identity: self.identity_store.load()?,
            epoch_marker: epoch_marker.to_string(),
        };
        let summary = self
            .drain(&content, cursor, live_size, last_modified_at, &mut state)
            .await?;

        if summary.processed_lines > 0 {
            tracing::debug!(
                processed_lines = summary.processed_lines,
                skipped_lines = summary.skipped_lines,
                stat_updates = summary.stat_updates,
                "Drained game log"
            );
        }
        Ok(PassOutcome::Drained(summary))
    }

    fn rotate(
        &self,
        previous: &LogCursor,
        epoch_marker: &str,
        last_modified_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        // Session side effects first: if they fail the rotation is detected
        // again on the next pass.
        self.identity_store.reset_session()?;
        self.nearby.clear();

        // Size 0 so the next pass sees growth and drains from line 0.
        self.cursor_store
            .save(&LogCursor::rotated(epoch_marker.to_string(), 0, last_modified_at))?;

        tracing::info!(
            previous_line_index = previous.last_processed_line_index,
            epoch_marker,
            "New game session detected, cursor reset"
        );
        Ok(())
    }

    async fn drain(
        &self,
        content: &str,
        mut cursor: LogCursor,
        live_size: u64,
        last_modified_at: Option<DateTime<Utc>>,
        state: &mut PassState,
    ) -> Result<DrainSummary> {
        let mut summary = DrainSummary::default();
        let start_index = usize::try_from(cursor.last_processed_line_index).unwrap_or(usize::MAX);

        for (line_index, raw_line) in complete_lines(content).enumerate().skip(start_index) {
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }

            let key = LineKey::new(&state.epoch_marker, line_index as u64);
            match self.process_line(line, key, state).await {
                Ok(true) => summary.stat_updates += 1,
                Ok(false) => {}
                Err(error) if error.is_line_local() => {
                    tracing::warn!(line_index, line_error = %error, "Skipping unreadable log line");
                    summary.skipped_lines += 1;
                }
                Err(error) => return Err(error),
            }

            // The stored size stays behind until the batch completes, so an
            // interrupted batch still looks like growth on the next pass.
            cursor = cursor.advanced_past(line_index as u64, cursor.file_size_bytes, last_modified_at);
            self.cursor_store.save(&cursor)?;
            summary.processed_lines += 1;
        }

        cursor.file_size_bytes = live_size;
        cursor.last_modified_at = last_modified_at;
        cursor.session_detected = true;
        self.cursor_store.save(&cursor)?;

        Ok(summary)
    }

    /// Returns whether a stat record changed.
    async fn process_line(&self, line: &str, key: LineKey, state: &mut PassState) -> Result<bool> {
        let Some(kind) = classify(line) else {
            return Ok(false);
        };
        tracing::trace!(line_kind = kind.label(), "Classified log line");

        match kind {
            LineKind::ActorDeath => self.handle_actor_death(line, key, state).await,
            LineKind::FatalCollision => self.handle_fatal_collision(line, key, state).await,
            LineKind::VehicleDestruction => self.handle_vehicle_destruction(line, key, state).await,
            LineKind::AccountIdentity => {
                let account = parse_account_identity(line)?;
                let mut identity = state.identity.clone();
                if let Some(display_name) = account.display_name {
                    identity.display_name = Some(display_name);
                }
                if let Some(external_id) = account.external_id {
                    identity.external_id = Some(external_id);
                }
                self.update_identity(state, identity)?;
                Ok(false)
            }
            LineKind::GameVersion => {
                let game_version = parse_game_version(line)?;
                let mut identity = state.identity.clone();
                identity.game_version = Some(game_version);
                self.update_identity(state, identity)?;
                Ok(false)
            }
            LineKind::VehicleControl => {
                let Some(control) = parse_vehicle_control(line) else {
                    return Ok(false);
                };
                let mut identity = state.identity.clone();
                match control.change {
                    ControlChange::Acquired => {
                        identity.current_ship_instance = Some(control.ship_instance);
                        identity.current_ship_class = Some(control.ship_class);
                    }
                    ControlChange::Released => {
                        if identity.current_ship_instance.as_deref()
                            == Some(control.ship_instance.as_str())
                        {
                            identity.clear_session_state();
                        }
                    }
                }
                self.update_identity(state, identity)?;
                Ok(false)
            }
            LineKind::LocationInventory => {
                let update = parse_location(line)?;
                if state.identity.is_local_user(&update.player) {
                    let mut identity = state.identity.clone();
                    identity.current_location = Some(update.location);
                    self.update_identity(state, identity)?;
                }
                Ok(false)
            }
            LineKind::SpawnFlow => {
                let reservation = parse_spawn_reservation(line)?;
                if state.identity.is_local_user(&reservation.player) {
                    let mut identity = state.identity.clone();
                    if reservation.received {
                        identity.spawn_point = Some(reservation.spawn_point);
                    } else if identity.spawn_point.as_deref() == Some(reservation.spawn_point.as_str())
                    {
                        identity.spawn_point = None;
                    }
                    self.update_identity(state, identity)?;
                }
                Ok(false)
            }
            LineKind::Corpse => {
                let sighting = parse_corpse_sighting(line, state.identity.user_name());
                self.record_sighting(line, sighting);
                Ok(false)
            }
            LineKind::ActorStall => {
                let sighting = parse_stall_sighting(line, state.identity.user_name());
                self.record_sighting(line, sighting);
                Ok(false)
            }
            LineKind::EndMission => Ok(false),
        }
    }

    async fn handle_actor_death(
        &self,
        line: &str,
        key: LineKey,
        state: &mut PassState,
    ) -> Result<bool> {
        let record = parse_actor_death(line)?;
        let classification = classify_actor_death(&record, &state.identity, self.gateway.as_ref());
        for (kind, class_id) in classification.unknown_classes {
            self.report_unknown_detached(kind, class_id);
        }

        let (domain, action, engagement, notification) = match classification.outcome {
            DeathOutcome::Suicide => (
                CombatDomain::Pve,
                Action::Loss,
                Engagement {
                    counterparty: SUICIDE_SUBJECT.to_string(),
                    own_ship: state.identity.ship_class().map(str::to_string),
                    ..Engagement::default()
                },
                Some(NotificationKind::Suicide),
            ),
            DeathOutcome::PveKill(engagement) => (
                CombatDomain::Pve,
                Action::Win,
                engagement,
                Some(NotificationKind::PveKill),
            ),
            DeathOutcome::PvpKill(engagement) => (
                CombatDomain::Pvp,
                Action::Win,
                engagement,
                Some(NotificationKind::PvpKill),
            ),
            DeathOutcome::PveDeath(engagement) => (CombatDomain::Pve, Action::Loss, engagement, None),
            DeathOutcome::PvpDeath(engagement) => (
                CombatDomain::Pvp,
                Action::Loss,
                engagement,
                Some(NotificationKind::PvpDeath),
            ),
            DeathOutcome::Unattributed(reason) => {
                tracing::trace!(victim = %record.victim, reason, "Actor death not counted");
                return Ok(false);
            }
        };

        let entry = LogEntry {
            timestamp: log_timestamp(line).unwrap_or_else(Utc::now),
            action,
            subject_class_id: Some(engagement.counterparty),
            counterparty_class_id: engagement.counterparty_ship,
            own_ship_class_id: engagement.own_ship,
            weapon_class_id: engagement.weapon,
        };
        self.apply_combat(key, domain, entry, notification, state).await
    }

    async fn handle_fatal_collision(
        &self,
        line: &str,
        key: LineKey,
        state: &mut PassState,
    ) -> Result<bool> {
        let collision = parse_fatal_collision(line)?;
        let entry = LogEntry {
            timestamp: log_timestamp(line).unwrap_or_else(Utc::now),
            action: Action::Loss,
            subject_class_id: Some(CRASH_SUBJECT.to_string()),
            counterparty_class_id: None,
            own_ship_class_id: Some(collision.vehicle_class),
            weapon_class_id: None,
        };
        self.apply_combat(key, CombatDomain::Pve, entry, Some(NotificationKind::Crash), state)
            .await
    }

    async fn handle_vehicle_destruction(
        &self,
        line: &str,
        key: LineKey,
        state: &mut PassState,
    ) -> Result<bool> {
        let destruction = parse_vehicle_destruction(line)?;
        let caused_by_user = destruction
            .caused_by
            .as_deref()
            .is_some_and(|cause| state.identity.is_local_user(cause));
        if !caused_by_user {
            return Ok(false);
        }

        if !self.gateway.is_known(ClassKind::Ship, &destruction.vehicle_class) {
            self.report_unknown_detached(ClassKind::Ship, destruction.vehicle_class.clone());
        }

        let entry = VehicleLogEntry {
            timestamp: log_timestamp(line).unwrap_or_else(Utc::now),
            vehicle_class_id: destruction.vehicle_class,
            driver: destruction.driver,
            destroy_level: destruction.to_level,
        };
        let outcome = self
            .aggregator
            .apply(key, StatEvent::VehicleDamaged(entry))
            .await?;
        Ok(outcome.applied)
    }

    async fn apply_combat(
        &self,
        key: LineKey,
        domain: CombatDomain,
        entry: LogEntry,
        notification: Option<NotificationKind>,
        state: &PassState,
    ) -> Result<bool> {
        let outcome = self
            .aggregator
            .apply(
                key,
                StatEvent::Combat {
                    domain,
                    entry: entry.clone(),
                },
            )
            .await?;

        if !outcome.applied {
            tracing::debug!(domain = domain.label(), "Log line already applied, skipping");
            return Ok(false);
        }

        tracing::info!(
            domain = domain.label(),
            action = ?entry.action,
            subject = entry.subject_class_id.as_deref().unwrap_or("unknown"),
            weapon = entry.weapon_class_id.as_deref().unwrap_or("none"),
            "Combat event recorded"
        );

        if let Some(kind) = notification {
            self.notify(&state.settings, kind, self.combat_payload(domain, &entry));
        }
        self.notify_level_up(&state.settings, &outcome);

        Ok(true)
    }

    fn combat_payload(&self, domain: CombatDomain, entry: &LogEntry) -> serde_json::Value {
        let subject = entry.subject_class_id.as_deref().unwrap_or("unknown");
        let subject_name = match domain {
            CombatDomain::Pve => self.display_name(ClassKind::Npc, subject),
            CombatDomain::Pvp => subject.to_string(),
        };

        json!({
            "domain": domain.label(),
            "timestamp": entry.timestamp.to_rfc3339(),
            "counterparty": subject_name,
            "counterpartyClassId": entry.subject_class_id,
            "counterpartyShip": entry
                .counterparty_class_id
                .as_deref()
                .map(|ship| self.display_name(ClassKind::Ship, ship)),
            "ownShip": entry
                .own_ship_class_id
                .as_deref()
                .map(|ship| self.display_name(ClassKind::Ship, ship)),
            "weapon": entry
                .weapon_class_id
                .as_deref()
                .map(|weapon| self.display_name(ClassKind::Weapon, weapon)),
        })
    }

    fn notify_level_up(&self, settings: &Settings, outcome: &ApplyOutcome) {
        if !outcome.levelled_up() {
            return;
        }

        tracing::info!(level = outcome.level_after, "Level up");
        self.notify(
            settings,
            NotificationKind::LevelUp,
            json!({
                "previousLevel": outcome.level_before,
                "level": outcome.level_after,
            }),
        );
    }

    fn notify(&self, settings: &Settings, kind: NotificationKind, payload: serde_json::Value) {
        if !settings.should_notify(kind) {
            return;
        }
        dispatch_detached(Arc::clone(&self.notifier), kind, payload);
    }

    fn display_name(&self, kind: ClassKind, class_id: &str) -> String {
        self.gateway
            .resolve(kind, class_id)
            .unwrap_or_else(|| class_id.to_string())
    }

    fn report_unknown_detached(&self, kind: ClassKind, class_id: String) {
        let gateway = Arc::clone(&self.gateway);
        tokio::task::spawn_blocking(move || gateway.report_unknown(kind, &class_id));
    }

    fn record_sighting(&self, line: &str, sighting: Option<PlayerSighting>) {
        let Some(sighting) = sighting else {
            return;
        };

        let seen_at = log_timestamp(line).unwrap_or_else(Utc::now);
        if self.nearby.observe(&sighting.name, sighting.kind, seen_at) {
            tracing::debug!(player = %sighting.name, icon_kind = ?sighting.kind, "Nearby player sighted");
        }
    }

    fn update_identity(&self, state: &mut PassState, identity: UserIdentity) -> Result<()> {
        if identity == state.identity {
            return Ok(());
        }

        self.identity_store.save(&identity)?;
        state.identity = identity;
        Ok(())
    }
}

fn read_log(log_path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(log_path).map_err(|error| Error::io_at("read game log", log_path, error))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// First non-blank complete line, trimmed. Identifies the session that wrote
/// the log.
fn epoch_marker(content: &str) -> Option<&str> {
    complete_lines(content)
        .map(str::trim)
        .find(|line| !line.is_empty())
}

/// Newline-terminated lines only. A trailing partial write is held back until
/// its newline arrives.
fn complete_lines(content: &str) -> impl Iterator<Item = &str> {
    let complete = content
        .rfind('\n')
        .map_or("", |last_newline| &content[..=last_newline]);
    complete.split_terminator('\n')
}
