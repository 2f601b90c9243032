//! Persisted combat and weapon records, and the update units that mutate them.

mod aggregator;
mod store;

pub use aggregator::StatAggregator;
pub use store::{JsonStatStore, StatStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::error::Result;

pub const PVE_KILL_XP: u64 = 10;
pub const PVP_KILL_XP: u64 = 20;

/// Applied line keys remembered per record.
pub const APPLIED_LINE_WINDOW: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombatDomain {
    Pve,
    Pvp,
}

impl CombatDomain {
    pub fn label(self) -> &'static str {
        match self {
            CombatDomain::Pve => "pve",
            CombatDomain::Pvp => "pvp",
        }
    }

    pub fn kill_xp(self) -> u64 {
        match self {
            CombatDomain::Pve => PVE_KILL_XP,
            CombatDomain::Pvp => PVP_KILL_XP,
        }
    }

    pub fn other(self) -> Self {
        match self {
            CombatDomain::Pve => CombatDomain::Pvp,
            CombatDomain::Pvp => CombatDomain::Pve,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Win,
    Loss,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub action: Action,
    /// The opposing entity: NPC class, player name, or `suicide`/`crash`.
    pub subject_class_id: Option<String>,
    /// Ship class the opposing entity was flying.
    pub counterparty_class_id: Option<String>,
    pub own_ship_class_id: Option<String>,
    pub weapon_class_id: Option<String>,
}

/// A vehicle the local player damaged; kept apart from the kill/death log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleLogEntry {
    pub timestamp: DateTime<Utc>,
    pub vehicle_class_id: String,
    pub driver: Option<String>,
    pub destroy_level: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PeriodCounters {
    /// `YYYY-MM`.
    pub period: String,
    pub kills: u64,
    pub deaths: u64,
}

/// Identifies one log line across sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineKey {
    pub session: String,
    pub line: u64,
}

impl LineKey {
    pub fn new(session: &str, line: u64) -> Self {
        Self {
            session: session.to_string(),
            line,
        }
    }
}

/// Bounded memory of line keys already folded into a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppliedLines(VecDeque<LineKey>);

impl AppliedLines {
    pub fn contains(&self, key: &LineKey) -> bool {
        self.0.contains(key)
    }

    pub fn remember(&mut self, key: LineKey) {
        if self.contains(&key) {
            return;
        }

        self.0.push_back(key);
        while self.0.len() > APPLIED_LINE_WINDOW {
            self.0.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// PVE or PVP totals. `kills`/`deaths` always equal the number of
/// `Win`/`Loss` entries in `event_log`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CombatRecord {
    pub kills: u64,
    pub deaths: u64,
    pub xp: u64,
    #[serde(rename = "currentMonth")]
    pub current_period: PeriodCounters,
    pub event_log: Vec<LogEntry>,
    pub vehicle_log: Vec<VehicleLogEntry>,
    pub applied_lines: AppliedLines,
}

impl CombatRecord {
    fn record(&mut self, domain: CombatDomain, entry: LogEntry) {
        let period = period_key(entry.timestamp);
        if period > self.current_period.period {
            self.current_period = PeriodCounters {
                period: period.clone(),
                ..PeriodCounters::default()
            };
        }
        let counts_for_period = period == self.current_period.period;

        match entry.action {
            Action::Win => {
                self.kills += 1;
                self.xp += domain.kill_xp();
                if counts_for_period {
                    self.current_period.kills += 1;
                }
            }
            Action::Loss => {
                self.deaths += 1;
                if counts_for_period {
                    self.current_period.deaths += 1;
                }
            }
        }

        self.event_log.push(entry);
    }

    pub fn kill_death_ratio(&self) -> f64 {
        if self.deaths == 0 {
            return self.kills as f64;
        }
        self.kills as f64 / self.deaths as f64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeaponLogEntry {
    pub timestamp: DateTime<Utc>,
    pub action: Action,
    pub domain: CombatDomain,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WeaponStats {
    pub wins: u64,
    pub losses: u64,
    pub event_log: Vec<WeaponLogEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WeaponBook {
    pub weapons: BTreeMap<String, WeaponStats>,
    pub applied_lines: AppliedLines,
}

impl WeaponBook {
    fn record(&mut self, weapon_class_id: &str, domain: CombatDomain, entry: &LogEntry) {
        let stats = self.weapons.entry(weapon_class_id.to_string()).or_default();
        match entry.action {
            Action::Win => stats.wins += 1,
            Action::Loss => stats.losses += 1,
        }
        stats.event_log.push(WeaponLogEntry {
            timestamp: entry.timestamp,
            action: entry.action,
            domain,
        });
    }
}

/// A counter-changing event extracted from one log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatEvent {
    Combat {
        domain: CombatDomain,
        entry: LogEntry,
    },
    VehicleDamaged(VehicleLogEntry),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// `false` when every record touched had already applied this line.
    pub applied: bool,
    pub level_before: u32,
    pub level_after: u32,
}

impl ApplyOutcome {
    pub fn levelled_up(&self) -> bool {
        self.applied && self.level_after > self.level_before
    }
}

/// Point-in-time copy of every stat record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatSnapshot {
    pub pve: CombatRecord,
    pub pvp: CombatRecord,
    pub weapons: WeaponBook,
}

impl StatSnapshot {
    pub fn total_xp(&self) -> u64 {
        self.pve.xp + self.pvp.xp
    }

    pub fn level(&self) -> u32 {
        level_for_xp(self.total_xp())
    }
}

pub fn level_for_xp(xp: u64) -> u32 {
    (0.1 * (xp as f64).sqrt()).floor() as u32
}

fn period_key(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m").to_string()
}

/// One read-modify-write unit. Each record is saved only if it changed, and
/// each remembers `key`, so replaying a line after a partial failure only
/// finishes the records that were not yet written.
pub(crate) fn apply_event(
    store: &dyn StatStore,
    key: &LineKey,
    event: &StatEvent,
) -> Result<ApplyOutcome> {
    match event {
        StatEvent::Combat { domain, entry } => apply_combat(store, key, *domain, entry),
        StatEvent::VehicleDamaged(entry) => {
            let mut record = store.load_combat(CombatDomain::Pve)?;
            if record.applied_lines.contains(key) {
                return Ok(ApplyOutcome::default());
            }
            record.vehicle_log.push(entry.clone());
            record.applied_lines.remember(key.clone());
            store.save_combat(CombatDomain::Pve, &record)?;
            Ok(ApplyOutcome {
                applied: true,
                ..ApplyOutcome::default()
            })
        }
    }
}

fn apply_combat(
    store: &dyn StatStore,
    key: &LineKey,
    domain: CombatDomain,
    entry: &LogEntry,
) -> Result<ApplyOutcome> {
    let mut record = store.load_combat(domain)?;
    let other_xp = store.load_combat(domain.other())?.xp;
    let level_before = level_for_xp(record.xp + other_xp);
    let mut applied = false;

    if !record.applied_lines.contains(key) {
        record.record(domain, entry.clone());
        record.applied_lines.remember(key.clone());
        store.save_combat(domain, &record)?;
        applied = true;
    }

    if let Some(weapon_class_id) = entry.weapon_class_id.as_deref() {
        let mut weapons = store.load_weapons()?;
        if !weapons.applied_lines.contains(key) {
            weapons.record(weapon_class_id, domain, entry);
            weapons.applied_lines.remember(key.clone());
            store.save_weapons(&weapons)?;
            applied = true;
        }
    }

    Ok(ApplyOutcome {
        applied,
        level_before,
        level_after: level_for_xp(record.xp + other_xp),
    })
}

/// Backfills XP for records that predate XP tracking. Returns the domains
/// that were updated.
pub(crate) fn reconcile_xp(store: &dyn StatStore) -> Result<Vec<CombatDomain>> {
    let mut reconciled = Vec::new();

    for domain in [CombatDomain::Pve, CombatDomain::Pvp] {
        let mut record = store.load_combat(domain)?;
        if record.kills == 0 || record.xp != 0 {
            continue;
        }

        record.xp = record.kills * domain.kill_xp();
        store.save_combat(domain, &record)?;
        tracing::info!(
            domain = domain.label(),
            kills = record.kills,
            xp = record.xp,
            "Reconciled experience from historical kills"
        );
        reconciled.push(domain);
    }

    Ok(reconciled)
}

pub(crate) fn snapshot(store: &dyn StatStore) -> Result<StatSnapshot> {
    Ok(StatSnapshot {
        pve: store.load_combat(CombatDomain::Pve)?,
        pvp: store.load_combat(CombatDomain::Pvp)?,
        weapons: store.load_weapons()?,
    })
}
