use std::path::{Path, PathBuf};

use super::{CombatDomain, CombatRecord, WeaponBook};
use crate::error::{Error, Result};
use crate::storage::{read_json_record, write_json_record};

pub const PVE_FILE_NAME: &str = "pve.json";
pub const PVP_FILE_NAME: &str = "pvp.json";
pub const WEAPONS_FILE_NAME: &str = "weapons.json";

/// Backing storage for stat records. Only the aggregator's worker calls the
/// save methods.
pub trait StatStore: Send + Sync {
    fn load_combat(&self, domain: CombatDomain) -> Result<CombatRecord>;

    fn save_combat(&self, domain: CombatDomain, record: &CombatRecord) -> Result<()>;

    fn load_weapons(&self) -> Result<WeaponBook>;

    fn save_weapons(&self, weapons: &WeaponBook) -> Result<()>;
}

pub struct JsonStatStore {
    data_directory: PathBuf,
}

impl JsonStatStore {
    pub fn new(data_directory: &Path) -> Self {
        Self {
            data_directory: data_directory.to_path_buf(),
        }
    }

    fn combat_path(&self, domain: CombatDomain) -> PathBuf {
        let file_name = match domain {
            CombatDomain::Pve => PVE_FILE_NAME,
            CombatDomain::Pvp => PVP_FILE_NAME,
        };
        self.data_directory.join(file_name)
    }
}

impl StatStore for JsonStatStore {
    fn load_combat(&self, domain: CombatDomain) -> Result<CombatRecord> {
        Ok(read_json_record::<CombatRecord>(&self.combat_path(domain))?.unwrap_or_default())
    }

    fn save_combat(&self, domain: CombatDomain, record: &CombatRecord) -> Result<()> {
        write_json_record(&self.combat_path(domain), record).map_err(|error| Error::Persist {
            target: match domain {
                CombatDomain::Pve => "PVE record",
                CombatDomain::Pvp => "PVP record",
            },
            reason: error.to_string(),
        })
    }

    fn load_weapons(&self) -> Result<WeaponBook> {
        Ok(
            read_json_record::<WeaponBook>(&self.data_directory.join(WEAPONS_FILE_NAME))?
                .unwrap_or_default(),
        )
    }

    fn save_weapons(&self, weapons: &WeaponBook) -> Result<()> {
        write_json_record(&self.data_directory.join(WEAPONS_FILE_NAME), weapons).map_err(
            |error| Error::Persist {
                target: "weapon records",
                reason: error.to_string(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{JsonStatStore, StatStore};
    use crate::stats::CombatDomain;

    #[test]
    fn missing_records_load_as_zeroed() {
        let temp_directory = tempfile::tempdir().expect("Failed to create temp directory");
        let store = JsonStatStore::new(temp_directory.path());

        let pve = store
            .load_combat(CombatDomain::Pve)
            .expect("Expected default PVE record");
        assert_eq!(pve.kills, 0);
        assert!(pve.event_log.is_empty());
        assert!(store
            .load_weapons()
            .expect("Expected default weapon book")
            .weapons
            .is_empty());
    }

    #[test]
    fn corrupt_record_is_not_silently_reset() {
        let temp_directory = tempfile::tempdir().expect("Failed to create temp directory");
        std::fs::write(temp_directory.path().join("pvp.json"), "{ not json")
            .expect("Failed to write corrupt record");
        let store = JsonStatStore::new(temp_directory.path());

        assert!(store.load_combat(CombatDomain::Pvp).is_err());
    }

    #[test]
    fn unwritable_directory_is_a_persist_error() {
        let temp_directory = tempfile::tempdir().expect("Failed to create temp directory");
        let blocker = temp_directory.path().join("blocked");
        std::fs::write(&blocker, "file, not a directory").expect("Failed to write blocker");
        let store = JsonStatStore::new(&blocker);

        let error = store
            .save_combat(CombatDomain::Pve, &Default::default())
            .expect_err("Writing below a file should fail");
        assert!(!error.is_line_local());
        assert!(error.to_string().contains("PVE record"));
    }
}
