//! Class-id to display-name resolution, with a side channel for ids the
//! catalog does not know yet.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Mutex;

use crate::error::Result;
use crate::storage::read_json_record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClassKind {
    Npc,
    Ship,
    Weapon,
}

impl ClassKind {
    pub fn label(self) -> &'static str {
        match self {
            ClassKind::Npc => "npc",
            ClassKind::Ship => "ship",
            ClassKind::Weapon => "weapon",
        }
    }

    fn dictionary_file_name(self) -> &'static str {
        match self {
            ClassKind::Npc => "NPC-Dictionary.json",
            ClassKind::Ship => "Ship-Dictionary.json",
            ClassKind::Weapon => "Weapon-Dictionary.json",
        }
    }
}

pub trait EnrichmentGateway: Send + Sync {
    fn resolve(&self, kind: ClassKind, class_id: &str) -> Option<String>;

    /// Fire-and-forget; implementations must not fail the caller.
    fn report_unknown(&self, kind: ClassKind, class_id: &str);

    /// Longest catalogued class id of `kind` contained in `text`.
    fn find_contained(&self, kind: ClassKind, text: &str) -> Option<String>;

    fn is_known(&self, kind: ClassKind, class_id: &str) -> bool {
        self.resolve(kind, class_id).is_some()
    }
}

#[derive(Debug, Deserialize)]
struct DictionaryFile {
    #[serde(default)]
    dictionary: BTreeMap<String, DictionaryEntry>,
}

#[derive(Debug, Deserialize)]
struct DictionaryEntry {
    name: String,
}

/// Gateway over the NPC/ship/weapon dictionary files.
#[derive(Default)]
pub struct CatalogGateway {
    catalogs: BTreeMap<ClassKind, BTreeMap<String, String>>,
    allow_submit: bool,
    pending_submissions: Mutex<BTreeSet<(ClassKind, String)>>,
}

impl CatalogGateway {
    pub fn new(allow_submit: bool) -> Self {
        Self {
            allow_submit,
            ..Self::default()
        }
    }

    /// Loads whichever dictionary files exist in `directory`; missing files
    /// leave that catalog empty.
    pub fn load_from_directory(directory: &Path, allow_submit: bool) -> Result<Self> {
        let mut gateway = Self::new(allow_submit);

        for kind in [ClassKind::Npc, ClassKind::Ship, ClassKind::Weapon] {
            let dictionary_path = directory.join(kind.dictionary_file_name());
            let Some(dictionary) = read_json_record::<DictionaryFile>(&dictionary_path)? else {
                tracing::debug!(
                    dictionary_path = %dictionary_path.display(),
                    "Dictionary file not found, catalog left empty"
                );
                continue;
            };

            let entries = dictionary
                .dictionary
                .into_iter()
                .map(|(class_id, entry)| (class_id, entry.name))
                .collect::<BTreeMap<String, String>>();
            tracing::info!(
                class_kind = kind.label(),
                entry_count = entries.len(),
                "Loaded class dictionary"
            );
            gateway.catalogs.insert(kind, entries);
        }

        Ok(gateway)
    }

    pub fn insert(&mut self, kind: ClassKind, class_id: &str, display_name: &str) {
        self.catalogs
            .entry(kind)
            .or_default()
            .insert(class_id.to_string(), display_name.to_string());
    }

    pub fn with_entry(mut self, kind: ClassKind, class_id: &str, display_name: &str) -> Self {
        self.insert(kind, class_id, display_name);
        self
    }

    /// Unknown ids reported while submission is allowed and not yet flushed
    /// by [`CatalogGateway::flush_pending_submissions`].
    pub fn pending_submissions(&self) -> Vec<(ClassKind, String)> {
        match self.pending_submissions.lock() {
            Ok(pending) => pending.iter().cloned().collect(),
            Err(error) => {
                tracing::error!(lock_error = %error, "Failed to lock pending submissions");
                Vec::new()
            }
        }
    }
}

impl CatalogGateway {
    /// Logs every queued id for dictionary submission and empties the queue.
    /// Returns how many ids were flushed.
    pub fn flush_pending_submissions(&self) -> usize {
        let pending = match self.pending_submissions.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(error) => {
                tracing::error!(lock_error = %error, "Failed to lock pending submissions");
                return 0;
            }
        };

        for (kind, class_id) in &pending {
            tracing::info!(
                class_kind = kind.label(),
                class_id = class_id.as_str(),
                "Class id awaiting dictionary submission"
            );
        }
        pending.len()
    }
}

impl EnrichmentGateway for CatalogGateway {
    fn resolve(&self, kind: ClassKind, class_id: &str) -> Option<String> {
        self.catalogs.get(&kind)?.get(class_id).cloned()
    }

    fn report_unknown(&self, kind: ClassKind, class_id: &str) {
        if !self.allow_submit {
            tracing::debug!(
                class_kind = kind.label(),
                class_id,
                "Unknown class id seen, dictionary submission disabled"
            );
            return;
        }

        match self.pending_submissions.lock() {
            Ok(mut pending) => {
                pending.insert((kind, class_id.to_string()));
            }
            Err(error) => {
                tracing::error!(lock_error = %error, "Failed to lock pending submissions");
                return;
            }
        }

        tracing::info!(
            class_kind = kind.label(),
            class_id,
            "Unknown class id queued for dictionary submission"
        );
    }

    fn find_contained(&self, kind: ClassKind, text: &str) -> Option<String> {
        self.catalogs
            .get(&kind)?
            .keys()
            .filter(|class_id| text.contains(class_id.as_str()))
            .max_by_key(|class_id| class_id.len())
            .cloned()
    }
}
