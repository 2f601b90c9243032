use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::storage::{read_json_record, write_json_record};

pub const IDENTITY_FILE_NAME: &str = "user.json";

/// The local player as learned from the log. Persists across sessions; only
/// the ship fields are transient.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserIdentity {
    #[serde(rename = "userName")]
    pub display_name: Option<String>,
    #[serde(rename = "geid")]
    pub external_id: Option<String>,
    pub game_version: Option<String>,
    pub current_ship_instance: Option<String>,
    pub current_ship_class: Option<String>,
    pub current_location: Option<String>,
    pub spawn_point: Option<String>,
}

impl UserIdentity {
    /// The local player's name, if one has been seen and it is non-blank.
    pub fn user_name(&self) -> Option<&str> {
        self.display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    pub fn is_local_user(&self, name: &str) -> bool {
        self.user_name().is_some_and(|user_name| user_name == name)
    }

    /// Ship class the local player is flying, `None` when on foot.
    pub fn ship_class(&self) -> Option<&str> {
        self.current_ship_class
            .as_deref()
            .map(str::trim)
            .filter(|class| !class.is_empty())
    }

    pub fn clear_session_state(&mut self) {
        self.current_ship_instance = None;
        self.current_ship_class = None;
    }
}

pub trait IdentityStore: Send + Sync {
    fn load(&self) -> Result<UserIdentity>;

    fn save(&self, identity: &UserIdentity) -> Result<()>;

    /// Session reset hook, invoked when the log rotates.
    fn reset_session(&self) -> Result<()> {
        let mut identity = self.load()?;
        identity.clear_session_state();
        self.save(&identity)
    }
}

pub struct JsonIdentityStore {
    path: PathBuf,
}

impl JsonIdentityStore {
    pub fn new(data_directory: &Path) -> Self {
        Self {
            path: data_directory.join(IDENTITY_FILE_NAME),
        }
    }
}

impl IdentityStore for JsonIdentityStore {
    /// An unreadable record is replaced by an empty identity; the login line
    /// of the next session restores the name.
    fn load(&self) -> Result<UserIdentity> {
        match read_json_record::<UserIdentity>(&self.path) {
            Ok(identity) => Ok(identity.unwrap_or_default()),
            Err(error) => {
                tracing::warn!(
                    identity_path = %self.path.display(),
                    identity_error = %error,
                    "Failed to load user identity, starting from an empty identity"
                );
                Ok(UserIdentity::default())
            }
        }
    }

    fn save(&self, identity: &UserIdentity) -> Result<()> {
        write_json_record(&self.path, identity).map_err(|error| Error::Persist {
            target: "user identity",
            reason: error.to_string(),
        })
    }
}
