use regex::Regex;
use std::sync::LazyLock;

use super::capture_text;
use crate::error::{Error, Result};

static ACCOUNT_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-\sname\s(.+?)\s-").expect("valid account name regex"));
static ACCOUNT_GEID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-\sgeid\s(\d+)\s-").expect("valid account geid regex"));
static BRANCH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Branch:\s*(\S.*)$").expect("valid branch regex"));

/// Fields of a character login status record; either may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountIdentity {
    pub display_name: Option<String>,
    pub external_id: Option<String>,
}

pub fn parse_account_identity(line: &str) -> Result<AccountIdentity> {
    let identity = AccountIdentity {
        display_name: capture_text(&ACCOUNT_NAME_RE, line, 1),
        external_id: capture_text(&ACCOUNT_GEID_RE, line, 1),
    };

    if identity.display_name.is_none() && identity.external_id.is_none() {
        return Err(Error::malformed("account identity", "no name or geid"));
    }

    Ok(identity)
}

pub fn parse_game_version(line: &str) -> Result<String> {
    capture_text(&BRANCH_RE, line, 1)
        .ok_or_else(|| Error::malformed("game version", "empty branch"))
}
