//! Board identity resolution.
//!
//! Sources, in order of precedence: an explicit value (command line), the
//! `BOARD_ID` environment variable, the first token of `/etc/board_id`, then 1.
//! Unparsable values are skipped with a warning.

use std::path::Path;

pub const BOARD_ID_ENV: &str = "BOARD_ID";
pub const BOARD_ID_FILE: &str = "/etc/board_id";
pub const DEFAULT_BOARD_ID: u32 = 1;

fn parse_id(s: &str) -> Option<u32> {
    s.split_whitespace().next()?.parse().ok()
}

/// Resolves the board id from the process environment and `/etc/board_id`.
pub fn resolve_board_id(explicit: Option<u32>) -> u32 {
    let env = std::env::var(BOARD_ID_ENV).ok();
    resolve_from(explicit, env.as_deref(), Path::new(BOARD_ID_FILE))
}

/// Same as [`resolve_board_id`], with the environment value and file given.
pub fn resolve_from(explicit: Option<u32>, env: Option<&str>, file: &Path) -> u32 {
    if let Some(id) = explicit {
        return id;
    }

    if let Some(value) = env {
        match parse_id(value) {
            Some(id) => return id,
            None => log::warn!("ignoring {BOARD_ID_ENV}={value:?}, not a board id"),
        }
    }

    if let Ok(content) = std::fs::read_to_string(file) {
        match parse_id(&content) {
            Some(id) => return id,
            None => log::warn!("ignoring {}, no board id in it", file.display()),
        }
    }

    DEFAULT_BOARD_ID
}
