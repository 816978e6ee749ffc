//! Météo France vigilance bulletins.
//!
//! - [`parser`] turns bulletin free text into a colour level and phenomena
//! - [`archive`] locates the regional text inside a ZIP payload
//! - [`VigilanceWatcher`] downloads and parses the current bulletin
//! - [`VigilanceNotifier`] diffs against the stored level and alerts subscribers

pub mod archive;
pub mod notifier;
pub mod parser;
pub mod watcher;

use serde::Serialize;

pub use notifier::{CheckError, CheckOutcome, VigilanceNotifier};
pub use watcher::{BulletinFetch, FetchedBulletin, HttpBulletinFetch, VigilanceWatcher, WatchError};

/// Level reported when no bulletin could be obtained. Not a colour.
pub const LEVEL_ERROR: i32 = -1;
/// Vigilance ended.
pub const LEVEL_GREY: i32 = 0;
pub const LEVEL_GREEN: i32 = 1;
pub const LEVEL_YELLOW: i32 = 2;
pub const LEVEL_ORANGE: i32 = 3;
pub const LEVEL_RED: i32 = 4;
pub const LEVEL_PURPLE: i32 = 5;

/// French colour name for a level. Unknown levels map to `"erreur"`.
pub const fn color_name(level: i32) -> &'static str {
    match level {
        LEVEL_GREY => "gris",
        LEVEL_GREEN => "vert",
        LEVEL_YELLOW => "jaune",
        LEVEL_ORANGE => "orange",
        LEVEL_RED => "rouge",
        LEVEL_PURPLE => "violet",
        _ => "erreur",
    }
}

/// Result of one bulletin poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VigilanceStatus {
    pub color_level: i32,
    pub color_name: &'static str,
    /// Phenomenon keywords in first-seen order, without duplicates.
    pub phenomena: Vec<String>,
    pub observed_at: i64,
    #[serde(skip)]
    pub raw_bulletin_text: String,
}

impl VigilanceStatus {
    /// Sentinel for "data unavailable".
    pub const fn unavailable(observed_at: i64) -> Self {
        Self {
            color_level: LEVEL_ERROR,
            color_name: color_name(LEVEL_ERROR),
            phenomena: Vec::new(),
            observed_at,
            raw_bulletin_text: String::new(),
        }
    }

    pub const fn is_unavailable(&self) -> bool {
        self.color_level == LEVEL_ERROR
    }

    /// Strictly above green. Only these levels trigger subscriber alerts.
    pub const fn is_alert(&self) -> bool {
        self.color_level > LEVEL_GREEN
    }
}
