//! Runtime settings, loaded from an optional TOML file.
//!
//! Every field has a default matching the production client, so an empty
//! file (or no file at all) is a valid configuration.
//!
//! ```toml
//! max_sessions = 4
//! language_column = "L_1"
//!
//! [timings]
//! settle_ms = 800
//!
//! [catalog.listing_no_data]
//! EN = "No objects were selected"
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::catalog::{EntrySpec, MessageCatalog, MessageKey};
use crate::errors::TechLocError;
use crate::parser::ParseMode;

/// Wait intervals, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timings {
    /// Bound on waiting for a new session to appear.
    pub session_create_timeout_ms: u64,
    /// Pause between two session creations.
    pub creation_pause_ms: u64,
    /// Default bound on leasing a session.
    pub acquire_timeout_ms: u64,
    /// Settle sleep after UI-mutating actions.
    pub settle_ms: u64,
    /// Shorter settle after closing the multi-value dialog.
    pub short_settle_ms: u64,
    /// Bound on waiting for exported report text.
    pub clipboard_wait_ms: u64,
    /// Poll interval of the session-count wait.
    pub poll_interval_ms: u64,
    /// Poll interval of the clipboard wait.
    pub clipboard_poll_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            session_create_timeout_ms: 10_000,
            creation_pause_ms: 1_000,
            acquire_timeout_ms: 30_000,
            settle_ms: 500,
            short_settle_ms: 250,
            clipboard_wait_ms: 30_000,
            poll_interval_ms: 250,
            clipboard_poll_ms: 100,
        }
    }
}

impl Timings {
    /// All waits zeroed except bounds; for simulated hosts.
    pub fn instant() -> Self {
        Self {
            session_create_timeout_ms: 1_000,
            creation_pause_ms: 0,
            acquire_timeout_ms: 1_000,
            settle_ms: 0,
            short_settle_ms: 0,
            clipboard_wait_ms: 200,
            poll_interval_ms: 1,
            clipboard_poll_ms: 1,
        }
    }

    pub fn session_create_timeout(&self) -> Duration {
        Duration::from_millis(self.session_create_timeout_ms)
    }

    pub fn creation_pause(&self) -> Duration {
        Duration::from_millis(self.creation_pause_ms)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn short_settle(&self) -> Duration {
        Duration::from_millis(self.short_settle_ms)
    }

    pub fn clipboard_wait(&self) -> Duration {
        Duration::from_millis(self.clipboard_wait_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn clipboard_poll(&self) -> Duration {
        Duration::from_millis(self.clipboard_poll_ms)
    }
}

/// Top-level settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Ceiling on open host sessions.
    pub max_sessions: usize,
    /// Index of the host connection to attach to.
    pub connection_index: usize,
    /// Report variant submitted with the listing request.
    pub listing_variant: String,
    /// Result layout selected in the table browser.
    pub report_layout: String,
    /// Table read by the bulk read.
    pub browse_table: String,
    /// Maximum hit count entered in the table browser.
    pub max_hits: String,
    /// Column holding the record language after renaming.
    pub language_column: String,
    /// Where result workbooks are written.
    pub output_dir: PathBuf,
    pub parse_mode: ParseMode,
    pub timings: Timings,
    /// Overrides merged over the built-in message catalog.
    pub catalog: HashMap<MessageKey, HashMap<String, EntrySpec>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_sessions: 6,
            connection_index: 0,
            listing_variant: "CHECK_FL_S".to_owned(),
            report_layout: "CHECK_FL_L".to_owned(),
            browse_table: "IFLO".to_owned(),
            max_hits: "9999999".to_owned(),
            language_column: "L_1".to_owned(),
            output_dir: PathBuf::from("."),
            parse_mode: ParseMode::default(),
            timings: Timings::default(),
            catalog: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load and validate a settings file.
    pub fn from_path(path: &Path) -> Result<Self, TechLocError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            TechLocError::ConfigError(format!("cannot read {}: {e}", path.display()))
        })?;
        let settings = Self::from_toml(&contents)?;
        log::debug!(target: "config", "loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn from_toml(contents: &str) -> Result<Self, TechLocError> {
        let settings: Settings = toml::from_str(contents)
            .map_err(|e| TechLocError::ConfigError(format!("invalid settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), TechLocError> {
        if self.max_sessions == 0 {
            return Err(invalid("max_sessions", "must be > 0"));
        }
        for (field, value) in [
            ("listing_variant", &self.listing_variant),
            ("report_layout", &self.report_layout),
            ("browse_table", &self.browse_table),
            ("language_column", &self.language_column),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(field, "must not be empty"));
            }
        }
        if self.max_hits.trim().parse::<u64>().is_err() {
            return Err(invalid("max_hits", "must be a positive integer"));
        }
        if self.timings.poll_interval_ms == 0 || self.timings.clipboard_poll_ms == 0 {
            return Err(invalid("timings", "poll intervals must be > 0"));
        }
        Ok(())
    }

    /// Built-in catalog with this file's overrides applied.
    pub fn message_catalog(&self) -> Result<MessageCatalog, TechLocError> {
        let mut catalog = MessageCatalog::builtin();
        catalog.apply_overrides(&self.catalog)?;
        Ok(catalog)
    }
}

fn invalid(field: &str, reason: &str) -> TechLocError {
    TechLocError::ConfigError(format!("invalid value for {field}: {reason}"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let s = Settings::from_toml("").unwrap();
        assert_eq!(s.max_sessions, 6);
        assert_eq!(s.listing_variant, "CHECK_FL_S");
        assert_eq!(s.report_layout, "CHECK_FL_L");
        assert_eq!(s.timings.session_create_timeout(), Duration::from_secs(10));
        assert_eq!(s.timings.clipboard_poll(), Duration::from_millis(100));
        assert_eq!(s.parse_mode, ParseMode::Robust);
    }

    #[test]
    fn test_partial_override() {
        let s = Settings::from_toml(
            "max_sessions = 3\nparse_mode = \"legacy\"\n[timings]\nsettle_ms = 900\n",
        )
        .unwrap();
        assert_eq!(s.max_sessions, 3);
        assert_eq!(s.parse_mode, ParseMode::Legacy);
        assert_eq!(s.timings.settle(), Duration::from_millis(900));
        assert_eq!(s.timings.short_settle(), Duration::from_millis(250));
    }

    #[test]
    fn test_rejects_unknown_and_invalid() {
        assert!(Settings::from_toml("max_session = 3").is_err());
        assert!(Settings::from_toml("max_sessions = 0").is_err());
        assert!(Settings::from_toml("max_hits = \"lots\"").is_err());
        assert!(Settings::from_toml("report_layout = \" \"").is_err());
    }

    #[test]
    fn test_catalog_overrides_applied() {
        let s = Settings::from_toml(
            "[catalog.listing_no_data]\nEN = \"No objects were selected\"\n",
        )
        .unwrap();
        let catalog = s.message_catalog().unwrap();
        assert!(catalog.lookup(MessageKey::ListingNoData, "en").is_ok());
        assert!(catalog.lookup(MessageKey::ListingNoData, "IT").is_ok());
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "browse_table = \"IFLOT\"").unwrap();
        let s = Settings::from_path(file.path()).unwrap();
        assert_eq!(s.browse_table, "IFLOT");
        assert!(Settings::from_path(Path::new("/nonexistent/techloc.toml")).is_err());
    }
}
