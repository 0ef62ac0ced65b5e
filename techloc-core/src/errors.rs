//! Error types for `techloc_core`.
//!
//! All Rust-side failures are funnelled through [`TechLocError`], which
//! uses `thiserror` for `Display` and `Error` derives.  Workflow entry points
//! return `Result<T, TechLocError>`; nothing below them panics on host
//! failures.

use std::fmt;

use thiserror::Error;

/// Why an expected screen or message was not observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationKind {
    /// The host explicitly reported that nothing matched the request.
    NoData,
    /// None of the mutually exclusive outcomes could be recognised.
    Ambiguous,
    /// The host reached a state the workflow does not handle.
    Unexpected,
}

impl fmt::Display for VerificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoData => "no data",
            Self::Ambiguous => "ambiguous",
            Self::Unexpected => "unexpected",
        };
        f.write_str(s)
    }
}

/// Top-level error type for the `techloc_core` library.
///
/// Each variant corresponds to a distinct failure class.
#[derive(Debug, Error)]
pub enum TechLocError {
    /// Host process, scripting engine, connection or session unreachable.
    /// Fatal to the whole batch.
    #[error("ConnectionUnavailable: {0}")]
    ConnectionUnavailable(String),

    /// The pool already holds the maximum number of sessions.
    #[error("CapacityExceeded: {live}/{max} sessions open")]
    CapacityExceeded { live: usize, max: usize },

    /// No session could be leased within the acquire timeout.
    #[error("SessionUnavailable: {0}")]
    SessionUnavailable(String),

    /// The expected screen or status message was not observed.
    #[error("VerificationFailed ({kind}): {detail}")]
    VerificationFailed {
        kind: VerificationKind,
        detail: String,
    },

    /// Clipboard report text could not be turned into a table.
    #[error("ParseError: {0}")]
    ParseError(String),

    /// A read-back field could not be read (bulk update, per row).
    #[error("FieldReadError: {0}")]
    FieldReadError(String),

    /// Saving a record failed (bulk update, per row).
    #[error("SaveError: {0}")]
    SaveError(String),

    /// COM / scripting object model error.
    #[error("ComError: {0}")]
    ComError(String),

    /// OS clipboard access failed.
    #[error("ClipboardError: {0}")]
    ClipboardError(String),

    /// Input batch rejected by the code masks.
    #[error("ValidationError: {0}")]
    ValidationError(String),

    /// Configuration file missing fields or malformed.
    #[error("ConfigError: {0}")]
    ConfigError(String),

    /// Writing the result workbook failed.
    #[error("ExportError: {0}")]
    ExportError(String),

    /// The user interrupted a wait.
    #[error("Cancelled")]
    Cancelled,
}

impl TechLocError {
    /// Shorthand for a [`TechLocError::VerificationFailed`].
    pub fn verification(kind: VerificationKind, detail: impl Into<String>) -> Self {
        Self::VerificationFailed {
            kind,
            detail: detail.into(),
        }
    }

    /// Soft errors concern one operation only; the caller may retry or move
    /// on to the next item.  Everything else aborts the batch.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            Self::CapacityExceeded { .. }
                | Self::SessionUnavailable(_)
                | Self::FieldReadError(_)
                | Self::SaveError(_)
        )
    }
}

/// Convert a `windows::core::Error` (COM / Win32 HRESULT failure) into a
/// `TechLocError::ComError`.
#[cfg(windows)]
impl From<windows::core::Error> for TechLocError {
    fn from(err: windows::core::Error) -> Self {
        TechLocError::ComError(format!("Windows COM error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_kind() {
        let err = TechLocError::verification(VerificationKind::NoData, "IH06 returned nothing");
        assert_eq!(
            err.to_string(),
            "VerificationFailed (no data): IH06 returned nothing"
        );
    }

    #[test]
    fn test_soft_classification() {
        assert!(TechLocError::SessionUnavailable("timeout".into()).is_soft());
        assert!(TechLocError::CapacityExceeded { live: 6, max: 6 }.is_soft());
        assert!(!TechLocError::ConnectionUnavailable("no SAPGUI".into()).is_soft());
        assert!(!TechLocError::ParseError("empty".into()).is_soft());
    }
}
