//! Automation-interface boundary consumed by the rest of the crate.
//!
//! The scripting object model is reached through three traits:
//!
//! | Trait | Models |
//! |-------|--------|
//! | [`ScriptingHost`] | the running client process: connection, session list, thread attach |
//! | [`HostSession`] | one session window tree, addressed by opaque element ids |
//! | [`GuiElement`] | one control: text, keys, buttons, grids, status bar |
//!
//! The production implementation lives in [`crate::sapgui`] (Windows only);
//! `crate::testing` (feature `testing`) provides an in-memory simulator.
//! Workflow code never touches element ids directly -- it goes through
//! [`crate::screens`].

use serde::Serialize;

use crate::errors::TechLocError;

/// Status-bar indicator of the last host action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MessageType {
    Success,
    Warning,
    Error,
    Info,
    Abort,
}

impl MessageType {
    /// Parse the single-character code exposed by the status bar.
    ///
    /// A blank code means "no message" and yields `None`, as does any code
    /// the host is not documented to produce.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "S" => Some(Self::Success),
            "W" => Some(Self::Warning),
            "E" => Some(Self::Error),
            "I" => Some(Self::Info),
            "A" => Some(Self::Abort),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Success => "S",
            Self::Warning => "W",
            Self::Error => "E",
            Self::Info => "I",
            Self::Abort => "A",
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

/// Read-only identity of the session the user is logged into.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub user: String,
    pub system_name: String,
    pub client: String,
    /// Negotiated UI language (e.g. `IT`).
    pub language: String,
}

/// One control in a session's window tree.
///
/// Methods that do not apply to the concrete control kind return
/// [`TechLocError::ComError`], as the host would.
pub trait GuiElement {
    fn text(&self) -> Result<String, TechLocError>;
    fn set_text(&self, value: &str) -> Result<(), TechLocError>;
    fn send_vkey(&self, vkey: u32) -> Result<(), TechLocError>;
    fn press(&self) -> Result<(), TechLocError>;
    fn select(&self) -> Result<(), TechLocError>;
    fn set_focus(&self) -> Result<(), TechLocError>;

    /// Number of rows of a grid control.
    fn row_count(&self) -> Result<usize, TechLocError>;
    /// Name of the column displayed at position `index`.
    fn column_order(&self, index: usize) -> Result<String, TechLocError>;
    fn cell_value(&self, row: usize, column: &str) -> Result<String, TechLocError>;
    /// Make `row` current, select it and click its current cell.
    fn select_row(&self, row: usize) -> Result<(), TechLocError>;

    /// Status-bar indicator; `None` when blank or absent.
    fn message_type(&self) -> Result<Option<MessageType>, TechLocError>;
}

/// One session of the automation host.
///
/// Session objects belong to the thread that opened them and are never
/// shared; see [`crate::pool`].
pub trait HostSession {
    type Element: GuiElement;

    fn find_by_id(&self, id: &str) -> Result<Self::Element, TechLocError>;

    /// Like [`find_by_id`](Self::find_by_id) but absence is not an error.
    fn try_find(&self, id: &str) -> Option<Self::Element> {
        self.find_by_id(id).ok()
    }

    fn info(&self) -> Result<SessionInfo, TechLocError>;
}

/// The running automation host process.
pub trait ScriptingHost: Send + Sync {
    type Session: HostSession;
    /// Per-thread IPC context (COM apartment); dropped to tear it down.
    type ThreadContext;

    /// Prepare the calling thread for host calls.
    fn attach_thread(&self) -> Result<Self::ThreadContext, TechLocError>;

    /// Resolve process, scripting engine and connection.
    fn connect(&self) -> Result<(), TechLocError>;

    /// Number of sessions currently open on the connection.
    fn session_count(&self) -> Result<usize, TechLocError>;

    /// Open session `index` for use on the calling thread.
    fn open_session(&self, index: usize) -> Result<Self::Session, TechLocError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_codes() {
        for t in [
            MessageType::Success,
            MessageType::Warning,
            MessageType::Error,
            MessageType::Info,
            MessageType::Abort,
        ] {
            assert_eq!(MessageType::from_code(t.code()), Some(t));
        }
    }

    #[test]
    fn test_blank_indicator_is_none() {
        assert_eq!(MessageType::from_code(""), None);
        assert_eq!(MessageType::from_code("  "), None);
        assert_eq!(MessageType::from_code("X"), None);
    }
}
