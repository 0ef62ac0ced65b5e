//! SAP GUI Scripting implementation of the [`crate::host`] traits.
//!
//! The object chain is `GetObject("SAPGUI")` -> `GetScriptingEngine` ->
//! `Children(connection)` -> `Children(session)` -> `findById(id)`.
//!
//! # COM apartment model
//!
//! Scripting objects are bound to the apartment that fetched them, so
//! [`SapGuiHost`] stores only the connection index and re-resolves the
//! chain on the calling thread.  Sessions and elements are `!Send` through
//! the `IDispatch` they wrap and never leave their worker thread.

mod dispatch;

use windows::core::{BSTR, VARIANT};

use crate::com::{Apartment, ComGuard};
use crate::errors::TechLocError;
use crate::host::{GuiElement, HostSession, MessageType, ScriptingHost, SessionInfo};
use crate::host_process::{require_process, HOST_PROCESS};

use dispatch::{index_arg, to_dispatch, to_string, Dispatch};

/// Running-object name of the SAP GUI automation root.
const ROOT_MONIKER: &str = "SAPGUI";

/// The SAP GUI client on this machine.
#[derive(Debug, Clone)]
pub struct SapGuiHost {
    connection_index: usize,
}

impl SapGuiHost {
    pub fn new(connection_index: usize) -> Self {
        Self { connection_index }
    }

    fn connection(&self) -> Result<Dispatch, TechLocError> {
        let root = Dispatch::bind(ROOT_MONIKER)?;
        let engine = root
            .call("GetScriptingEngine", &[])
            .and_then(|v| to_dispatch(&v))
            .map_err(|e| {
                TechLocError::ConnectionUnavailable(format!("scripting engine unavailable: {e}"))
            })?;
        let connections = engine.get_object("Children")?;
        connections.item(self.connection_index).map_err(|e| {
            TechLocError::ConnectionUnavailable(format!(
                "connection {} not open: {e}",
                self.connection_index
            ))
        })
    }
}

impl ScriptingHost for SapGuiHost {
    type Session = SapSession;
    type ThreadContext = ComGuard;

    fn attach_thread(&self) -> Result<ComGuard, TechLocError> {
        ComGuard::init(Apartment::SingleThreaded)
    }

    fn connect(&self) -> Result<(), TechLocError> {
        require_process(HOST_PROCESS)?;
        let connection = self.connection()?;
        let sessions = connection.get_object("Children")?.get_i32("Count")?;
        if sessions < 1 {
            return Err(TechLocError::ConnectionUnavailable(format!(
                "connection {} has no session, log on first",
                self.connection_index
            )));
        }
        log::info!(target: "sapgui", "ok: connection {} with {sessions} sessions", self.connection_index);
        Ok(())
    }

    fn session_count(&self) -> Result<usize, TechLocError> {
        let count = self.connection()?.get_object("Children")?.get_i32("Count")?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn open_session(&self, index: usize) -> Result<SapSession, TechLocError> {
        let session = self
            .connection()?
            .get_object("Children")?
            .item(index)
            .map_err(|e| TechLocError::SessionUnavailable(format!("session {index}: {e}")))?;
        Ok(SapSession { session })
    }
}

/// One `GuiSession`.
pub struct SapSession {
    session: Dispatch,
}

impl HostSession for SapSession {
    type Element = SapElement;

    fn find_by_id(&self, id: &str) -> Result<SapElement, TechLocError> {
        let found = self
            .session
            .call("findById", &[VARIANT::from(BSTR::from(id))])
            .map_err(|e| TechLocError::ComError(format!("findById({id}): {e}")))?;
        Ok(SapElement {
            id: id.to_owned(),
            inner: to_dispatch(&found)?,
        })
    }

    fn info(&self) -> Result<SessionInfo, TechLocError> {
        let info = self.session.get_object("Info")?;
        Ok(SessionInfo {
            user: info.get_string("User")?,
            system_name: info.get_string("SystemName")?,
            client: info.get_string("Client")?,
            language: info.get_string("Language")?,
        })
    }
}

/// One `GuiComponent` found by id.
pub struct SapElement {
    id: String,
    inner: Dispatch,
}

impl SapElement {
    fn method(&self, name: &str, args: &[VARIANT]) -> Result<(), TechLocError> {
        self.inner
            .call(name, args)
            .map(drop)
            .map_err(|e| TechLocError::ComError(format!("{}.{name}: {e}", self.id)))
    }
}

impl GuiElement for SapElement {
    fn text(&self) -> Result<String, TechLocError> {
        self.inner.get_string("Text")
    }

    fn set_text(&self, value: &str) -> Result<(), TechLocError> {
        self.inner.put("Text", VARIANT::from(BSTR::from(value)))
    }

    fn send_vkey(&self, vkey: u32) -> Result<(), TechLocError> {
        let key = i32::try_from(vkey)
            .map_err(|_| TechLocError::ComError(format!("virtual key {vkey} out of range")))?;
        self.method("sendVKey", &[VARIANT::from(key)])
    }

    fn press(&self) -> Result<(), TechLocError> {
        self.method("press", &[])
    }

    fn select(&self) -> Result<(), TechLocError> {
        self.method("select", &[])
    }

    fn set_focus(&self) -> Result<(), TechLocError> {
        self.method("setFocus", &[])
    }

    fn row_count(&self) -> Result<usize, TechLocError> {
        let rows = self.inner.get_i32("RowCount")?;
        Ok(usize::try_from(rows).unwrap_or(0))
    }

    fn column_order(&self, index: usize) -> Result<String, TechLocError> {
        let order = self.inner.get_object("ColumnOrder")?;
        to_string(&order.call("Item", &[VARIANT::from(index_arg(index)?)])?)
    }

    fn cell_value(&self, row: usize, column: &str) -> Result<String, TechLocError> {
        let value = self.inner.call(
            "getCellValue",
            &[VARIANT::from(index_arg(row)?), VARIANT::from(BSTR::from(column))],
        )?;
        to_string(&value)
    }

    fn select_row(&self, row: usize) -> Result<(), TechLocError> {
        self.inner.put("currentCellRow", VARIANT::from(index_arg(row)?))?;
        self.inner
            .put("selectedRows", VARIANT::from(BSTR::from(row.to_string().as_str())))?;
        self.method("clickCurrentCell", &[])
    }

    fn message_type(&self) -> Result<Option<MessageType>, TechLocError> {
        Ok(MessageType::from_code(&self.inner.get_string("MessageType")?))
    }
}

#[cfg(test)]
mod tests {
    use super::dispatch::to_i32;
    use super::*;

    #[test]
    fn test_empty_variant_reads_as_blank() {
        assert_eq!(to_string(&VARIANT::default()).unwrap(), "");
    }

    #[test]
    fn test_integer_variant_coerces() {
        assert_eq!(to_i32(&VARIANT::from(BSTR::from("42"))).unwrap(), 42);
        assert_eq!(to_string(&VARIANT::from(7i32)).unwrap(), "7");
    }
}
