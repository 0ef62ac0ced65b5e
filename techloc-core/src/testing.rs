//! In-memory automation host for tests.
//!
//! [`SimulatedHost`] implements [`ScriptingHost`] over a small model of the
//! listing, table-browser and change transactions, with a shared
//! [`MemoryClipboard`] that the export dialogs write into.  It also records
//! what a real host cannot tell us:
//!
//! - how many session-creation commands were issued;
//! - whether two session objects for the same index were ever open at once
//!   ([`concurrency_violations`](SimulatedHost::concurrency_violations));
//! - how many thread contexts are currently attached.
//!
//! Faults (dead sessions, rejected descriptions, failing saves or field
//! reads, empty exports, capped session creation) are injected per test.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::clipboard::{Clipboard, MemoryClipboard};
use crate::errors::TechLocError;
use crate::host::{GuiElement, HostSession, MessageType, ScriptingHost, SessionInfo};
use crate::location::Classification;
use crate::screens::{commands, ids, vkey};

/// One technical location known to the simulated host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimLocation {
    pub code: String,
    pub description: String,
    /// Maintenance languages; one table row each.
    pub languages: Vec<String>,
    pub classification: Classification,
    /// Classification the host derives once the description is re-entered.
    pub derived: Option<Classification>,
}

impl SimLocation {
    pub fn new(code: &str, description: &str) -> Self {
        let short = code.rsplit('-').next().unwrap_or(code).to_owned();
        Self {
            code: code.to_owned(),
            description: description.to_owned(),
            languages: vec!["IT".to_owned()],
            classification: Classification {
                category: format!("T-{short}"),
                component: format!("C-{short}"),
                section: format!("S-{short}"),
                object_type: "FL".to_owned(),
                catalog_profile: "PROF1".to_owned(),
            },
            derived: None,
        }
    }

    pub fn with_languages(mut self, languages: &[&str]) -> Self {
        self.languages = languages.iter().map(|l| (*l).to_owned()).collect();
        self
    }

    pub fn deriving(mut self, derived: Classification) -> Self {
        self.derived = Some(derived);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tab {
    General,
    Structure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Screen {
    MainMenu,
    ListingSelection,
    ListingSingle(String),
    ListingMultiple(Vec<String>),
    BrowseInitial,
    BrowseSelection,
    BrowseResult,
    ChangeInitial,
    ChangeMaster { code: String, tab: Tab },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Modal {
    MultiValue,
    LayoutChooser,
    Export { listing: bool, clipboard_format: bool },
}

#[derive(Debug)]
struct SessionState {
    alive: bool,
    screen: Screen,
    modal: Option<Modal>,
    fields: HashMap<&'static str, String>,
    status: Option<MessageType>,
    status_text: String,
    pending_paste: Vec<String>,
    selection: Vec<String>,
    layout: Option<String>,
    result_rows: Vec<(usize, String)>,
    draft: Option<String>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            alive: true,
            screen: Screen::MainMenu,
            modal: None,
            fields: HashMap::new(),
            status: None,
            status_text: String::new(),
            pending_paste: Vec::new(),
            selection: Vec::new(),
            layout: None,
            result_rows: Vec::new(),
            draft: None,
        }
    }

    fn set_status(&mut self, status: Option<MessageType>, text: impl Into<String>) {
        self.status = status;
        self.status_text = text.into();
    }

    fn navigate(&mut self, screen: Screen) {
        self.screen = screen;
        self.modal = None;
        self.fields.clear();
        self.selection.clear();
        self.pending_paste.clear();
        self.layout = None;
        self.result_rows.clear();
        self.draft = None;
        self.set_status(None, "");
    }

    fn title(&self) -> String {
        match &self.screen {
            Screen::MainMenu => "SAP Easy Access".to_owned(),
            Screen::ListingSelection => "Sedi tecniche: videata di selezione".to_owned(),
            Screen::ListingSingle(_) => "Visualizzare sede tecnica: Dati anagrafici".to_owned(),
            Screen::ListingMultiple(_) => "Visualizzare sede tecnica: lista sedi tecniche".to_owned(),
            Screen::BrowseInitial => "Data Browser: videata iniziale".to_owned(),
            Screen::BrowseSelection => "Data Browser: tabella IFLO: videata di selezione".to_owned(),
            Screen::BrowseResult => {
                format!("Data Browser: tabella IFLO   {} hit", self.result_rows.len())
            }
            Screen::ChangeInitial => "Modificare sede tecnica: videata iniziale".to_owned(),
            Screen::ChangeMaster { .. } => "Modificare sede tecnica: Dati anagrafici".to_owned(),
        }
    }
}

#[derive(Debug)]
struct World {
    reachable: bool,
    language: String,
    sessions: Vec<SessionState>,
    handles: Vec<usize>,
    violations: usize,
    attached: usize,
    creation_attempts: usize,
    creation_budget: Option<usize>,
    locations: Vec<SimLocation>,
    layouts: Vec<String>,
    unreadable_layout_rows: HashSet<usize>,
    rejected: HashMap<String, String>,
    save_failures: HashSet<String>,
    read_failures: HashSet<String>,
    export_nothing: bool,
    commands: Vec<String>,
}

/// Simulated automation host.  Clones share the same state.
#[derive(Debug, Clone)]
pub struct SimulatedHost {
    world: Arc<Mutex<World>>,
    clipboard: MemoryClipboard,
}

impl SimulatedHost {
    /// Host with `sessions` open, logged-in sessions and no locations.
    pub fn with_sessions(sessions: usize) -> Self {
        let world = World {
            reachable: true,
            language: "IT".to_owned(),
            sessions: (0..sessions).map(|_| SessionState::new()).collect(),
            handles: vec![0; sessions],
            violations: 0,
            attached: 0,
            creation_attempts: 0,
            creation_budget: None,
            locations: Vec::new(),
            layouts: vec!["/DEFAULT".to_owned(), "CHECK_FL_L".to_owned(), "CHECK_FL_S".to_owned()],
            unreadable_layout_rows: HashSet::new(),
            rejected: HashMap::new(),
            save_failures: HashSet::new(),
            read_failures: HashSet::new(),
            export_nothing: false,
            commands: Vec::new(),
        };
        Self {
            world: Arc::new(Mutex::new(world)),
            clipboard: MemoryClipboard::new(),
        }
    }

    /// The clipboard export dialogs write into.
    pub fn clipboard(&self) -> MemoryClipboard {
        self.clipboard.clone()
    }

    pub fn add_location(&self, location: SimLocation) {
        self.world.lock().locations.push(location);
    }

    pub fn location(&self, code: &str) -> Option<SimLocation> {
        self.world
            .lock()
            .locations
            .iter()
            .find(|l| l.code == code)
            .cloned()
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.world.lock().reachable = reachable;
    }

    pub fn set_language(&self, language: &str) {
        self.world.lock().language = language.to_owned();
    }

    pub fn set_layouts(&self, layouts: &[&str]) {
        self.world.lock().layouts = layouts.iter().map(|l| (*l).to_owned()).collect();
    }

    /// Reading the name of layout row `row` fails.
    pub fn fail_layout_row(&self, row: usize) {
        self.world.lock().unreadable_layout_rows.insert(row);
    }

    /// Only the next `count` session-creation commands succeed.
    pub fn fail_creations_after(&self, count: usize) {
        self.world.lock().creation_budget = Some(count);
    }

    /// Session `index` stays listed but no longer answers.
    pub fn kill_session(&self, index: usize) {
        if let Some(s) = self.world.lock().sessions.get_mut(index) {
            s.alive = false;
        }
    }

    /// Entering a new description for `code` raises an error message.
    pub fn reject_description(&self, code: &str, message: &str) {
        self.world
            .lock()
            .rejected
            .insert(code.to_owned(), message.to_owned());
    }

    pub fn fail_save(&self, code: &str) {
        self.world.lock().save_failures.insert(code.to_owned());
    }

    pub fn fail_field_read(&self, code: &str) {
        self.world.lock().read_failures.insert(code.to_owned());
    }

    /// Export dialogs confirm without writing to the clipboard.
    pub fn export_nothing(&self, on: bool) {
        self.world.lock().export_nothing = on;
    }

    /// Leave session `index` with the export dialog open.
    pub fn open_modal(&self, index: usize) {
        if let Some(s) = self.world.lock().sessions.get_mut(index) {
            s.modal = Some(Modal::Export {
                listing: true,
                clipboard_format: false,
            });
        }
    }

    pub fn has_modal(&self, index: usize) -> bool {
        self.world
            .lock()
            .sessions
            .get(index)
            .is_some_and(|s| s.modal.is_some())
    }

    pub fn creation_attempts(&self) -> usize {
        self.world.lock().creation_attempts
    }

    pub fn concurrency_violations(&self) -> usize {
        self.world.lock().violations
    }

    /// Session objects currently open.
    pub fn open_handles(&self) -> usize {
        self.world.lock().handles.iter().sum()
    }

    pub fn attached_threads(&self) -> usize {
        self.world.lock().attached
    }

    /// Commands typed into the command field, in order, across sessions.
    pub fn command_log(&self) -> Vec<String> {
        self.world.lock().commands.clone()
    }
}

/// Attached-thread marker; detaches on drop.
#[derive(Debug)]
pub struct SimThreadContext {
    world: Arc<Mutex<World>>,
}

impl Drop for SimThreadContext {
    fn drop(&mut self) {
        let mut w = self.world.lock();
        w.attached = w.attached.saturating_sub(1);
    }
}

impl ScriptingHost for SimulatedHost {
    type Session = SimSession;
    type ThreadContext = SimThreadContext;

    fn attach_thread(&self) -> Result<SimThreadContext, TechLocError> {
        self.world.lock().attached += 1;
        Ok(SimThreadContext {
            world: Arc::clone(&self.world),
        })
    }

    fn connect(&self) -> Result<(), TechLocError> {
        if self.world.lock().reachable {
            Ok(())
        } else {
            Err(TechLocError::ConnectionUnavailable(
                "host process is not running".into(),
            ))
        }
    }

    fn session_count(&self) -> Result<usize, TechLocError> {
        let w = self.world.lock();
        if !w.reachable {
            return Err(TechLocError::ConnectionUnavailable(
                "host process is not running".into(),
            ));
        }
        Ok(w.sessions.len())
    }

    fn open_session(&self, index: usize) -> Result<SimSession, TechLocError> {
        let mut w = self.world.lock();
        if index >= w.sessions.len() {
            return Err(TechLocError::ComError(format!(
                "session index {index} out of range"
            )));
        }
        w.handles[index] += 1;
        if w.handles[index] > 1 {
            w.violations += 1;
        }
        Ok(SimSession {
            world: Arc::clone(&self.world),
            clipboard: self.clipboard.clone(),
            index,
        })
    }
}

/// Session object bound to one simulated session index.
#[derive(Debug)]
pub struct SimSession {
    world: Arc<Mutex<World>>,
    clipboard: MemoryClipboard,
    index: usize,
}

impl Drop for SimSession {
    fn drop(&mut self) {
        let mut w = self.world.lock();
        if let Some(h) = w.handles.get_mut(self.index) {
            *h = h.saturating_sub(1);
        }
    }
}

impl HostSession for SimSession {
    type Element = SimElement;

    fn find_by_id(&self, id: &str) -> Result<SimElement, TechLocError> {
        let w = self.world.lock();
        let state = live_state(&w, self.index)?;
        if !element_exists(&w, state, id) {
            return Err(not_found(id));
        }
        Ok(SimElement {
            world: Arc::clone(&self.world),
            clipboard: self.clipboard.clone(),
            session: self.index,
            id: id.to_owned(),
        })
    }

    fn info(&self) -> Result<SessionInfo, TechLocError> {
        let w = self.world.lock();
        live_state(&w, self.index)?;
        Ok(SessionInfo {
            user: "TESTUSER".to_owned(),
            system_name: "PRD".to_owned(),
            client: "100".to_owned(),
            language: w.language.clone(),
        })
    }
}

fn live_state(w: &World, index: usize) -> Result<&SessionState, TechLocError> {
    match w.sessions.get(index) {
        Some(s) if s.alive => Ok(s),
        _ => Err(TechLocError::ComError(format!("session {index} is closed"))),
    }
}

fn not_found(id: &str) -> TechLocError {
    TechLocError::ComError(format!("control not found: {id}"))
}

fn element_exists(w: &World, s: &SessionState, id: &str) -> bool {
    if id == ids::MAIN || id == ids::STATUS_BAR {
        return true;
    }
    if let Some(modal) = s.modal {
        return match id {
            ids::MODAL => true,
            ids::MULTI_VALUE_PASTE | ids::MULTI_VALUE_ACCEPT => modal == Modal::MultiValue,
            ids::LAYOUT_GRID => modal == Modal::LayoutChooser,
            ids::EXPORT_CLIPBOARD_FORMAT | ids::MODAL_CONFIRM => {
                matches!(modal, Modal::Export { .. })
            }
            _ => false,
        };
    }
    match (&s.screen, id) {
        (_, ids::OKCODE) => true,
        (Screen::ListingSelection, ids::LISTING_CODE | ids::LISTING_VARIANT | ids::EXECUTE) => true,
        (Screen::ListingSingle(_), ids::RECORD_CODE | ids::RECORD_DESCRIPTION) => true,
        (Screen::ListingMultiple(_), ids::LISTING_GRID | ids::LISTING_EXPORT_MENU) => true,
        (Screen::BrowseInitial, ids::BROWSE_TABLE) => true,
        (
            Screen::BrowseSelection,
            ids::BROWSE_MULTI_VALUE
            | ids::BROWSE_FIRST_VALUE
            | ids::BROWSE_LANGUAGE_FLAG
            | ids::BROWSE_MAX_HITS
            | ids::EXECUTE,
        ) => true,
        (Screen::BrowseResult, ids::BROWSE_LAYOUT_BUTTON | ids::BROWSE_EXPORT_MENU) => true,
        (Screen::ChangeInitial, ids::RECORD_CODE) => true,
        (Screen::ChangeMaster { code, tab }, _) => match id {
            ids::RECORD_CODE | ids::RECORD_DESCRIPTION | ids::SAVE => true,
            ids::TAB_GENERAL | ids::TAB_STRUCTURE => true,
            ids::CATEGORY | ids::COMPONENT | ids::SECTION | ids::OBJECT_TYPE => {
                *tab == Tab::General && !w.read_failures.contains(code)
            }
            ids::CATALOG_PROFILE => *tab == Tab::Structure && !w.read_failures.contains(code),
            _ => false,
        },
        _ => false,
    }
}

/// Handle to one control of one simulated session.
#[derive(Debug)]
pub struct SimElement {
    world: Arc<Mutex<World>>,
    clipboard: MemoryClipboard,
    session: usize,
    id: String,
}

impl SimElement {
    /// Run `f` on the world with this element's session, re-checking that
    /// the control still exists.
    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut World, usize) -> Result<T, TechLocError>,
    ) -> Result<T, TechLocError> {
        let mut w = self.world.lock();
        let state = live_state(&w, self.session)?;
        if !element_exists(&w, state, &self.id) {
            return Err(not_found(&self.id));
        }
        f(&mut *w, self.session)
    }

    fn unsupported(&self, what: &str) -> TechLocError {
        TechLocError::ComError(format!("{what} not supported by {}", self.id))
    }
}

impl GuiElement for SimElement {
    fn text(&self) -> Result<String, TechLocError> {
        self.with_state(|w, i| {
            let w: &World = w;
            let s = &w.sessions[i];
            let text = match (self.id.as_str(), &s.screen) {
                (ids::MAIN, _) => s.title(),
                (ids::STATUS_BAR, _) => s.status_text.clone(),
                (ids::RECORD_CODE, Screen::ListingSingle(code)) => code.clone(),
                (ids::RECORD_CODE, Screen::ChangeMaster { code, .. }) => code.clone(),
                (ids::RECORD_DESCRIPTION, Screen::ListingSingle(code)) => {
                    find_location(w, code)?.description.clone()
                }
                (ids::RECORD_DESCRIPTION, Screen::ChangeMaster { code, .. }) => match &s.draft {
                    Some(d) => d.clone(),
                    None => find_location(w, code)?.description.clone(),
                },
                (ids::BROWSE_FIRST_VALUE, _) => s.selection.first().cloned().unwrap_or_default(),
                (field, Screen::ChangeMaster { code, .. }) if is_classification(field) => {
                    let loc = find_location(w, code)?;
                    let c = match (&s.draft, &loc.derived) {
                        (Some(_), Some(derived)) => derived,
                        _ => &loc.classification,
                    };
                    classification_field(c, field)
                }
                (field, _) => s.fields.get(field).cloned().unwrap_or_default(),
            };
            Ok(text)
        })
    }

    fn set_text(&self, value: &str) -> Result<(), TechLocError> {
        self.with_state(|w, i| {
            let s = &mut w.sessions[i];
            match (self.id.as_str(), &s.screen) {
                (ids::RECORD_DESCRIPTION, Screen::ChangeMaster { .. }) => {
                    s.draft = Some(value.to_owned());
                }
                (ids::MAIN | ids::STATUS_BAR | ids::RECORD_CODE, Screen::ChangeMaster { .. }) => {
                    return Err(self.unsupported("set_text"))
                }
                (ids::MAIN | ids::STATUS_BAR | ids::LISTING_GRID | ids::BROWSE_FIRST_VALUE, _) => {
                    return Err(self.unsupported("set_text"))
                }
                (_, _) => {
                    let key = field_key(&self.id).ok_or_else(|| self.unsupported("set_text"))?;
                    s.fields.insert(key, value.to_owned());
                }
            }
            Ok(())
        })
    }

    fn send_vkey(&self, key: u32) -> Result<(), TechLocError> {
        self.with_state(|w, i| match (self.id.as_str(), key) {
            (ids::MAIN, vkey::ENTER) => handle_enter(w, i),
            (ids::MODAL, vkey::CANCEL) => {
                w.sessions[i].modal = None;
                Ok(())
            }
            _ => Err(self.unsupported("send_vkey")),
        })
    }

    fn press(&self) -> Result<(), TechLocError> {
        self.with_state(|w, i| match self.id.as_str() {
            ids::EXECUTE => handle_execute(w, i),
            ids::SAVE => handle_save(w, i),
            ids::BROWSE_MULTI_VALUE => {
                w.sessions[i].modal = Some(Modal::MultiValue);
                Ok(())
            }
            ids::MULTI_VALUE_PASTE => {
                let text = self.clipboard.read_text()?.unwrap_or_default();
                w.sessions[i].pending_paste = text
                    .split("\r\n")
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_owned)
                    .collect();
                Ok(())
            }
            ids::MULTI_VALUE_ACCEPT => {
                let s = &mut w.sessions[i];
                s.selection = std::mem::take(&mut s.pending_paste);
                s.modal = None;
                Ok(())
            }
            ids::BROWSE_LAYOUT_BUTTON => {
                w.sessions[i].modal = Some(Modal::LayoutChooser);
                Ok(())
            }
            ids::MODAL_CONFIRM => handle_export(w, i, &self.clipboard),
            _ => Err(self.unsupported("press")),
        })
    }

    fn select(&self) -> Result<(), TechLocError> {
        self.with_state(|w, i| {
            let s = &mut w.sessions[i];
            match self.id.as_str() {
                ids::LISTING_EXPORT_MENU => {
                    s.modal = Some(Modal::Export {
                        listing: true,
                        clipboard_format: false,
                    })
                }
                ids::BROWSE_EXPORT_MENU => {
                    s.modal = Some(Modal::Export {
                        listing: false,
                        clipboard_format: false,
                    })
                }
                ids::EXPORT_CLIPBOARD_FORMAT => {
                    if let Some(Modal::Export { listing, .. }) = s.modal {
                        s.modal = Some(Modal::Export {
                            listing,
                            clipboard_format: true,
                        });
                    }
                }
                ids::TAB_GENERAL | ids::TAB_STRUCTURE => {
                    if let Screen::ChangeMaster { tab, .. } = &mut s.screen {
                        *tab = if self.id == ids::TAB_GENERAL {
                            Tab::General
                        } else {
                            Tab::Structure
                        };
                    }
                }
                _ => return Err(self.unsupported("select")),
            }
            Ok(())
        })
    }

    fn set_focus(&self) -> Result<(), TechLocError> {
        self.with_state(|_, _| Ok(()))
    }

    fn row_count(&self) -> Result<usize, TechLocError> {
        self.with_state(|w, i| match (self.id.as_str(), &w.sessions[i].screen) {
            (ids::LISTING_GRID, Screen::ListingMultiple(codes)) => Ok(codes.len()),
            (ids::LAYOUT_GRID, _) => Ok(w.layouts.len()),
            _ => Err(self.unsupported("row_count")),
        })
    }

    fn column_order(&self, index: usize) -> Result<String, TechLocError> {
        self.with_state(|_, _| match (self.id.as_str(), index) {
            (ids::LAYOUT_GRID, 0) => Ok("VARIANT".to_owned()),
            (ids::LAYOUT_GRID, 1) => Ok("TEXT".to_owned()),
            _ => Err(self.unsupported("column_order")),
        })
    }

    fn cell_value(&self, row: usize, column: &str) -> Result<String, TechLocError> {
        self.with_state(|w, _| match (self.id.as_str(), column) {
            (ids::LAYOUT_GRID, "VARIANT") if w.unreadable_layout_rows.contains(&row) => {
                Err(TechLocError::ComError(format!("row {row} not readable")))
            }
            (ids::LAYOUT_GRID, "VARIANT") => w
                .layouts
                .get(row)
                .cloned()
                .ok_or_else(|| TechLocError::ComError(format!("row {row} out of range"))),
            (ids::LAYOUT_GRID, "TEXT") => Ok(String::new()),
            _ => Err(self.unsupported("cell_value")),
        })
    }

    fn select_row(&self, row: usize) -> Result<(), TechLocError> {
        self.with_state(|w, i| {
            if self.id != ids::LAYOUT_GRID {
                return Err(self.unsupported("select_row"));
            }
            let layout = w
                .layouts
                .get(row)
                .cloned()
                .ok_or_else(|| TechLocError::ComError(format!("row {row} out of range")))?;
            let s = &mut w.sessions[i];
            s.layout = Some(layout);
            s.modal = None;
            s.set_status(Some(MessageType::Success), "Layout applicato");
            Ok(())
        })
    }

    fn message_type(&self) -> Result<Option<MessageType>, TechLocError> {
        self.with_state(|w, i| {
            if self.id == ids::STATUS_BAR {
                Ok(w.sessions[i].status)
            } else {
                Err(self.unsupported("message_type"))
            }
        })
    }
}

fn field_key(id: &str) -> Option<&'static str> {
    [
        ids::OKCODE,
        ids::LISTING_CODE,
        ids::LISTING_VARIANT,
        ids::BROWSE_TABLE,
        ids::BROWSE_LANGUAGE_FLAG,
        ids::BROWSE_MAX_HITS,
        ids::RECORD_CODE,
    ]
    .into_iter()
    .find(|k| *k == id)
}

fn is_classification(id: &str) -> bool {
    matches!(
        id,
        ids::CATEGORY | ids::COMPONENT | ids::SECTION | ids::OBJECT_TYPE | ids::CATALOG_PROFILE
    )
}

fn classification_field(c: &Classification, id: &str) -> String {
    match id {
        ids::CATEGORY => c.category.clone(),
        ids::COMPONENT => c.component.clone(),
        ids::SECTION => c.section.clone(),
        ids::OBJECT_TYPE => c.object_type.clone(),
        _ => c.catalog_profile.clone(),
    }
}

fn find_location<'w>(w: &'w World, code: &str) -> Result<&'w SimLocation, TechLocError> {
    w.locations
        .iter()
        .find(|l| l.code == code)
        .ok_or_else(|| TechLocError::ComError(format!("no location {code}")))
}

fn handle_enter(w: &mut World, i: usize) -> Result<(), TechLocError> {
    let command = w.sessions[i]
        .fields
        .remove(ids::OKCODE)
        .unwrap_or_default();
    if !command.trim().is_empty() {
        return handle_command(w, i, command.trim());
    }

    let screen = w.sessions[i].screen.clone();
    match screen {
        Screen::BrowseInitial => {
            let s = &mut w.sessions[i];
            let table = s.fields.get(ids::BROWSE_TABLE).cloned().unwrap_or_default();
            if table.eq_ignore_ascii_case("IFLO") {
                s.navigate(Screen::BrowseSelection);
            } else {
                s.set_status(Some(MessageType::Error), format!("Tabella {table} non esiste"));
            }
        }
        Screen::ChangeInitial => {
            let code = w.sessions[i]
                .fields
                .get(ids::RECORD_CODE)
                .cloned()
                .unwrap_or_default();
            let exists = w.locations.iter().any(|l| l.code == code);
            let s = &mut w.sessions[i];
            if exists {
                s.navigate(Screen::ChangeMaster {
                    code,
                    tab: Tab::General,
                });
            } else {
                s.set_status(
                    Some(MessageType::Error),
                    format!("Sede tecnica {code} non esiste"),
                );
            }
        }
        Screen::ChangeMaster { code, .. } => {
            let rejected = w.rejected.get(&code).cloned();
            let s = &mut w.sessions[i];
            match (rejected, &s.draft) {
                (Some(message), Some(_)) => s.set_status(Some(MessageType::Error), message),
                _ => s.set_status(None, ""),
            }
        }
        _ => {}
    }
    Ok(())
}

fn handle_command(w: &mut World, i: usize, command: &str) -> Result<(), TechLocError> {
    w.commands.push(command.to_owned());
    let target = match command.to_ascii_uppercase().as_str() {
        c if c == commands::LISTING.to_ascii_uppercase() => Screen::ListingSelection,
        c if c == commands::BROWSE.to_ascii_uppercase() => Screen::BrowseInitial,
        c if c == commands::CHANGE.to_ascii_uppercase() => Screen::ChangeInitial,
        c if c == commands::MAIN_MENU.to_ascii_uppercase() => Screen::MainMenu,
        c if c == commands::NEW_SESSION.to_ascii_uppercase() => {
            w.creation_attempts += 1;
            let allowed = match w.creation_budget {
                Some(0) => false,
                Some(left) => {
                    w.creation_budget = Some(left - 1);
                    true
                }
                None => true,
            };
            if allowed {
                w.sessions.push(SessionState::new());
                w.handles.push(0);
            }
            return Ok(());
        }
        _ => {
            w.sessions[i].set_status(
                Some(MessageType::Error),
                format!("Transazione {command} non esiste"),
            );
            return Ok(());
        }
    };
    w.sessions[i].navigate(target);
    Ok(())
}

fn handle_execute(w: &mut World, i: usize) -> Result<(), TechLocError> {
    match w.sessions[i].screen {
        Screen::ListingSelection => {
            let pattern = w.sessions[i]
                .fields
                .get(ids::LISTING_CODE)
                .cloned()
                .unwrap_or_default();
            let matches: Vec<String> = w
                .locations
                .iter()
                .filter(|l| glob_match(&pattern, &l.code))
                .map(|l| l.code.clone())
                .collect();
            let s = &mut w.sessions[i];
            match matches.len() {
                0 => s.set_status(
                    Some(MessageType::Error),
                    "Non sono stati selezionati oggetti",
                ),
                1 => s.navigate(Screen::ListingSingle(matches[0].clone())),
                _ => s.navigate(Screen::ListingMultiple(matches)),
            }
        }
        Screen::BrowseSelection => {
            let selection = w.sessions[i].selection.clone();
            let max_hits: usize = w.sessions[i]
                .fields
                .get(ids::BROWSE_MAX_HITS)
                .and_then(|m| m.trim().parse().ok())
                .unwrap_or(500);
            let rows: Vec<(usize, String)> = w
                .locations
                .iter()
                .enumerate()
                .filter(|(_, l)| selection.contains(&l.code))
                .flat_map(|(idx, l)| l.languages.iter().map(move |lang| (idx, lang.clone())))
                .take(max_hits)
                .collect();
            let s = &mut w.sessions[i];
            if rows.is_empty() {
                s.set_status(
                    Some(MessageType::Error),
                    "Nessuna voce di tabella trovata per la chiave indicata",
                );
            } else {
                s.navigate(Screen::BrowseResult);
                s.result_rows = rows;
            }
        }
        _ => {
            return Err(TechLocError::ComError(
                "execute not available on this screen".into(),
            ))
        }
    }
    Ok(())
}

fn handle_save(w: &mut World, i: usize) -> Result<(), TechLocError> {
    let Screen::ChangeMaster { code, .. } = w.sessions[i].screen.clone() else {
        return Err(TechLocError::ComError("nothing to save".into()));
    };
    if w.save_failures.contains(&code) {
        w.sessions[i].set_status(
            Some(MessageType::Error),
            format!("Sede tecnica {code} bloccata da altro utente"),
        );
        return Ok(());
    }
    let draft = w.sessions[i].draft.clone();
    if let Some(loc) = w.locations.iter_mut().find(|l| l.code == code) {
        if let Some(description) = draft {
            loc.description = description;
            if let Some(derived) = loc.derived.take() {
                loc.classification = derived;
            }
        }
    }
    let s = &mut w.sessions[i];
    s.navigate(Screen::ChangeInitial);
    s.set_status(
        Some(MessageType::Success),
        format!("Sede tecnica {code} salvata"),
    );
    Ok(())
}

fn handle_export(w: &mut World, i: usize, clipboard: &MemoryClipboard) -> Result<(), TechLocError> {
    let Some(Modal::Export {
        listing,
        clipboard_format,
    }) = w.sessions[i].modal
    else {
        return Err(TechLocError::ComError("no export dialog".into()));
    };
    w.sessions[i].modal = None;
    if !clipboard_format || w.export_nothing {
        return Ok(());
    }

    let s = &w.sessions[i];
    let text = if listing {
        let Screen::ListingMultiple(codes) = &s.screen else {
            return Ok(());
        };
        let rows: Vec<Vec<String>> = codes
            .iter()
            .map(|c| vec![c.clone(), String::new()])
            .collect();
        render_report(&["Sede tecnica", "Note"], &rows)
    } else if s.layout.as_deref() == Some("CHECK_FL_L") {
        let rows: Vec<Vec<String>> = s
            .result_rows
            .iter()
            .map(|(idx, lang)| {
                let l = &w.locations[*idx];
                let c = &l.classification;
                vec![
                    l.code.clone(),
                    l.description.clone(),
                    lang.chars().next().map(String::from).unwrap_or_default(),
                    lang.clone(),
                    c.category.clone(),
                    c.component.clone(),
                    c.section.clone(),
                    c.object_type.clone(),
                    c.catalog_profile.clone(),
                ]
            })
            .collect();
        render_report(
            &[
                "Sede tecnica",
                "Definizione",
                "L",
                "L",
                "Tipologia",
                "Componente",
                "Sezione",
                "Tipo ogg.",
                "Prof.cat.",
            ],
            &rows,
        )
    } else {
        let rows: Vec<Vec<String>> = s
            .result_rows
            .iter()
            .map(|(idx, _)| {
                let l = &w.locations[*idx];
                vec![l.code.clone(), l.description.clone()]
            })
            .collect();
        render_report(&["Sede tecnica", "Definizione"], &rows)
    };
    clipboard.write_text(&text)
}

/// Render rows the way the host's list export does: a title line, dash
/// borders and pipe-delimited cells.
pub fn render_report(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut out = String::from("16.10.2026          Dynamic List Display          1\n");
    let rule = "-".repeat(60);
    out.push_str(&rule);
    out.push('\n');
    out.push_str(&format!("| {} |\n", headers.join(" | ")));
    out.push_str(&format!("|{}|\n", "-".repeat(58)));
    for row in rows {
        out.push_str(&format!("| {} |\n", row.join(" | ")));
    }
    out.push_str(&rule);
    out.push('\n');
    out
}

/// `*` matches any run of characters; everything else literally.
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }
    let mut rest = text;
    for (n, part) in parts.iter().enumerate() {
        if n == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if n == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(at) => rest = &rest[at + part.len()..],
                None => return false,
            }
        }
    }
    true
}
