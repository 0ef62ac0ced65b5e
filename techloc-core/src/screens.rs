//! Typed views over the host screens the workflows visit.
//!
//! Element ids are host-assigned paths and stay private to this module (and
//! the in-crate simulator); workflow code only sees the named accessors of
//! each screen type.
//!
//! | Screen | Transaction | Type |
//! |--------|-------------|------|
//! | any | - | [`Frame`] |
//! | listing selection | `IH06` | [`ListingSelection`] |
//! | listing result | `IH06` | [`ListingScreen`] |
//! | table browser | `SE16` | [`BrowseSelection`], [`BrowseResult`], [`LayoutChooser`] |
//! | change master record | `IL02` | [`ChangeEntry`], [`ChangeMaster`] |
//! | list export modal | - | [`ExportDialog`] |

use crate::errors::TechLocError;
use crate::host::{GuiElement, HostSession, MessageType};
use crate::location::Classification;

/// Host element ids.
pub(crate) mod ids {
    pub const MAIN: &str = "wnd[0]";
    pub const MODAL: &str = "wnd[1]";
    pub const OKCODE: &str = "wnd[0]/tbar[0]/okcd";
    pub const STATUS_BAR: &str = "wnd[0]/sbar";
    pub const EXECUTE: &str = "wnd[0]/tbar[1]/btn[8]";
    pub const SAVE: &str = "wnd[0]/tbar[0]/btn[11]";

    pub const LISTING_CODE: &str = "wnd[0]/usr/ctxtSTRNO-LOW";
    pub const LISTING_VARIANT: &str = "wnd[0]/usr/ctxtVARIANT";
    pub const LISTING_GRID: &str = "wnd[0]/usr/cntlGRID1/shellcont/shell";
    pub const LISTING_EXPORT_MENU: &str = "wnd[0]/mbar/menu[0]/menu[10]/menu[2]";

    pub const RECORD_CODE: &str = "wnd[0]/usr/ctxtIFLO-TPLNR";
    pub const RECORD_DESCRIPTION: &str = "wnd[0]/usr/txtIFLO-PLTXT";

    pub const EXPORT_CLIPBOARD_FORMAT: &str =
        "wnd[1]/usr/subSUBSCREEN_STEPLOOP:SAPLSPO5:0150/sub:SAPLSPO5:0150/radSPOPLI-SELFLAG[4,0]";
    pub const MODAL_CONFIRM: &str = "wnd[1]/tbar[0]/btn[0]";

    pub const BROWSE_TABLE: &str = "wnd[0]/usr/ctxtDATABROWSE-TABLENAME";
    pub const BROWSE_MULTI_VALUE: &str = "wnd[0]/usr/btn%_I1_%_APP_%-VALU_PUSH";
    pub const MULTI_VALUE_PASTE: &str = "wnd[1]/tbar[0]/btn[24]";
    pub const MULTI_VALUE_ACCEPT: &str = "wnd[1]/tbar[0]/btn[8]";
    pub const BROWSE_FIRST_VALUE: &str = "wnd[0]/usr/ctxtI1-LOW";
    pub const BROWSE_LANGUAGE_FLAG: &str = "wnd[0]/usr/txtI4-LOW";
    pub const BROWSE_MAX_HITS: &str = "wnd[0]/usr/txtMAX_SEL";
    pub const BROWSE_LAYOUT_BUTTON: &str = "wnd[0]/tbar[1]/btn[33]";
    pub const LAYOUT_GRID: &str =
        "wnd[1]/usr/ssubD0500_SUBSCREEN:SAPLSLVC_DIALOG:0501/cntlG51_CONTAINER/shellcont/shell";
    pub const BROWSE_EXPORT_MENU: &str = "wnd[0]/mbar/menu[0]/menu[10]/menu[3]/menu[2]";

    pub const TAB_GENERAL: &str = "wnd[0]/usr/tabsTABSTRIP/tabpT\\01";
    pub const CATEGORY: &str =
        "wnd[0]/usr/tabsTABSTRIP/tabpT\\01/ssubSUB_DATA:SAPLITO0:0102/ctxtIFLO-ZZTIPOLOGIA";
    pub const COMPONENT: &str =
        "wnd[0]/usr/tabsTABSTRIP/tabpT\\01/ssubSUB_DATA:SAPLITO0:0102/ctxtIFLO-ZZCOMPONENTE";
    pub const SECTION: &str =
        "wnd[0]/usr/tabsTABSTRIP/tabpT\\01/ssubSUB_DATA:SAPLITO0:0102/ctxtIFLO-ZZSEZIONE";
    pub const OBJECT_TYPE: &str =
        "wnd[0]/usr/tabsTABSTRIP/tabpT\\01/ssubSUB_DATA:SAPLITO0:0102/ctxtITOBATTR-EQART";
    pub const TAB_STRUCTURE: &str = "wnd[0]/usr/tabsTABSTRIP/tabpT\\04";
    pub const CATALOG_PROFILE: &str =
        "wnd[0]/usr/tabsTABSTRIP/tabpT\\04/ssubSUB_DATA:SAPLITO0:0105/ctxtITOBATTR-RBNR";
}

/// Host transaction commands.
pub(crate) mod commands {
    pub const LISTING: &str = "/nIH06";
    pub const BROWSE: &str = "/nse16";
    pub const CHANGE: &str = "/nIL02";
    pub const MAIN_MENU: &str = "/n";
    pub const NEW_SESSION: &str = "/oSESSION_MANAGER";
}

/// Virtual key codes sent to windows.
pub mod vkey {
    pub const ENTER: u32 = 0;
    pub const CANCEL: u32 = 12;
}

/// Value that switches the table browser to maintenance-language rows only.
const LANGUAGE_FLAG_ON: &str = "X";

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// Main window chrome present on every screen: title, command field,
/// toolbar and status bar.
pub struct Frame<'s, S: HostSession> {
    session: &'s S,
}

impl<'s, S: HostSession> Frame<'s, S> {
    pub fn new(session: &'s S) -> Self {
        Self { session }
    }

    pub fn title(&self) -> Result<String, TechLocError> {
        self.session.find_by_id(ids::MAIN)?.text()
    }

    pub fn status_text(&self) -> Result<String, TechLocError> {
        self.session.find_by_id(ids::STATUS_BAR)?.text()
    }

    pub fn status_indicator(&self) -> Result<Option<MessageType>, TechLocError> {
        self.session.find_by_id(ids::STATUS_BAR)?.message_type()
    }

    /// Type `command` into the command field and press Enter.
    pub fn run_command(&self, command: &str) -> Result<(), TechLocError> {
        log::debug!(target: "screens", "command {command}");
        self.session.find_by_id(ids::OKCODE)?.set_text(command)?;
        self.enter()
    }

    pub fn enter(&self) -> Result<(), TechLocError> {
        self.session.find_by_id(ids::MAIN)?.send_vkey(vkey::ENTER)
    }

    pub fn execute(&self) -> Result<(), TechLocError> {
        self.session.find_by_id(ids::EXECUTE)?.press()
    }

    pub fn save(&self) -> Result<(), TechLocError> {
        self.session.find_by_id(ids::SAVE)?.press()
    }

    /// Close the modal window, if one is open.  Returns whether one was.
    pub fn dismiss_modal(&self) -> Result<bool, TechLocError> {
        match self.session.try_find(ids::MODAL) {
            Some(modal) => {
                modal.send_vkey(vkey::CANCEL)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Leave the current transaction for the main menu.
    pub fn to_main_menu(&self) -> Result<(), TechLocError> {
        self.run_command(commands::MAIN_MENU)
    }

    /// Ask the host to open one more session.
    pub fn request_new_session(&self) -> Result<(), TechLocError> {
        self.run_command(commands::NEW_SESSION)
    }
}

// ---------------------------------------------------------------------------
// List export modal
// ---------------------------------------------------------------------------

/// Format dialog opened by the "export list" menu entries.
pub struct ExportDialog<'s, S: HostSession> {
    session: &'s S,
}

impl<'s, S: HostSession> ExportDialog<'s, S> {
    pub fn new(session: &'s S) -> Self {
        Self { session }
    }

    /// Pick the clipboard format and confirm.
    pub fn confirm_clipboard(&self) -> Result<(), TechLocError> {
        let radio = self.session.find_by_id(ids::EXPORT_CLIPBOARD_FORMAT)?;
        radio.select()?;
        radio.set_focus()?;
        self.session.find_by_id(ids::MODAL_CONFIRM)?.press()
    }
}

// ---------------------------------------------------------------------------
// Listing (IH06)
// ---------------------------------------------------------------------------

/// Selection screen of the listing transaction.
pub struct ListingSelection<'s, S: HostSession> {
    session: &'s S,
}

impl<'s, S: HostSession> ListingSelection<'s, S> {
    /// Navigate to the listing transaction.
    pub fn open(session: &'s S) -> Result<Self, TechLocError> {
        Frame::new(session).run_command(commands::LISTING)?;
        Ok(Self { session })
    }

    /// Enter the search code and report variant, then execute.
    pub fn submit(&self, code: &str, variant: &str) -> Result<(), TechLocError> {
        self.session.find_by_id(ids::LISTING_CODE)?.set_text(code)?;
        self.session.find_by_id(ids::LISTING_VARIANT)?.set_text(variant)?;
        Frame::new(self.session).execute()
    }
}

/// Screen reached after submitting a listing request.
pub enum ListingScreen<'s, S: HostSession> {
    /// Status bar reports that nothing was selected.
    NoData,
    /// Exactly one match; its master record is displayed.
    Single(RecordView<'s, S>),
    /// Several matches in a result grid.
    Multiple(ResultList<'s, S>),
}

/// Read-only master record display.
pub struct RecordView<'s, S: HostSession> {
    session: &'s S,
}

impl<'s, S: HostSession> RecordView<'s, S> {
    pub fn new(session: &'s S) -> Self {
        Self { session }
    }

    pub fn code(&self) -> Result<String, TechLocError> {
        self.session.find_by_id(ids::RECORD_CODE)?.text()
    }

    pub fn description(&self) -> Result<String, TechLocError> {
        self.session.find_by_id(ids::RECORD_DESCRIPTION)?.text()
    }
}

/// Listing result grid.
pub struct ResultList<'s, S: HostSession> {
    session: &'s S,
}

impl<'s, S: HostSession> ResultList<'s, S> {
    pub fn new(session: &'s S) -> Self {
        Self { session }
    }

    pub fn row_count(&self) -> Result<usize, TechLocError> {
        self.session.find_by_id(ids::LISTING_GRID)?.row_count()
    }

    /// Open the export format dialog.
    pub fn open_export(&self) -> Result<ExportDialog<'s, S>, TechLocError> {
        self.session.find_by_id(ids::LISTING_EXPORT_MENU)?.select()?;
        Ok(ExportDialog::new(self.session))
    }
}

// ---------------------------------------------------------------------------
// Table browser (SE16)
// ---------------------------------------------------------------------------

/// Selection screen of the table browser for one table.
pub struct BrowseSelection<'s, S: HostSession> {
    session: &'s S,
}

impl<'s, S: HostSession> BrowseSelection<'s, S> {
    /// Navigate to the table browser and request `table`.
    pub fn open(session: &'s S, table: &str) -> Result<Self, TechLocError> {
        let frame = Frame::new(session);
        frame.run_command(commands::BROWSE)?;
        session.find_by_id(ids::BROWSE_TABLE)?.set_text(table)?;
        frame.enter()?;
        Ok(Self { session })
    }

    /// Open the multi-value dialog of the code field, paste the clipboard
    /// and accept.
    pub fn paste_code_values(&self) -> Result<(), TechLocError> {
        self.session.find_by_id(ids::BROWSE_MULTI_VALUE)?.press()?;
        self.session.find_by_id(ids::MULTI_VALUE_PASTE)?.press()?;
        self.session.find_by_id(ids::MULTI_VALUE_ACCEPT)?.press()
    }

    /// First code value shown in the selection field.
    pub fn first_code_value(&self) -> Result<String, TechLocError> {
        self.session.find_by_id(ids::BROWSE_FIRST_VALUE)?.text()
    }

    pub fn restrict_to_main_language(&self) -> Result<(), TechLocError> {
        self.session
            .find_by_id(ids::BROWSE_LANGUAGE_FLAG)?
            .set_text(LANGUAGE_FLAG_ON)
    }

    pub fn set_max_hits(&self, max_hits: &str) -> Result<(), TechLocError> {
        self.session.find_by_id(ids::BROWSE_MAX_HITS)?.set_text(max_hits)
    }

    pub fn execute(self) -> Result<BrowseResult<'s, S>, TechLocError> {
        Frame::new(self.session).execute()?;
        Ok(BrowseResult {
            session: self.session,
        })
    }
}

/// Result list of the table browser.
pub struct BrowseResult<'s, S: HostSession> {
    session: &'s S,
}

impl<'s, S: HostSession> BrowseResult<'s, S> {
    pub fn open_layout_chooser(&self) -> Result<LayoutChooser<S::Element>, TechLocError> {
        self.session.find_by_id(ids::BROWSE_LAYOUT_BUTTON)?.press()?;
        let grid = self.session.find_by_id(ids::LAYOUT_GRID)?;
        Ok(LayoutChooser { grid })
    }

    pub fn open_export(&self) -> Result<ExportDialog<'s, S>, TechLocError> {
        self.session.find_by_id(ids::BROWSE_EXPORT_MENU)?.select()?;
        Ok(ExportDialog::new(self.session))
    }
}

/// Grid of stored report layouts.
pub struct LayoutChooser<E: GuiElement> {
    grid: E,
}

impl<E: GuiElement> LayoutChooser<E> {
    pub fn row_count(&self) -> Result<usize, TechLocError> {
        self.grid.row_count()
    }

    /// Layout name in the first displayed column of `row`.
    pub fn name_at(&self, row: usize) -> Result<String, TechLocError> {
        let column = self.grid.column_order(0)?;
        self.grid.cell_value(row, &column)
    }

    pub fn choose(&self, row: usize) -> Result<(), TechLocError> {
        self.grid.select_row(row)
    }
}

// ---------------------------------------------------------------------------
// Change master record (IL02)
// ---------------------------------------------------------------------------

/// Initial screen of the change transaction.
pub struct ChangeEntry<'s, S: HostSession> {
    session: &'s S,
}

impl<'s, S: HostSession> ChangeEntry<'s, S> {
    pub fn open(session: &'s S) -> Result<Self, TechLocError> {
        Frame::new(session).run_command(commands::CHANGE)?;
        Ok(Self { session })
    }

    /// Enter the code and press Enter to reach the master record.
    pub fn open_record(self, code: &str) -> Result<ChangeMaster<'s, S>, TechLocError> {
        self.session.find_by_id(ids::RECORD_CODE)?.set_text(code)?;
        Frame::new(self.session).enter()?;
        Ok(ChangeMaster {
            session: self.session,
        })
    }
}

/// Editable master record.
pub struct ChangeMaster<'s, S: HostSession> {
    session: &'s S,
}

impl<'s, S: HostSession> ChangeMaster<'s, S> {
    /// Replace the description and press Enter.
    pub fn set_description(&self, description: &str) -> Result<(), TechLocError> {
        self.session
            .find_by_id(ids::RECORD_DESCRIPTION)?
            .set_text(description)?;
        Frame::new(self.session).enter()
    }

    /// Read the five classification fields.  Four sit on the general tab;
    /// the catalog profile needs the structure tab.
    pub fn classification(&self) -> Result<Classification, TechLocError> {
        let read = |id: &str| -> Result<String, TechLocError> {
            self.session
                .find_by_id(id)
                .and_then(|e| e.text())
                .map(|t| t.trim().to_owned())
                .map_err(|e| TechLocError::FieldReadError(format!("{id}: {e}")))
        };
        self.session
            .find_by_id(ids::TAB_GENERAL)
            .and_then(|tab| tab.select())
            .map_err(|e| TechLocError::FieldReadError(format!("general tab: {e}")))?;
        let category = read(ids::CATEGORY)?;
        let component = read(ids::COMPONENT)?;
        let section = read(ids::SECTION)?;
        let object_type = read(ids::OBJECT_TYPE)?;
        self.session
            .find_by_id(ids::TAB_STRUCTURE)
            .and_then(|tab| tab.select())
            .map_err(|e| TechLocError::FieldReadError(format!("structure tab: {e}")))?;
        let catalog_profile = read(ids::CATALOG_PROFILE)?;
        Ok(Classification {
            category,
            component,
            section,
            object_type,
            catalog_profile,
        })
    }

    pub fn save(&self) -> Result<(), TechLocError> {
        Frame::new(self.session)
            .save()
            .map_err(|e| TechLocError::SaveError(e.to_string()))
    }
}
