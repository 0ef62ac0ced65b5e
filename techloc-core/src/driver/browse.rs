//! Bulk read (`SE16`): fetch the master rows of many codes in one table
//! browser request.

use super::TransactionDriver;
use crate::catalog::MessageKey;
use crate::errors::{TechLocError, VerificationKind};
use crate::host::{HostSession, MessageType};
use crate::screens::{BrowseResult, BrowseSelection, Frame};
use crate::table::ParsedTable;

impl<'a, S: HostSession> TransactionDriver<'a, S> {
    /// Read the table rows of every code in `codes` with the configured
    /// report layout.
    ///
    /// The codes travel to the host through the clipboard and the
    /// multi-value dialog; the result comes back through the clipboard
    /// export.  The clipboard gate is held for the whole exchange.
    pub fn read_locations<C: AsRef<str>>(&self, codes: &[C]) -> Result<ParsedTable, TechLocError> {
        self.guarded("bulk read", || self.run_bulk_read(codes))
    }

    fn run_bulk_read<C: AsRef<str>>(&self, codes: &[C]) -> Result<ParsedTable, TechLocError> {
        self.ctx.cancel.check()?;
        let settings = &self.ctx.settings;
        let verifier = self.ctx.verifier();

        let clipboard = self.lock_clipboard()?;
        let count = clipboard.write_selection_values(codes)?;
        log::info!(
            target: "driver",
            "bulk read of {count} codes from table {}",
            settings.browse_table
        );

        let selection = BrowseSelection::open(self.session, &settings.browse_table)?;
        self.settle();
        if !verifier.match_window_title(self.session, MessageKey::BrowseSelectionView) {
            return Err(TechLocError::verification(
                VerificationKind::Unexpected,
                format!("selection screen of table {} not reached", settings.browse_table),
            ));
        }

        selection.paste_code_values()?;
        self.short_settle();
        let first = selection.first_code_value()?;
        if first.trim().is_empty() {
            return Err(TechLocError::verification(
                VerificationKind::Unexpected,
                "code field still empty after pasting the selection values",
            ));
        }
        log::debug!(target: "driver", "selection starts at {}", first.trim());

        selection.restrict_to_main_language()?;
        selection.set_max_hits(&settings.max_hits)?;
        let result = selection.execute()?;
        self.settle();
        self.ctx.cancel.check()?;

        if !verifier.match_window_title(self.session, MessageKey::BrowseDataResult) {
            let indicator = Frame::new(self.session).status_indicator()?;
            return Err(match indicator {
                Some(MessageType::Error) => TechLocError::verification(
                    VerificationKind::NoData,
                    format!("no rows of table {} match the codes", settings.browse_table),
                ),
                other => TechLocError::verification(
                    VerificationKind::Ambiguous,
                    format!(
                        "result list not recognised, status indicator {}",
                        other.map_or("blank", MessageType::code)
                    ),
                ),
            });
        }

        self.choose_layout(&result, &settings.report_layout)?;

        clipboard.clear()?;
        result.open_export()?.confirm_clipboard()?;
        self.short_settle();
        let table = self.collect_export(&clipboard)?;
        drop(clipboard);

        log::info!(
            target: "driver",
            "ok: bulk read returned {} rows x {} columns",
            table.len(),
            table.columns().len()
        );
        Ok(table)
    }

    /// Pick `layout` from the layout grid by exact name in its first column.
    fn choose_layout(&self, result: &BrowseResult<'a, S>, layout: &str) -> Result<(), TechLocError> {
        let chooser = result.open_layout_chooser()?;
        self.short_settle();

        let rows = chooser.row_count()?;
        let mut chosen = None;
        for row in 0..rows {
            match chooser.name_at(row) {
                Ok(name) if name == layout => {
                    chosen = Some(row);
                    break;
                }
                Ok(_) => {}
                Err(e) => log::warn!(target: "driver", "layout row {row} unreadable: {e}"),
            }
        }
        let Some(row) = chosen else {
            return Err(TechLocError::verification(
                VerificationKind::Unexpected,
                format!("layout {layout} not among {rows} stored layouts"),
            ));
        };
        chooser.choose(row)?;
        self.settle();

        let frame = Frame::new(self.session);
        match frame.status_indicator()? {
            Some(MessageType::Success) => {
                log::debug!(target: "driver", "layout {layout} applied");
                Ok(())
            }
            other => Err(TechLocError::verification(
                VerificationKind::Unexpected,
                format!(
                    "layout {layout} not applied (indicator {}): {}",
                    other.map_or("blank", MessageType::code),
                    frame.status_text().unwrap_or_default()
                ),
            )),
        }
    }
}
