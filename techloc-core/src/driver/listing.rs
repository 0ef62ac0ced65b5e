//! Record listing (`IH06`): expand a code or wildcard pattern into the
//! matching technical locations.

use super::TransactionDriver;
use crate::catalog::MessageKey;
use crate::errors::{TechLocError, VerificationKind};
use crate::headers;
use crate::host::HostSession;
use crate::screens::{ListingScreen, ListingSelection, RecordView, ResultList};
use crate::table::ParsedTable;

impl<'a, S: HostSession> TransactionDriver<'a, S> {
    /// List the technical locations matching `code`.
    ///
    /// A single match is read straight off the record screen into a one-row
    /// table of code and description; several matches are exported through
    /// the clipboard and parsed.  No match fails with
    /// [`VerificationKind::NoData`].
    pub fn list_locations(&self, code: &str) -> Result<ParsedTable, TechLocError> {
        self.guarded("listing", || self.run_listing(code))
    }

    fn run_listing(&self, code: &str) -> Result<ParsedTable, TechLocError> {
        self.ctx.cancel.check()?;
        log::info!(target: "driver", "listing {code}");

        let selection = ListingSelection::open(self.session)?;
        selection.submit(code, &self.ctx.settings.listing_variant)?;
        self.settle();

        match self.classify_listing()? {
            ListingScreen::NoData => Err(TechLocError::verification(
                VerificationKind::NoData,
                format!("no technical location matches {code}"),
            )),
            ListingScreen::Single(record) => {
                let found = record.code()?.trim().to_owned();
                let description = record.description()?.trim().to_owned();
                log::info!(target: "driver", "ok: {code} matched one location {found}");
                ParsedTable::new(
                    vec![headers::CODE.to_owned(), headers::DESCRIPTION.to_owned()],
                    vec![vec![found, description]],
                )
            }
            ListingScreen::Multiple(list) => {
                let expected = list.row_count()?;
                log::info!(target: "driver", "{code} matched {expected} locations, exporting");

                let clipboard = self.lock_clipboard()?;
                clipboard.clear()?;
                list.open_export()?.confirm_clipboard()?;
                self.short_settle();
                let table = self.collect_export(&clipboard)?;
                drop(clipboard);

                if table.len() != expected {
                    log::warn!(
                        target: "driver",
                        "{code}: grid shows {expected} rows, export holds {}",
                        table.len()
                    );
                }
                log::info!(target: "driver", "ok: {code} listed {} locations", table.len());
                Ok(table)
            }
        }
    }

    /// Decide which of the three listing outcomes is on screen.  Exactly
    /// one must match.
    fn classify_listing(&self) -> Result<ListingScreen<'a, S>, TechLocError> {
        let verifier = self.ctx.verifier();
        let no_data = verifier.match_status_bar(self.session, MessageKey::ListingNoData);
        let single = verifier.match_window_title(self.session, MessageKey::ListingSingleResult);
        let multiple =
            verifier.match_window_title(self.session, MessageKey::ListingMultipleResults);

        match (no_data, single, multiple) {
            (true, false, false) => Ok(ListingScreen::NoData),
            (false, true, false) => Ok(ListingScreen::Single(RecordView::new(self.session))),
            (false, false, true) => Ok(ListingScreen::Multiple(ResultList::new(self.session))),
            (false, false, false) => Err(TechLocError::verification(
                VerificationKind::Ambiguous,
                "listing outcome not recognised",
            )),
            _ => Err(TechLocError::verification(
                VerificationKind::Ambiguous,
                format!(
                    "listing outcomes overlap (no_data={no_data} single={single} multiple={multiple})"
                ),
            )),
        }
    }
}
