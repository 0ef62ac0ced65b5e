//! Transaction workflows run against one leased session.
//!
//! | Workflow | Transaction | Entry point |
//! |----------|-------------|-------------|
//! | record listing | `IH06` | [`TransactionDriver::list_locations`] |
//! | bulk read | `SE16` | [`TransactionDriver::read_locations`] |
//! | bulk update | `IL02` | [`TransactionDriver::update_locations`] |
//! | single modify | `IL02` | [`TransactionDriver::modify_location`] |
//!
//! Every entry point logs its failure and makes a best-effort attempt to
//! bring the session back to the main menu, so the next workflow on the same
//! session does not start inside a stale modal.

mod browse;
mod listing;
mod update;

pub use update::UpdateReport;

use crate::clipboard::ClipboardLease;
use crate::context::WorkContext;
use crate::errors::TechLocError;
use crate::host::HostSession;
use crate::parser::parse_report;
use crate::screens::Frame;
use crate::table::ParsedTable;
use crate::wait;

/// Runs workflows on one session with one context.
pub struct TransactionDriver<'a, S: HostSession> {
    session: &'a S,
    ctx: &'a WorkContext,
}

impl<'a, S: HostSession> TransactionDriver<'a, S> {
    pub fn new(session: &'a S, ctx: &'a WorkContext) -> Self {
        Self { session, ctx }
    }

    pub fn session(&self) -> &'a S {
        self.session
    }

    pub fn context(&self) -> &'a WorkContext {
        self.ctx
    }

    /// Close any modal window and return to the main menu.  Failures are
    /// logged, never returned.
    pub fn reset_ui(&self) {
        let frame = Frame::new(self.session);
        match frame.dismiss_modal() {
            Ok(true) => log::debug!(target: "driver", "modal window closed"),
            Ok(false) => {}
            Err(e) => log::warn!(target: "driver", "could not close modal window: {e}"),
        }
        if let Err(e) = frame.to_main_menu() {
            log::warn!(target: "driver", "could not return to main menu: {e}");
        }
    }

    /// Run one workflow; on error log it and reset the UI.
    fn guarded<T>(
        &self,
        workflow: &str,
        op: impl FnOnce() -> Result<T, TechLocError>,
    ) -> Result<T, TechLocError> {
        op().map_err(|e| {
            match &e {
                TechLocError::Cancelled => log::warn!(target: "driver", "{workflow} cancelled"),
                TechLocError::VerificationFailed { .. } => {
                    log::warn!(target: "driver", "{workflow} failed: {e}")
                }
                _ => log::error!(target: "driver", "{workflow} failed: {e}"),
            }
            self.reset_ui();
            e
        })
    }

    fn settle(&self) {
        wait::settle(self.ctx.timings().settle());
    }

    fn short_settle(&self) {
        wait::settle(self.ctx.timings().short_settle());
    }

    /// Take the clipboard gate, waiting at most the acquire timeout.
    fn lock_clipboard(&self) -> Result<ClipboardLease<'a>, TechLocError> {
        let timings = self.ctx.timings();
        self.ctx.clipboard.lock(
            timings.acquire_timeout(),
            timings.clipboard_poll(),
            &self.ctx.cancel,
        )
    }

    /// Wait for the export dialog to fill the clipboard, then parse it.
    ///
    /// The caller holds the clipboard gate from before the export was
    /// triggered, so the text read here is ours.
    fn collect_export(&self, clipboard: &ClipboardLease<'_>) -> Result<ParsedTable, TechLocError> {
        let timings = self.ctx.timings();
        let text = clipboard
            .wait_for_text(
                timings.clipboard_wait(),
                timings.clipboard_poll(),
                &self.ctx.cancel,
            )?
            .ok_or_else(|| {
                TechLocError::ParseError(format!(
                    "no clipboard data within {:.1}s of the export",
                    timings.clipboard_wait().as_secs_f32()
                ))
            })?;
        parse_report(&text, self.ctx.settings.parse_mode)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::clipboard::SharedClipboard;
    use crate::config::{Settings, Timings};
    use crate::context::WorkContext;
    use crate::testing::SimulatedHost;
    use crate::wait::CancelToken;

    /// Context wired to the simulator's clipboard with instant timings.
    pub fn context(host: &SimulatedHost) -> WorkContext {
        let settings = Settings {
            timings: Timings::instant(),
            ..Settings::default()
        };
        WorkContext::new(
            settings,
            SharedClipboard::new(host.clipboard()),
            CancelToken::new(),
        )
        .unwrap()
        .with_language("IT")
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::context;
    use super::*;
    use crate::host::ScriptingHost;
    use crate::testing::SimulatedHost;

    #[test]
    fn test_reset_ui_closes_modal_and_leaves_transaction() {
        let host = SimulatedHost::with_sessions(1);
        let ctx = context(&host);
        host.open_modal(0);
        let session = host.open_session(0).unwrap();
        TransactionDriver::new(&session, &ctx).reset_ui();
        assert!(!host.has_modal(0));
        assert_eq!(host.command_log(), vec!["/n"]);
    }

    #[test]
    fn test_guarded_resets_on_error_only() {
        let host = SimulatedHost::with_sessions(1);
        let ctx = context(&host);
        let session = host.open_session(0).unwrap();
        let driver = TransactionDriver::new(&session, &ctx);

        assert_eq!(driver.guarded("ok", || Ok(3)).unwrap(), 3);
        assert!(host.command_log().is_empty());

        let err = driver
            .guarded::<()>("failing", || Err(TechLocError::ParseError("x".into())))
            .unwrap_err();
        assert!(matches!(err, TechLocError::ParseError(_)));
        assert_eq!(host.command_log(), vec!["/n"]);
    }
}
