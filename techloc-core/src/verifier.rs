//! Window-title and status-bar verification.
//!
//! The verifier only reads from the UI.  Every check logs one line with the
//! key, language, expected and observed text, and the verdict.  Unknown keys,
//! missing languages and unreadable controls all count as "no match".

use crate::catalog::{LookupError, MessageCatalog, MessageKey};
use crate::host::HostSession;
use crate::screens::Frame;

/// Which text a check reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    StatusBar,
    WindowTitle,
}

impl Surface {
    fn as_str(self) -> &'static str {
        match self {
            Self::StatusBar => "status_bar",
            Self::WindowTitle => "window_title",
        }
    }
}

/// Catalog checks for one language.
#[derive(Debug, Clone, Copy)]
pub struct Verifier<'a> {
    catalog: &'a MessageCatalog,
    language: &'a str,
}

impl<'a> Verifier<'a> {
    pub fn new(catalog: &'a MessageCatalog, language: &'a str) -> Self {
        Self { catalog, language }
    }

    pub fn language(&self) -> &str {
        self.language
    }

    /// Does the status-bar text match `key`?
    pub fn match_status_bar<S: HostSession>(&self, session: &S, key: MessageKey) -> bool {
        let observed = Frame::new(session).status_text();
        self.check_read(Surface::StatusBar, key, observed)
    }

    /// Does the main window title match `key`?
    pub fn match_window_title<S: HostSession>(&self, session: &S, key: MessageKey) -> bool {
        let observed = Frame::new(session).title();
        self.check_read(Surface::WindowTitle, key, observed)
    }

    fn check_read(
        &self,
        surface: Surface,
        key: MessageKey,
        observed: Result<String, crate::errors::TechLocError>,
    ) -> bool {
        match observed {
            Ok(text) => self.matches(surface, key, &text),
            Err(e) => {
                log::error!(
                    target: "verifier",
                    "surface={} key={key} lang={} result=unreadable error={e}",
                    surface.as_str(),
                    self.language
                );
                false
            }
        }
    }

    /// Match already-read text against the catalog entry for `key`.
    pub fn matches(&self, surface: Surface, key: MessageKey, observed: &str) -> bool {
        let expected = match self.catalog.lookup(key, self.language) {
            Ok(expected) => expected,
            Err(LookupError::UnknownKey) => {
                log::error!(
                    target: "verifier",
                    "surface={} key={key} lang={} result=unknown_key",
                    surface.as_str(),
                    self.language
                );
                return false;
            }
            Err(LookupError::UnsupportedLanguage { available }) => {
                log::error!(
                    target: "verifier",
                    "surface={} key={key} lang={} result=unsupported_language available={available:?}",
                    surface.as_str(),
                    self.language
                );
                return false;
            }
        };

        match expected.find(observed) {
            Some(fragment) => {
                log::info!(
                    target: "verifier",
                    "surface={} key={key} lang={} result=match expected={:?} observed={observed:?} matched={fragment:?}",
                    surface.as_str(),
                    self.language,
                    expected.as_str()
                );
                true
            }
            None => {
                log::debug!(
                    target: "verifier",
                    "surface={} key={key} lang={} result=no_match expected={:?} observed={observed:?}",
                    surface.as_str(),
                    self.language,
                    expected.as_str()
                );
                false
            }
        }
    }
}
