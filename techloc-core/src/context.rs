//! Explicit per-batch context threaded through every workflow call.

use std::path::PathBuf;
use std::sync::Arc;

use crate::catalog::MessageCatalog;
use crate::clipboard::SharedClipboard;
use crate::config::{Settings, Timings};
use crate::errors::TechLocError;
use crate::verifier::Verifier;
use crate::wait::CancelToken;

/// What a workflow needs besides its session: active language, output
/// location, settings, catalog, the gated clipboard and the interrupt flag.
///
/// Cloning is cheap; every worker gets its own copy.
#[derive(Debug, Clone)]
pub struct WorkContext {
    /// UI language negotiated by the live session (e.g. `IT`).
    pub language: String,
    pub output_dir: PathBuf,
    pub settings: Arc<Settings>,
    pub catalog: Arc<MessageCatalog>,
    pub clipboard: SharedClipboard,
    pub cancel: CancelToken,
}

impl WorkContext {
    /// Build a context with the catalog resolved from `settings`.
    ///
    /// The language starts empty and is set from the session identity with
    /// [`with_language`](Self::with_language) once connected.
    pub fn new(
        settings: Settings,
        clipboard: SharedClipboard,
        cancel: CancelToken,
    ) -> Result<Self, TechLocError> {
        let catalog = settings.message_catalog()?;
        Ok(Self {
            language: String::new(),
            output_dir: settings.output_dir.clone(),
            settings: Arc::new(settings),
            catalog: Arc::new(catalog),
            clipboard,
            cancel,
        })
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into().trim().to_ascii_uppercase();
        self
    }

    pub fn timings(&self) -> &Timings {
        &self.settings.timings
    }

    pub fn verifier(&self) -> Verifier<'_> {
        Verifier::new(&self.catalog, &self.language)
    }
}
