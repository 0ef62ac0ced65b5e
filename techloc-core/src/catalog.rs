//! Localized catalog of expected window titles and status-bar messages.
//!
//! Each [`MessageKey`] maps language codes to either a literal (matched by
//! substring containment) or a pattern (case-insensitive regex search).
//! Missing or blank entries are treated as absent so checks fail closed.

use std::collections::HashMap;
use std::fmt;

use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::errors::TechLocError;

/// Screens and messages the workflows need to recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKey {
    /// Status bar: listing selected nothing.
    ListingNoData,
    /// Title: listing returned a result list.
    ListingMultipleResults,
    /// Title: listing jumped straight to one master record.
    ListingSingleResult,
    /// Title: table browser selection screen.
    BrowseSelectionView,
    /// Title: table browser result with hit count.
    BrowseDataResult,
}

impl MessageKey {
    pub const ALL: [MessageKey; 5] = [
        MessageKey::ListingNoData,
        MessageKey::ListingMultipleResults,
        MessageKey::ListingSingleResult,
        MessageKey::BrowseSelectionView,
        MessageKey::BrowseDataResult,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ListingNoData => "listing_no_data",
            Self::ListingMultipleResults => "listing_multiple_results",
            Self::ListingSingleResult => "listing_single_result",
            Self::BrowseSelectionView => "browse_selection_view",
            Self::BrowseDataResult => "browse_data_result",
        }
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One expected text.
#[derive(Debug, Clone)]
pub enum Expected {
    Literal(String),
    Pattern(Regex),
}

impl Expected {
    pub fn literal(text: impl Into<String>) -> Self {
        Self::Literal(text.into())
    }

    /// Compile a case-insensitive pattern.
    pub fn pattern(source: &str) -> Result<Self, TechLocError> {
        RegexBuilder::new(source)
            .case_insensitive(true)
            .build()
            .map(Self::Pattern)
            .map_err(|e| TechLocError::ConfigError(format!("invalid pattern '{source}': {e}")))
    }

    /// Source text, for logs.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Literal(s) => s,
            Self::Pattern(re) => re.as_str(),
        }
    }

    /// Match against observed text; returns the matched fragment.
    pub fn find<'t>(&self, observed: &'t str) -> Option<&'t str> {
        match self {
            Self::Literal(s) => observed.find(s.as_str()).map(|at| &observed[at..at + s.len()]),
            Self::Pattern(re) => re.find(observed).map(|m| m.as_str()),
        }
    }

    fn is_blank(&self) -> bool {
        self.as_str().trim().is_empty()
    }
}

/// Catalog entry as written in a configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EntrySpec {
    Literal(String),
    Pattern { pattern: String },
}

/// `{message key -> {language -> expected}}`.
#[derive(Debug, Clone, Default)]
pub struct MessageCatalog {
    entries: HashMap<MessageKey, HashMap<String, Expected>>,
}

/// Why a lookup produced no expectation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    UnknownKey,
    UnsupportedLanguage { available: Vec<String> },
}

impl MessageCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Built-in Italian texts of the production client.
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        catalog.insert(
            MessageKey::ListingNoData,
            "IT",
            Expected::literal("Non sono stati selezionati oggetti"),
        );
        catalog.insert(
            MessageKey::ListingMultipleResults,
            "IT",
            Expected::literal("Visualizzare sede tecnica: lista sedi tecniche"),
        );
        catalog.insert(
            MessageKey::ListingSingleResult,
            "IT",
            Expected::literal("Visualizzare sede tecnica: Dati anagrafici"),
        );
        catalog.insert(
            MessageKey::BrowseSelectionView,
            "IT",
            Expected::literal("Data Browser: tabella IFLO: videata di selezione"),
        );
        if let Ok(hits) = Expected::pattern(r"Data Browser: tabella IFLO\s+\d+\s+hit") {
            catalog.insert(MessageKey::BrowseDataResult, "IT", hits);
        }
        catalog
    }

    /// Add or replace one entry.  Language codes are stored upper-case;
    /// blank expectations are ignored.
    pub fn insert(&mut self, key: MessageKey, language: &str, expected: Expected) {
        if expected.is_blank() {
            log::warn!(
                target: "catalog",
                "ignoring blank catalog entry {key}/{language}"
            );
            return;
        }
        self.entries
            .entry(key)
            .or_default()
            .insert(language.trim().to_ascii_uppercase(), expected);
    }

    /// Merge configuration overrides over this catalog.
    pub fn apply_overrides(
        &mut self,
        overrides: &HashMap<MessageKey, HashMap<String, EntrySpec>>,
    ) -> Result<(), TechLocError> {
        for (key, by_lang) in overrides {
            for (lang, spec) in by_lang {
                let expected = match spec {
                    EntrySpec::Literal(s) => Expected::literal(s.clone()),
                    EntrySpec::Pattern { pattern } => Expected::pattern(pattern)?,
                };
                self.insert(*key, lang, expected);
            }
        }
        Ok(())
    }

    pub fn lookup(&self, key: MessageKey, language: &str) -> Result<&Expected, LookupError> {
        let by_lang = self.entries.get(&key).ok_or(LookupError::UnknownKey)?;
        by_lang
            .get(&language.trim().to_ascii_uppercase())
            .ok_or_else(|| {
                let mut available: Vec<String> = by_lang.keys().cloned().collect();
                available.sort();
                LookupError::UnsupportedLanguage { available }
            })
    }

    /// Keys without an entry for `language`.
    pub fn missing_for(&self, language: &str) -> Vec<MessageKey> {
        MessageKey::ALL
            .into_iter()
            .filter(|k| self.lookup(*k, language).is_err())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_is_complete_for_italian() {
        let c = MessageCatalog::builtin();
        assert!(c.missing_for("IT").is_empty());
        assert!(c.missing_for("it").is_empty());
        assert_eq!(c.missing_for("EN").len(), MessageKey::ALL.len());
    }

    #[test]
    fn test_blank_entry_is_absent() {
        let mut c = MessageCatalog::empty();
        c.insert(MessageKey::ListingNoData, "EN", Expected::literal(""));
        assert_eq!(
            c.lookup(MessageKey::ListingNoData, "EN").unwrap_err(),
            LookupError::UnknownKey
        );
    }

    #[test]
    fn test_unsupported_language_lists_available() {
        let c = MessageCatalog::builtin();
        match c.lookup(MessageKey::ListingNoData, "PT") {
            Err(LookupError::UnsupportedLanguage { available }) => {
                assert_eq!(available, vec!["IT".to_owned()])
            }
            other => panic!("unexpected lookup result: {other:?}"),
        }
    }

    #[test]
    fn test_pattern_is_case_insensitive() {
        let e = Expected::pattern(r"tabella IFLO\s+\d+\s+hit").unwrap();
        assert_eq!(
            e.find("Data Browser: Tabella iflo   42 HIT"),
            Some("Tabella iflo   42 HIT")
        );
        assert_eq!(e.find("Data Browser: tabella IFLO"), None);
    }

    #[test]
    fn test_literal_is_substring() {
        let e = Expected::literal("lista sedi");
        assert_eq!(e.find("Visualizzare sede tecnica: lista sedi tecniche"), Some("lista sedi"));
        assert_eq!(e.find("LISTA SEDI"), None);
    }

    #[test]
    fn test_overrides_from_toml() {
        #[derive(Deserialize)]
        struct Doc {
            catalog: HashMap<MessageKey, HashMap<String, EntrySpec>>,
        }
        let doc: Doc = toml::from_str(
            r#"
            [catalog.listing_no_data]
            EN = "No objects were selected"
            [catalog.browse_data_result]
            en = { pattern = 'Data Browser: Table IFLO\s+\d+\s+Hits' }
            "#,
        )
        .unwrap();
        let mut c = MessageCatalog::builtin();
        c.apply_overrides(&doc.catalog).unwrap();
        assert!(c.lookup(MessageKey::ListingNoData, "EN").is_ok());
        assert!(matches!(
            c.lookup(MessageKey::BrowseDataResult, "EN"),
            Ok(Expected::Pattern(_))
        ));
    }
}
