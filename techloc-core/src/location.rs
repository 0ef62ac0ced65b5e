//! Technical-location codes, input-batch validation and result records.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::errors::TechLocError;
use crate::host::MessageType;

/// Segment separator of a technical-location code.
pub const SEGMENT_SEPARATOR: char = '-';

/// Wildcard accepted by the listing transaction.
pub const WILDCARD: char = '*';

// ---------------------------------------------------------------------------
// Masks
// ---------------------------------------------------------------------------

/// Pattern class of one input line, deciding which extraction route it takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LocationCodeMask {
    /// `AAA[-BBBB[-CC[-DD(D)[-EE(E)[-FF]]]]]`, no wildcard.  Read directly.
    FullySpecified,
    /// `AAA-BBBB` followed by up to 13 characters containing `*`.  Expanded
    /// through the listing workflow first.
    WildcardPrefixed,
}

fn fully_specified_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:[A-Z0-9]{3}(?:-[A-Z0-9]{4}(?:-[A-Z0-9]{2}(?:-[A-Z0-9]{2,3}(?:-[A-Z0-9]{2,3}(?:-[A-Z0-9]{2})?)?)?)?)?)?$",
        )
        .expect("static regex")
    })
}

fn wildcard_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:[A-Z0-9]{3}(?:-[A-Z0-9]{4}(?:[A-Z0-9*\-]{1,13}))?)?$").expect("static regex")
    })
}

impl LocationCodeMask {
    /// Classify one trimmed, non-blank line.  `None` when no mask matches.
    ///
    /// The wildcard flag decides which mask is tried, so a line can never
    /// match both.
    pub fn classify(line: &str) -> Option<Self> {
        if line.is_empty() {
            return None;
        }
        if line.contains(WILDCARD) {
            wildcard_re()
                .is_match(line)
                .then_some(Self::WildcardPrefixed)
        } else {
            fully_specified_re()
                .is_match(line)
                .then_some(Self::FullySpecified)
        }
    }
}

impl fmt::Display for LocationCodeMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FullySpecified => f.write_str("Mask_gen"),
            Self::WildcardPrefixed => f.write_str("Mask_star"),
        }
    }
}

/// A validated input batch, split by route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InputBatch {
    /// Fully specified codes in input order.
    pub exact: Vec<String>,
    /// Wildcard patterns in input order, de-duplicated.
    pub wildcard: Vec<String>,
}

impl InputBatch {
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.wildcard.is_empty()
    }
}

/// Validate pasted input text line by line.
///
/// Every non-blank line must match exactly one mask; otherwise the whole
/// batch is rejected with one message per offending line (1-based numbers
/// counted over non-blank lines).
pub fn validate_batch(text: &str) -> Result<InputBatch, TechLocError> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    if lines.is_empty() {
        return Err(TechLocError::ValidationError(
            "no technical location codes in input".into(),
        ));
    }

    let mut batch = InputBatch::default();
    let mut errors = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        match LocationCodeMask::classify(line) {
            Some(LocationCodeMask::FullySpecified) => batch.exact.push((*line).to_owned()),
            Some(LocationCodeMask::WildcardPrefixed) => {
                if !batch.wildcard.iter().any(|w| w == line) {
                    batch.wildcard.push((*line).to_owned());
                }
            }
            None => errors.push(format!("line {}: '{line}' does not match any mask", i + 1)),
        }
    }

    if !errors.is_empty() {
        return Err(TechLocError::ValidationError(errors.join("; ")));
    }

    log::info!(
        target: "location",
        "input validated: {} exact, {} wildcard",
        batch.exact.len(),
        batch.wildcard.len()
    );
    Ok(batch)
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Read-back classification fields of a technical location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub category: String,
    pub component: String,
    pub section: String,
    pub object_type: String,
    pub catalog_profile: String,
}

/// Tri-state outcome marker taken from the status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Success,
    Warning,
    Error,
}

impl Outcome {
    /// Info and abort indicators fold into warning and error respectively.
    pub fn from_indicator(indicator: MessageType) -> Self {
        match indicator {
            MessageType::Success => Self::Success,
            MessageType::Warning | MessageType::Info => Self::Warning,
            MessageType::Error | MessageType::Abort => Self::Error,
        }
    }
}

/// One technical location as it moves through extraction and update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TechnicalLocationRecord {
    pub code: String,
    pub description: String,
    /// Values read before the update (from the bulk read).
    pub current: Option<Classification>,
    /// Values read back after the description change.
    pub updated: Option<Classification>,
    /// Raw indicator code (`S`, `W`, `E`, ...) of the last host action.
    pub indicator: String,
    pub message: String,
}

impl TechnicalLocationRecord {
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn outcome(&self) -> Option<Outcome> {
        MessageType::from_code(&self.indicator).map(Outcome::from_indicator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_fully_specified() {
        for code in ["ESS", "ESS-ESND", "ESS-ESSW-52", "ESS-ESSW-52-AB1-XY-01"] {
            assert_eq!(
                LocationCodeMask::classify(code),
                Some(LocationCodeMask::FullySpecified),
                "{code}"
            );
        }
    }

    #[test]
    fn test_classify_wildcard() {
        assert_eq!(
            LocationCodeMask::classify("ESS-ESND*"),
            Some(LocationCodeMask::WildcardPrefixed)
        );
        assert_eq!(
            LocationCodeMask::classify("ESS-ESSW-5*"),
            Some(LocationCodeMask::WildcardPrefixed)
        );
    }

    #[test]
    fn test_classify_rejects() {
        assert_eq!(LocationCodeMask::classify("ess-esnd"), None);
        assert_eq!(LocationCodeMask::classify("ESS-ES"), None);
        assert_eq!(LocationCodeMask::classify("E*"), None);
        assert_eq!(LocationCodeMask::classify("ESS-ESND-1"), None);
    }

    #[test]
    fn test_validate_batch_routes_and_dedups() {
        let batch = validate_batch("ESS-ESND\n\n  ESS-ESSW-52*\nESS-ESSW-52*\nESS-AAAA\n").unwrap();
        assert_eq!(batch.exact, vec!["ESS-ESND", "ESS-AAAA"]);
        assert_eq!(batch.wildcard, vec!["ESS-ESSW-52*"]);
    }

    #[test]
    fn test_validate_batch_rejects_whole_batch() {
        let err = validate_batch("ESS-ESND\nbad line\nESS-ESSW*\nxx").unwrap_err();
        match err {
            TechLocError::ValidationError(msg) => {
                assert!(msg.contains("line 2"));
                assert!(msg.contains("line 4"));
                assert!(!msg.contains("line 1"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_batch_empty() {
        assert!(validate_batch("  \n\n").is_err());
    }

    #[test]
    fn test_record_outcome() {
        let mut rec = TechnicalLocationRecord::new("ESS-ESND", "Pump");
        assert_eq!(rec.outcome(), None);
        rec.indicator = "W".into();
        assert_eq!(rec.outcome(), Some(Outcome::Warning));
        rec.indicator = "A".into();
        assert_eq!(rec.outcome(), Some(Outcome::Error));
    }
}
