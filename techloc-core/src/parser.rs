//! Clipboard report parser.
//!
//! The host's "copy list to clipboard" export produces a pipe-delimited
//! dump framed by decorative dash borders:
//!
//! ```text
//! 16.10.2026            Dynamic List Display                   1
//! ----------------------------------------------------------------
//! | Sede tecnica | Definizione        | L | L |
//! |--------------------------------------------|
//! | ESS-ESND     | Pompa alimento     | I | IT |
//! ----------------------------------------------------------------
//! ```
//!
//! [`parse_report`] turns such text into a [`ParsedTable`]: header names are
//! de-duplicated with `_<n>` suffixes and columns holding nothing but blanks
//! or null markers are dropped.

use std::collections::HashSet;

use serde::Deserialize;

use crate::errors::TechLocError;
use crate::table::ParsedTable;

/// Cell delimiter of the report dump.
pub const DELIMITER: char = '|';

/// Spellings treated as "no value" when deciding whether a column is empty.
pub const NULL_MARKERS: &[&str] = &["", "nan", "None", "NaN"];

/// How leading non-data lines are discarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    /// Keep only lines starting with the delimiter; decorative borders may
    /// appear anywhere.
    #[default]
    Robust,
    /// Skip the first two lines, then every line made only of dashes.
    /// Needs at least four lines.
    Legacy,
}

/// Parse a report dump into a table.
///
/// Fails with [`TechLocError::ParseError`] when the input is empty, holds no
/// delimited line, no column survives null-dropping, or no data row remains.
pub fn parse_report(text: &str, mode: ParseMode) -> Result<ParsedTable, TechLocError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(TechLocError::ParseError("no data".into()));
    }

    let lines = match mode {
        ParseMode::Robust => robust_lines(text)?,
        ParseMode::Legacy => legacy_lines(text)?,
    };

    let mut rows = lines.into_iter().map(split_cells);
    let header = rows
        .next()
        .ok_or_else(|| TechLocError::ParseError("no header line".into()))?;
    let columns = dedup_headers(&header);

    let mut body = Vec::new();
    for (i, mut cells) in rows.enumerate() {
        if cells.len() > columns.len() {
            return Err(TechLocError::ParseError(format!(
                "data line {} has {} cells, header has {}",
                i + 1,
                cells.len(),
                columns.len()
            )));
        }
        cells.resize(columns.len(), String::new());
        body.push(cells);
    }

    let table = drop_null_columns(columns, body)?;
    if table.is_empty() {
        return Err(TechLocError::ParseError("table has no data rows".into()));
    }

    log::info!(
        target: "parser",
        "parsed report: {} rows x {} columns {:?}",
        table.len(),
        table.columns().len(),
        table.columns()
    );
    Ok(table)
}

/// Lines beginning with the delimiter, minus pure border rows such as
/// `|-----|`.
fn robust_lines(text: &str) -> Result<Vec<&str>, TechLocError> {
    let delimited: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with(DELIMITER))
        .collect();
    if delimited.is_empty() {
        return Err(TechLocError::ParseError(format!(
            "no line starts with '{DELIMITER}'"
        )));
    }
    Ok(delimited.into_iter().filter(|l| !is_border(l)).collect())
}

fn legacy_lines(text: &str) -> Result<Vec<&str>, TechLocError> {
    let all: Vec<&str> = text.lines().collect();
    if all.len() <= 3 {
        return Err(TechLocError::ParseError(format!(
            "at least 4 lines required, found {}",
            all.len()
        )));
    }
    let kept: Vec<&str> = all[2..]
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty() && !l.chars().filter(|c| *c != ' ').all(|c| c == '-'))
        .collect();
    if !kept.iter().any(|l| l.contains(DELIMITER)) {
        return Err(TechLocError::ParseError(format!(
            "no line contains '{DELIMITER}'"
        )));
    }
    Ok(kept)
}

/// A frame line such as `|-----|`: only delimiters, dashes and blanks,
/// with at least one run of two dashes.  `| - | - |` is data.
fn is_border(line: &str) -> bool {
    line.contains("--")
        && line
            .chars()
            .all(|c| c == DELIMITER || c == '-' || c.is_whitespace())
}

fn split_cells(line: &str) -> Vec<String> {
    line.split(DELIMITER).map(|c| c.trim().to_owned()).collect()
}

/// Make header names unique: the n-th repetition of a name becomes
/// `name_n`; the first occurrence keeps the bare name.
///
/// Names present literally in `headers` are reserved, so a generated suffix
/// never collides with a later header such as `A_1`.
pub fn dedup_headers<S: AsRef<str>>(headers: &[S]) -> Vec<String> {
    let mut seen: Vec<(String, usize)> = Vec::new();
    let mut taken: HashSet<String> = headers
        .iter()
        .map(|h| h.as_ref().trim().to_owned())
        .collect();
    let mut out = Vec::with_capacity(headers.len());

    for header in headers {
        let name = header.as_ref().trim().to_owned();
        let unique = match seen.iter_mut().find(|(n, _)| *n == name) {
            None => {
                seen.push((name.clone(), 0));
                name
            }
            Some((_, count)) => loop {
                *count += 1;
                let candidate = format!("{name}_{count}");
                if !taken.contains(&candidate) {
                    break candidate;
                }
            },
        };
        taken.insert(unique.clone());
        out.push(unique);
    }

    let repeated: Vec<&str> = seen
        .iter()
        .filter(|(_, n)| *n > 0)
        .map(|(name, _)| name.as_str())
        .collect();
    if !repeated.is_empty() {
        log::debug!(target: "parser", "duplicate headers renamed with suffixes: {repeated:?}");
    }
    out
}

fn is_null_marker(cell: &str) -> bool {
    NULL_MARKERS.contains(&cell.trim())
}

fn drop_null_columns(
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
) -> Result<ParsedTable, TechLocError> {
    let keep: Vec<usize> = (0..columns.len())
        .filter(|&c| rows.iter().any(|r| !is_null_marker(&r[c])))
        .collect();
    if keep.is_empty() {
        return Err(TechLocError::ParseError(
            "no column contains valid data".into(),
        ));
    }

    let kept_columns = keep.iter().map(|&c| columns[c].clone()).collect();
    let kept_rows = rows
        .into_iter()
        .map(|r| keep.iter().map(|&c| r[c].clone()).collect())
        .collect();
    ParsedTable::new(kept_columns, kept_rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_four_line_block() {
        let t = parse_report("|A|B|\n|--|--|\n|1|2|\n|3|4|", ParseMode::Robust).unwrap();
        assert_eq!(t.columns(), ["A", "B"]);
        assert_eq!(t.rows(), [vec!["1", "2"], vec!["3", "4"]]);
    }

    #[test]
    fn test_decorated_sap_dump() {
        let dump = "16.10.2026   Dynamic List Display   1\n\
                    --------------------------------------------\n\
                    | Sede tecnica | Definizione     | L | L  |\n\
                    |------------------------------------------|\n\
                    | ESS-ESND     | Pompa alimento  | I | IT |\n\
                    --------------------------------------------\n\
                    | ESS-ESSW     | Valvola         | E | EN |\n\
                    --------------------------------------------\n";
        let t = parse_report(dump, ParseMode::Robust).unwrap();
        assert_eq!(t.columns(), ["Sede tecnica", "Definizione", "L", "L_1"]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.cell(1, "L_1"), Some("EN"));
    }

    #[test]
    fn test_legacy_mode_skips_two_lines() {
        let dump = "title line\n\
                    -----------\n\
                    |Code|Text|\n\
                    -----------\n\
                    |X1|one|\n\
                    |X2|two|";
        let t = parse_report(dump, ParseMode::Legacy).unwrap();
        assert_eq!(t.columns(), ["Code", "Text"]);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_legacy_mode_needs_four_lines() {
        assert!(parse_report("a\nb\n|A|", ParseMode::Legacy).is_err());
    }

    #[test]
    fn test_empty_input_fails() {
        assert!(parse_report("", ParseMode::Robust).is_err());
        assert!(parse_report("   \n  ", ParseMode::Robust).is_err());
    }

    #[test]
    fn test_no_delimited_line_fails() {
        let err = parse_report("just some\ntext here", ParseMode::Robust).unwrap_err();
        assert!(matches!(err, TechLocError::ParseError(_)));
    }

    #[test]
    fn test_header_only_fails() {
        assert!(parse_report("|A|B|\n|---|---|", ParseMode::Robust).is_err());
    }

    #[test]
    fn test_all_null_columns_fails() {
        assert!(parse_report("|A|B|\n|nan|None|\n| |NaN|", ParseMode::Robust).is_err());
    }

    #[test]
    fn test_longer_row_fails() {
        assert!(parse_report("|A|\n|1|2|3|", ParseMode::Robust).is_err());
    }

    #[test]
    fn test_dedup_headers_basic() {
        assert_eq!(
            dedup_headers(&["L", "Code", "L", "L"]),
            vec!["L", "Code", "L_1", "L_2"]
        );
    }

    #[test]
    fn test_dedup_headers_avoids_existing_suffix() {
        assert_eq!(dedup_headers(&["A", "A_1", "A"]), vec!["A", "A_1", "A_2"]);
    }

    #[test]
    fn test_dedup_headers_reserves_later_literal() {
        assert_eq!(dedup_headers(&["A", "A", "A_1"]), vec!["A", "A_2", "A_1"]);
        let t = parse_report("|A|A|A_1|\n|1|2|3|", ParseMode::Robust).unwrap();
        assert_eq!(t.columns(), ["A", "A_2", "A_1"]);
        assert_eq!(t.cell(0, "A_1"), Some("3"));
    }

    #[test]
    fn test_single_dash_cells_are_data() {
        let t = parse_report("|A|B|\n|---|---|\n| - | - |\n|1|2|", ParseMode::Robust).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.rows()[0], vec!["-", "-"]);
    }

    fn arb_name() -> impl Strategy<Value = String> {
        "[A-Z][a-z]{0,4}"
    }

    fn arb_cell() -> impl Strategy<Value = String> {
        prop_oneof![
            Just(String::new()),
            Just("nan".to_owned()),
            Just("None".to_owned()),
            Just("NaN".to_owned()),
            "[a-z0-9]{1,6}",
        ]
    }

    proptest! {
        #[test]
        fn prop_dedup_suffixes_in_order(name in arb_name(), k in 1usize..8, others in prop::collection::vec(arb_name(), 0..5)) {
            let mut headers: Vec<String> = others.into_iter().filter(|o| *o != name).collect();
            let mut positions = Vec::new();
            for i in 0..k {
                let at = (i * 3).min(headers.len());
                headers.insert(at, name.clone());
                positions.push(at);
            }
            let out = dedup_headers(&headers);
            let got: Vec<&String> = out.iter().filter(|h| h.starts_with(name.as_str()) && (h.as_str() == name || h[name.len()..].starts_with('_'))).collect();
            let mut expected = vec![name.clone()];
            expected.extend((1..k).map(|n| format!("{name}_{n}")));
            prop_assert_eq!(got.into_iter().cloned().collect::<Vec<_>>(), expected);
        }

        #[test]
        fn prop_dedup_output_unique(headers in prop::collection::vec("[AB](_[12])?", 0..10)) {
            let out = dedup_headers(&headers);
            prop_assert_eq!(out.len(), headers.len());
            let distinct: HashSet<&String> = out.iter().collect();
            prop_assert_eq!(distinct.len(), out.len());
            for (i, h) in headers.iter().enumerate() {
                if !headers[..i].contains(h) {
                    prop_assert_eq!(&out[i], h);
                }
            }
        }

        #[test]
        fn prop_null_columns_dropped(
            rows in prop::collection::vec(prop::collection::vec(arb_cell(), 3), 1..6)
        ) {
            let mut text = String::from("|C0|C1|C2|\n");
            for r in &rows {
                text.push_str(&format!("|{}|{}|{}|\n", r[0], r[1], r[2]));
            }
            let live: Vec<usize> = (0..3)
                .filter(|&c| rows.iter().any(|r| !NULL_MARKERS.contains(&r[c].as_str())))
                .collect();
            match parse_report(&text, ParseMode::Robust) {
                Ok(t) => {
                    let names: Vec<String> = live.iter().map(|c| format!("C{c}")).collect();
                    prop_assert_eq!(t.columns(), names.as_slice());
                    for &c in &live {
                        let col = t.column_values(&format!("C{c}")).unwrap();
                        let orig: Vec<&str> = rows.iter().map(|r| r[c].as_str()).collect();
                        prop_assert_eq!(col, orig);
                    }
                }
                Err(_) => prop_assert!(live.is_empty()),
            }
        }
    }
}
