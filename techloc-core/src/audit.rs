//! Post-update audit: which classification fields changed, and how the
//! update outcomes are distributed.

use serde::Serialize;

use crate::errors::TechLocError;
use crate::headers;
use crate::table::ParsedTable;

/// `Modified_Fields` text of a saved row with nothing changed.
pub const NO_CHANGES: &str = "Nessuna modifica";
/// `Modified_Fields` text of a row that was not saved.
pub const NOT_PROCESSED: &str = "Non elaborata (Result≠S)";

/// Compare every `N_<field>` column against `<field>` on saved rows and fill
/// the `Check` and `Modified_Fields` columns.
///
/// A row counts as saved when its `Result` contains `S`.  Returns the
/// number of rows with at least one changed field.
pub fn mark_modifications(table: &mut ParsedTable) -> Result<usize, TechLocError> {
    let results = owned_column(table, headers::RESULT)?;
    let pairs = headers::CLASSIFICATION
        .iter()
        .map(|field| {
            Ok((
                *field,
                owned_column(table, field)?,
                owned_column(table, &headers::updated(field))?,
            ))
        })
        .collect::<Result<Vec<_>, TechLocError>>()?;

    let mut checks = Vec::with_capacity(table.len());
    let mut notes = Vec::with_capacity(table.len());
    let mut changed_rows = 0;

    for (row, result) in results.iter().enumerate() {
        if !result.contains('S') {
            checks.push("0".to_owned());
            notes.push(NOT_PROCESSED.to_owned());
            continue;
        }
        let changes: Vec<String> = pairs
            .iter()
            .filter_map(|(field, old, new)| {
                let (old, new) = (old[row].trim(), new[row].trim());
                (old != new).then(|| format!("{field}: '{old}' → '{new}'"))
            })
            .collect();
        if changes.is_empty() {
            checks.push("0".to_owned());
            notes.push(NO_CHANGES.to_owned());
        } else {
            changed_rows += 1;
            checks.push("1".to_owned());
            notes.push(changes.join("; "));
        }
    }

    table.set_column(headers::CHECK, checks)?;
    table.set_column(headers::MODIFIED_FIELDS, notes)?;
    log::info!(
        target: "audit",
        "{} rows, {} saved, {changed_rows} with changed classification",
        table.len(),
        results.iter().filter(|r| r.contains('S')).count()
    );
    Ok(changed_rows)
}

fn owned_column(table: &ParsedTable, name: &str) -> Result<Vec<String>, TechLocError> {
    table
        .column_values(name)
        .map(|v| v.into_iter().map(str::to_owned).collect())
        .ok_or_else(|| TechLocError::ValidationError(format!("audit needs column '{name}'")))
}

/// Frequency of one `Result` value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeCount {
    pub value: String,
    pub count: usize,
    /// Share of all non-blank results, 0-100.
    pub percent: f64,
}

/// Count each distinct non-blank `Result` value, most frequent first.
///
/// Empty when the column holds no value.
pub fn outcome_stats(table: &ParsedTable) -> Result<Vec<OutcomeCount>, TechLocError> {
    let results = table.column_values(headers::RESULT).ok_or_else(|| {
        TechLocError::ValidationError(format!("no '{}' column", headers::RESULT))
    })?;

    let mut counts: Vec<(String, usize)> = Vec::new();
    for value in results.iter().map(|v| v.trim()).filter(|v| !v.is_empty()) {
        match counts.iter_mut().find(|(v, _)| v == value) {
            Some((_, n)) => *n += 1,
            None => counts.push((value.to_owned(), 1)),
        }
    }
    let total: usize = counts.iter().map(|(_, n)| n).sum();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let stats: Vec<OutcomeCount> = counts
        .into_iter()
        .map(|(value, count)| OutcomeCount {
            percent: count as f64 * 100.0 / total as f64,
            value,
            count,
        })
        .collect();
    for s in &stats {
        log::info!(target: "audit", "result '{}': {:>4} ({:>5.1}%)", s.value, s.count, s.percent);
    }
    if stats.is_empty() {
        log::warn!(target: "audit", "no result values to analyse");
    }
    Ok(stats)
}
