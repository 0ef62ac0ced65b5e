//! Row-major string table produced by the clipboard parser and accumulated
//! by the workflows.

use serde::Serialize;

use crate::errors::TechLocError;

/// Ordered, uniquely named columns and rows of string cells.
///
/// Every row has exactly `columns.len()` cells.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl ParsedTable {
    /// Build a table, checking unique column names and row width.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self, TechLocError> {
        for (i, name) in columns.iter().enumerate() {
            if columns[..i].contains(name) {
                return Err(TechLocError::ParseError(format!(
                    "duplicate column name '{name}'"
                )));
            }
        }
        if let Some((i, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != columns.len())
        {
            return Err(TechLocError::ParseError(format!(
                "row {i} has {} cells, header has {}",
                row.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    /// Single-column table.
    pub fn from_column(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            columns: vec![name.into()],
            rows: values.into_iter().map(|v| vec![v]).collect(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| r[idx].as_str())
    }

    /// All values of one column, in row order.
    pub fn column_values(&self, column: &str) -> Option<Vec<&str>> {
        let idx = self.column_index(column)?;
        Some(self.rows.iter().map(|r| r[idx].as_str()).collect())
    }

    /// Values of the column at position `index`.
    pub fn column_values_at(&self, index: usize) -> Option<Vec<&str>> {
        if index >= self.columns.len() {
            return None;
        }
        Some(self.rows.iter().map(|r| r[index].as_str()).collect())
    }

    /// Append a column, or overwrite it when the name already exists.
    pub fn set_column(&mut self, name: &str, values: Vec<String>) -> Result<(), TechLocError> {
        if values.len() != self.rows.len() {
            return Err(TechLocError::ParseError(format!(
                "column '{name}' has {} values for {} rows",
                values.len(),
                self.rows.len()
            )));
        }
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.columns.push(name.to_owned());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(())
    }

    /// Replace every column name.
    ///
    /// Fails when the count differs, a name is blank, or names repeat; the
    /// table is left untouched on failure.
    pub fn rename_columns<S: AsRef<str>>(&mut self, names: &[S]) -> Result<(), TechLocError> {
        if names.len() != self.columns.len() {
            return Err(TechLocError::ValidationError(format!(
                "column count mismatch: table has {} columns {:?}, {} names given",
                self.columns.len(),
                self.columns,
                names.len()
            )));
        }
        let names: Vec<String> = names.iter().map(|n| n.as_ref().to_owned()).collect();
        if let Some(blank) = names.iter().position(|n| n.trim().is_empty()) {
            return Err(TechLocError::ValidationError(format!(
                "column name {blank} is blank"
            )));
        }
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(TechLocError::ValidationError(format!(
                    "duplicate column name '{name}'"
                )));
            }
        }
        for (old, new) in self.columns.iter().zip(&names) {
            log::debug!(target: "table", "rename column '{old}' -> '{new}'");
        }
        self.columns = names;
        Ok(())
    }

    /// Rebuild the table with one column per `(source, target)` pair, in
    /// pair order and named `target`.
    ///
    /// A source column the table lacks comes back blank.  A table column no
    /// pair names is a [`TechLocError::ValidationError`].
    pub fn remap_columns(&self, mapping: &[(&str, &str)]) -> Result<ParsedTable, TechLocError> {
        if let Some(unknown) = self
            .columns
            .iter()
            .find(|c| !mapping.iter().any(|(source, _)| source == c))
        {
            return Err(TechLocError::ValidationError(format!(
                "unexpected column '{unknown}' (columns: {:?})",
                self.columns
            )));
        }

        let mut rows = vec![Vec::with_capacity(mapping.len()); self.rows.len()];
        for (source, _) in mapping {
            match self.column_index(source) {
                Some(idx) => {
                    for (out, row) in rows.iter_mut().zip(&self.rows) {
                        out.push(row[idx].clone());
                    }
                }
                None => {
                    log::debug!(target: "table", "column '{source}' absent, filled blank");
                    for out in &mut rows {
                        out.push(String::new());
                    }
                }
            }
        }
        let mut table = ParsedTable {
            columns: mapping.iter().map(|(source, _)| (*source).to_owned()).collect(),
            rows,
        };
        let targets: Vec<&str> = mapping.iter().map(|(_, target)| *target).collect();
        table.rename_columns(&targets)?;
        Ok(table)
    }

    /// Append the rows of `other`, which must have the same columns.
    pub fn append(&mut self, other: ParsedTable) -> Result<(), TechLocError> {
        if self.columns.is_empty() && self.rows.is_empty() {
            *self = other;
            return Ok(());
        }
        if self.columns != other.columns {
            return Err(TechLocError::ParseError(format!(
                "cannot append table with columns {:?} to {:?}",
                other.columns, self.columns
            )));
        }
        self.rows.extend(other.rows);
        Ok(())
    }

    /// Rows whose `column` equals `value`, ignoring ASCII case.
    ///
    /// `None` when the column is missing or nothing matches.
    pub fn filter_eq_ignore_case(&self, column: &str, value: &str) -> Option<ParsedTable> {
        let idx = self.column_index(column)?;
        let rows: Vec<Vec<String>> = self
            .rows
            .iter()
            .filter(|r| r[idx].trim().eq_ignore_ascii_case(value.trim()))
            .cloned()
            .collect();
        if rows.is_empty() {
            return None;
        }
        Some(ParsedTable {
            columns: self.columns.clone(),
            rows,
        })
    }

    /// Split into consecutive tables of at most `size` rows, in row order.
    pub fn chunks(&self, size: usize) -> Vec<ParsedTable> {
        self.rows
            .chunks(size.max(1))
            .map(|rows| ParsedTable {
                columns: self.columns.clone(),
                rows: rows.to_vec(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ParsedTable {
        ParsedTable::new(
            vec!["Code".into(), "L_1".into()],
            vec![
                vec!["ESS-ESND".into(), "IT".into()],
                vec!["ESS-ESSW".into(), "en".into()],
                vec!["ESS-AAAA".into(), "it".into()],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_ragged_rows() {
        let err = ParsedTable::new(vec!["A".into()], vec![vec!["1".into(), "2".into()]]);
        assert!(err.is_err());
    }

    #[test]
    fn test_new_rejects_duplicate_columns() {
        assert!(ParsedTable::new(vec!["A".into(), "A".into()], vec![]).is_err());
    }

    #[test]
    fn test_filter_case_insensitive() {
        let t = sample();
        let it = t.filter_eq_ignore_case("L_1", "It").unwrap();
        assert_eq!(it.len(), 2);
        assert_eq!(it.cell(1, "Code"), Some("ESS-AAAA"));
    }

    #[test]
    fn test_filter_no_match_leaves_source() {
        let t = sample();
        let before = t.clone();
        assert!(t.filter_eq_ignore_case("L_1", "PT").is_none());
        assert!(t.filter_eq_ignore_case("Missing", "IT").is_none());
        assert_eq!(t, before);
    }

    #[test]
    fn test_rename_columns_checks() {
        let mut t = sample();
        assert!(t.rename_columns(&["Only one"]).is_err());
        assert!(t.rename_columns(&["X", "X"]).is_err());
        assert!(t.rename_columns(&["X", " "]).is_err());
        assert_eq!(t.columns(), ["Code", "L_1"]);
        t.rename_columns(&["Sede tecnica", "Lingua"]).unwrap();
        assert_eq!(t.columns(), ["Sede tecnica", "Lingua"]);
    }

    #[test]
    fn test_remap_refills_dropped_column() {
        let t = ParsedTable::new(
            vec!["Code".into(), "Lang".into()],
            vec![vec!["ESS-ESND".into(), "IT".into()]],
        )
        .unwrap();
        let out = t
            .remap_columns(&[("Code", "Sede tecnica"), ("Profile", "Prof.cat."), ("Lang", "L_1")])
            .unwrap();
        assert_eq!(out.columns(), ["Sede tecnica", "Prof.cat.", "L_1"]);
        assert_eq!(out.rows(), [vec!["ESS-ESND", "", "IT"]]);
        assert!(t.remap_columns(&[("Code", "Sede tecnica")]).is_err());
    }

    #[test]
    fn test_append_and_set_column() {
        let mut t = ParsedTable::default();
        t.append(sample()).unwrap();
        t.append(sample()).unwrap();
        assert_eq!(t.len(), 6);
        t.set_column("Result", vec!["S".into(); 6]).unwrap();
        assert_eq!(t.cell(5, "Result"), Some("S"));
        assert!(t.set_column("Bad", vec![]).is_err());
        assert!(t.append(ParsedTable::from_column("Other", vec![])).is_err());
    }

    #[test]
    fn test_chunks_keep_order() {
        let t = sample();
        let parts = t.chunks(2);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].len(), 2);
        assert_eq!(parts[1].cell(0, "Code"), Some("ESS-AAAA"));
        assert_eq!(t.chunks(0).len(), 3);
        assert!(ParsedTable::default().chunks(4).is_empty());
    }
}
