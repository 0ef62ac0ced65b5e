//! Result workbooks.
//!
//! Each artifact is an `.xlsx` file named `<prefix>_YYYYMMDD_HHMMSS.xlsx`
//! (local time) with one worksheet per table, a bold header row and no
//! index column.  An existing file of the same name is overwritten.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use rust_xlsxwriter::{Format, Workbook, XlsxError};

use crate::errors::TechLocError;
use crate::table::ParsedTable;

/// Prefix of the bulk-read workbook.
pub const EXTRACTED_PREFIX: &str = "FL_estratte";
/// Prefix of the bulk-update workbook.
pub const UPDATED_PREFIX: &str = "FL_aggiornate";
/// Sheet name used by [`export_table`].
pub const DEFAULT_SHEET: &str = "Sheet1";

impl From<XlsxError> for TechLocError {
    fn from(err: XlsxError) -> Self {
        TechLocError::ExportError(err.to_string())
    }
}

/// `<prefix>_YYYYMMDD_HHMMSS.xlsx`
pub fn artifact_name(prefix: &str, at: DateTime<Local>) -> String {
    format!("{prefix}_{}.xlsx", at.format("%Y%m%d_%H%M%S"))
}

/// Write `table` to a new timestamped workbook in `dir`, creating the
/// directory when needed.  Returns the file path.
pub fn export_table(dir: &Path, prefix: &str, table: &ParsedTable) -> Result<PathBuf, TechLocError> {
    let path = dir.join(artifact_name(prefix, Local::now()));
    write_workbook(&path, &[(DEFAULT_SHEET, table)])?;
    Ok(path)
}

/// Write one worksheet per `(name, table)` to `path`.
///
/// Refuses to write when there is no sheet or any table has no rows.
pub fn write_workbook(path: &Path, sheets: &[(&str, &ParsedTable)]) -> Result<(), TechLocError> {
    if sheets.is_empty() {
        return Err(TechLocError::ExportError("no sheet to write".into()));
    }
    if let Some((name, _)) = sheets.iter().find(|(_, t)| t.is_empty()) {
        log::error!(target: "export", "sheet {name} is empty, {} not written", path.display());
        return Err(TechLocError::ExportError(format!(
            "sheet {name} has no rows, {} not written",
            path.display()
        )));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            TechLocError::ExportError(format!("cannot create {}: {e}", parent.display()))
        })?;
    }

    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    for (name, table) in sheets {
        let sheet = workbook.add_worksheet();
        sheet.set_name(*name)?;
        for (col, title) in table.columns().iter().enumerate() {
            sheet.write_string_with_format(0, column_index(col)?, title, &header)?;
        }
        for (row, cells) in table.rows().iter().enumerate() {
            let row = u32::try_from(row + 1)
                .map_err(|_| TechLocError::ExportError("too many rows".into()))?;
            for (col, value) in cells.iter().enumerate() {
                if !value.is_empty() {
                    sheet.write_string(row, column_index(col)?, value)?;
                }
            }
        }
        sheet.autofit();
    }
    workbook.save(path)?;

    log::info!(
        target: "export",
        "ok: wrote {} ({} sheets, {} rows)",
        path.display(),
        sheets.len(),
        sheets.iter().map(|(_, t)| t.len()).sum::<usize>()
    );
    Ok(())
}

fn column_index(col: usize) -> Result<u16, TechLocError> {
    u16::try_from(col).map_err(|_| TechLocError::ExportError("too many columns".into()))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn sample() -> ParsedTable {
        ParsedTable::new(
            vec!["Sede tecnica".into(), "Result".into()],
            vec![
                vec!["ESS-ESND".into(), "S".into()],
                vec!["ESS-ESSW".into(), "".into()],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_artifact_name() {
        let at = Local.with_ymd_and_hms(2026, 10, 16, 9, 5, 7).single().unwrap();
        assert_eq!(artifact_name("FL_estratte", at), "FL_estratte_20261016_090507.xlsx");
    }

    #[test]
    fn test_export_creates_directory_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("out");
        let path = export_table(&out, UPDATED_PREFIX, &sample()).unwrap();
        assert!(path.starts_with(&out));
        assert!(path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("FL_aggiornate_") && n.ends_with(".xlsx")));
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn test_rerun_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixed.xlsx");
        let t = sample();
        write_workbook(&path, &[("A", &t)]).unwrap();
        write_workbook(&path, &[("A", &t), ("B", &t)]).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_empty_table_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.xlsx");
        let empty = ParsedTable::new(vec!["A".into()], vec![]).unwrap();
        let err = write_workbook(&path, &[("A", &empty)]).unwrap_err();
        assert!(matches!(err, TechLocError::ExportError(_)));
        assert!(!path.exists());
    }
}
