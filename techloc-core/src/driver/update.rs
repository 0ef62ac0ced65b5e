//! Bulk update (`IL02`): re-enter each description, read back the derived
//! classification and save.

use serde::Serialize;

use super::TransactionDriver;
use crate::errors::TechLocError;
use crate::headers;
use crate::host::{HostSession, MessageType};
use crate::location::{Classification, TechnicalLocationRecord};
use crate::screens::{ChangeEntry, ChangeMaster, Frame};
use crate::table::ParsedTable;

/// Message stored on rows not reached before an interrupt.
pub const CANCELLED_MESSAGE: &str = "Cancelled";

/// Input rows with per-row outcome columns appended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    /// Input columns followed by `N_<field>`, `Result` and `Message`.
    pub table: ParsedTable,
    /// Rows whose final indicator was success.
    pub succeeded: usize,
    pub failed: usize,
}

impl UpdateReport {
    /// Report for rows that never reached the host, each carrying `message`.
    pub fn unprocessed(input: &ParsedTable, message: &str) -> Result<Self, TechLocError> {
        let codes = required_column(input, headers::CODE)?;
        let descriptions = required_column(input, headers::DESCRIPTION)?;
        let records: Vec<TechnicalLocationRecord> = codes
            .iter()
            .zip(&descriptions)
            .map(|(code, description)| {
                let mut record = TechnicalLocationRecord::new(*code, *description);
                record.message = message.to_owned();
                record
            })
            .collect();
        build_report(input, &records)
    }

    /// Append the rows of a report produced for a later chunk of the input.
    pub fn append(&mut self, other: UpdateReport) -> Result<(), TechLocError> {
        self.table.append(other.table)?;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        Ok(())
    }
}

impl<'a, S: HostSession> TransactionDriver<'a, S> {
    /// Update every row of `input` independently.
    ///
    /// `input` needs the code and description columns.  The report always
    /// has one row per input row; a failing row records its indicator and
    /// message and the batch moves on.  `Err` is returned only when the
    /// input itself is unusable.
    pub fn update_locations(&self, input: &ParsedTable) -> Result<UpdateReport, TechLocError> {
        let codes = required_column(input, headers::CODE)?;
        let descriptions = required_column(input, headers::DESCRIPTION)?;
        log::info!(target: "driver", "bulk update of {} rows", input.len());

        let mut records = Vec::with_capacity(input.len());
        for (code, description) in codes.iter().zip(&descriptions) {
            let record = if self.ctx.cancel.is_cancelled() {
                let mut record = TechnicalLocationRecord::new(*code, *description);
                record.message = CANCELLED_MESSAGE.to_owned();
                record
            } else {
                self.update_row(code.trim(), description.trim())
            };
            records.push(record);
        }

        let report = build_report(input, &records)?;
        log::info!(
            target: "driver",
            "bulk update done: {} succeeded, {} failed",
            report.succeeded,
            report.failed
        );
        Ok(report)
    }

    fn update_row(&self, code: &str, description: &str) -> TechnicalLocationRecord {
        let mut record = TechnicalLocationRecord::new(code, description);
        match self.try_update_row(&mut record) {
            Ok(()) => {
                if record.indicator == MessageType::Success.code() {
                    log::info!(target: "driver", "ok: {code} saved: {}", record.message);
                } else {
                    log::warn!(
                        target: "driver",
                        "{code} not saved ({}): {}",
                        record.indicator,
                        record.message
                    );
                }
            }
            Err(e) => {
                log::error!(target: "driver", "{code} failed: {e}");
                record.indicator = MessageType::Error.code().to_owned();
                record.message = e.to_string();
                self.reset_ui();
            }
        }
        record
    }

    /// Fill `record` from one pass over the change transaction.  `Ok` means
    /// the row was handled, whatever its indicator.
    fn try_update_row(&self, record: &mut TechnicalLocationRecord) -> Result<(), TechLocError> {
        let master = self.open_master(&record.code)?;
        if self.capture_failure(record) {
            return Ok(());
        }

        master.set_description(&record.description)?;
        self.settle();
        if self.capture_failure(record) {
            return Ok(());
        }

        record.updated = Some(master.classification()?);
        master.save()?;
        self.settle();
        self.capture_status(record)
    }

    fn open_master(&self, code: &str) -> Result<ChangeMaster<'a, S>, TechLocError> {
        let entry = ChangeEntry::open(self.session)?;
        self.short_settle();
        let master = entry.open_record(code)?;
        self.settle();
        Ok(master)
    }

    /// Store a non-blank, non-success indicator on `record`.  Returns whether
    /// one was found.
    fn capture_failure(&self, record: &mut TechnicalLocationRecord) -> bool {
        let frame = Frame::new(self.session);
        match frame.status_indicator() {
            Ok(Some(indicator)) if !indicator.is_success() => {
                record.indicator = indicator.code().to_owned();
                record.message = frame.status_text().unwrap_or_default().trim().to_owned();
                true
            }
            Ok(_) => false,
            Err(e) => {
                log::debug!(target: "driver", "status indicator unreadable: {e}");
                false
            }
        }
    }

    fn capture_status(&self, record: &mut TechnicalLocationRecord) -> Result<(), TechLocError> {
        let frame = Frame::new(self.session);
        record.indicator = frame
            .status_indicator()?
            .map(|t| t.code().to_owned())
            .unwrap_or_default();
        record.message = frame.status_text()?.trim().to_owned();
        Ok(())
    }

    /// Change one description and save.  Succeeds only when the host
    /// confirms the save with a success indicator; returns its message.
    pub fn modify_location(&self, code: &str, description: &str) -> Result<String, TechLocError> {
        self.guarded("modify", || {
            self.ctx.cancel.check()?;
            let mut record = TechnicalLocationRecord::new(code, description);
            let master = self.open_master(code)?;
            if self.capture_failure(&mut record) {
                return Err(TechLocError::SaveError(format!("{code}: {}", record.message)));
            }
            master.set_description(description)?;
            self.settle();
            master.save()?;
            self.settle();
            self.capture_status(&mut record)?;
            if record.indicator == MessageType::Success.code() {
                log::info!(target: "driver", "ok: {code} modified: {}", record.message);
                Ok(record.message)
            } else {
                Err(TechLocError::SaveError(format!(
                    "{code}: indicator '{}': {}",
                    record.indicator, record.message
                )))
            }
        })
    }
}

fn required_column<'t>(table: &'t ParsedTable, name: &str) -> Result<Vec<&'t str>, TechLocError> {
    table.column_values(name).ok_or_else(|| {
        TechLocError::ValidationError(format!(
            "update input has no '{name}' column (columns: {:?})",
            table.columns()
        ))
    })
}

fn build_report(
    input: &ParsedTable,
    records: &[TechnicalLocationRecord],
) -> Result<UpdateReport, TechLocError> {
    let mut table = input.clone();
    let columns: [(&str, Vec<String>); 5] = [
        (headers::CLASSIFICATION[0], updated_values(records, |c| c.category.as_str())),
        (headers::CLASSIFICATION[1], updated_values(records, |c| c.component.as_str())),
        (headers::CLASSIFICATION[2], updated_values(records, |c| c.section.as_str())),
        (headers::CLASSIFICATION[3], updated_values(records, |c| c.object_type.as_str())),
        (headers::CLASSIFICATION[4], updated_values(records, |c| c.catalog_profile.as_str())),
    ];
    for (name, values) in columns {
        table.set_column(&headers::updated(name), values)?;
    }
    table.set_column(
        headers::RESULT,
        records.iter().map(|r| r.indicator.clone()).collect(),
    )?;
    table.set_column(
        headers::MESSAGE,
        records.iter().map(|r| r.message.clone()).collect(),
    )?;

    let succeeded = records
        .iter()
        .filter(|r| r.indicator == MessageType::Success.code())
        .count();
    Ok(UpdateReport {
        table,
        succeeded,
        failed: records.len() - succeeded,
    })
}

/// One read-back field per record; blank where nothing was read.
fn updated_values(
    records: &[TechnicalLocationRecord],
    get: impl Fn(&Classification) -> &str,
) -> Vec<String> {
    records
        .iter()
        .map(|r| r.updated.as_ref().map(|c| get(c).to_owned()).unwrap_or_default())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::test_support::context;
    use super::*;
    use crate::host::ScriptingHost;
    use crate::testing::{SimLocation, SimulatedHost};

    fn input(rows: &[(&str, &str)]) -> ParsedTable {
        ParsedTable::new(
            vec![headers::CODE.to_owned(), headers::DESCRIPTION.to_owned()],
            rows.iter()
                .map(|(c, d)| vec![(*c).to_owned(), (*d).to_owned()])
                .collect(),
        )
        .unwrap()
    }

    fn derived() -> Classification {
        Classification {
            category: "POMPA".into(),
            component: "MOT".into(),
            section: "A1".into(),
            object_type: "FL".into(),
            catalog_profile: "PROF2".into(),
        }
    }

    #[test]
    fn test_every_row_reported_independently() {
        let host = SimulatedHost::with_sessions(1);
        host.add_location(SimLocation::new("ESS-ESND", "Pompa").deriving(derived()));
        host.add_location(SimLocation::new("ESS-ESSW-52", "Valvola"));
        host.add_location(SimLocation::new("ESS-ESSW-53", "Serbatoio"));
        host.reject_description("ESS-ESSW-52", "Descrizione non ammessa");
        host.fail_save("ESS-ESSW-53");

        let ctx = context(&host);
        let session = host.open_session(0).unwrap();
        let report = TransactionDriver::new(&session, &ctx)
            .update_locations(&input(&[
                ("ESS-ESND", "Pompa"),
                ("ESS-ESSW-52", "Valvola"),
                ("ESS-XXXX", "Nessuna"),
                ("ESS-ESSW-53", "Serbatoio"),
            ]))
            .unwrap();

        let t = &report.table;
        assert_eq!(t.len(), 4);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 3);
        assert_eq!(t.column_values(headers::RESULT).unwrap(), vec!["S", "E", "E", "E"]);
        assert_eq!(t.cell(0, "N_Tipologia"), Some("POMPA"));
        assert_eq!(t.cell(0, "N_Prof.cat."), Some("PROF2"));
        assert_eq!(t.cell(1, headers::MESSAGE), Some("Descrizione non ammessa"));
        assert_eq!(t.cell(1, "N_Tipologia"), Some(""));
        assert!(t.cell(2, headers::MESSAGE).unwrap().contains("non esiste"));
        assert!(t.cell(3, headers::MESSAGE).unwrap().contains("bloccata"));
        assert_eq!(host.location("ESS-ESND").unwrap().classification, derived());
    }

    #[test]
    fn test_field_read_failure_skips_save() {
        let host = SimulatedHost::with_sessions(1);
        host.add_location(SimLocation::new("ESS-ESND", "Pompa"));
        host.fail_field_read("ESS-ESND");
        let ctx = context(&host);
        let session = host.open_session(0).unwrap();
        let report = TransactionDriver::new(&session, &ctx)
            .update_locations(&input(&[("ESS-ESND", "Pompa nuova")]))
            .unwrap();

        assert_eq!(report.table.cell(0, headers::RESULT), Some("E"));
        assert!(report
            .table
            .cell(0, headers::MESSAGE)
            .unwrap()
            .starts_with("FieldReadError"));
        assert_eq!(host.location("ESS-ESND").unwrap().description, "Pompa");
    }

    #[test]
    fn test_cancelled_rows_are_still_reported() {
        let host = SimulatedHost::with_sessions(1);
        host.add_location(SimLocation::new("ESS-ESND", "Pompa"));
        let ctx = context(&host);
        ctx.cancel.cancel();
        let session = host.open_session(0).unwrap();
        let report = TransactionDriver::new(&session, &ctx)
            .update_locations(&input(&[("ESS-ESND", "Pompa"), ("ESS-ESSW", "Valvola")]))
            .unwrap();
        assert_eq!(report.table.len(), 2);
        assert_eq!(
            report.table.column_values(headers::MESSAGE).unwrap(),
            vec![CANCELLED_MESSAGE, CANCELLED_MESSAGE]
        );
        assert!(host.command_log().is_empty());
    }

    #[test]
    fn test_missing_description_column() {
        let host = SimulatedHost::with_sessions(1);
        let ctx = context(&host);
        let session = host.open_session(0).unwrap();
        let table = ParsedTable::from_column(headers::CODE, vec!["ESS-ESND".into()]);
        let err = TransactionDriver::new(&session, &ctx)
            .update_locations(&table)
            .unwrap_err();
        assert!(matches!(err, TechLocError::ValidationError(_)));
    }

    #[test]
    fn test_modify_location_requires_success() {
        let host = SimulatedHost::with_sessions(1);
        host.add_location(SimLocation::new("ESS-ESND", "Pompa"));
        host.add_location(SimLocation::new("ESS-ESSW", "Valvola"));
        host.fail_save("ESS-ESSW");
        let ctx = context(&host);
        let session = host.open_session(0).unwrap();
        let driver = TransactionDriver::new(&session, &ctx);

        let message = driver.modify_location("ESS-ESND", "Pompa 2").unwrap();
        assert!(message.contains("salvata"));
        assert_eq!(host.location("ESS-ESND").unwrap().description, "Pompa 2");

        let err = driver.modify_location("ESS-ESSW", "Valvola 2").unwrap_err();
        assert!(matches!(err, TechLocError::SaveError(_)));
    }
}
