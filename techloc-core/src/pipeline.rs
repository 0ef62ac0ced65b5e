//! End-to-end batch over the session pool.
//!
//! ```text
//! validate -> list wildcard patterns (parallel) -> merge with exact codes
//!          -> bulk read -> localized headers -> export FL_estratte_*
//!          -> language filter -> bulk update (parallel) -> audit
//!          -> export FL_aggiornate_*
//! ```
//!
//! Parallel steps run on a dedicated rayon pool with one worker per allowed
//! session; each work item leases its own session for its whole duration.

use std::collections::HashSet;
use std::path::PathBuf;

use rayon::prelude::*;
use serde::Serialize;

use crate::audit::{self, OutcomeCount};
use crate::context::WorkContext;
use crate::driver::{TransactionDriver, UpdateReport};
use crate::errors::{TechLocError, VerificationKind};
use crate::export::{export_table, EXTRACTED_PREFIX, UPDATED_PREFIX};
use crate::headers;
use crate::host::{ScriptingHost, SessionInfo};
use crate::location::{validate_batch, InputBatch};
use crate::pool::SessionPool;
use crate::table::ParsedTable;

/// Result of the read-only half of the batch.
#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    pub batch: InputBatch,
    /// Wildcard patterns that yielded nothing, with the reason.
    pub unmatched: Vec<(String, String)>,
    /// Codes sent to the bulk read, de-duplicated in input order.
    pub codes: Vec<String>,
    /// Bulk-read rows under the localized headers.
    pub table: ParsedTable,
}

/// Result of a full run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub extraction: Extraction,
    pub extracted_file: PathBuf,
    /// Update outcome with the audit columns filled in.
    pub update: UpdateReport,
    pub changed_rows: usize,
    pub stats: Vec<OutcomeCount>,
    pub updated_file: PathBuf,
}

/// Rows of `table` whose `column` equals `language`, ignoring case.
///
/// `None` when the column is missing or no row matches; `table` is never
/// modified.
pub fn filter_by_language(table: &ParsedTable, column: &str, language: &str) -> Option<ParsedTable> {
    if let Some(values) = table.column_values(column) {
        let mut present: Vec<&str> = values.into_iter().map(str::trim).collect();
        present.sort_unstable();
        present.dedup();
        log::info!(target: "pipeline", "languages present in {column}: {present:?}");
    }
    match table.filter_eq_ignore_case(column, language) {
        Some(filtered) => {
            log::info!(
                target: "pipeline",
                "ok: {} of {} rows in language {language}",
                filtered.len(),
                table.len()
            );
            Some(filtered)
        }
        None => {
            log::error!(target: "pipeline", "no row with {column} = {language}");
            None
        }
    }
}

/// Session pool, worker threads and context for one batch.
pub struct Pipeline<H: ScriptingHost> {
    pool: SessionPool<H>,
    ctx: WorkContext,
    workers: rayon::ThreadPool,
}

impl<H: ScriptingHost> Pipeline<H> {
    pub fn new(host: H, ctx: WorkContext) -> Result<Self, TechLocError> {
        let max = ctx.settings.max_sessions;
        let pool = SessionPool::new(host, max, ctx.timings().clone(), ctx.cancel.clone());
        let workers = rayon::ThreadPoolBuilder::new()
            .num_threads(max)
            .thread_name(|i| format!("techloc-worker-{i}"))
            .build()
            .map_err(|e| TechLocError::ConfigError(format!("cannot start worker threads: {e}")))?;
        Ok(Self { pool, ctx, workers })
    }

    pub fn pool(&self) -> &SessionPool<H> {
        &self.pool
    }

    pub fn context(&self) -> &WorkContext {
        &self.ctx
    }

    /// Connect, adopt the session language and open sessions up to the
    /// maximum.  Failing to open more sessions is not fatal.
    pub fn prepare(&mut self) -> Result<SessionInfo, TechLocError> {
        let info = self.pool.connect()?;
        self.ctx = self.ctx.clone().with_language(&info.language);

        let missing = self.ctx.catalog.missing_for(&self.ctx.language);
        if !missing.is_empty() {
            log::warn!(
                target: "pipeline",
                "no catalog text for language {} and keys {missing:?}; those checks will fail",
                self.ctx.language
            );
        }

        match self.pool.ensure_capacity(self.pool.max_sessions()) {
            Ok(live) => log::info!(target: "pipeline", "{live} sessions available"),
            Err(e) if e.is_soft() => log::warn!(target: "pipeline", "working with fewer sessions: {e}"),
            Err(e) => return Err(e),
        }
        Ok(info)
    }

    /// Validate `input`, expand its wildcard patterns and bulk-read every
    /// resulting code.
    pub fn extract(&self, input: &str) -> Result<Extraction, TechLocError> {
        let batch = validate_batch(input)?;
        let (listed, unmatched) = self.list_patterns(&batch.wildcard)?;

        let mut seen = HashSet::new();
        let codes: Vec<String> = batch
            .exact
            .iter()
            .cloned()
            .chain(listed)
            .filter(|c| seen.insert(c.clone()))
            .collect();
        if codes.is_empty() {
            return Err(TechLocError::verification(
                VerificationKind::NoData,
                "no technical location left to read",
            ));
        }
        log::info!(
            target: "pipeline",
            "reading {} codes ({} exact, {} patterns unmatched)",
            codes.len(),
            batch.exact.len(),
            unmatched.len()
        );

        let timeout = self.ctx.timings().acquire_timeout();
        let raw = self.pool.with_session(timeout, |session| {
            TransactionDriver::new(session, &self.ctx).read_locations(&codes)
        })?;
        let table = raw.remap_columns(&headers::LAYOUT)?;

        Ok(Extraction {
            batch,
            unmatched,
            codes,
            table,
        })
    }

    /// [`extract`](Self::extract) and write the extraction workbook.
    pub fn extract_and_export(&self, input: &str) -> Result<(Extraction, PathBuf), TechLocError> {
        let extraction = self.extract(input)?;
        let path = export_table(&self.ctx.output_dir, EXTRACTED_PREFIX, &extraction.table)?;
        Ok((extraction, path))
    }

    /// The whole batch: extraction, language filter, update and audit.
    pub fn run(&self, input: &str) -> Result<RunReport, TechLocError> {
        let (extraction, extracted_file) = self.extract_and_export(input)?;

        let language = &self.ctx.language;
        let selected = filter_by_language(
            &extraction.table,
            &self.ctx.settings.language_column,
            language,
        )
        .ok_or_else(|| {
            TechLocError::verification(
                VerificationKind::NoData,
                format!("no extracted row in language {language}"),
            )
        })?;
        self.ctx.cancel.check()?;

        let mut update = self.update_parallel(&selected)?;
        let changed_rows = audit::mark_modifications(&mut update.table)?;
        let stats = audit::outcome_stats(&update.table)?;
        let updated_file = export_table(&self.ctx.output_dir, UPDATED_PREFIX, &update.table)?;

        log::info!(
            target: "pipeline",
            "ok: run finished, {} rows updated, {} failed, {changed_rows} changed",
            update.succeeded,
            update.failed
        );
        Ok(RunReport {
            extraction,
            extracted_file,
            update,
            changed_rows,
            stats,
            updated_file,
        })
    }

    /// List every pattern on its own worker.  Returns the found codes in
    /// pattern order and the patterns that found nothing.
    #[allow(clippy::type_complexity)]
    fn list_patterns(
        &self,
        patterns: &[String],
    ) -> Result<(Vec<String>, Vec<(String, String)>), TechLocError> {
        if patterns.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }
        let timeout = self.ctx.timings().acquire_timeout();
        let results: Vec<Result<ParsedTable, TechLocError>> = self.workers.install(|| {
            patterns
                .par_iter()
                .map(|pattern| {
                    self.pool.with_session(timeout, |session| {
                        TransactionDriver::new(session, &self.ctx).list_locations(pattern)
                    })
                })
                .collect()
        });

        let mut codes = Vec::new();
        let mut unmatched = Vec::new();
        for (pattern, result) in patterns.iter().zip(results) {
            match result {
                Ok(table) => codes.extend(
                    table
                        .column_values_at(0)
                        .unwrap_or_default()
                        .into_iter()
                        .map(str::trim)
                        .filter(|c| !c.is_empty())
                        .map(str::to_owned),
                ),
                Err(e @ (TechLocError::ConnectionUnavailable(_) | TechLocError::Cancelled)) => {
                    return Err(e)
                }
                Err(e) => {
                    log::warn!(target: "pipeline", "pattern {pattern} skipped: {e}");
                    unmatched.push((pattern.clone(), e.to_string()));
                }
            }
        }
        Ok((codes, unmatched))
    }

    /// Split `table` across the open sessions and update the parts in
    /// parallel.  Rows of a part that could not get a session are reported
    /// unprocessed.
    fn update_parallel(&self, table: &ParsedTable) -> Result<UpdateReport, TechLocError> {
        let sessions = self.pool.status()?.managed_sessions;
        let workers = self.workers.current_num_threads().min(sessions).max(1);
        log::info!(
            target: "pipeline",
            "updating {} rows on {workers} of {} workers",
            table.len(),
            self.workers.current_num_threads()
        );
        let parts = table.chunks(table.len().div_ceil(workers));
        let timeout = self.ctx.timings().acquire_timeout();

        let results: Vec<Result<UpdateReport, TechLocError>> = self.workers.install(|| {
            parts
                .par_iter()
                .map(|part| {
                    self.pool.with_session(timeout, |session| {
                        TransactionDriver::new(session, &self.ctx).update_locations(part)
                    })
                })
                .collect()
        });

        let mut report = UpdateReport::default();
        for (part, result) in parts.iter().zip(results) {
            let part_report = match result {
                Ok(r) => r,
                Err(e @ TechLocError::ConnectionUnavailable(_)) => return Err(e),
                Err(e) => {
                    log::error!(target: "pipeline", "{} rows not processed: {e}", part.len());
                    UpdateReport::unprocessed(part, &e.to_string())?
                }
            };
            report.append(part_report)?;
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::SharedClipboard;
    use crate::config::{Settings, Timings};
    use crate::location::Classification;
    use crate::testing::{SimLocation, SimulatedHost};
    use crate::wait::CancelToken;

    fn host() -> SimulatedHost {
        let host = SimulatedHost::with_sessions(2);
        host.add_location(
            SimLocation::new("ESS-ESND", "Pompa alimento")
                .with_languages(&["IT", "EN"])
                .deriving(Classification {
                    category: "POMPA".into(),
                    component: "C-ESND".into(),
                    section: "S-ESND".into(),
                    object_type: "FL".into(),
                    catalog_profile: "PROF1".into(),
                }),
        );
        host.add_location(SimLocation::new("ESS-ESSW-52", "Valvola"));
        host.add_location(SimLocation::new("ESS-ESSW-53", "Serbatoio"));
        host.add_location(SimLocation::new("ESS-ESSX", "Solo inglese").with_languages(&["EN"]));
        host
    }

    fn pipeline(host: &SimulatedHost, out: &std::path::Path) -> Pipeline<SimulatedHost> {
        let settings = Settings {
            max_sessions: 3,
            output_dir: out.to_path_buf(),
            timings: Timings::instant(),
            ..Settings::default()
        };
        let ctx = WorkContext::new(
            settings,
            SharedClipboard::new(host.clipboard()),
            CancelToken::new(),
        )
        .unwrap();
        Pipeline::new(host.clone(), ctx).unwrap()
    }

    #[test]
    fn test_filter_by_language() {
        let t = ParsedTable::new(
            vec!["Sede tecnica".into(), "L_1".into()],
            vec![
                vec!["A".into(), "IT".into()],
                vec!["B".into(), "EN".into()],
            ],
        )
        .unwrap();
        assert_eq!(filter_by_language(&t, "L_1", "it").unwrap().len(), 1);
        assert!(filter_by_language(&t, "L_1", "DE").is_none());
        assert!(filter_by_language(&t, "Lingua", "IT").is_none());
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_prepare_adopts_language_and_grows_pool() {
        let host = host();
        let dir = tempfile::tempdir().unwrap();
        let mut p = pipeline(&host, dir.path());
        let info = p.prepare().unwrap();
        assert_eq!(info.language, "IT");
        assert_eq!(p.context().language, "IT");
        assert_eq!(host.creation_attempts(), 1);
        assert_eq!(p.pool().status().unwrap().live_sessions, 3);
    }

    #[test]
    fn test_extract_merges_exact_and_listed_codes() {
        let host = host();
        let dir = tempfile::tempdir().unwrap();
        let mut p = pipeline(&host, dir.path());
        p.prepare().unwrap();

        let ex = p
            .extract("ESS-ESND\nESS-ESSW*\nESS-ESND\nXXX-YYYY*\n")
            .unwrap();
        assert_eq!(ex.codes, vec!["ESS-ESND", "ESS-ESSW-52", "ESS-ESSW-53"]);
        assert_eq!(ex.unmatched.len(), 1);
        assert_eq!(ex.unmatched[0].0, "XXX-YYYY*");
        assert_eq!(ex.table.columns(), headers::EXTRACTED);
        assert_eq!(ex.table.len(), 4);
        assert_eq!(host.concurrency_violations(), 0);
    }

    #[test]
    fn test_extract_with_nothing_to_read() {
        let host = host();
        let dir = tempfile::tempdir().unwrap();
        let mut p = pipeline(&host, dir.path());
        p.prepare().unwrap();
        let err = p.extract("XXX-YYYY*").unwrap_err();
        assert!(matches!(
            err,
            TechLocError::VerificationFailed {
                kind: VerificationKind::NoData,
                ..
            }
        ));
    }

    #[test]
    fn test_run_end_to_end() {
        let host = host();
        let dir = tempfile::tempdir().unwrap();
        let mut p = pipeline(&host, dir.path());
        p.prepare().unwrap();

        let report = p.run("ESS-ESND\nESS-ESSW*\nESS-ESSX").unwrap();
        assert!(report.extracted_file.exists());
        assert!(report.updated_file.exists());

        let t = &report.update.table;
        assert_eq!(t.len(), 3);
        assert_eq!(report.update.succeeded, 3);
        assert_eq!(report.changed_rows, 1);
        assert_eq!(t.cell(0, headers::CHECK), Some("1"));
        assert_eq!(
            t.cell(0, headers::MODIFIED_FIELDS),
            Some("Tipologia: 'T-ESND' → 'POMPA'")
        );
        assert_eq!(t.cell(1, headers::MODIFIED_FIELDS), Some(audit::NO_CHANGES));
        assert_eq!(report.stats.len(), 1);
        assert_eq!(report.stats[0].count, 3);

        assert_eq!(host.concurrency_violations(), 0);
        assert_eq!(host.open_handles(), 0);
        assert_eq!(host.attached_threads(), 0);
    }

    #[test]
    fn test_run_fails_closed_without_catalog_language() {
        let host = host();
        host.set_language("EN");
        let dir = tempfile::tempdir().unwrap();
        let mut p = pipeline(&host, dir.path());
        p.prepare().unwrap();
        let err = p.run("ESS-ESSX").unwrap_err();
        assert!(matches!(err, TechLocError::VerificationFailed { .. }));
    }

    #[test]
    fn test_run_uses_every_open_session_when_creation_fails() {
        let host = SimulatedHost::with_sessions(1);
        host.fail_creations_after(0);
        let codes: Vec<String> = (50..56).map(|n| format!("ESS-ESSW-{n}")).collect();
        for code in &codes {
            host.add_location(SimLocation::new(code, "Valvola"));
        }
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            max_sessions: 3,
            output_dir: dir.path().to_path_buf(),
            timings: Timings {
                acquire_timeout_ms: 50,
                session_create_timeout_ms: 50,
                ..Timings::instant()
            },
            ..Settings::default()
        };
        let ctx = WorkContext::new(settings, SharedClipboard::new(host.clipboard()), CancelToken::new())
            .unwrap();
        let mut p = Pipeline::new(host.clone(), ctx).unwrap();
        p.prepare().unwrap();
        assert_eq!(p.pool().status().unwrap().managed_sessions, 1);

        let report = p.run(&codes.join("\n")).unwrap();
        assert_eq!(report.update.table.len(), 6);
        assert_eq!(report.update.succeeded, 6);
        assert_eq!(report.update.failed, 0);
    }

    #[test]
    fn test_extract_keeps_layout_column_blank_in_every_row() {
        let host = SimulatedHost::with_sessions(1);
        for code in ["ESS-ESSW-52", "ESS-ESSW-53"] {
            let mut location = SimLocation::new(code, "Valvola");
            location.classification.catalog_profile = String::new();
            host.add_location(location);
        }
        let dir = tempfile::tempdir().unwrap();
        let mut p = pipeline(&host, dir.path());
        p.prepare().unwrap();

        let ex = p.extract("ESS-ESSW-52\nESS-ESSW-53").unwrap();
        assert_eq!(ex.table.columns(), headers::EXTRACTED);
        assert_eq!(ex.table.column_values("Prof.cat."), Some(vec!["", ""]));
        assert_eq!(ex.table.cell(1, headers::CODE), Some("ESS-ESSW-53"));
    }
}
