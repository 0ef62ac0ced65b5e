//! End-to-end workflows against the simulated host.

use std::time::Duration;

use rayon::prelude::*;

use techloc_core::audit::NOT_PROCESSED;
use techloc_core::clipboard::SharedClipboard;
use techloc_core::config::{Settings, Timings};
use techloc_core::context::WorkContext;
use techloc_core::driver::TransactionDriver;
use techloc_core::headers;
use techloc_core::pipeline::Pipeline;
use techloc_core::pool::SessionPool;
use techloc_core::testing::{SimLocation, SimulatedHost};
use techloc_core::wait::CancelToken;
use techloc_core::TechLocError;

fn host() -> SimulatedHost {
    let host = SimulatedHost::with_sessions(2);
    for (code, description) in [
        ("ESS-ESND", "Pompa alimento"),
        ("ESS-ESSW-52", "Valvola"),
        ("ESS-ESSW-53", "Serbatoio"),
        ("ESS-ESSW-54", "Filtro"),
    ] {
        host.add_location(SimLocation::new(code, description));
    }
    host
}

fn context(host: &SimulatedHost, out: &std::path::Path, max_sessions: usize) -> WorkContext {
    let settings = Settings {
        max_sessions,
        output_dir: out.to_path_buf(),
        timings: Timings::instant(),
        ..Settings::default()
    };
    WorkContext::new(settings, SharedClipboard::new(host.clipboard()), CancelToken::new()).unwrap()
}

#[test]
fn test_parallel_listings_never_share_a_session() {
    let host = host();
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(&host, dir.path(), 2).with_language("IT");
    let pool = SessionPool::new(host.clone(), 2, ctx.timings().clone(), ctx.cancel.clone());
    pool.connect().unwrap();

    let workers = rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap();
    let found: Vec<usize> = workers.install(|| {
        (0..12)
            .into_par_iter()
            .map(|_| {
                pool.with_session(Duration::from_secs(10), |session| {
                    TransactionDriver::new(session, &ctx).list_locations("ESS-ESSW*")
                })
                .unwrap()
                .len()
            })
            .collect()
    });

    assert!(found.iter().all(|n| *n == 3));
    assert_eq!(host.concurrency_violations(), 0);
    assert_eq!(pool.status().unwrap().busy_sessions, 0);
    assert_eq!(host.attached_threads(), 0);
}

#[test]
fn test_run_with_a_locked_record() {
    let host = host();
    host.fail_save("ESS-ESSW-53");
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = Pipeline::new(host.clone(), context(&host, dir.path(), 3)).unwrap();
    pipeline.prepare().unwrap();

    let report = pipeline.run("ESS-ESND\nESS-ESSW*\n").unwrap();
    let table = &report.update.table;
    assert_eq!(table.len(), 4);
    assert_eq!(report.update.succeeded, 3);
    assert_eq!(report.update.failed, 1);

    let row = table
        .column_values(headers::CODE)
        .unwrap()
        .iter()
        .position(|c| *c == "ESS-ESSW-53")
        .unwrap();
    assert_eq!(table.cell(row, headers::RESULT), Some("E"));
    assert_eq!(table.cell(row, headers::MODIFIED_FIELDS), Some(NOT_PROCESSED));
    assert_eq!(report.stats[0].value, "S");
    assert_eq!(report.stats[0].count, 3);
    assert!(report.updated_file.exists());
    assert_eq!(host.concurrency_violations(), 0);
}

#[test]
fn test_unreachable_host_stops_the_batch() {
    let host = host();
    host.set_reachable(false);
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = Pipeline::new(host.clone(), context(&host, dir.path(), 2)).unwrap();
    let err = pipeline.prepare().unwrap_err();
    assert!(matches!(err, TechLocError::ConnectionUnavailable(_)));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_invalid_input_touches_nothing() {
    let host = host();
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = Pipeline::new(host.clone(), context(&host, dir.path(), 2)).unwrap();
    pipeline.prepare().unwrap();
    let commands_before = host.command_log().len();

    let err = pipeline.run("ESS-ESND\nnot a code\n").unwrap_err();
    assert!(matches!(err, TechLocError::ValidationError(_)));
    assert_eq!(host.command_log().len(), commands_before);
}
