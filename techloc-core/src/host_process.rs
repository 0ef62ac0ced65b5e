//! Host process detection via the `sysinfo` crate.
//!
//! Binding to the scripting engine of a client that is not running fails
//! with an opaque moniker error.  Checking the process table first lets the
//! connection step report a precise `ConnectionUnavailable` instead.
//!
//! # Thread safety
//!
//! `sysinfo::System` is wrapped in `parking_lot::Mutex` + `OnceLock` for
//! safe concurrent access.

use std::sync::OnceLock;

use parking_lot::Mutex;
use serde::Serialize;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};

use crate::errors::TechLocError;

/// Executable name of the client launcher hosting the scripting engine.
pub const HOST_PROCESS: &str = "saplogon.exe";

// ---------------------------------------------------------------------------
// Singleton
// ---------------------------------------------------------------------------

static SYSTEM: OnceLock<Mutex<System>> = OnceLock::new();

fn get_system() -> &'static Mutex<System> {
    SYSTEM.get_or_init(|| {
        Mutex::new(System::new_with_specifics(
            RefreshKind::nothing().with_processes(ProcessRefreshKind::nothing().with_memory()),
        ))
    })
}

/// Owned snapshot of one matching process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostProcess {
    pub pid: u32,
    pub name: String,
    pub memory_bytes: u64,
}

/// Running processes whose executable name equals `name`, ignoring ASCII
/// case.
pub fn find_processes(name: &str) -> Vec<HostProcess> {
    let mut sys = get_system().lock();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing().with_memory(),
    );
    let mut found: Vec<HostProcess> = sys
        .processes()
        .values()
        .filter(|p| p.name().to_string_lossy().eq_ignore_ascii_case(name))
        .map(|p| HostProcess {
            pid: p.pid().as_u32(),
            name: p.name().to_string_lossy().into_owned(),
            memory_bytes: p.memory(),
        })
        .collect();
    found.sort_by_key(|p| p.pid);
    found
}

/// The first process named `name`, or `ConnectionUnavailable`.
pub fn require_process(name: &str) -> Result<HostProcess, TechLocError> {
    let mut found = find_processes(name);
    if found.is_empty() {
        log::error!(target: "host", "process {name} is not running");
        return Err(TechLocError::ConnectionUnavailable(format!(
            "{name} is not running; start the client and log on first"
        )));
    }
    let first = found.swap_remove(0);
    log::debug!(target: "host", "found {} (pid {})", first.name, first.pid);
    Ok(first)
}
