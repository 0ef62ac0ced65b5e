//! `techloc_core` -- extraction and bulk update of technical locations
//! through SAP GUI Scripting.
//!
//! This crate holds all workflow logic and is consumed by `techloc-cli`.
//! Everything except [`com`] and [`sapgui`] is platform independent and
//! runs against `testing::SimulatedHost` in tests.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`errors`] | `TechLocError` enum via `thiserror` |
//! | [`config`] | `Settings` / `Timings`, TOML file + defaults |
//! | [`location`] | Code masks, input batch validation, records |
//! | [`table`] | `ParsedTable` row-major string table |
//! | [`parser`] | Pipe-delimited report parser |
//! | [`headers`] | Column names of every produced table |
//! | [`catalog`] | Localized screen titles and status messages |
//! | [`clipboard`] | Serialized clipboard access via `arboard` |
//! | [`wait`] | Cancellation token and polling |
//! | [`host`] | Scripting host / session / element traits |
//! | [`host_process`] | Client process detection via `sysinfo` |
//! | [`com`] | `ComGuard` RAII wrapper for COM apartment init (Windows) |
//! | [`sapgui`] | `IDispatch` implementation of [`host`] (Windows) |
//! | `testing` | In-memory host simulator (`testing` feature) |
//! | [`screens`] | Typed views over element ids |
//! | [`verifier`] | Screen identity checks |
//! | [`context`] | Per-run `WorkContext` |
//! | [`pool`] | Session pool with per-thread checkout |
//! | [`driver`] | Listing, bulk read and bulk update transactions |
//! | [`audit`] | Change detection and outcome statistics |
//! | [`export`] | `.xlsx` artifacts via `rust_xlsxwriter` |
//! | [`pipeline`] | End-to-end run across a Rayon worker pool |

pub mod audit;
pub mod catalog;
pub mod clipboard;
#[cfg(windows)]
pub mod com;
pub mod config;
pub mod context;
pub mod driver;
pub mod errors;
pub mod export;
pub mod headers;
pub mod host;
pub mod host_process;
pub mod location;
pub mod parser;
pub mod pipeline;
pub mod pool;
#[cfg(windows)]
pub mod sapgui;
pub mod screens;
pub mod table;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod verifier;
pub mod wait;

pub use errors::TechLocError;
