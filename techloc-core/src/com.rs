//! COM apartment RAII guard.
//!
//! [`ComGuard`] wraps `CoInitializeEx` / `CoUninitialize` in an RAII pattern
//! so that every block of scripting calls made from a worker thread is
//! bracketed by apartment init and teardown, even on early return.
//!
//! SAP GUI Scripting objects live in a single-threaded apartment, so worker
//! threads join an STA by default.  The `PhantomData<*const ()>` field
//! enforces `!Send` + `!Sync` at compile time, preventing the guard from
//! being moved across thread boundaries.

use windows::Win32::System::Com::{
    CoInitializeEx, CoUninitialize, COINIT, COINIT_APARTMENTTHREADED, COINIT_MULTITHREADED,
};

use crate::errors::TechLocError;

/// Apartment model requested by [`ComGuard::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Apartment {
    SingleThreaded,
    MultiThreaded,
}

impl Apartment {
    fn coinit(self) -> COINIT {
        match self {
            Self::SingleThreaded => COINIT_APARTMENTTHREADED,
            Self::MultiThreaded => COINIT_MULTITHREADED,
        }
    }
}

/// RAII wrapper that calls `CoUninitialize` on `Drop` when appropriate.
///
/// The guard tracks whether `CoInitializeEx` actually succeeded (vs.
/// `RPC_E_CHANGED_MODE`) and only calls `CoUninitialize` when a balancing
/// call is required per MSDN.  Nested guards on one thread are fine: COM
/// reference-counts initialisation.
#[must_use = "ComGuard must be kept alive for the duration of COM usage"]
pub struct ComGuard {
    should_uninit: bool,
    _not_send: std::marker::PhantomData<*const ()>,
}

impl ComGuard {
    /// Initialise (or join) the thread's COM apartment.
    ///
    /// Returns `Ok(ComGuard)` for `S_OK`, `S_FALSE`, and
    /// `RPC_E_CHANGED_MODE` (thread already has the other apartment kind;
    /// COM is usable but we must NOT call `CoUninitialize`).
    pub fn init(apartment: Apartment) -> Result<Self, TechLocError> {
        let hr = unsafe { CoInitializeEx(None, apartment.coinit()) };

        let hresult_value = hr.0 as u32;
        match hresult_value {
            // S_OK (newly initialised) or S_FALSE (already initialised).
            0x0 | 0x1 => Ok(Self {
                should_uninit: true,
                _not_send: std::marker::PhantomData,
            }),
            0x8001_0106 => {
                log::warn!(
                    target: "com",
                    "CoInitializeEx: RPC_E_CHANGED_MODE -- thread already has a different \
                     apartment than {apartment:?}, reusing it"
                );
                Ok(Self {
                    should_uninit: false,
                    _not_send: std::marker::PhantomData,
                })
            }
            _ => Err(TechLocError::ComError(format!(
                "CoInitializeEx failed: HRESULT 0x{hresult_value:08X}"
            ))),
        }
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        if self.should_uninit {
            unsafe { CoUninitialize() };
        }
    }
}
