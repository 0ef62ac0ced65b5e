//! Process-wide clipboard access.
//!
//! The OS clipboard is one shared resource while host sessions run in
//! parallel, so every clipboard-mediated step goes through a
//! [`SharedClipboard`] and holds its [`ClipboardLease`] from the first write
//! (or clear) until the final read.  Two workflows therefore never
//! interleave their clipboard traffic.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};

use crate::errors::TechLocError;
use crate::wait::{poll_until, CancelToken, PollOutcome};

/// Line separator expected by the host's multi-value paste.
pub const SELECTION_SEPARATOR: &str = "\r\n";

/// Text clipboard boundary.
pub trait Clipboard: Send + Sync {
    /// Current text content; `None` when empty or not text.
    fn read_text(&self) -> Result<Option<String>, TechLocError>;
    fn write_text(&self, text: &str) -> Result<(), TechLocError>;
    fn clear(&self) -> Result<(), TechLocError>;
}

// ---------------------------------------------------------------------------
// System clipboard (arboard)
// ---------------------------------------------------------------------------

/// The desktop clipboard.
///
/// `arboard::Clipboard` holds an OS handle that must not outlive one
/// operation, so a fresh handle is opened per call.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

impl SystemClipboard {
    fn open() -> Result<arboard::Clipboard, TechLocError> {
        arboard::Clipboard::new()
            .map_err(|e| TechLocError::ClipboardError(format!("cannot open clipboard: {e}")))
    }
}

impl Clipboard for SystemClipboard {
    fn read_text(&self) -> Result<Option<String>, TechLocError> {
        match Self::open()?.get_text() {
            Ok(text) => Ok(Some(text)),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(e) => Err(TechLocError::ClipboardError(format!("read failed: {e}"))),
        }
    }

    fn write_text(&self, text: &str) -> Result<(), TechLocError> {
        Self::open()?
            .set_text(text.to_owned())
            .map_err(|e| TechLocError::ClipboardError(format!("write failed: {e}")))
    }

    fn clear(&self) -> Result<(), TechLocError> {
        Self::open()?
            .clear()
            .map_err(|e| TechLocError::ClipboardError(format!("clear failed: {e}")))
    }
}

// ---------------------------------------------------------------------------
// In-memory clipboard
// ---------------------------------------------------------------------------

/// Clipboard kept in memory; clones share the same content.
#[derive(Debug, Default, Clone)]
pub struct MemoryClipboard {
    content: Arc<Mutex<Option<String>>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current content without going through the trait.
    pub fn peek(&self) -> Option<String> {
        self.content.lock().clone()
    }
}

impl Clipboard for MemoryClipboard {
    fn read_text(&self) -> Result<Option<String>, TechLocError> {
        Ok(self.content.lock().clone().filter(|t| !t.is_empty()))
    }

    fn write_text(&self, text: &str) -> Result<(), TechLocError> {
        *self.content.lock() = Some(text.to_owned());
        Ok(())
    }

    fn clear(&self) -> Result<(), TechLocError> {
        *self.content.lock() = None;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

struct Inner {
    clipboard: Box<dyn Clipboard>,
    gate: Mutex<()>,
}

/// Clipboard behind a cross-worker gate.  Cheap to clone.
#[derive(Clone)]
pub struct SharedClipboard {
    inner: Arc<Inner>,
}

impl SharedClipboard {
    pub fn new(clipboard: impl Clipboard + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                clipboard: Box::new(clipboard),
                gate: Mutex::new(()),
            }),
        }
    }

    pub fn system() -> Self {
        Self::new(SystemClipboard)
    }

    /// Wait until no other worker holds the clipboard.
    ///
    /// Gives up with [`TechLocError::SessionUnavailable`] after `timeout`
    /// and with [`TechLocError::Cancelled`] once `cancel` is set; both are
    /// checked every `interval`.
    pub fn lock(
        &self,
        timeout: Duration,
        interval: Duration,
        cancel: &CancelToken,
    ) -> Result<ClipboardLease<'_>, TechLocError> {
        let deadline = Instant::now() + timeout;
        loop {
            cancel.check()?;
            let slice = interval
                .max(Duration::from_millis(1))
                .min(deadline.saturating_duration_since(Instant::now()));
            if let Some(guard) = self.inner.gate.try_lock_for(slice) {
                log::trace!(target: "clipboard", "clipboard gate acquired");
                return Ok(ClipboardLease {
                    clipboard: self.inner.clipboard.as_ref(),
                    _guard: guard,
                });
            }
            if Instant::now() >= deadline {
                log::warn!(
                    target: "clipboard",
                    "clipboard still held by another worker after {:.1}s",
                    timeout.as_secs_f32()
                );
                return Err(TechLocError::SessionUnavailable(format!(
                    "clipboard busy for {:.1}s",
                    timeout.as_secs_f32()
                )));
            }
        }
    }
}

impl std::fmt::Debug for SharedClipboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedClipboard").finish_non_exhaustive()
    }
}

/// Exclusive use of the clipboard until dropped.
pub struct ClipboardLease<'a> {
    clipboard: &'a dyn Clipboard,
    _guard: MutexGuard<'a, ()>,
}

impl std::fmt::Debug for ClipboardLease<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipboardLease").finish_non_exhaustive()
    }
}

impl ClipboardLease<'_> {
    pub fn read_text(&self) -> Result<Option<String>, TechLocError> {
        self.clipboard.read_text()
    }

    pub fn write_text(&self, text: &str) -> Result<(), TechLocError> {
        self.clipboard.write_text(text)
    }

    pub fn clear(&self) -> Result<(), TechLocError> {
        self.clipboard.clear()
    }

    /// Copy selection values for the host's multi-value paste.
    ///
    /// Returns how many values were written; writing nothing is an error.
    pub fn write_selection_values<S: AsRef<str>>(
        &self,
        values: &[S],
    ) -> Result<usize, TechLocError> {
        let (text, count) = format_selection_values(values);
        if count == 0 {
            log::warn!(target: "clipboard", "no values to copy");
            return Err(TechLocError::ClipboardError("no values to copy".into()));
        }
        self.clipboard.write_text(&text)?;
        log::info!(target: "clipboard", "ok: copied {count} values for selection");
        Ok(count)
    }

    /// Poll until the clipboard holds non-blank text.
    ///
    /// `Ok(None)` on timeout.  Read errors are logged and polling goes on,
    /// since another process may briefly hold the clipboard open.
    pub fn wait_for_text(
        &self,
        timeout: Duration,
        interval: Duration,
        cancel: &CancelToken,
    ) -> Result<Option<String>, TechLocError> {
        let mut found = None;
        let outcome = poll_until(timeout, interval, cancel, || {
            match self.clipboard.read_text() {
                Ok(Some(text)) if !text.trim().is_empty() => {
                    found = Some(text);
                    true
                }
                Ok(_) => false,
                Err(e) => {
                    log::warn!(target: "clipboard", "clipboard read failed while waiting: {e}");
                    false
                }
            }
        });
        match outcome {
            PollOutcome::Ready => {
                log::debug!(target: "clipboard", "clipboard data available");
                Ok(found)
            }
            PollOutcome::TimedOut => {
                log::warn!(
                    target: "clipboard",
                    "no clipboard data after {:.1}s",
                    timeout.as_secs_f32()
                );
                Ok(None)
            }
            PollOutcome::Cancelled => Err(TechLocError::Cancelled),
        }
    }
}

/// Join non-blank values with [`SELECTION_SEPARATOR`].
///
/// Returns the text and the number of values it holds.
pub fn format_selection_values<S: AsRef<str>>(values: &[S]) -> (String, usize) {
    let kept: Vec<&str> = values
        .iter()
        .map(|v| v.as_ref().trim())
        .filter(|v| !v.is_empty())
        .collect();
    (kept.join(SELECTION_SEPARATOR), kept.len())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::*;

    fn lease(shared: &SharedClipboard) -> ClipboardLease<'_> {
        shared
            .lock(Duration::from_secs(5), Duration::from_millis(1), &CancelToken::new())
            .unwrap()
    }

    #[test]
    fn test_format_selection_values() {
        let (text, n) = format_selection_values(&["ESS-ESND", "  ", "", " ESS-ESSW "]);
        assert_eq!(text, "ESS-ESND\r\nESS-ESSW");
        assert_eq!(n, 2);
        assert_eq!(format_selection_values::<&str>(&[]), (String::new(), 0));
    }

    #[test]
    fn test_write_selection_values_rejects_empty() {
        let shared = SharedClipboard::new(MemoryClipboard::new());
        let lease = lease(&shared);
        assert!(lease.write_selection_values(&[" ", ""]).is_err());
        assert_eq!(lease.write_selection_values(&["A", "B"]).unwrap(), 2);
        assert_eq!(lease.read_text().unwrap().as_deref(), Some("A\r\nB"));
    }

    #[test]
    fn test_wait_for_text_times_out_on_blank() {
        let mem = MemoryClipboard::new();
        mem.write_text("   ").unwrap();
        let shared = SharedClipboard::new(mem);
        let got = lease(&shared)
            .wait_for_text(
                Duration::from_millis(20),
                Duration::from_millis(5),
                &CancelToken::new(),
            )
            .unwrap();
        assert_eq!(got, None);
    }

    #[test]
    fn test_wait_for_text_sees_late_write() {
        let mem = MemoryClipboard::new();
        let writer = mem.clone();
        let shared = SharedClipboard::new(mem);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            writer.write_text("|A|\n|1|").unwrap();
        });
        let got = lease(&shared)
            .wait_for_text(
                Duration::from_secs(5),
                Duration::from_millis(2),
                &CancelToken::new(),
            )
            .unwrap();
        handle.join().unwrap();
        assert_eq!(got.as_deref(), Some("|A|\n|1|"));
    }

    #[test]
    fn test_wait_for_text_cancelled() {
        let shared = SharedClipboard::new(MemoryClipboard::new());
        let token = CancelToken::new();
        token.cancel();
        let err = lease(&shared)
            .wait_for_text(Duration::from_secs(5), Duration::from_millis(1), &token)
            .unwrap_err();
        assert!(matches!(err, TechLocError::Cancelled));
    }

    #[test]
    fn test_gate_serializes_workers() {
        let shared = SharedClipboard::new(MemoryClipboard::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let shared = shared.clone();
                let inside = Arc::clone(&inside);
                let overlaps = Arc::clone(&overlaps);
                thread::spawn(move || {
                    for _ in 0..10 {
                        let lease = lease(&shared);
                        if inside.fetch_add(1, Ordering::SeqCst) != 0 {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        lease.write_text(&format!("worker {i}")).unwrap();
                        thread::sleep(Duration::from_millis(1));
                        assert_eq!(
                            lease.read_text().unwrap().as_deref(),
                            Some(format!("worker {i}").as_str())
                        );
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_lock_times_out_while_held() {
        let shared = SharedClipboard::new(MemoryClipboard::new());
        let held = lease(&shared);
        let err = shared
            .lock(Duration::from_millis(20), Duration::from_millis(2), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, TechLocError::SessionUnavailable(_)));
        drop(held);
        assert!(shared
            .lock(Duration::from_millis(20), Duration::from_millis(2), &CancelToken::new())
            .is_ok());
    }

    #[test]
    fn test_lock_observes_cancel_while_held() {
        let shared = SharedClipboard::new(MemoryClipboard::new());
        let _held = lease(&shared);
        let token = CancelToken::new();
        let canceller = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            canceller.cancel();
        });
        let err = shared
            .lock(Duration::from_secs(30), Duration::from_millis(2), &token)
            .unwrap_err();
        handle.join().unwrap();
        assert!(matches!(err, TechLocError::Cancelled));
    }
}
