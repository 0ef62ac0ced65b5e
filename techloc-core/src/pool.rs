//! Bounded session pool.
//!
//! The automation host allows at most one caller per session at a time and
//! its session objects belong to the thread that opened them.  The pool
//! therefore tracks *slots* (session indices) rather than session objects:
//!
//! - a slot is checked out under the pool mutex, so no two leases share a
//!   session index;
//! - the worker then opens its own session object for that index on its own
//!   thread and checks liveness by reading the session identity;
//! - dropping the [`SessionLease`] closes the session object, returns the
//!   slot and wakes one waiter, then tears down the thread context, in that
//!   order, on every exit path.
//!
//! The preferred slot is `worker index % slot count`, where the worker index
//! is the rayon thread index; the remaining slots are probed linearly.
//!
//! New sessions are created by issuing the session-manager command against a
//! checked-out session and polling the host's session count.  Creations are
//! serialized by a dedicated lock, since the command itself is a stateful UI
//! action on a shared window.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::Serialize;

use crate::config::Timings;
use crate::errors::TechLocError;
use crate::host::{HostSession, ScriptingHost, SessionInfo};
use crate::screens::Frame;
use crate::wait::{poll_until, settle, CancelToken, PollOutcome};

/// Read-only pool snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub max_sessions: usize,
    /// Sessions open on the host connection.
    pub live_sessions: usize,
    /// Sessions tracked by the pool.
    pub managed_sessions: usize,
    pub busy_sessions: usize,
    pub initialized: bool,
}

#[derive(Debug, Default)]
struct PoolState {
    /// `true` while the slot is leased.
    busy: Vec<bool>,
    initialized: bool,
}

impl PoolState {
    fn busy_count(&self) -> usize {
        self.busy.iter().filter(|b| **b).count()
    }
}

/// Bounded pool of host sessions shared by worker threads.
pub struct SessionPool<H: ScriptingHost> {
    host: H,
    max_sessions: usize,
    timings: Timings,
    cancel: CancelToken,
    state: Mutex<PoolState>,
    released: Condvar,
    create_lock: Mutex<()>,
    identity: Mutex<Option<SessionInfo>>,
}

impl<H: ScriptingHost> SessionPool<H> {
    pub fn new(host: H, max_sessions: usize, timings: Timings, cancel: CancelToken) -> Self {
        Self {
            host,
            max_sessions,
            timings,
            cancel,
            state: Mutex::new(PoolState::default()),
            released: Condvar::new(),
            create_lock: Mutex::new(()),
            identity: Mutex::new(None),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Identity captured by [`connect`](Self::connect).
    pub fn identity(&self) -> Option<SessionInfo> {
        self.identity.lock().clone()
    }

    /// Attach to the host and its connection, register the open sessions
    /// and capture the system identity from the first live one.
    pub fn connect(&self) -> Result<SessionInfo, TechLocError> {
        let _ctx = self.host.attach_thread()?;
        self.host.connect()?;
        let live = self.refresh_slots()?;
        if live == 0 {
            return Err(TechLocError::ConnectionUnavailable(
                "connection has no open session".into(),
            ));
        }

        let info = {
            let lease = self
                .checkout(self.timings.acquire_timeout())
                .map_err(|e| match e {
                    TechLocError::SessionUnavailable(msg) => TechLocError::ConnectionUnavailable(msg),
                    other => other,
                })?
                .ok_or_else(|| {
                    TechLocError::ConnectionUnavailable("no open session is free".into())
                })?;
            lease.session().info()?
        };

        log::info!(
            target: "pool",
            "ok: connected user={} system={} client={} language={} sessions={live}/{}",
            info.user,
            info.system_name,
            info.client,
            info.language,
            self.max_sessions
        );
        *self.identity.lock() = Some(info.clone());
        Ok(info)
    }

    /// Grow the host to `target` open sessions.
    ///
    /// Issues exactly `target - live` creation attempts, one at a time,
    /// stopping at the first failure.  Returns the live count reached.
    pub fn ensure_capacity(&self, target: usize) -> Result<usize, TechLocError> {
        let _ctx = self.host.attach_thread()?;
        let mut live = self.refresh_slots()?;
        if target > self.max_sessions {
            return Err(TechLocError::CapacityExceeded {
                live,
                max: self.max_sessions,
            });
        }

        let attempts = target.saturating_sub(live);
        if attempts == 0 {
            log::info!(target: "pool", "capacity {live}/{target} already reached");
        } else {
            log::info!(target: "pool", "creating {attempts} sessions ({live}/{target})");
        }

        for attempt in 1..=attempts {
            if attempt > 1 {
                settle(self.timings.creation_pause());
            }
            match self.create_session() {
                Ok(count) => {
                    live = count;
                    log::info!(target: "pool", "ok: session {attempt}/{attempts} created, {live} open");
                }
                Err(TechLocError::Cancelled) => return Err(TechLocError::Cancelled),
                Err(e) => {
                    log::warn!(
                        target: "pool",
                        "session {attempt}/{attempts} not created, keeping {live}: {e}"
                    );
                    break;
                }
            }
        }

        live = self.refresh_slots()?;
        Ok(live)
    }

    /// One creation attempt, serialized with all others.
    fn create_session(&self) -> Result<usize, TechLocError> {
        let _creating = self.create_lock.lock();
        let before = self.host.session_count()?;
        if before >= self.max_sessions {
            return Err(TechLocError::CapacityExceeded {
                live: before,
                max: self.max_sessions,
            });
        }

        {
            let lease = self
                .checkout(self.timings.acquire_timeout())?
                .ok_or_else(|| {
                    TechLocError::SessionUnavailable("no free session to issue the command".into())
                })?;
            if let Err(e) = Frame::new(lease.session()).request_new_session() {
                log::warn!(target: "pool", "session-manager command failed on slot {}: {e}", lease.index());
            }
            settle(self.timings.settle());
        }

        let mut after = before;
        let outcome = poll_until(
            self.timings.session_create_timeout(),
            self.timings.poll_interval(),
            &self.cancel,
            || {
                match self.host.session_count() {
                    Ok(n) => after = n,
                    Err(e) => log::debug!(target: "pool", "session count unreadable: {e}"),
                }
                after > before
            },
        );
        match outcome {
            PollOutcome::Ready => {
                settle(self.timings.settle());
                self.grow_slots(after);
                Ok(after)
            }
            PollOutcome::TimedOut => Err(TechLocError::SessionUnavailable(format!(
                "no new session within {:.1}s",
                self.timings.session_create_timeout().as_secs_f32()
            ))),
            PollOutcome::Cancelled => Err(TechLocError::Cancelled),
        }
    }

    /// Lease a session for the calling thread.
    ///
    /// `Ok(None)` when no session could be leased within `timeout`.
    pub fn acquire(&self, timeout: Duration) -> Result<Option<SessionLease<'_, H>>, TechLocError> {
        let ctx = self.host.attach_thread()?;
        if !self.state.lock().initialized {
            self.refresh_slots()?;
        }
        Ok(self.checkout(timeout)?.map(|lease| {
            log::debug!(target: "pool", "slot {} leased", lease.index());
            lease.with_context(ctx)
        }))
    }

    /// Run `op` with a leased session; a timeout becomes
    /// [`TechLocError::SessionUnavailable`].
    pub fn with_session<T, F>(&self, timeout: Duration, op: F) -> Result<T, TechLocError>
    where
        F: FnOnce(&H::Session) -> Result<T, TechLocError>,
    {
        let lease = self.acquire(timeout)?.ok_or_else(|| {
            TechLocError::SessionUnavailable(format!(
                "no session free within {:.1}s",
                timeout.as_secs_f32()
            ))
        })?;
        op(lease.session())
    }

    pub fn status(&self) -> Result<PoolStatus, TechLocError> {
        let _ctx = self.host.attach_thread()?;
        let live = self.host.session_count()?;
        let state = self.state.lock();
        Ok(PoolStatus {
            max_sessions: self.max_sessions,
            live_sessions: live,
            managed_sessions: state.busy.len(),
            busy_sessions: state.busy_count(),
            initialized: state.initialized,
        })
    }

    /// Check out a free, live slot without attaching the thread.
    fn checkout(&self, timeout: Duration) -> Result<Option<SessionLease<'_, H>>, TechLocError> {
        let deadline = Instant::now() + timeout;
        let preferred = rayon::current_thread_index().unwrap_or(0);

        let mut state = self.state.lock();
        loop {
            self.cancel.check()?;
            let slots = state.busy.len();
            if slots == 0 {
                return Err(TechLocError::ConnectionUnavailable(
                    "pool has no sessions".into(),
                ));
            }

            let start = preferred % slots;
            let mut any_busy = false;
            for offset in 0..slots {
                let index = (start + offset) % slots;
                match state.busy.get_mut(index) {
                    Some(busy) if !*busy => *busy = true,
                    Some(_) => {
                        any_busy = true;
                        continue;
                    }
                    None => continue,
                }
                drop(state);

                let probe = self
                    .host
                    .open_session(index)
                    .and_then(|s| s.info().map(|_| s));
                match probe {
                    Ok(session) => {
                        return Ok(Some(SessionLease {
                            session,
                            slot: SlotGuard { pool: self, index },
                            _ctx: None,
                        }))
                    }
                    Err(e) => {
                        log::warn!(target: "pool", "slot {index} failed liveness check: {e}");
                        state = self.state.lock();
                        if let Some(busy) = state.busy.get_mut(index) {
                            *busy = false;
                        }
                    }
                }
            }

            if !any_busy {
                return Err(TechLocError::SessionUnavailable(
                    "no pooled session is alive".into(),
                ));
            }
            if self.released.wait_until(&mut state, deadline).timed_out() {
                log::warn!(
                    target: "pool",
                    "no session free within {:.1}s ({} busy)",
                    timeout.as_secs_f32(),
                    state.busy_count()
                );
                return Ok(None);
            }
        }
    }

    /// Resize the slot table to the host's session count (capped at the
    /// maximum).  Busy slots are kept.
    fn refresh_slots(&self) -> Result<usize, TechLocError> {
        let live = self.host.session_count()?;
        let mut state = self.state.lock();
        let managed = live.min(self.max_sessions);
        if managed >= state.busy.len() {
            state.busy.resize(managed, false);
        } else {
            let keep = state
                .busy
                .iter()
                .rposition(|b| *b)
                .map_or(managed, |last| managed.max(last + 1));
            state.busy.truncate(keep);
        }
        state.initialized = true;
        log::debug!(target: "pool", "{live} sessions open, {} managed", state.busy.len());
        Ok(live)
    }

    fn grow_slots(&self, live: usize) {
        let mut state = self.state.lock();
        let managed = live.min(self.max_sessions);
        if managed > state.busy.len() {
            state.busy.resize(managed, false);
            self.released.notify_all();
        }
    }

    fn release(&self, index: usize) {
        let mut state = self.state.lock();
        if let Some(slot) = state.busy.get_mut(index) {
            *slot = false;
        }
        drop(state);
        self.released.notify_one();
        log::debug!(target: "pool", "slot {index} released");
    }
}

/// Returns the slot when dropped.
struct SlotGuard<'p, H: ScriptingHost> {
    pool: &'p SessionPool<H>,
    index: usize,
}

impl<H: ScriptingHost> Drop for SlotGuard<'_, H> {
    fn drop(&mut self) {
        self.pool.release(self.index);
    }
}

/// Exclusive use of one session until dropped.
///
/// Fields drop in declaration order: session object, then slot, then the
/// thread context.
pub struct SessionLease<'p, H: ScriptingHost> {
    session: H::Session,
    slot: SlotGuard<'p, H>,
    _ctx: Option<H::ThreadContext>,
}

impl<'p, H: ScriptingHost> SessionLease<'p, H> {
    fn with_context(mut self, ctx: H::ThreadContext) -> Self {
        self._ctx = Some(ctx);
        self
    }

    pub fn session(&self) -> &H::Session {
        &self.session
    }

    /// Host index of the leased session.
    pub fn index(&self) -> usize {
        self.slot.index
    }
}

impl<H: ScriptingHost> std::ops::Deref for SessionLease<'_, H> {
    type Target = H::Session;

    fn deref(&self) -> &H::Session {
        &self.session
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::testing::SimulatedHost;

    fn pool(host: SimulatedHost, max: usize) -> SessionPool<SimulatedHost> {
        SessionPool::new(host, max, Timings::instant(), CancelToken::new())
    }

    #[test]
    fn test_connect_captures_identity() {
        let p = pool(SimulatedHost::with_sessions(2), 6);
        let info = p.connect().unwrap();
        assert_eq!(info.language, "IT");
        assert_eq!(p.identity(), Some(info));
        let status = p.status().unwrap();
        assert_eq!(status.live_sessions, 2);
        assert_eq!(status.managed_sessions, 2);
        assert!(status.initialized);
    }

    #[test]
    fn test_connect_fails_without_host() {
        let host = SimulatedHost::with_sessions(1);
        host.set_reachable(false);
        let err = pool(host, 6).connect().unwrap_err();
        assert!(matches!(err, TechLocError::ConnectionUnavailable(_)));
    }

    #[test]
    fn test_capacity_six_from_two_makes_four_attempts() {
        let p = pool(SimulatedHost::with_sessions(2), 6);
        p.connect().unwrap();
        assert_eq!(p.ensure_capacity(6).unwrap(), 6);
        assert_eq!(p.host().creation_attempts(), 4);
        assert_eq!(p.status().unwrap().managed_sessions, 6);
    }

    #[test]
    fn test_capacity_stops_at_first_failure() {
        let host = SimulatedHost::with_sessions(2);
        host.fail_creations_after(1);
        let p = pool(host, 6);
        p.connect().unwrap();
        assert_eq!(p.ensure_capacity(6).unwrap(), 3);
        assert_eq!(p.host().creation_attempts(), 2);
    }

    #[test]
    fn test_capacity_above_max_is_rejected() {
        let p = pool(SimulatedHost::with_sessions(2), 4);
        p.connect().unwrap();
        let err = p.ensure_capacity(5).unwrap_err();
        assert!(matches!(err, TechLocError::CapacityExceeded { live: 2, max: 4 }));
        assert_eq!(p.host().creation_attempts(), 0);
    }

    #[test]
    fn test_acquire_times_out_with_none() {
        let p = pool(SimulatedHost::with_sessions(1), 6);
        p.connect().unwrap();
        let held = p.acquire(Duration::from_millis(10)).unwrap().unwrap();
        let second = p.acquire(Duration::from_millis(20)).unwrap();
        assert!(second.is_none());
        drop(held);
        assert!(p.acquire(Duration::from_millis(10)).unwrap().is_some());
    }

    #[test]
    fn test_acquire_skips_dead_session() {
        let host = SimulatedHost::with_sessions(2);
        host.kill_session(0);
        let p = pool(host, 6);
        p.connect().unwrap();
        let lease = p.acquire(Duration::from_millis(50)).unwrap().unwrap();
        assert_eq!(lease.index(), 1);
    }

    #[test]
    fn test_acquire_all_dead_is_error() {
        let host = SimulatedHost::with_sessions(2);
        let p = pool(host, 6);
        p.connect().unwrap();
        p.host().kill_session(0);
        p.host().kill_session(1);
        assert!(matches!(
            p.acquire(Duration::from_millis(50)),
            Err(TechLocError::SessionUnavailable(_))
        ));
    }

    #[test]
    fn test_release_on_error_path() {
        let p = pool(SimulatedHost::with_sessions(1), 6);
        p.connect().unwrap();
        let r: Result<(), _> = p.with_session(Duration::from_millis(10), |_| {
            Err(TechLocError::ParseError("boom".into()))
        });
        assert!(r.is_err());
        assert_eq!(p.status().unwrap().busy_sessions, 0);
        assert_eq!(p.host().open_handles(), 0);
    }

    #[test]
    fn test_no_double_lease_under_contention() {
        let p = Arc::new(pool(SimulatedHost::with_sessions(3), 6));
        p.connect().unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let p = Arc::clone(&p);
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    for _ in 0..20 {
                        p.with_session(Duration::from_secs(5), |s| {
                            s.info()?;
                            thread::sleep(Duration::from_micros(200));
                            Ok(())
                        })
                        .unwrap();
                        done.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(done.load(Ordering::SeqCst), 160);
        assert_eq!(p.host().concurrency_violations(), 0);
        assert_eq!(p.status().unwrap().busy_sessions, 0);
    }

    #[test]
    fn test_thread_context_torn_down() {
        let p = pool(SimulatedHost::with_sessions(1), 6);
        p.connect().unwrap();
        {
            let _lease = p.acquire(Duration::from_millis(10)).unwrap().unwrap();
            assert!(p.host().attached_threads() >= 1);
        }
        assert_eq!(p.host().attached_threads(), 0);
        assert!(p.acquire(Duration::from_millis(10)).unwrap().is_some());
        assert_eq!(p.host().attached_threads(), 0);
    }
}
