//! Session Cancellation
//!
//! Cooperative cancellation for a streaming session.
//!
//! ## Design
//!
//! Uses a combination of:
//! - Atomic flag checked before every handler callback
//! - Optional deadline measured from session start
//! - `Notify` so a session waiting on the transport wakes up on abort
//!
//! Handlers are never interrupted mid-call; once cancellation is observed
//! the dispatcher simply stops initiating callbacks.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

const ACTIVE: u8 = 0;
const ABORTED: u8 = 1;
const DEADLINE: u8 = 2;

/// Why a session stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// Explicit abort through a [`CancelHandle`] or [`CancelSignal::cancel`]
    Aborted,
    /// The session deadline passed
    DeadlineExceeded { timeout: Duration },
}

/// Cancellation error
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}", describe(.reason, .elapsed))]
pub struct Cancelled {
    pub reason: CancelReason,
    /// How long the session had been running
    pub elapsed: Duration,
}

fn describe(reason: &CancelReason, elapsed: &Duration) -> String {
    match reason {
        CancelReason::Aborted => format!("session aborted after {elapsed:?}"),
        CancelReason::DeadlineExceeded { timeout } => {
            format!("session exceeded deadline of {timeout:?} (ran for {elapsed:?})")
        }
    }
}

struct CancelState {
    status: AtomicU8,
    notify: Notify,
}

impl CancelState {
    fn trip(&self, status: u8) {
        // First reason wins
        if self
            .status
            .compare_exchange(ACTIVE, status, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.notify.notify_waiters();
        }
    }
}

/// Cancellation signal bound to one streaming session
///
/// Clones share state: cancelling any clone cancels them all.
#[derive(Clone)]
pub struct CancelSignal {
    state: Arc<CancelState>,

    /// When the session started
    start_time: Instant,

    /// Maximum allowed duration
    timeout: Option<Duration>,
}

impl CancelSignal {
    /// Create a signal with an optional deadline
    pub fn new(timeout: Option<Duration>) -> Self {
        CancelSignal {
            state: Arc::new(CancelState {
                status: AtomicU8::new(ACTIVE),
                notify: Notify::new(),
            }),
            start_time: Instant::now(),
            timeout,
        }
    }

    /// Signal with no deadline; only explicit aborts cancel it
    pub fn never() -> Self {
        CancelSignal::new(None)
    }

    /// Signal from a millisecond timeout where 0 means no deadline
    pub fn from_timeout_ms(timeout_ms: u64) -> Self {
        if timeout_ms == 0 {
            CancelSignal::never()
        } else {
            CancelSignal::new(Some(Duration::from_millis(timeout_ms)))
        }
    }

    /// Check whether the session may continue.
    ///
    /// Called before every handler callback.
    pub fn check(&self) -> Result<(), Cancelled> {
        if let Some(timeout) = self.timeout {
            if self.start_time.elapsed() > timeout {
                self.state.trip(DEADLINE);
            }
        }

        match self.state.status.load(Ordering::Acquire) {
            ACTIVE => Ok(()),
            ABORTED => Err(self.cancelled_error(CancelReason::Aborted)),
            _ => Err(self.cancelled_error(CancelReason::DeadlineExceeded {
                timeout: self.timeout.unwrap_or(Duration::ZERO),
            })),
        }
    }

    fn cancelled_error(&self, reason: CancelReason) -> Cancelled {
        Cancelled {
            reason,
            elapsed: self.start_time.elapsed(),
        }
    }

    /// Abort the session explicitly
    pub fn cancel(&self) {
        self.state.trip(ABORTED);
    }

    /// Whether cancellation has been observed (explicit or deadline)
    pub fn is_cancelled(&self) -> bool {
        self.check().is_err()
    }

    /// Time since the session started
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Time left before the deadline, if any
    pub fn remaining(&self) -> Option<Duration> {
        self.timeout
            .map(|timeout| timeout.saturating_sub(self.start_time.elapsed()))
    }

    /// Get a handle that can abort the session from another task or thread
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Resolve once the session is cancelled or its deadline passes.
    ///
    /// Cancel-safe: dropping the future has no effect on the signal.
    pub async fn cancelled(&self) -> Cancelled {
        loop {
            let notified = self.state.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Err(cancelled) = self.check() {
                return cancelled;
            }

            match self.remaining() {
                Some(remaining) => {
                    tokio::select! {
                        () = &mut notified => {}
                        () = tokio::time::sleep(remaining + Duration::from_millis(1)) => {}
                    }
                }
                None => notified.await,
            }
        }
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        CancelSignal::never()
    }
}

impl std::fmt::Debug for CancelSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelSignal")
            .field("timeout", &self.timeout)
            .field("elapsed", &self.start_time.elapsed())
            .field("status", &self.state.status.load(Ordering::Relaxed))
            .finish()
    }
}

/// Handle for aborting a session from another task or thread
#[derive(Clone)]
pub struct CancelHandle {
    state: Arc<CancelState>,
}

impl CancelHandle {
    /// Abort the associated session
    pub fn cancel(&self) {
        self.state.trip(ABORTED);
    }

    /// Check if an abort has been requested (deadline expiry is not visible here)
    pub fn is_cancelled(&self) -> bool {
        self.state.status.load(Ordering::Acquire) != ACTIVE
    }
}
