//! Producer/consumer synchronization for resources.
//!
//! A [`SyncObject`] coordinates a producer thread that stages resource data
//! with the consumer thread that makes it visible to the driver. The
//! consumer signals the object when it replays the command that finalizes a
//! write; the producer waits for the signal before writing again.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Status of a sync object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// The latest write has not been consumed yet.
    Unsignaled,
    /// The consumer has finished with the latest write.
    Signaled,
}

/// Decision returned by a wait job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitJobControl {
    /// Keep waiting.
    Continue,
    /// Stop waiting; the wait returns `false`.
    Cancel,
}

/// Cross-thread handshake primitive owned by a resource.
///
/// # Example
///
/// ```ignore
/// // Producer thread, before rewriting a streamed buffer:
/// if !buffer.sync().wait_sync_client_timeout(Duration::from_millis(16)) {
///     // Consumer still busy; skip this update.
/// }
/// ```
pub struct SyncObject {
    status: Mutex<SyncStatus>,
    condvar: Condvar,
}

impl SyncObject {
    /// Length of one polling slice in [`wait_sync_client_with`](Self::wait_sync_client_with).
    pub const POLL_SLICE: Duration = Duration::from_millis(1);

    pub(crate) fn new(status: SyncStatus) -> Self {
        Self {
            status: Mutex::new(status),
            condvar: Condvar::new(),
        }
    }

    /// Get the current status.
    pub fn status(&self) -> SyncStatus {
        *self.status.lock()
    }

    /// Check if the object is signaled (non-blocking).
    pub fn is_signaled(&self) -> bool {
        self.status() == SyncStatus::Signaled
    }

    /// Mark the latest write as consumed and wake all waiters.
    pub fn signal(&self) {
        *self.status.lock() = SyncStatus::Signaled;
        self.condvar.notify_all();
    }

    /// Mark a new write as pending.
    pub(crate) fn reset(&self) {
        *self.status.lock() = SyncStatus::Unsignaled;
    }

    /// Block until signaled. The status stays signaled.
    pub fn wait_sync_driver(&self) {
        let mut status = self.status.lock();
        while *status != SyncStatus::Signaled {
            self.condvar.wait(&mut status);
        }
    }

    /// Block until signaled, then reset to unsignaled.
    pub fn wait_sync_client(&self) {
        let mut status = self.status.lock();
        while *status != SyncStatus::Signaled {
            self.condvar.wait(&mut status);
        }
        *status = SyncStatus::Unsignaled;
    }

    /// Bounded [`wait_sync_client`](Self::wait_sync_client).
    ///
    /// Returns `false` without changing the status if `timeout` elapses
    /// first. A timeout too large to form a deadline waits without bound.
    pub fn wait_sync_client_timeout(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.wait_sync_client();
            return true;
        };
        let mut status = self.status.lock();
        while *status != SyncStatus::Signaled {
            if self.condvar.wait_until(&mut status, deadline).timed_out() {
                break;
            }
        }
        if *status == SyncStatus::Signaled {
            *status = SyncStatus::Unsignaled;
            true
        } else {
            false
        }
    }

    /// Bounded client wait that runs `job` between polling slices.
    ///
    /// `job` is called once per [`POLL_SLICE`](Self::POLL_SLICE) while the
    /// object is unsignaled, never after the deadline has passed. Returning
    /// [`WaitJobControl::Cancel`] ends the wait with `false`. A timeout too
    /// large to form a deadline only ends through the job or a signal.
    pub fn wait_sync_client_with<F>(&self, timeout: Duration, mut job: F) -> bool
    where
        F: FnMut() -> WaitJobControl,
    {
        let deadline = Instant::now().checked_add(timeout);
        let expired = || deadline.is_some_and(|deadline| Instant::now() >= deadline);
        loop {
            {
                let mut status = self.status.lock();
                if *status != SyncStatus::Signaled {
                    let slice = match deadline {
                        Some(deadline) => {
                            let now = Instant::now();
                            if now >= deadline {
                                return false;
                            }
                            Self::POLL_SLICE.min(deadline - now)
                        }
                        None => Self::POLL_SLICE,
                    };
                    self.condvar.wait_for(&mut status, slice);
                }
                if *status == SyncStatus::Signaled {
                    *status = SyncStatus::Unsignaled;
                    return true;
                }
            }

            if expired() {
                return false;
            }
            if job() == WaitJobControl::Cancel {
                log::trace!("SyncObject: client wait cancelled by job");
                return false;
            }
        }
    }
}

impl std::fmt::Debug for SyncObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncObject")
            .field("status", &self.status())
            .finish()
    }
}
