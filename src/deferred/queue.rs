//! Flushed command set shared between a producer and the consumer.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::command::Command;
use crate::context::RenderContext;
use crate::error::GlError;

#[derive(Debug, Default)]
struct FlushedSet {
    commands: Vec<Command>,
    /// Epoch of the latest flush.
    epoch: u64,
}

/// Commands flushed by one [`DeferredContext`](super::DeferredContext),
/// waiting to be replayed by the consumer thread.
///
/// Obtained with [`DeferredContext::queue`](super::DeferredContext::queue).
/// Every flush advances the queue's epoch; the consumer acknowledges the
/// epoch it replayed so that producers can wait for their batch.
#[derive(Debug, Default)]
pub struct DeferredQueue {
    flushed: Mutex<FlushedSet>,
    executed_epoch: Mutex<u64>,
    executed: Condvar,
}

impl DeferredQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Move `commands` into the flushed set and return the flushed epoch.
    ///
    /// An empty `commands` leaves the epoch unchanged.
    pub(crate) fn submit(&self, commands: &mut Vec<Command>) -> u64 {
        let mut flushed = self.flushed.lock();
        if commands.is_empty() {
            return flushed.epoch;
        }
        if flushed.commands.is_empty() {
            std::mem::swap(&mut flushed.commands, commands);
        } else {
            flushed.commands.append(commands);
        }
        flushed.epoch += 1;
        flushed.epoch
    }

    /// Number of commands waiting to be replayed.
    pub fn pending(&self) -> usize {
        self.flushed.lock().commands.len()
    }

    /// Epoch of the latest flush.
    pub fn flushed_epoch(&self) -> u64 {
        self.flushed.lock().epoch
    }

    /// Epoch of the latest replay.
    pub fn executed_epoch(&self) -> u64 {
        *self.executed_epoch.lock()
    }

    /// Replay the flushed commands against `context` in recording order.
    ///
    /// With `clear` the flushed set is emptied afterwards and the release
    /// action of every command runs. Without it the set stays intact and a
    /// later call replays the same commands again.
    ///
    /// The flushed set stays locked during replay, so commands must not
    /// flush into this queue.
    ///
    /// # Errors
    ///
    /// The first failing command aborts the replay and its error is
    /// returned. Commands already executed are not rolled back. The batch is
    /// still cleared and acknowledged.
    pub fn execute_commands(
        &self,
        context: &mut RenderContext,
        clear: bool,
    ) -> Result<(), GlError> {
        let (result, epoch, batch) = {
            let mut flushed = self.flushed.lock();
            let epoch = flushed.epoch;
            log::debug!(
                "DeferredQueue: executing {} commands (epoch {}, clear: {})",
                flushed.commands.len(),
                epoch,
                clear
            );

            let mut result = Ok(());
            for (index, command) in flushed.commands.iter_mut().enumerate() {
                if let Err(e) = command.execute(context) {
                    log::error!(
                        "DeferredQueue: command {} ({}) failed, aborting replay: {}",
                        index,
                        command.name(),
                        e
                    );
                    result = Err(e);
                    break;
                }
            }

            let batch = if clear {
                std::mem::take(&mut flushed.commands)
            } else {
                Vec::new()
            };
            (result, epoch, batch)
        };

        // Release actions run without the flushed set locked.
        drop(batch);
        self.acknowledge(epoch);
        result
    }

    fn acknowledge(&self, epoch: u64) {
        let mut executed = self.executed_epoch.lock();
        if epoch > *executed {
            *executed = epoch;
        }
        self.executed.notify_all();
    }

    /// Block until the batch flushed at `epoch` has been replayed.
    ///
    /// Returns `false` if `timeout` elapsed first. A timeout too large to
    /// form a deadline waits without bound.
    pub(crate) fn wait_executed(&self, epoch: u64, timeout: Option<Duration>) -> bool {
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        let mut executed = self.executed_epoch.lock();
        while *executed < epoch {
            match deadline {
                Some(deadline) => {
                    if self.executed.wait_until(&mut executed, deadline).timed_out() {
                        return *executed >= epoch;
                    }
                }
                None => self.executed.wait(&mut executed),
            }
        }
        true
    }
}

static_assertions::assert_impl_all!(DeferredQueue: Send, Sync);
