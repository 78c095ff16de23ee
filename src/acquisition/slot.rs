//! State shared between the producer thread and the consumer.
//!
//! The producer publishes each completed sweep into a single "latest" slot;
//! the consumer waits for the slot's sequence number to move past the last
//! one it saw. There is no queue and no back-pressure: a slow consumer simply
//! skips to the newest sweep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::error::VnaError;
use crate::measurement::SweepResult;

#[derive(Debug, Default)]
struct Slot {
    sequence: u64,
    result: Option<SweepResult>,
}

/// Most recent completed sweep, read and written as one unit.
#[derive(Debug, Default)]
pub struct LatestSweep {
    slot: Mutex<Slot>,
    ready: Condvar,
}

impl LatestSweep {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the latest sweep and wake waiting consumers.
    ///
    /// Returns the new sequence number.
    pub fn publish(&self, result: SweepResult) -> u64 {
        let mut slot = self.slot.lock();
        slot.sequence += 1;
        slot.result = Some(result);
        let sequence = slot.sequence;
        drop(slot);
        self.ready.notify_all();
        trace!(sequence, "Published sweep");
        sequence
    }

    /// Sequence number of the latest publish (0 before the first).
    pub fn sequence(&self) -> u64 {
        self.slot.lock().sequence
    }

    /// Snapshot of the latest sweep with its sequence number.
    pub fn latest(&self) -> Option<(u64, SweepResult)> {
        let slot = self.slot.lock();
        slot.result.clone().map(|r| (slot.sequence, r))
    }

    /// The latest sweep if it is newer than `seen`, without waiting.
    pub fn newer_than(&self, seen: u64) -> Option<(u64, SweepResult)> {
        let slot = self.slot.lock();
        if slot.sequence > seen {
            slot.result.clone().map(|r| (slot.sequence, r))
        } else {
            None
        }
    }

    /// Wait up to `timeout` for a sweep newer than `seen`.
    pub fn wait_newer(&self, seen: u64, timeout: Duration) -> Option<(u64, SweepResult)> {
        let mut slot = self.slot.lock();
        if slot.sequence <= seen {
            self.ready.wait_for(&mut slot, timeout);
        }
        if slot.sequence > seen {
            slot.result.clone().map(|r| (slot.sequence, r))
        } else {
            None
        }
    }

    /// Wake every waiter without publishing.
    pub fn wake(&self) {
        let _slot = self.slot.lock();
        self.ready.notify_all();
    }
}

/// A sweep pass that failed without ending the run.
#[derive(Debug)]
pub struct PassFault {
    /// Zero-based pass index within the producer's lifetime
    pub pass: u64,
    pub error: VnaError,
}

/// Run flag, latest slot and captured errors of one run.
///
/// `running` is the single authoritative flag: the producer checks it
/// between passes and the consumer checks it when no new sweep arrived.
#[derive(Debug)]
pub struct RunShared {
    running: AtomicBool,
    pub(crate) latest: LatestSweep,
    faults: Mutex<Vec<PassFault>>,
    fatal: Mutex<Option<VnaError>>,
}

impl RunShared {
    pub(crate) fn new(running: bool) -> Self {
        Self {
            running: AtomicBool::new(running),
            latest: LatestSweep::new(),
            faults: Mutex::new(Vec::new()),
            fatal: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Clear the run flag and wake the consumer.
    pub(crate) fn request_stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.latest.wake();
    }

    pub(crate) fn record_fault(&self, pass: u64, error: VnaError) {
        self.faults.lock().push(PassFault { pass, error });
    }

    pub(crate) fn fault_count(&self) -> usize {
        self.faults.lock().len()
    }

    pub(crate) fn take_faults(&self) -> Vec<PassFault> {
        std::mem::take(&mut *self.faults.lock())
    }

    /// Keep the first fatal error; later ones are consequences of it.
    pub(crate) fn set_fatal(&self, error: VnaError) {
        let mut fatal = self.fatal.lock();
        if fatal.is_none() {
            *fatal = Some(error);
        }
    }

    pub(crate) fn take_fatal(&self) -> Option<VnaError> {
        self.fatal.lock().take()
    }
}

/// Clears the run flag when the producer thread exits, panics included.
pub(crate) struct RunningGuard(pub(crate) Arc<RunShared>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.request_stop();
    }
}

/// Cloneable handle that asks a stream to stop from any thread.
///
/// Stopping is cooperative: a sweep already in flight completes first. The
/// stream itself joins the producer thread when it ends or is dropped.
#[derive(Debug, Clone)]
pub struct StopHandle {
    shared: Arc<RunShared>,
}

impl StopHandle {
    pub(crate) fn new(shared: Arc<RunShared>) -> Self {
        Self { shared }
    }

    pub fn stop(&self) {
        self.shared.request_stop();
    }

    pub fn is_stopped(&self) -> bool {
        !self.shared.is_running()
    }
}
