//! Pull-based stream of sweeps.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::orchestrator::Orchestrator;
use super::slot::{PassFault, RunShared, StopHandle};
use crate::error::{Result, VnaError};
use crate::measurement::SweepResult;
use crate::recording::RecordedSource;

/// Outcome of one bounded wait on a stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamPoll {
    /// A sweep newer than the last one returned
    Item(SweepResult),
    /// Nothing new yet; the stream is still active
    Pending,
    /// The stream is exhausted
    Ended,
}

enum Source<'a> {
    Live {
        orchestrator: &'a mut Orchestrator,
        seen: u64,
    },
    Recorded(RecordedSource),
}

/// Lazy sequence of sweeps from the instrument or a recording.
///
/// Iterating blocks until the next sweep arrives or the source ends. Dropping
/// the stream, or calling [`close`](Self::close), stops a live producer and
/// joins its thread before returning. A stream is not restartable; open a
/// new one instead.
pub struct SweepStream<'a> {
    source: Source<'a>,
    shared: Arc<RunShared>,
    poll_interval: Duration,
    fault: Option<VnaError>,
    finished: bool,
}

impl<'a> SweepStream<'a> {
    pub(crate) fn live(orchestrator: &'a mut Orchestrator, shared: Arc<RunShared>) -> Self {
        let poll_interval = orchestrator.poll_interval();
        Self {
            source: Source::Live {
                orchestrator,
                seen: 0,
            },
            shared,
            poll_interval,
            fault: None,
            finished: false,
        }
    }

    pub(crate) fn recorded(source: RecordedSource) -> Self {
        Self {
            source: Source::Recorded(source),
            shared: Arc::new(RunShared::new(true)),
            poll_interval: Duration::ZERO,
            fault: None,
            finished: false,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self.source, Source::Live { .. })
    }

    /// Handle that ends this stream from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::new(Arc::clone(&self.shared))
    }

    /// Ask the source to stop; the stream ends at its next poll.
    pub fn stop(&self) {
        self.shared.request_stop();
    }

    /// The error that ended the stream, if any.
    pub fn fault(&self) -> Option<&VnaError> {
        self.fault.as_ref()
    }

    /// Passes that failed so far without ending a live stream.
    pub fn take_faults(&self) -> Vec<PassFault> {
        self.shared.take_faults()
    }

    /// Wait at most `timeout` for the next sweep.
    ///
    /// Recordings never report `Pending`; a read either yields or ends.
    pub fn next_within(&mut self, timeout: Duration) -> StreamPoll {
        if self.finished {
            return StreamPoll::Ended;
        }

        let polled = match &mut self.source {
            Source::Live { seen, .. } => {
                match self.shared.latest.wait_newer(*seen, timeout) {
                    Some((sequence, result)) => {
                        *seen = sequence;
                        Some(StreamPoll::Item(result))
                    }
                    // Stop requested or producer exited: drain the last publish
                    None if !self.shared.is_running() => {
                        self.shared.latest.newer_than(*seen).map(|(sequence, result)| {
                            *seen = sequence;
                            StreamPoll::Item(result)
                        })
                    }
                    None => Some(StreamPoll::Pending),
                }
            }
            Source::Recorded(reader) => {
                if !self.shared.is_running() {
                    None
                } else {
                    match reader.next() {
                        Some(Ok(result)) => Some(StreamPoll::Item(result)),
                        Some(Err(e)) => {
                            warn!(error = %e, "Recording ended with an error");
                            self.fault = Some(e);
                            None
                        }
                        None => None,
                    }
                }
            }
        };

        match polled {
            Some(poll) => poll,
            None => {
                self.finish();
                StreamPoll::Ended
            }
        }
    }

    /// Stop the source, join the producer and return the error that ended
    /// the stream, if any.
    pub fn close(mut self) -> Result<()> {
        self.finish();
        match self.fault.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.shared.request_stop();

        if let Source::Live { orchestrator, seen } = &mut self.source {
            if let Err(e) = orchestrator.stop() {
                self.fault.get_or_insert(e);
            }
            if let Some(e) = self.shared.take_fatal() {
                self.fault.get_or_insert(e);
            }
            debug!(
                last_sequence = *seen,
                faulted = self.fault.is_some(),
                "Live stream closed"
            );
        }
    }
}

impl Iterator for SweepStream<'_> {
    type Item = SweepResult;

    fn next(&mut self) -> Option<SweepResult> {
        loop {
            match self.next_within(self.poll_interval) {
                StreamPoll::Item(result) => return Some(result),
                StreamPoll::Pending => continue,
                StreamPoll::Ended => return None,
            }
        }
    }
}

impl Drop for SweepStream<'_> {
    fn drop(&mut self) {
        self.finish();
        if let Some(e) = &self.fault {
            warn!(error = %e, "Stream dropped after a fault");
        }
    }
}
