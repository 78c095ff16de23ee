//! Acquisition orchestration.
//!
//! The [`Orchestrator`] runs the sweep producer either on the calling thread
//! (single sweeps) or on one background thread (streams), and hands results
//! to the consumer through a [`SweepStream`]. The stream looks the same
//! whether it is fed by the instrument or by a recording.
//!
//! Lifecycle guarantees:
//! - at most one background producer thread exists per orchestrator
//! - dropping or closing a stream stops and joins that thread before
//!   returning
//! - errors raised on the producer thread are captured, never lost

pub mod orchestrator;
pub mod slot;
pub mod stream;

pub use orchestrator::{Orchestrator, StreamSource};
pub use slot::{LatestSweep, PassFault, RunShared, StopHandle};
pub use stream::{StreamPoll, SweepStream};

use crate::measurement::SweepResult;
use crate::sweep::SweepMode;

/// Snapshot of an orchestrator's run state.
#[derive(Debug, Clone, PartialEq)]
pub struct RunState {
    pub running: bool,
    pub mode: SweepMode,
    pub last_result: Option<SweepResult>,
}
