use std::fmt::{self, Display};

use super::Meters;

/// Lifecycle of a `Trainer`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Status {
    #[default]
    Idle,
    Running,
    /// The early-stop trigger fired.
    Stopped,
    /// An epoch yielded no training batch.
    Exhausted,
}

impl Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Idle => "idle",
            Status::Running => "running",
            Status::Stopped => "stopped",
            Status::Exhausted => "exhausted",
        };
        f.write_str(s)
    }
}

/// Progress counters and meters of a training run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainerState {
    /// Completed epochs.
    pub epochs: usize,
    /// Processed training batches.
    pub iterations: usize,
    /// Optimizer steps taken.
    pub updates: usize,
    pub meters: Meters,
    pub status: Status,
}
