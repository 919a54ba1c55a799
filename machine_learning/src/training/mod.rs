//! The training engine: epochs, meters, early stopping and checkpoints.

mod checkpoint;
mod evaluator;
mod hooks;
mod meters;
mod progress;
mod state;
mod trainer;
mod triggers;

pub use checkpoint::{Checkpoint, ModelState, SaveModelCheckpointHook};
pub use evaluator::Evaluator;
pub use hooks::{Event, Hook, HookContext};
pub use meters::{AverageMeter, Meters, Metric, SequenceErrorMeter, edit_distance};
pub use state::{Status, TrainerState};
pub use trainer::Trainer;
pub use triggers::{MeterStdDev, Trigger};
