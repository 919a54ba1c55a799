use super::TrainerState;
use crate::{Result, optimization::Optimizer};

/// The points of an epoch where hooks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    EpochStart,
    /// After validation, before the early-stop trigger is evaluated.
    EpochEnd,
}

/// Read-only view of the live training run handed to hooks.
pub struct HookContext<'a> {
    pub state: &'a TrainerState,
    pub params: &'a [f32],
    pub optimizer: &'a dyn Optimizer,
}

/// A callback bound to an `Event`.
///
/// Errors returned by a hook end the training run.
pub trait Hook {
    fn call(&mut self, ctx: &HookContext<'_>) -> Result<()>;
}

impl<F> Hook for F
where
    F: FnMut(&HookContext<'_>) -> Result<()>,
{
    fn call(&mut self, ctx: &HookContext<'_>) -> Result<()> {
        self(ctx)
    }
}
