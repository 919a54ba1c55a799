use std::num::NonZeroUsize;

use log::{debug, info, warn};

use super::{Evaluator, Event, Hook, HookContext, Status, TrainerState, Trigger, progress};
use crate::{
    MlErr, Result,
    arch::{Model, loss::LossFn},
    data::{DataLoader, Dataset},
    optimization::Optimizer,
};

type Hooks = Vec<(Event, Box<dyn Hook>)>;

/// Drives the training of a model epoch after epoch until its trigger fires.
///
/// Gradients of consecutive batches are summed into a single buffer, the optimizer steps every
/// `num_iterations_per_update` batches. Pending gradients carry over into the next epoch.
pub struct Trainer<M, O, L, D> {
    model: M,
    params: Vec<f32>,
    grad: Vec<f32>,
    optimizer: O,
    evaluator: Evaluator<L>,

    train: DataLoader<D>,
    valid: Option<DataLoader<D>>,
    num_iterations_per_update: NonZeroUsize,

    state: TrainerState,
    trigger: Trigger,
    hooks: Hooks,
    show_progress: bool,
}

impl<M, O, L, D> Trainer<M, O, L, D>
where
    M: Model,
    O: Optimizer,
    L: LossFn,
    D: Dataset + 'static,
{
    /// Creates a new `Trainer`.
    ///
    /// # Arguments
    /// * `model` - The model to train.
    /// * `params` - The model's initial parameters.
    /// * `optimizer` - The optimizer updating `params`.
    /// * `loss_fn` - The training objective.
    /// * `train` - The training batches.
    /// * `num_iterations_per_update` - The amount of batches whose gradients are summed per step.
    ///
    /// # Returns
    /// A new `Trainer` or an error if `params` doesn't fit the model.
    pub fn new(
        model: M,
        params: Vec<f32>,
        optimizer: O,
        loss_fn: L,
        train: DataLoader<D>,
        num_iterations_per_update: NonZeroUsize,
    ) -> Result<Self> {
        if params.len() != model.size() {
            return Err(MlErr::SizeMismatch {
                what: "trainer params",
                got: params.len(),
                expected: model.size(),
            });
        }

        Ok(Self {
            grad: vec![0.; params.len()],
            model,
            params,
            optimizer,
            evaluator: Evaluator::new(loss_fn),
            train,
            valid: None,
            num_iterations_per_update,
            state: TrainerState::default(),
            trigger: Trigger::default(),
            hooks: Vec::new(),
            show_progress: false,
        })
    }

    pub fn with_validation(mut self, valid: DataLoader<D>) -> Self {
        self.valid = Some(valid);
        self
    }

    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self.evaluator = self.evaluator.with_progress(show_progress);
        self
    }

    /// Registers a hook, hooks of the same event run in registration order.
    pub fn add_hook<H: Hook + 'static>(&mut self, event: Event, hook: H) {
        self.hooks.push((event, Box::new(hook)));
    }

    pub fn state(&self) -> &TrainerState {
        &self.state
    }

    pub fn params(&self) -> &[f32] {
        &self.params
    }

    pub fn optimizer(&self) -> &O {
        &self.optimizer
    }

    /// Trains until the trigger fires or the training loader runs dry.
    ///
    /// # Returns
    /// The final status, `Stopped` or `Exhausted`.
    pub fn run(&mut self) -> Result<Status> {
        if self.state.status != Status::Idle {
            return Ok(self.state.status);
        }

        if self.trigger.is_empty() {
            warn!("no early-stop trigger configured, training until the data runs out");
        }
        self.state.status = Status::Running;

        loop {
            self.fire(Event::EpochStart)?;

            if self.train_epoch()? == 0 {
                warn!("epoch {} yielded no training batch", self.state.epochs + 1);
                self.state.status = Status::Exhausted;
                break;
            }
            self.state.epochs += 1;

            self.validate()?;
            self.log_epoch();

            self.fire(Event::EpochEnd)?;

            if self.trigger.fires(&self.state) {
                info!(
                    "early stop after epoch {}: {}",
                    self.state.epochs, self.trigger
                );
                self.state.status = Status::Stopped;
                break;
            }
        }

        Ok(self.state.status)
    }

    fn train_epoch(&mut self) -> Result<usize> {
        let epoch = self.state.epochs + 1;
        let meters = &mut self.state.meters;
        meters.train_loss.reset();
        meters.train_cer.reset();

        let pb = progress::pass_bar(self.train.num_batches(), "train", self.show_progress);
        let mut seen = 0;

        for batch in self.train.iter() {
            let batch = batch?;
            let output = self.model.forward(&self.params, &batch.input)?;
            let out = self.evaluator.score(
                &output,
                &batch,
                &mut self.state.meters.train_loss,
                &mut self.state.meters.train_cer,
                epoch,
                self.state.iterations,
            )?;

            if out.scored > 0 {
                self.model.backward(&self.params, &mut self.grad, out.grad)?;
            }
            self.state.iterations += 1;
            seen += 1;

            if self.state.iterations % self.num_iterations_per_update.get() == 0 {
                self.optimizer.update_params(&self.grad, &mut self.params)?;
                self.grad.fill(0.);
                self.state.updates += 1;
                debug!(
                    "update {} after {} iterations",
                    self.state.updates, self.state.iterations
                );
            }

            pb.inc(1);
            if let Some(loss) = self.state.meters.train_loss.value() {
                pb.set_message(format!("loss {loss:.4}"));
            }
        }

        pb.finish_and_clear();
        Ok(seen)
    }

    fn validate(&mut self) -> Result<()> {
        let meters = &mut self.state.meters;
        meters.valid_loss.reset();
        meters.valid_cer.reset();

        let Some(valid) = &mut self.valid else {
            return Ok(());
        };

        self.evaluator.run(
            &mut self.model,
            &self.params,
            valid,
            &mut meters.valid_loss,
            &mut meters.valid_cer,
            self.state.epochs,
        )?;
        Ok(())
    }

    fn log_epoch(&self) {
        let fmt = |v: Option<f64>| v.map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}"));
        let m = &self.state.meters;
        info!(
            "epoch {:>4} | updates {:>6} | tr loss {} | tr cer {} | va loss {} | va cer {}",
            self.state.epochs,
            self.state.updates,
            fmt(m.train_loss.value()),
            fmt(m.train_cer.value()),
            fmt(m.valid_loss.value()),
            fmt(m.valid_cer.value()),
        );
    }

    fn fire(&mut self, event: Event) -> Result<()> {
        let ctx = HookContext {
            state: &self.state,
            params: &self.params,
            optimizer: &self.optimizer,
        };

        for (_, hook) in self.hooks.iter_mut().filter(|(e, _)| *e == event) {
            hook.call(&ctx)?;
        }
        Ok(())
    }
}
