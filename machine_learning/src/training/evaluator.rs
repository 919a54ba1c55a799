use super::{AverageMeter, SequenceErrorMeter, progress};
use crate::{
    MlErr, Result,
    arch::{
        Model,
        loss::{LossFn, LossOutput},
    },
    data::{Batch, DataLoader, Dataset},
    sequence::PackedSequence,
};

/// Runs a model over a loader without updating it, measuring loss and error rate.
#[derive(Debug, Clone)]
pub struct Evaluator<L> {
    loss_fn: L,
    show_progress: bool,
}

impl<L: LossFn> Evaluator<L> {
    pub fn new(loss_fn: L) -> Self {
        Self {
            loss_fn,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Evaluates every batch of one epoch of `loader`.
    ///
    /// # Arguments
    /// * `model` - The model to evaluate.
    /// * `params` - The model's parameters.
    /// * `loader` - The batches to evaluate on.
    /// * `loss` - Receives the mean loss of every batch.
    /// * `cer` - Receives the decoded hypotheses of every sample.
    /// * `epoch` - The current epoch, used in error reports.
    ///
    /// # Returns
    /// The amount of evaluated batches.
    pub fn run<M, D>(
        &self,
        model: &mut M,
        params: &[f32],
        loader: &mut DataLoader<D>,
        loss: &mut AverageMeter,
        cer: &mut SequenceErrorMeter,
        epoch: usize,
    ) -> Result<usize>
    where
        M: Model,
        D: Dataset + 'static,
    {
        let pb = progress::pass_bar(loader.num_batches(), "valid", self.show_progress);
        let mut seen = 0;

        for (i, batch) in loader.iter().enumerate() {
            let batch = batch?;
            let output = model.forward(params, &batch.input)?;
            self.score(&output, &batch, loss, cer, epoch, i)?;
            seen += 1;
            pb.inc(1);
        }

        pb.finish_and_clear();
        Ok(seen)
    }

    /// Computes the loss of a batch and feeds the meters.
    pub(super) fn score(
        &self,
        output: &PackedSequence,
        batch: &Batch,
        loss: &mut AverageMeter,
        cer: &mut SequenceErrorMeter,
        epoch: usize,
        iteration: usize,
    ) -> Result<LossOutput> {
        let out = self.loss_fn.loss(output, &batch.targets)?;
        if !out.loss.is_finite() {
            return Err(MlErr::NonFiniteLoss { epoch, iteration });
        }

        if out.scored > 0 {
            loss.add(out.loss as f64, out.scored);
        }
        for (hyp, reference) in self.loss_fn.decode(output).iter().zip(&batch.targets) {
            cer.add(hyp, reference);
        }

        Ok(out)
    }
}
