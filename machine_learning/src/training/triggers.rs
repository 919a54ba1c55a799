use std::{
    collections::VecDeque,
    fmt::{self, Display},
    num::NonZeroUsize,
};

use super::{Metric, TrainerState};
use crate::{MlErr, Result};

/// Stops training once the spread of a metric over its last values is small enough.
#[derive(Debug, Clone, PartialEq)]
pub struct MeterStdDev {
    metric: Metric,
    window_size: NonZeroUsize,
    threshold: f64,
    window: VecDeque<f64>,
}

impl MeterStdDev {
    /// Creates a new `MeterStdDev`.
    ///
    /// # Arguments
    /// * `metric` - The metric to watch.
    /// * `window_size` - The amount of most recent values considered, at least 2.
    /// * `threshold` - The trigger fires when the sample standard deviation is at most this.
    pub fn new(metric: Metric, window_size: NonZeroUsize, threshold: f64) -> Result<Self> {
        if window_size.get() < 2 {
            return Err(MlErr::InvalidConfig(format!(
                "the {metric} std window needs at least 2 values, got {window_size}"
            )));
        }
        if !threshold.is_finite() || threshold < 0. {
            return Err(MlErr::InvalidConfig(format!(
                "the {metric} std threshold must be a non-negative number, got {threshold}"
            )));
        }

        Ok(Self {
            metric,
            window_size,
            threshold,
            window: VecDeque::with_capacity(window_size.get()),
        })
    }

    fn fires(&mut self, state: &TrainerState) -> bool {
        if let Some(value) = state.meters.value(self.metric) {
            if self.window.len() == self.window_size.get() {
                self.window.pop_front();
            }
            self.window.push_back(value);
        }

        self.window.len() == self.window_size.get()
            && sample_std(self.window.iter().copied()) <= self.threshold
    }
}

/// A condition over the training progress that ends the run once it fires.
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// Fires once this many epochs were completed.
    NumEpochs(usize),
    /// Fires once this many optimizer updates were taken.
    NumUpdates(usize),
    MeterStdDev(MeterStdDev),
    /// Fires if any member does. Every member is evaluated on each call.
    Any(Vec<Trigger>),
}

impl Trigger {
    pub fn meter_std_dev(metric: Metric, window_size: NonZeroUsize, threshold: f64) -> Result<Self> {
        MeterStdDev::new(metric, window_size, threshold).map(Self::MeterStdDev)
    }

    pub fn any<I: IntoIterator<Item = Trigger>>(triggers: I) -> Self {
        Self::Any(triggers.into_iter().collect())
    }

    /// Evaluates the trigger, updating the state of stateful members.
    pub fn fires(&mut self, state: &TrainerState) -> bool {
        match self {
            Trigger::NumEpochs(max) => state.epochs >= *max,
            Trigger::NumUpdates(max) => state.updates >= *max,
            Trigger::MeterStdDev(t) => t.fires(state),
            Trigger::Any(triggers) => triggers
                .iter_mut()
                .fold(false, |fired, t| t.fires(state) || fired),
        }
    }

    /// Whether this trigger can never fire.
    pub fn is_empty(&self) -> bool {
        matches!(self, Trigger::Any(triggers) if triggers.iter().all(Trigger::is_empty))
    }
}

impl Default for Trigger {
    fn default() -> Self {
        Self::Any(Vec::new())
    }
}

impl Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::NumEpochs(max) => write!(f, "epochs >= {max}"),
            Trigger::NumUpdates(max) => write!(f, "updates >= {max}"),
            Trigger::MeterStdDev(t) => write!(
                f,
                "std of the last {} {} values <= {}",
                t.window_size, t.metric, t.threshold
            ),
            Trigger::Any(triggers) => {
                f.write_str("any(")?;
                for (i, t) in triggers.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{t}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Standard deviation with Bessel's correction.
fn sample_std<I: ExactSizeIterator<Item = f64> + Clone>(values: I) -> f64 {
    let n = values.len() as f64;
    let mean = values.clone().sum::<f64>() / n;
    let ss: f64 = values.map(|v| (v - mean).powi(2)).sum();
    (ss / (n - 1.)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn with_train_loss(value: f64) -> TrainerState {
        let mut state = TrainerState::default();
        state.meters.train_loss.add(value, 1);
        state
    }

    #[test]
    fn std_dev_trigger_waits_for_a_full_window() {
        let mut t = Trigger::meter_std_dev(Metric::TrainLoss, nz(3), 0.01).unwrap();
        let fired: Vec<_> = [0.50, 0.20, 0.05, 0.04, 0.045]
            .into_iter()
            .map(|v| t.fires(&with_train_loss(v)))
            .collect();

        assert_eq!(fired, [false, false, false, false, true]);
    }

    #[test]
    fn std_dev_threshold_is_inclusive() {
        let mut t = Trigger::meter_std_dev(Metric::TrainLoss, nz(2), 0.).unwrap();
        assert!(!t.fires(&with_train_loss(1.)));
        assert!(t.fires(&with_train_loss(1.)));
    }

    #[test]
    fn std_dev_trigger_ignores_missing_values() {
        let mut t = Trigger::meter_std_dev(Metric::ValidCer, nz(2), 1.).unwrap();
        let empty = TrainerState::default();
        assert!(!t.fires(&empty));
        assert!(!t.fires(&empty));
        assert!(!t.fires(&empty));
    }

    #[test]
    fn std_dev_trigger_rejects_bad_settings() {
        assert!(Trigger::meter_std_dev(Metric::TrainLoss, nz(1), 0.1).is_err());
        assert!(Trigger::meter_std_dev(Metric::TrainLoss, nz(3), f64::NAN).is_err());
        assert!(Trigger::meter_std_dev(Metric::TrainLoss, nz(3), -1.).is_err());
    }

    #[test]
    fn any_fires_when_a_member_fires() {
        let mut t = Trigger::any([Trigger::NumEpochs(2), Trigger::NumUpdates(100)]);
        let mut state = TrainerState::default();

        state.epochs = 1;
        assert!(!t.fires(&state));
        state.epochs = 2;
        assert!(t.fires(&state));

        state.epochs = 0;
        state.updates = 100;
        assert!(t.fires(&state));
    }

    #[test]
    fn any_keeps_feeding_every_member() {
        let std = Trigger::meter_std_dev(Metric::TrainLoss, nz(2), 0.).unwrap();
        let mut t = Trigger::any([Trigger::NumEpochs(1), std]);

        let mut state = with_train_loss(0.3);
        state.epochs = 1;
        assert!(t.fires(&state));

        let Trigger::Any(members) = &t else {
            unreachable!()
        };
        let Trigger::MeterStdDev(std) = &members[1] else {
            unreachable!()
        };
        assert_eq!(std.window.len(), 1);
    }

    #[test]
    fn empty_any_never_fires() {
        let mut t = Trigger::default();
        let mut state = TrainerState::default();
        state.epochs = 1_000;
        assert!(t.is_empty());
        assert!(!t.fires(&state));
    }
}
