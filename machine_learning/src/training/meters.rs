use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Keys of the meters the engine maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    TrainLoss,
    TrainCer,
    ValidLoss,
    ValidCer,
}

impl Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::TrainLoss => "train loss",
            Metric::TrainCer => "train CER",
            Metric::ValidLoss => "valid loss",
            Metric::ValidCer => "valid CER",
        };
        f.write_str(name)
    }
}

/// Running mean of a scalar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AverageMeter {
    sum: f64,
    count: usize,
}

impl AverageMeter {
    /// Adds `value` as the mean of `n` observations.
    pub fn add(&mut self, value: f64, n: usize) {
        self.sum += value * n as f64;
        self.count += n;
    }

    /// The mean of every observation since the last reset, `None` if there is none.
    pub fn value(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Accumulated edit distance over accumulated reference length, e.g. a character error rate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequenceErrorMeter {
    errors: usize,
    ref_len: usize,
}

impl SequenceErrorMeter {
    /// Compares a hypothesis against its reference.
    pub fn add<T: PartialEq>(&mut self, hyp: &[T], reference: &[T]) {
        self.errors += edit_distance(hyp, reference);
        self.ref_len += reference.len();
    }

    /// The error rate since the last reset. `None` until a non-empty reference was observed.
    pub fn value(&self) -> Option<f64> {
        (self.ref_len > 0).then(|| self.errors as f64 / self.ref_len as f64)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// The meters of a training run. The engine is their only writer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Meters {
    pub train_loss: AverageMeter,
    pub train_cer: SequenceErrorMeter,
    pub valid_loss: AverageMeter,
    pub valid_cer: SequenceErrorMeter,
}

impl Meters {
    /// Current value of a metric.
    pub fn value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::TrainLoss => self.train_loss.value(),
            Metric::TrainCer => self.train_cer.value(),
            Metric::ValidLoss => self.valid_loss.value(),
            Metric::ValidCer => self.valid_cer.value(),
        }
    }
}

/// Levenshtein distance with unit costs.
pub fn edit_distance<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, x) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, y) in b.iter().enumerate() {
            let sub = prev[j] + usize::from(x != y);
            curr[j + 1] = sub.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}
