use log::warn;
use ndarray::{Array1, Array2, ArrayView2, s};
use rayon::prelude::*;

use super::{LossFn, LossOutput};
use crate::{MlErr, Result, sequence::PackedSequence};

/// Connectionist temporal classification over unnormalized frame scores.
///
/// The scores are normalized with a log-softmax per frame. Samples whose target cannot be
/// aligned with their frames are left out of the batch loss and get a zero gradient.
#[derive(Debug, Clone, Copy)]
pub struct Ctc {
    blank: usize,
}

impl Default for Ctc {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Ctc {
    /// Creates a new `Ctc` loss with `blank` as the blank symbol index.
    pub fn new(blank: usize) -> Self {
        Self { blank }
    }
}

impl LossFn for Ctc {
    fn loss(&self, output: &PackedSequence, targets: &[Vec<usize>]) -> Result<LossOutput> {
        if targets.len() != output.batch_size() {
            return Err(MlErr::SizeMismatch {
                what: "ctc targets",
                got: targets.len(),
                expected: output.batch_size(),
            });
        }

        let classes = output.features();
        if let Some(&bad) = targets.iter().flatten().find(|&&k| k >= classes) {
            return Err(MlErr::SizeMismatch {
                what: "ctc target symbol",
                got: bad,
                expected: classes,
            });
        }

        let segments = output.segments();
        let data = output.data();
        let per_sample: Vec<_> = segments
            .par_iter()
            .zip(targets.par_iter())
            .map(|(seg, target)| sample_loss(data.slice(s![seg.clone(), ..]), target, self.blank))
            .collect();

        let scored = per_sample.iter().filter(|r| r.is_some()).count();
        let mut grad = Array2::zeros(data.raw_dim());
        if scored == 0 {
            warn!("no sample in the batch has a feasible alignment");
            return Ok(LossOutput {
                loss: 0.,
                grad,
                scored,
            });
        }

        let scale = 1. / scored as f64;
        let mut total = 0.;
        for (i, (seg, result)) in segments.iter().zip(per_sample).enumerate() {
            let Some((loss, g)) = result else {
                warn!(
                    "sample {i} has {} frames, too few for a target of {} symbols",
                    seg.len(),
                    targets[i].len()
                );
                continue;
            };
            total += loss;
            grad.slice_mut(s![seg.clone(), ..])
                .assign(&g.mapv(|v| (v * scale) as f32));
        }

        Ok(LossOutput {
            loss: (total * scale) as f32,
            grad,
            scored,
        })
    }

    fn decode(&self, output: &PackedSequence) -> Vec<Vec<usize>> {
        output
            .segments()
            .into_iter()
            .map(|seg| greedy_decode(output.data().slice(s![seg, ..]), self.blank))
            .collect()
    }
}

/// Best path decoding: picks the top scoring symbol of every frame, merges repetitions and drops
/// blanks.
pub fn greedy_decode(scores: ArrayView2<'_, f32>, blank: usize) -> Vec<usize> {
    let mut decoded = Vec::new();
    let mut prev = None;

    for row in scores.rows() {
        let best = row
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |acc, (k, &v)| {
                if v > acc.1 { (k, v) } else { acc }
            })
            .0;

        if Some(best) != prev && best != blank {
            decoded.push(best);
        }
        prev = Some(best);
    }

    decoded
}

fn log_add(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let m = a.max(b);
    m + ((a - m).exp() + (b - m).exp()).ln()
}

fn log_softmax(scores: ArrayView2<'_, f32>) -> Array2<f64> {
    let mut out = scores.mapv(f64::from);
    for mut row in out.rows_mut() {
        let m = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
        let lse = m + row.iter().map(|v| (v - m).exp()).sum::<f64>().ln();
        row.mapv_inplace(|v| v - lse);
    }
    out
}

/// Negative log likelihood of `target` and its derivative with respect to the raw scores, or
/// `None` if no alignment exists.
fn sample_loss(
    scores: ArrayView2<'_, f32>,
    target: &[usize],
    blank: usize,
) -> Option<(f64, Array2<f64>)> {
    let frames = scores.nrows();
    if frames == 0 {
        return None;
    }

    // target interleaved with blanks: _ a _ b _
    let ext: Vec<usize> = std::iter::once(blank)
        .chain(target.iter().flat_map(|&k| [k, blank]))
        .collect();
    let states = ext.len();
    let lp = log_softmax(scores);

    let mut alpha = Array2::from_elem((frames, states), f64::NEG_INFINITY);
    alpha[[0, 0]] = lp[[0, ext[0]]];
    if states > 1 {
        alpha[[0, 1]] = lp[[0, ext[1]]];
    }
    for t in 1..frames {
        for s in 0..states {
            let mut a = alpha[[t - 1, s]];
            if s >= 1 {
                a = log_add(a, alpha[[t - 1, s - 1]]);
            }
            if s >= 2 && ext[s] != blank && ext[s] != ext[s - 2] {
                a = log_add(a, alpha[[t - 1, s - 2]]);
            }
            alpha[[t, s]] = a + lp[[t, ext[s]]];
        }
    }

    let last = frames - 1;
    let mut log_lik = alpha[[last, states - 1]];
    if states > 1 {
        log_lik = log_add(log_lik, alpha[[last, states - 2]]);
    }
    if !log_lik.is_finite() {
        return None;
    }

    let mut beta = Array2::from_elem((frames, states), f64::NEG_INFINITY);
    beta[[last, states - 1]] = lp[[last, ext[states - 1]]];
    if states > 1 {
        beta[[last, states - 2]] = lp[[last, ext[states - 2]]];
    }
    for t in (0..last).rev() {
        for s in 0..states {
            let mut b = beta[[t + 1, s]];
            if s + 1 < states {
                b = log_add(b, beta[[t + 1, s + 1]]);
            }
            if s + 2 < states && ext[s] != blank && ext[s] != ext[s + 2] {
                b = log_add(b, beta[[t + 1, s + 2]]);
            }
            beta[[t, s]] = b + lp[[t, ext[s]]];
        }
    }

    // alpha and beta both include the emission of frame t, hence the extra lp term.
    let classes = scores.ncols();
    let mut grad = lp.mapv(f64::exp);
    for t in 0..frames {
        let mut occupancy = Array1::from_elem(classes, f64::NEG_INFINITY);
        for (s, &k) in ext.iter().enumerate() {
            occupancy[k] = log_add(occupancy[k], alpha[[t, s]] + beta[[t, s]]);
        }
        for (k, occ) in occupancy.iter().enumerate() {
            if *occ != f64::NEG_INFINITY {
                grad[[t, k]] -= (occ - lp[[t, k]] - log_lik).exp();
            }
        }
    }

    Some((-log_lik, grad))
}

/// Sums the loss of every frame sequence of the batch, ignoring infeasible samples.
#[cfg(test)]
fn batch_nll(output: &PackedSequence, targets: &[Vec<usize>], blank: usize) -> f64 {
    output
        .segments()
        .into_iter()
        .zip(targets)
        .filter_map(|(seg, t)| sample_loss(output.data().slice(s![seg, ..]), t, blank))
        .map(|(l, _)| l)
        .sum::<f64>()
        / targets.len() as f64
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    fn packed(rows: Array2<f32>) -> PackedSequence {
        let n = rows.nrows();
        PackedSequence::new(rows, vec![n]).unwrap()
    }

    #[test]
    fn single_frame_is_cross_entropy() {
        let out = packed(array![[0.0, 1.0, -1.0]]);
        let res = Ctc::default().loss(&out, &[vec![1]]).unwrap();

        let z: f32 = [0.0f32, 1.0, -1.0].iter().map(|v| v.exp()).sum();
        let expected = -(1.0f32.exp() / z).ln();
        assert!((res.loss - expected).abs() < 1e-5);
        assert_eq!(res.scored, 1);
    }

    #[test]
    fn two_frames_sum_three_paths() {
        // uniform frames: p = P(a a) + P(_ a) + P(a _) = 3 / 4
        let out = packed(Array2::zeros((2, 2)));
        let res = Ctc::default().loss(&out, &[vec![1]]).unwrap();
        assert!((res.loss - (-(0.75f32).ln())).abs() < 1e-5);
    }

    #[test]
    fn repeated_symbols_need_a_blank_in_between() {
        // "a a" needs at least 3 frames
        let out = packed(Array2::zeros((2, 2)));
        let res = Ctc::default().loss(&out, &[vec![1, 1]]).unwrap();
        assert_eq!(res.scored, 0);
        assert!(res.grad.iter().all(|&g| g == 0.));

        let out = packed(Array2::zeros((3, 2)));
        let res = Ctc::default().loss(&out, &[vec![1, 1]]).unwrap();
        assert_eq!(res.scored, 1);
        // only "a _ a" is valid
        assert!((res.loss - 3. * 2f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn empty_target_only_emits_blanks() {
        let out = packed(Array2::zeros((3, 2)));
        let res = Ctc::default().loss(&out, &[vec![]]).unwrap();
        assert!((res.loss - 3. * 2f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let a = array![[0.2, -0.1, 0.4], [0.0, 0.3, -0.2], [0.5, 0.1, 0.1], [-0.3, 0.2, 0.0]];
        let b = array![[0.1, 0.2, 0.3], [0.3, 0.2, 0.1]];
        let out = PackedSequence::pack([a.view(), b.view()]).unwrap();
        let targets = vec![vec![1, 2], vec![2]];

        let res = Ctc::default().loss(&out, &targets).unwrap();
        let base = out.data().to_owned();
        let eps = 1e-3;

        for ((r, c), g) in res.grad.indexed_iter() {
            let mut plus = base.clone();
            plus[[r, c]] += eps;
            let mut minus = base.clone();
            minus[[r, c]] -= eps;
            let lp = batch_nll(&out.with_data(plus).unwrap(), &targets, 0);
            let lm = batch_nll(&out.with_data(minus).unwrap(), &targets, 0);
            let numeric = (lp - lm) / (2. * eps as f64);
            assert!(
                (numeric - *g as f64).abs() < 1e-3,
                "({r}, {c}): numeric {numeric}, analytic {g}"
            );
        }
    }

    #[test]
    fn rejects_symbols_outside_the_output() {
        let out = packed(Array2::zeros((2, 2)));
        assert!(Ctc::default().loss(&out, &[vec![5]]).is_err());
        assert!(Ctc::default().loss(&out, &[vec![1], vec![1]]).is_err());
    }

    #[test]
    fn greedy_decode_merges_and_drops_blanks() {
        let scores = array![
            [0.9, 0.1, 0.0],
            [0.1, 0.9, 0.0],
            [0.1, 0.9, 0.0],
            [0.9, 0.0, 0.1],
            [0.0, 0.9, 0.1],
            [0.0, 0.1, 0.9],
        ];
        assert_eq!(greedy_decode(scores.view(), 0), vec![1, 1, 2]);
    }

    #[test]
    fn decode_splits_the_batch() {
        let a = array![[0.0, 1.0], [0.0, 1.0]];
        let b = array![[1.0, 0.0]];
        let out = PackedSequence::pack([a.view(), b.view()]).unwrap();
        assert_eq!(Ctc::default().decode(&out), vec![vec![1], vec![]]);
    }
}
