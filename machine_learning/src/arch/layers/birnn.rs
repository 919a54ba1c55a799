use std::ops::Range;

use ndarray::{concatenate, linalg, prelude::*};
use rand::Rng;

use super::{check_len, uniform_fill};
use crate::{
    MlErr, Result,
    sequence::{PackedSequence, segments},
};

/// A bidirectional Elman recurrence with `tanh` units.
///
/// Each direction computes `h_t = tanh(x_t W_ih + h_prev W_hh + b)`, the forward one walking every
/// sequence from its first frame, the backward one from its last. The output of a frame is the
/// concatenation `[h_fw, h_bw]`, so it has `2 * hidden` features.
///
/// Parameters of the forward direction come first, each direction storing `W_ih`
/// (`input x hidden`), `W_hh` (`hidden x hidden`) and `b` (`hidden`).
#[derive(Debug, Clone)]
pub struct BiRnn {
    input: usize,
    hidden: usize,

    // Forward metadata
    x: Array2<f32>,
    lengths: Vec<usize>,
    states: [Array2<f32>; 2],
}

struct DirParams<'a> {
    w_ih: ArrayView2<'a, f32>,
    w_hh: ArrayView2<'a, f32>,
    b: ArrayView1<'a, f32>,
}

struct DirGrad<'a> {
    w_ih: ArrayViewMut2<'a, f32>,
    w_hh: ArrayViewMut2<'a, f32>,
    b: ArrayViewMut1<'a, f32>,
}

impl BiRnn {
    /// Creates a new `BiRnn`.
    ///
    /// # Arguments
    /// * `input` - The amount of features of each input frame.
    /// * `hidden` - The amount of units of each direction.
    pub fn new(input: usize, hidden: usize) -> Self {
        Self {
            input,
            hidden,
            x: Array2::zeros((0, input)),
            lengths: Vec::new(),
            states: [Array2::zeros((0, hidden)), Array2::zeros((0, hidden))],
        }
    }

    fn dir_size(&self) -> usize {
        self.input * self.hidden + self.hidden * self.hidden + self.hidden
    }

    /// Returns the amount of parameters this layer has.
    pub fn size(&self) -> usize {
        2 * self.dir_size()
    }

    pub fn output_size(&self) -> usize {
        2 * self.hidden
    }

    pub fn init_params<R: Rng + ?Sized>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        check_len("birnn params", params.len(), self.size())?;
        let bound = 1. / (self.hidden.max(1) as f32).sqrt();
        uniform_fill(params, bound, rng)
    }

    pub fn forward(&mut self, params: &[f32], x: &PackedSequence) -> Result<PackedSequence> {
        check_len("birnn input features", x.features(), self.input)?;
        check_len("birnn params", params.len(), self.size())?;

        let (fw, bw) = params.split_at(self.dir_size());
        let segs = x.segments();
        let h_fw = self.run_direction(self.view_params(fw)?, x.data(), &segs, false);
        let h_bw = self.run_direction(self.view_params(bw)?, x.data(), &segs, true);

        let out = concatenate(Axis(1), &[h_fw.view(), h_bw.view()]).map_err(|_| {
            MlErr::SizeMismatch {
                what: "birnn states",
                got: h_bw.nrows(),
                expected: h_fw.nrows(),
            }
        })?;

        self.x = x.data().to_owned();
        self.lengths = x.lengths().to_vec();
        self.states = [h_fw, h_bw];

        x.with_data(out)
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        check_len("birnn params", params.len(), self.size())?;
        check_len("birnn grad", grad.len(), self.size())?;
        check_len("birnn deltas", d.ncols(), self.output_size())?;
        check_len("birnn deltas", d.nrows(), self.x.nrows())?;

        let dir_size = self.dir_size();
        let h = self.hidden;
        let segs = segments(&self.lengths);
        let mut dx = Array2::zeros(self.x.raw_dim());

        let (p_fw, p_bw) = params.split_at(dir_size);
        let (g_fw, g_bw) = grad.split_at_mut(dir_size);
        let dirs = [
            (p_fw, g_fw, d.slice(s![.., ..h]), false),
            (p_bw, g_bw, d.slice(s![.., h..]), true),
        ];

        for (i, (p, g, d_dir, reverse)) in dirs.into_iter().enumerate() {
            let p = self.view_params(p)?;
            let mut g = self.view_grad(g)?;
            let states = &self.states[i];

            let mut d_pre = Array2::<f32>::zeros(states.raw_dim());
            for seg in &segs {
                let mut dh_next = Array1::<f32>::zeros(h);
                let order = steps(seg.clone(), reverse);

                for (k, &t) in order.iter().enumerate().rev() {
                    let dh = &d_dir.row(t) + &dh_next;
                    let dz = &dh * &states.row(t).mapv(|v| 1. - v * v);

                    if k > 0 {
                        let prev = states.row(order[k - 1]);
                        linalg::general_mat_mul(
                            1.0,
                            &prev.insert_axis(Axis(1)),
                            &dz.view().insert_axis(Axis(0)),
                            1.0,
                            &mut g.w_hh,
                        );
                    }

                    dh_next = dz.dot(&p.w_hh.t());
                    d_pre.row_mut(t).assign(&dz);
                }
            }

            linalg::general_mat_mul(1.0, &self.x.t(), &d_pre, 1.0, &mut g.w_ih);
            g.b += &d_pre.sum_axis(Axis(0));
            linalg::general_mat_mul(1.0, &d_pre, &p.w_ih.t(), 1.0, &mut dx);
        }

        Ok(dx)
    }

    fn run_direction(
        &self,
        p: DirParams<'_>,
        x: ArrayView2<'_, f32>,
        segs: &[Range<usize>],
        reverse: bool,
    ) -> Array2<f32> {
        let mut pre = x.dot(&p.w_ih);
        pre += &p.b;

        let mut states = Array2::zeros((x.nrows(), self.hidden));
        for seg in segs {
            let mut h_prev = Array1::<f32>::zeros(self.hidden);
            for t in steps(seg.clone(), reverse) {
                let z = &pre.row(t) + &h_prev.dot(&p.w_hh);
                h_prev = z.mapv_into(f32::tanh);
                states.row_mut(t).assign(&h_prev);
            }
        }

        states
    }

    fn view_params<'a>(&self, params: &'a [f32]) -> Result<DirParams<'a>> {
        let (i, h) = (self.input, self.hidden);
        let (w_ih, rest) = params.split_at(i * h);
        let (w_hh, b) = rest.split_at(h * h);

        Ok(DirParams {
            w_ih: ArrayView2::from_shape((i, h), w_ih).map_err(|_| self.shape_err())?,
            w_hh: ArrayView2::from_shape((h, h), w_hh).map_err(|_| self.shape_err())?,
            b: ArrayView1::from_shape(h, b).map_err(|_| self.shape_err())?,
        })
    }

    fn view_grad<'a>(&self, grad: &'a mut [f32]) -> Result<DirGrad<'a>> {
        let (i, h) = (self.input, self.hidden);
        let (w_ih, rest) = grad.split_at_mut(i * h);
        let (w_hh, b) = rest.split_at_mut(h * h);

        Ok(DirGrad {
            w_ih: ArrayViewMut2::from_shape((i, h), w_ih).map_err(|_| self.shape_err())?,
            w_hh: ArrayViewMut2::from_shape((h, h), w_hh).map_err(|_| self.shape_err())?,
            b: ArrayViewMut1::from_shape(h, b).map_err(|_| self.shape_err())?,
        })
    }

    fn shape_err(&self) -> MlErr {
        MlErr::SizeMismatch {
            what: "birnn layout",
            got: 0,
            expected: self.dir_size(),
        }
    }
}

/// Frame indices of a segment in the order a direction visits them.
fn steps(seg: Range<usize>, reverse: bool) -> Vec<usize> {
    if reverse {
        seg.rev().collect()
    } else {
        seg.collect()
    }
}
