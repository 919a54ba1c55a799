use std::num::NonZeroUsize;

use ndarray::{Array2, ArrayView2};

use super::Sample;
use crate::{Result, sequence::PackedSequence};

/// Turns an image into a sequence of column frames.
///
/// The image height is average-pooled into `height` bins (adaptive pooling: bin `i` covers rows
/// `floor(i * H / height)..ceil((i + 1) * H / height)`), then every column becomes a frame of
/// `height` features. The width, and so the sequence length, is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageToSequence {
    height: NonZeroUsize,
}

impl ImageToSequence {
    pub fn new(height: NonZeroUsize) -> Self {
        Self { height }
    }

    /// Amount of features of every produced frame.
    pub fn features(&self) -> usize {
        self.height.get()
    }

    /// Returns the `(width, height)` frame matrix of `image`.
    pub fn frames(&self, image: ArrayView2<'_, f32>) -> Array2<f32> {
        let (h, w) = image.dim();
        let out = self.height.get();
        let mut frames = Array2::zeros((w, out));
        if h == 0 {
            return frames;
        }

        for i in 0..out {
            let start = i * h / out;
            let end = ((i + 1) * h).div_ceil(out);
            let rows = image.slice(ndarray::s![start..end, ..]);
            let n = (end - start) as f32;
            for (c, col) in rows.columns().into_iter().enumerate() {
                frames[[c, i]] = col.sum() / n;
            }
        }

        frames
    }
}

/// A collated batch: ids, packed input frames and targets, all in the same order.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub ids: Vec<String>,
    pub input: PackedSequence,
    pub targets: Vec<Vec<usize>>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Collates variable-size samples into a single packed batch.
pub fn collate(samples: Vec<Sample>, to_sequence: &ImageToSequence) -> Result<Batch> {
    let frames: Vec<_> = samples
        .iter()
        .map(|s| to_sequence.frames(s.image.view()))
        .collect();
    let input = PackedSequence::pack(frames.iter().map(|f| f.view()))?;

    let (ids, targets) = samples.into_iter().map(|s| (s.id, s.target)).unzip();

    Ok(Batch {
        ids,
        input,
        targets,
    })
}
