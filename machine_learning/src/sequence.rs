use std::ops::Range;

use ndarray::{Array2, ArrayView2, Axis, concatenate, s};

use crate::{MlErr, Result};

/// A batch of variable-length sequences stored back to back.
///
/// Rows `offsets()[i]..offsets()[i] + lengths()[i]` of `data` hold the frames of the `i`-th
/// sequence, samples keep the order they were packed in. Layers that work frame by frame can
/// operate on `data` directly, recurrent layers walk the segments.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedSequence {
    data: Array2<f32>,
    lengths: Vec<usize>,
}

impl PackedSequence {
    /// Creates a new `PackedSequence`.
    ///
    /// # Arguments
    /// * `data` - The concatenated frames, one per row.
    /// * `lengths` - The amount of frames of each sequence.
    ///
    /// # Returns
    /// A new `PackedSequence` or an error if the lengths don't add up to the number of rows.
    pub fn new(data: Array2<f32>, lengths: Vec<usize>) -> Result<Self> {
        let total = lengths.iter().sum();
        if data.nrows() != total {
            return Err(MlErr::SizeMismatch {
                what: "packed sequence rows",
                got: data.nrows(),
                expected: total,
            });
        }

        Ok(Self { data, lengths })
    }

    /// Packs a list of `(frames, features)` matrices, all with the same amount of features.
    pub fn pack<'a, I>(sequences: I) -> Result<Self>
    where
        I: IntoIterator<Item = ArrayView2<'a, f32>>,
    {
        let views: Vec<_> = sequences.into_iter().collect();
        let Some(first) = views.first() else {
            return Err(MlErr::SizeMismatch {
                what: "packed sequence batch",
                got: 0,
                expected: 1,
            });
        };

        let features = first.ncols();
        if let Some(bad) = views.iter().find(|v| v.ncols() != features) {
            return Err(MlErr::SizeMismatch {
                what: "packed sequence features",
                got: bad.ncols(),
                expected: features,
            });
        }

        let lengths = views.iter().map(|v| v.nrows()).collect();
        let data = concatenate(Axis(0), &views).map_err(|_| MlErr::SizeMismatch {
            what: "packed sequence features",
            got: 0,
            expected: features,
        })?;

        Self::new(data, lengths)
    }

    /// Returns a sequence with the same lengths but different frame contents.
    pub fn with_data(&self, data: Array2<f32>) -> Result<Self> {
        Self::new(data, self.lengths.clone())
    }

    pub fn data(&self) -> ArrayView2<'_, f32> {
        self.data.view()
    }

    pub fn into_data(self) -> Array2<f32> {
        self.data
    }

    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    /// Amount of sequences in the batch.
    pub fn batch_size(&self) -> usize {
        self.lengths.len()
    }

    pub fn features(&self) -> usize {
        self.data.ncols()
    }

    /// Returns the starting row of each sequence.
    pub fn offsets(&self) -> Vec<usize> {
        offsets(&self.lengths)
    }

    /// Returns the row range of each sequence.
    pub fn segments(&self) -> Vec<Range<usize>> {
        segments(&self.lengths)
    }

    /// Returns a view over the frames of the `i`-th sequence.
    pub fn sequence(&self, i: usize) -> ArrayView2<'_, f32> {
        let range = &self.segments()[i];
        self.data.slice(s![range.clone(), ..])
    }
}

/// Starting row of each segment of a packed buffer.
pub fn offsets(lengths: &[usize]) -> Vec<usize> {
    lengths
        .iter()
        .scan(0, |acc, &len| {
            let start = *acc;
            *acc += len;
            Some(start)
        })
        .collect()
}

/// Row range of each segment of a packed buffer.
pub fn segments(lengths: &[usize]) -> Vec<Range<usize>> {
    offsets(lengths)
        .into_iter()
        .zip(lengths)
        .map(|(start, len)| start..start + len)
        .collect()
}
