use rand::{Rng, seq::SliceRandom};

/// Decides which samples an epoch visits and in which order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sampler {
    /// Every sample once, in dataset order.
    Sequential,
    /// Every sample once, in a random order.
    Shuffle,
    /// Exactly `num_samples` samples per epoch, drawn from consecutive random permutations
    /// of the dataset so no sample repeats before all the others were visited.
    FixedSize { num_samples: usize },
}

impl Sampler {
    /// Amount of samples an epoch visits over a dataset of `len` samples.
    pub fn epoch_len(&self, len: usize) -> usize {
        match *self {
            Sampler::FixedSize { num_samples } if len > 0 => num_samples,
            Sampler::FixedSize { .. } => 0,
            _ => len,
        }
    }

    /// Returns the sample indices of one epoch.
    ///
    /// # Arguments
    /// * `len` - The size of the dataset.
    /// * `rng` - The random source driving the order.
    pub fn indices<R: Rng + ?Sized>(&self, len: usize, rng: &mut R) -> Vec<usize> {
        match *self {
            Sampler::Sequential => (0..len).collect(),
            Sampler::Shuffle => {
                let mut indices: Vec<_> = (0..len).collect();
                indices.shuffle(rng);
                indices
            }
            Sampler::FixedSize { num_samples } => {
                if len == 0 {
                    return Vec::new();
                }

                let mut indices = Vec::with_capacity(num_samples + len);
                while indices.len() < num_samples {
                    let mut perm: Vec<_> = (0..len).collect();
                    perm.shuffle(rng);
                    indices.extend(perm);
                }
                indices.truncate(num_samples);
                indices
            }
        }
    }
}
