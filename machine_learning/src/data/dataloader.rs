use std::{
    num::NonZeroUsize,
    sync::{
        Arc,
        mpsc::{self, Receiver},
    },
    thread::{self, JoinHandle},
};

use log::debug;
use rand::{Rng, SeedableRng, rngs::StdRng};

use super::{Batch, Dataset, ImageToSequence, Sampler, collate};
use crate::{MlErr, Result};

/// Groups the samples of a dataset into packed batches, epoch after epoch.
///
/// Every epoch draws a fresh seed from the loader's generator. The seed fixes both the sample
/// order and the random state each batch is loaded with, so the produced batches don't depend
/// on the amount of worker threads.
pub struct DataLoader<D> {
    dataset: Arc<D>,
    batch_size: NonZeroUsize,
    sampler: Sampler,
    to_sequence: ImageToSequence,
    num_workers: usize,
    prefetch: NonZeroUsize,
    rng: StdRng,
}

impl<D: Dataset + 'static> DataLoader<D> {
    /// Creates a new `DataLoader` that loads batches on the calling thread.
    ///
    /// # Arguments
    /// * `dataset` - The samples to iterate over.
    /// * `batch_size` - The maximum amount of samples per batch, the last one may be smaller.
    /// * `sampler` - The order in which samples are visited.
    /// * `to_sequence` - The image to frame sequence transform applied during collation.
    /// * `seed` - The seed of the loader's random generator.
    pub fn new(
        dataset: D,
        batch_size: NonZeroUsize,
        sampler: Sampler,
        to_sequence: ImageToSequence,
        seed: u64,
    ) -> Self {
        Self {
            dataset: Arc::new(dataset),
            batch_size,
            sampler,
            to_sequence,
            num_workers: 0,
            prefetch: NonZeroUsize::MIN,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Loads batches on `num_workers` background threads, each keeping up to `prefetch`
    /// batches ready. Zero workers means loading on the calling thread.
    pub fn with_workers(mut self, num_workers: usize, prefetch: NonZeroUsize) -> Self {
        self.num_workers = num_workers;
        self.prefetch = prefetch;
        self
    }

    /// Amount of batches a single epoch yields.
    pub fn num_batches(&self) -> usize {
        self.sampler
            .epoch_len(self.dataset.len())
            .div_ceil(self.batch_size.get())
    }

    /// Starts a new epoch.
    pub fn iter(&mut self) -> Batches<D> {
        let seed: u64 = self.rng.random();
        let indices = self
            .sampler
            .indices(self.dataset.len(), &mut StdRng::seed_from_u64(seed));
        let chunks: Arc<[Vec<usize>]> = indices
            .chunks(self.batch_size.get())
            .map(<[usize]>::to_vec)
            .collect();

        let mut batches = Batches {
            dataset: Arc::clone(&self.dataset),
            to_sequence: self.to_sequence,
            chunks,
            seed,
            next: 0,
            receivers: Vec::new(),
            workers: Vec::new(),
        };

        let num_workers = self.num_workers.min(batches.chunks.len());
        for id in 0..num_workers {
            let (tx, rx) = mpsc::sync_channel(self.prefetch.get());
            let dataset = Arc::clone(&self.dataset);
            let chunks = Arc::clone(&batches.chunks);
            let to_sequence = self.to_sequence;

            let handle = thread::spawn(move || {
                for b in (id..chunks.len()).step_by(num_workers) {
                    let batch = load(dataset.as_ref(), &chunks[b], &to_sequence, seed, b);
                    if tx.send(batch).is_err() {
                        debug!("loader worker {id} stopping early");
                        break;
                    }
                }
            });

            batches.receivers.push(rx);
            batches.workers.push(handle);
        }

        batches
    }
}

/// The batches of a single epoch, in order.
///
/// Dropping it before the end stops the workers.
pub struct Batches<D> {
    dataset: Arc<D>,
    to_sequence: ImageToSequence,
    chunks: Arc<[Vec<usize>]>,
    seed: u64,
    next: usize,
    receivers: Vec<Receiver<Result<Batch>>>,
    workers: Vec<JoinHandle<()>>,
}

impl<D: Dataset> Iterator for Batches<D> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let b = self.next;
        if b >= self.chunks.len() {
            return None;
        }
        self.next += 1;

        if self.receivers.is_empty() {
            let batch = load(
                self.dataset.as_ref(),
                &self.chunks[b],
                &self.to_sequence,
                self.seed,
                b,
            );
            return Some(batch);
        }

        let worker = b % self.receivers.len();
        let batch = self.receivers[worker]
            .recv()
            .unwrap_or(Err(MlErr::LoaderWorker(worker)));
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.chunks.len() - self.next;
        (left, Some(left))
    }
}

impl<D: Dataset> ExactSizeIterator for Batches<D> {}

impl<D> Drop for Batches<D> {
    fn drop(&mut self) {
        // Disconnecting unblocks workers waiting on a full channel.
        self.receivers.clear();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn load<D: Dataset + ?Sized>(
    dataset: &D,
    indices: &[usize],
    to_sequence: &ImageToSequence,
    seed: u64,
    batch: usize,
) -> Result<Batch> {
    let mut rng = batch_rng(seed, batch);
    let samples = indices
        .iter()
        .map(|&i| dataset.get(i, &mut rng))
        .collect::<Result<Vec<_>>>()?;

    collate(samples, to_sequence)
}

/// The augmentation generator of one batch, independent of the epoch's sampler stream.
fn batch_rng(seed: u64, batch: usize) -> StdRng {
    StdRng::seed_from_u64(seed ^ (batch as u64 + 1).wrapping_mul(0x9e37_79b9_7f4a_7c15))
}

#[cfg(test)]
mod tests {
    use ndarray::Array2;

    use super::*;
    use crate::data::{InMemoryDataset, Sample};

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn dataset(n: usize) -> InMemoryDataset {
        InMemoryDataset::new(
            (0..n)
                .map(|i| Sample {
                    id: format!("s{i}"),
                    image: Array2::from_elem((3, i + 1), i as f32),
                    target: vec![i % 3 + 1],
                })
                .collect(),
        )
    }

    fn loader(n: usize, batch_size: usize, sampler: Sampler) -> DataLoader<InMemoryDataset> {
        DataLoader::new(
            dataset(n),
            nz(batch_size),
            sampler,
            ImageToSequence::new(nz(2)),
            42,
        )
    }

    fn ids(batches: Batches<InMemoryDataset>) -> Vec<Vec<String>> {
        batches.map(|b| b.unwrap().ids).collect()
    }

    #[test]
    fn sequential_batches_cover_the_dataset() {
        let mut dl = loader(5, 2, Sampler::Sequential);
        assert_eq!(dl.num_batches(), 3);

        let epoch = ids(dl.iter());
        assert_eq!(epoch, vec![vec!["s0", "s1"], vec!["s2", "s3"], vec!["s4"]]);
    }

    #[test]
    fn workers_do_not_change_the_order() {
        let mut inline = loader(20, 3, Sampler::Shuffle);
        let mut threaded = loader(20, 3, Sampler::Shuffle).with_workers(3, nz(2));

        for _ in 0..3 {
            assert_eq!(ids(inline.iter()), ids(threaded.iter()));
        }
    }

    #[test]
    fn epochs_are_reshuffled() {
        let mut dl = loader(30, 1, Sampler::Shuffle);
        let first = ids(dl.iter());
        let second = ids(dl.iter());
        assert_eq!(first.len(), 30);
        assert_ne!(first, second);
    }

    #[test]
    fn batch_generators_differ_from_the_sampler_stream() {
        let seed = 7;
        let mut epoch = StdRng::seed_from_u64(seed);
        let sampler: Vec<u64> = (0..4).map(|_| epoch.random()).collect();
        let draws = |batch| -> Vec<u64> {
            let mut rng = batch_rng(seed, batch);
            (0..4).map(|_| rng.random()).collect()
        };

        assert_ne!(draws(0), sampler);
        assert_ne!(draws(0), draws(1));
        assert_eq!(draws(1), draws(1));
    }

    #[test]
    fn fixed_size_sampler_sets_the_epoch_length() {
        let mut dl = loader(4, 1, Sampler::FixedSize { num_samples: 10 }).with_workers(2, nz(1));
        assert_eq!(dl.num_batches(), 10);
        assert_eq!(dl.iter().len(), 10);
        assert_eq!(ids(dl.iter()).len(), 10);
    }

    #[test]
    fn dropping_an_epoch_early_stops_the_workers() {
        let mut dl = loader(50, 1, Sampler::Sequential).with_workers(4, nz(1));
        let mut epoch = dl.iter();
        assert!(epoch.next().unwrap().is_ok());
        drop(epoch);

        assert_eq!(ids(dl.iter()).len(), 50);
    }
}
