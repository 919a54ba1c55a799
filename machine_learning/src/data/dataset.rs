use std::path::{Path, PathBuf};

use log::{info, warn};
use ndarray::Array2;
use rand::rngs::StdRng;

use super::{Distortion, SymbolTable, find_image, load_image, read_text_table};
use crate::{MlErr, Result};

/// A single labelled image.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub id: String,
    /// `(height, width)` grayscale values, ink close to 1.
    pub image: Array2<f32>,
    /// Symbol indices of the transcription.
    pub target: Vec<usize>,
}

/// A collection of samples that can be consumed by a `DataLoader`.
///
/// Implementations must be shareable between the loader threads.
pub trait Dataset: Send + Sync {
    /// Returns the total number of samples.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetches a sample by index.
    ///
    /// # Arguments
    /// * `index` - The sample index, smaller than `len()`.
    /// * `rng` - Source of randomness for data augmentation.
    fn get(&self, index: usize, rng: &mut StdRng) -> Result<Sample>;
}

#[derive(Debug, Clone)]
struct Entry {
    id: String,
    path: PathBuf,
    target: Vec<usize>,
}

/// Images on disk paired with the transcriptions of a text table.
#[derive(Debug, Clone)]
pub struct TextImageDataset {
    entries: Vec<Entry>,
    distortion: Option<Distortion>,
}

impl TextImageDataset {
    /// Builds the dataset from a text table and the directory holding the images.
    ///
    /// Every token is mapped through `symbols`, an unknown token is an error. Entries whose
    /// image cannot be found are skipped with a warning.
    ///
    /// # Arguments
    /// * `txt_table` - The text table with one `id tokens...` line per sample.
    /// * `img_dir` - The directory containing `<id>.<ext>` images.
    /// * `symbols` - The symbol table used to encode the transcriptions.
    /// * `distortion` - Random distortion applied to every fetched image, if any.
    pub fn new(
        txt_table: &Path,
        img_dir: &Path,
        symbols: &SymbolTable,
        distortion: Option<Distortion>,
    ) -> Result<Self> {
        let table = read_text_table(txt_table)?;
        let mut entries = Vec::with_capacity(table.len());

        for row in table {
            let target = row
                .tokens
                .iter()
                .map(|tok| {
                    symbols.index_of(tok).ok_or_else(|| MlErr::Parse {
                        path: txt_table.to_path_buf(),
                        line: row.line,
                        msg: format!("symbol {tok:?} is not in the symbol table"),
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            let Some(path) = find_image(img_dir, &row.id) else {
                warn!("no image found for sample {:?} in {}", row.id, img_dir.display());
                continue;
            };

            entries.push(Entry {
                id: row.id,
                path,
                target,
            });
        }

        if entries.is_empty() {
            return Err(MlErr::EmptyDataset(txt_table.to_path_buf()));
        }

        info!(
            "loaded {} samples from {}",
            entries.len(),
            txt_table.display()
        );
        Ok(Self {
            entries,
            distortion,
        })
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.id.as_str())
    }
}

impl Dataset for TextImageDataset {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn get(&self, index: usize, rng: &mut StdRng) -> Result<Sample> {
        let entry = self.entries.get(index).ok_or(MlErr::SizeMismatch {
            what: "dataset index",
            got: index,
            expected: self.entries.len(),
        })?;

        let mut image = load_image(&entry.path)?;
        if let Some(distortion) = &self.distortion {
            image = distortion.apply(&image, rng);
        }

        Ok(Sample {
            id: entry.id.clone(),
            image,
            target: entry.target.clone(),
        })
    }
}

/// A minimal in-memory dataset, deterministic and test-friendly.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    samples: Vec<Sample>,
}

impl InMemoryDataset {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }
}

impl Dataset for InMemoryDataset {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, index: usize, _rng: &mut StdRng) -> Result<Sample> {
        self.samples.get(index).cloned().ok_or(MlErr::SizeMismatch {
            what: "dataset index",
            got: index,
            expected: self.samples.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use image::{GrayImage, Luma};
    use rand::SeedableRng;

    use super::*;

    fn fixture(dir: &Path) -> SymbolTable {
        for id in ["a", "b"] {
            GrayImage::from_pixel(4, 2, Luma([200]))
                .save(dir.join(format!("{id}.png")))
                .unwrap();
        }
        SymbolTable::parse(Path::new("syms"), "<ctc> 0\nx 1\ny 2\n").unwrap()
    }

    #[test]
    fn encodes_targets_and_skips_missing_images() {
        let dir = tempfile::tempdir().unwrap();
        let syms = fixture(dir.path());
        let table = dir.path().join("tr.txt");
        fs::write(&table, "a x y\nmissing x\nb y\n").unwrap();

        let ds = TextImageDataset::new(&table, dir.path(), &syms, None).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.ids().collect::<Vec<_>>(), ["a", "b"]);

        let sample = ds.get(0, &mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(sample.target, vec![1, 2]);
        assert_eq!(sample.image.dim(), (2, 4));
        assert!(ds.get(2, &mut StdRng::seed_from_u64(0)).is_err());
    }

    #[test]
    fn unknown_symbols_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let syms = fixture(dir.path());
        let table = dir.path().join("tr.txt");
        fs::write(&table, "a x\nb z\n").unwrap();

        let err = TextImageDataset::new(&table, dir.path(), &syms, None).unwrap_err();
        assert!(matches!(err, MlErr::Parse { line: 2, .. }));
    }

    #[test]
    fn no_images_at_all_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let syms = SymbolTable::parse(Path::new("syms"), "<ctc> 0\nx 1\n").unwrap();
        let table = dir.path().join("tr.txt");
        fs::write(&table, "a x\n").unwrap();

        let err = TextImageDataset::new(&table, dir.path(), &syms, None).unwrap_err();
        assert!(matches!(err, MlErr::EmptyDataset(_)));
    }
}
