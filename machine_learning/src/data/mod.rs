//! Everything between the files on disk and the packed batches the trainer consumes.

mod collate;
mod dataloader;
mod dataset;
mod image;
mod sampler;
mod symbols;
mod text_table;
mod transform;

pub use collate::{Batch, ImageToSequence, collate};
pub use dataloader::{Batches, DataLoader};
pub use dataset::{Dataset, InMemoryDataset, Sample, TextImageDataset};
pub use self::image::{IMAGE_EXTENSIONS, find_image, load_image};
pub use sampler::Sampler;
pub use symbols::SymbolTable;
pub use text_table::{TextTableEntry, read_text_table};
pub use transform::Distortion;
