use std::{
    error::Error,
    fmt::{self, Display},
    io,
    path::PathBuf,
};

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    /// A malformed line in a symbol table or text table.
    Parse {
        path: PathBuf,
        line: usize,
        msg: String,
    },
    /// A dataset ended up with no usable samples.
    EmptyDataset(PathBuf),
    InvalidConfig(String),
    NonFiniteLoss {
        epoch: usize,
        iteration: usize,
    },
    Checkpoint {
        path: PathBuf,
        msg: String,
    },
    /// A data loader thread exited before delivering its batches.
    LoaderWorker(usize),
    Io(io::Error),
    Json(serde_json::Error),
    Image {
        path: PathBuf,
        source: image::ImageError,
    },
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch in {what}, got {got} and expected {expected}"
            ),
            MlErr::Parse { path, line, msg } => {
                write!(f, "{}:{line}: {msg}", path.display())
            }
            MlErr::EmptyDataset(path) => {
                write!(f, "no usable samples found in {}", path.display())
            }
            MlErr::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            MlErr::NonFiniteLoss { epoch, iteration } => write!(
                f,
                "non-finite loss at epoch {epoch}, iteration {iteration}"
            ),
            MlErr::Checkpoint { path, msg } => {
                write!(f, "bad checkpoint {}: {msg}", path.display())
            }
            MlErr::LoaderWorker(id) => {
                write!(f, "data loader worker {id} stopped unexpectedly")
            }
            MlErr::Io(e) => write!(f, "io error: {e}"),
            MlErr::Json(e) => write!(f, "json error: {e}"),
            MlErr::Image { path, source } => {
                write!(f, "failed to decode {}: {source}", path.display())
            }
        }
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Io(e) => Some(e),
            MlErr::Json(e) => Some(e),
            MlErr::Image { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for MlErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for MlErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}
