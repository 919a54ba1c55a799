use std::{num::NonZeroUsize, path::PathBuf};

use clap::{ArgAction, Parser};
use log::warn;
use machine_learning::{
    MlErr, Result,
    training::{Metric, Trigger},
};

/// Command line arguments of `train-ctc`.
#[derive(Debug, Clone, Parser)]
#[command(name = "train-ctc")]
#[command(about = "Trains a CTC handwriting recognition model", long_about = None)]
pub struct Args {
    /// Symbols table mapping from strings to integers
    pub syms: PathBuf,
    /// Directory containing the training and validation images
    pub tr_img_dir: PathBuf,
    /// Character transcriptions of each training image
    pub tr_txt_table: PathBuf,
    /// Character transcriptions of each validation image
    pub va_txt_table: PathBuf,

    /// Device to train on: 0 is the CPU, n > 0 the accelerator n - 1
    #[arg(long, default_value_t = 0)]
    pub gpu: usize,
    /// Maximum number of training epochs, 0 for no limit
    #[arg(long, default_value_t = 0)]
    pub max_epochs: usize,
    /// Maximum number of optimizer updates, 0 for no limit
    #[arg(long, default_value_t = 0)]
    pub max_updates: usize,
    /// Draw this many training samples per epoch instead of the whole dataset
    #[arg(long)]
    pub num_samples_per_epoch: Option<usize>,
    /// Seed of every random generator
    #[arg(long, default_value_t = 0x12345)]
    pub seed: u64,

    #[arg(long)]
    pub train_loss_std_window_size: Option<usize>,
    #[arg(long)]
    pub train_loss_std_threshold: Option<f64>,
    #[arg(long)]
    pub valid_cer_std_window_size: Option<usize>,
    #[arg(long)]
    pub valid_cer_std_threshold: Option<f64>,

    /// Validation batch size, training always uses single samples
    #[arg(long, default_value_t = 1)]
    pub batch_size: usize,
    #[arg(long, default_value_t = 0.015)]
    pub learning_rate: f32,
    #[arg(long, default_value_t = 0.9)]
    pub momentum: f32,
    /// Number of batches whose gradients are summed before each update
    #[arg(long, default_value_t = 10)]
    pub num_iterations_per_update: usize,
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub show_progress_bar: bool,
    /// Apply random affine distortions to the training images
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub use_distortions: bool,
    #[arg(long, default_value_t = 0.00005)]
    pub weight_l2_penalty: f32,

    /// Filename of the output model checkpoint, empty to disable
    #[arg(long, default_value = "model.ckpt")]
    pub save_checkpoint: String,
    /// Load model parameters (and optimizer state, if present) from this checkpoint
    #[arg(long)]
    pub load_checkpoint: Option<PathBuf>,

    /// Height the images are pooled to before becoming frame sequences
    #[arg(long, default_value_t = 16)]
    pub adaptive_pool_height: usize,
    /// Size of the per-frame features fed to the recurrent encoder
    #[arg(long, default_value_t = 64)]
    pub feature_size: usize,
    /// Units of each direction of the recurrent encoder
    #[arg(long, default_value_t = 128)]
    pub hidden_size: usize,
    /// Data loading threads, 0 to load on the training thread
    #[arg(long, default_value_t = 8)]
    pub num_workers: usize,
    /// Batches each loading thread keeps ready
    #[arg(long, default_value_t = 2)]
    pub prefetch: usize,
}

/// Where the model runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StdWindow {
    pub size: NonZeroUsize,
    pub threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelConfig {
    pub adaptive_pool_height: NonZeroUsize,
    pub feature_size: NonZeroUsize,
    pub hidden_size: NonZeroUsize,
}

/// Validated training settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    pub syms: PathBuf,
    pub tr_img_dir: PathBuf,
    pub tr_txt_table: PathBuf,
    pub va_txt_table: PathBuf,

    pub device: Device,
    pub seed: u64,
    pub max_epochs: Option<NonZeroUsize>,
    pub max_updates: Option<NonZeroUsize>,
    pub num_samples_per_epoch: Option<NonZeroUsize>,
    pub train_loss_std: Option<StdWindow>,
    pub valid_cer_std: Option<StdWindow>,

    pub batch_size: NonZeroUsize,
    pub learning_rate: f32,
    pub momentum: f32,
    pub weight_l2_penalty: f32,
    pub num_iterations_per_update: NonZeroUsize,
    pub show_progress_bar: bool,
    pub use_distortions: bool,

    pub save_checkpoint: Option<PathBuf>,
    pub load_checkpoint: Option<PathBuf>,

    pub model: ModelConfig,
    pub num_workers: usize,
    pub prefetch: NonZeroUsize,
}

impl TryFrom<Args> for TrainingConfig {
    type Error = MlErr;

    fn try_from(args: Args) -> Result<Self> {
        if args.gpu > 0 {
            return Err(MlErr::InvalidConfig(format!(
                "accelerator {} requested, only the CPU is supported",
                args.gpu - 1
            )));
        }
        if !(args.learning_rate.is_finite() && args.learning_rate > 0.) {
            return Err(MlErr::InvalidConfig(format!(
                "learning rate must be positive, got {}",
                args.learning_rate
            )));
        }
        if !(0. ..1.).contains(&args.momentum) {
            return Err(MlErr::InvalidConfig(format!(
                "momentum must be in [0, 1), got {}",
                args.momentum
            )));
        }
        if !(args.weight_l2_penalty.is_finite() && args.weight_l2_penalty >= 0.) {
            return Err(MlErr::InvalidConfig(format!(
                "weight L2 penalty must be non-negative, got {}",
                args.weight_l2_penalty
            )));
        }

        let num_samples_per_epoch = match args.num_samples_per_epoch {
            Some(n) => Some(non_zero("num samples per epoch", n)?),
            None => None,
        };

        Ok(Self {
            device: Device::Cpu,
            seed: args.seed,
            max_epochs: NonZeroUsize::new(args.max_epochs),
            max_updates: NonZeroUsize::new(args.max_updates),
            num_samples_per_epoch,
            train_loss_std: std_window(
                "train loss",
                args.train_loss_std_window_size,
                args.train_loss_std_threshold,
            )?,
            valid_cer_std: std_window(
                "valid CER",
                args.valid_cer_std_window_size,
                args.valid_cer_std_threshold,
            )?,
            batch_size: non_zero("batch size", args.batch_size)?,
            learning_rate: args.learning_rate,
            momentum: args.momentum,
            weight_l2_penalty: args.weight_l2_penalty,
            num_iterations_per_update: non_zero(
                "num iterations per update",
                args.num_iterations_per_update,
            )?,
            show_progress_bar: args.show_progress_bar,
            use_distortions: args.use_distortions,
            save_checkpoint: Some(args.save_checkpoint)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
            load_checkpoint: args.load_checkpoint,
            model: ModelConfig {
                adaptive_pool_height: non_zero("adaptive pool height", args.adaptive_pool_height)?,
                feature_size: non_zero("feature size", args.feature_size)?,
                hidden_size: non_zero("hidden size", args.hidden_size)?,
            },
            num_workers: args.num_workers,
            prefetch: non_zero("prefetch", args.prefetch)?,
            syms: args.syms,
            tr_img_dir: args.tr_img_dir,
            tr_txt_table: args.tr_txt_table,
            va_txt_table: args.va_txt_table,
        })
    }
}

impl TrainingConfig {
    /// The early-stop condition: any of the configured criteria.
    pub fn early_stop_trigger(&self) -> Result<Trigger> {
        let mut triggers = Vec::new();

        if let Some(n) = self.max_epochs {
            triggers.push(Trigger::NumEpochs(n.get()));
        }
        if let Some(n) = self.max_updates {
            triggers.push(Trigger::NumUpdates(n.get()));
        }
        if let Some(w) = self.train_loss_std {
            triggers.push(Trigger::meter_std_dev(Metric::TrainLoss, w.size, w.threshold)?);
        }
        if let Some(w) = self.valid_cer_std {
            triggers.push(Trigger::meter_std_dev(Metric::ValidCer, w.size, w.threshold)?);
        }

        Ok(Trigger::any(triggers))
    }
}

fn non_zero(what: &str, n: usize) -> Result<NonZeroUsize> {
    NonZeroUsize::new(n).ok_or_else(|| MlErr::InvalidConfig(format!("{what} must be positive")))
}

/// A plateau window is enabled when both its size and its threshold are non-zero. A window with
/// only one of them is ignored.
fn std_window(what: &str, size: Option<usize>, threshold: Option<f64>) -> Result<Option<StdWindow>> {
    match (size.filter(|&n| n > 0), threshold.filter(|&t| t != 0.)) {
        (Some(size), Some(threshold)) => Ok(Some(StdWindow {
            size: non_zero(what, size)?,
            threshold,
        })),
        (None, None) => Ok(None),
        _ => {
            warn!("ignoring the {what} std window, it needs both a window size and a threshold");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> std::result::Result<Args, clap::Error> {
        let mut argv = vec!["train-ctc", "syms.txt", "imgs", "tr.txt", "va.txt"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv)
    }

    fn config(extra: &[&str]) -> Result<TrainingConfig> {
        TrainingConfig::try_from(parse(extra).unwrap())
    }

    #[test]
    fn defaults_follow_the_recipe() {
        let c = config(&[]).unwrap();
        assert_eq!(c.device, Device::Cpu);
        assert_eq!(c.batch_size.get(), 1);
        assert_eq!(c.learning_rate, 0.015);
        assert_eq!(c.momentum, 0.9);
        assert_eq!(c.num_iterations_per_update.get(), 10);
        assert_eq!(c.weight_l2_penalty, 0.00005);
        assert!(c.show_progress_bar);
        assert!(c.use_distortions);
        assert_eq!(c.save_checkpoint, Some(PathBuf::from("model.ckpt")));
        assert_eq!(c.load_checkpoint, None);
        assert_eq!(c.max_epochs, None);
        assert_eq!(c.model.adaptive_pool_height.get(), 16);
        assert_eq!(c.model.hidden_size.get(), 128);
        assert_eq!(c.num_workers, 8);
        assert_eq!(c.seed, 0x12345);
        assert!(c.early_stop_trigger().unwrap().is_empty());
    }

    #[test]
    fn options_use_kebab_case() {
        let c = config(&[
            "--max-epochs",
            "3",
            "--show-progress-bar",
            "false",
            "--use-distortions",
            "false",
            "--valid-cer-std-window-size",
            "5",
            "--valid-cer-std-threshold",
            "0.01",
            "--num-samples-per-epoch",
            "100",
        ])
        .unwrap();

        assert_eq!(c.max_epochs, NonZeroUsize::new(3));
        assert!(!c.show_progress_bar);
        assert!(!c.use_distortions);
        assert_eq!(c.num_samples_per_epoch, NonZeroUsize::new(100));
        assert_eq!(
            c.valid_cer_std,
            Some(StdWindow {
                size: NonZeroUsize::new(5).unwrap(),
                threshold: 0.01
            })
        );

        let trigger = c.early_stop_trigger().unwrap();
        assert!(matches!(&trigger, Trigger::Any(t) if t.len() == 2));
    }

    #[test]
    fn accelerators_are_rejected() {
        assert!(matches!(config(&["--gpu", "1"]), Err(MlErr::InvalidConfig(_))));
        assert!(config(&["--gpu", "0"]).is_ok());
    }

    #[test]
    fn invalid_values_are_config_errors() {
        for extra in [
            &["--batch-size", "0"][..],
            &["--num-iterations-per-update", "0"],
            &["--learning-rate", "0"],
            &["--momentum", "1"],
            &["--num-samples-per-epoch", "0"],
        ] {
            assert!(
                matches!(config(extra), Err(MlErr::InvalidConfig(_))),
                "{extra:?}"
            );
        }

        assert!(parse(&["--max-epochs", "many"]).is_err());
    }

    #[test]
    fn incomplete_std_windows_are_ignored() {
        let c = config(&["--train-loss-std-window-size", "4"]).unwrap();
        assert_eq!(c.train_loss_std, None);

        let c = config(&["--valid-cer-std-threshold", "0.1"]).unwrap();
        assert_eq!(c.valid_cer_std, None);
    }

    #[test]
    fn empty_save_path_disables_checkpoints() {
        let c = config(&["--save-checkpoint", ""]).unwrap();
        assert_eq!(c.save_checkpoint, None);
    }
}
