use std::{
    ffi::OsString,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use anyhow::Context;
use log::info;
use machine_learning::{
    arch::{Model, loss::Ctc},
    data::{DataLoader, Distortion, ImageToSequence, Sampler, SymbolTable, TextImageDataset},
    optimization::{Optimizer, Sgd},
    training::{Checkpoint, Event, Metric, SaveModelCheckpointHook, Status, Trainer},
};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{TrainingConfig, build_model};

const BEST_VALID_CER_SUFFIX: &str = "-valid-lowest-cer";

/// Trains a model as configured, saving the best and the final checkpoints.
///
/// # Returns
/// The status the trainer finished with.
pub fn train(config: &TrainingConfig) -> anyhow::Result<Status> {
    info!("training with {config:?}");
    let mut rng = StdRng::seed_from_u64(config.seed);

    let syms = SymbolTable::load(&config.syms)
        .with_context(|| format!("failed to load symbols from {}", config.syms.display()))?;
    let model = build_model(syms.num_outputs(), &config.model);
    let mut params = model.init_params(&mut rng)?;
    info!(
        "model with {} parameters and {} outputs",
        params.len(),
        syms.num_outputs()
    );

    let mut optimizer = Sgd::new(
        params.len(),
        config.learning_rate,
        config.momentum,
        config.weight_l2_penalty,
    );

    if let Some(path) = &config.load_checkpoint {
        info!("Loading parameters from {}", path.display());
        let (loaded, state) = Checkpoint::load(path, params.len())
            .with_context(|| format!("failed to load checkpoint {}", path.display()))?;
        params = loaded;
        if let Some(state) = state {
            optimizer.load_state(state)?;
        }
    }

    let distortion = config.use_distortions.then(Distortion::default);
    let tr_ds = TextImageDataset::new(&config.tr_txt_table, &config.tr_img_dir, &syms, distortion)
        .context("failed to load the training set")?;
    let va_ds = TextImageDataset::new(&config.va_txt_table, &config.tr_img_dir, &syms, None)
        .context("failed to load the validation set")?;

    let to_sequence = ImageToSequence::new(config.model.adaptive_pool_height);
    let sampler = match config.num_samples_per_epoch {
        Some(n) => Sampler::FixedSize {
            num_samples: n.get(),
        },
        None => Sampler::Shuffle,
    };

    let train = DataLoader::new(tr_ds, NonZeroUsize::MIN, sampler, to_sequence, rng.random())
        .with_workers(config.num_workers, config.prefetch);
    let valid = DataLoader::new(
        va_ds,
        config.batch_size,
        Sampler::Sequential,
        to_sequence,
        rng.random(),
    )
    .with_workers(config.num_workers, config.prefetch);

    let mut trainer = Trainer::new(
        model,
        params,
        optimizer,
        Ctc::default(),
        train,
        config.num_iterations_per_update,
    )?
    .with_validation(valid)
    .with_trigger(config.early_stop_trigger()?)
    .with_progress(config.show_progress_bar);

    if let Some(save) = &config.save_checkpoint {
        let best = with_suffix(save, BEST_VALID_CER_SUFFIX);
        let hook = SaveModelCheckpointHook::new(Metric::ValidCer, &best)
            .with_context(|| format!("failed to prepare {}", best.display()))?;
        trainer.add_hook(Event::EpochEnd, hook);
    }

    let status = trainer.run()?;
    info!(
        "training {status} after {} epochs and {} updates",
        trainer.state().epochs,
        trainer.state().updates
    );

    if let Some(save) = &config.save_checkpoint {
        Checkpoint::new(trainer.params(), trainer.optimizer())
            .save(save)
            .with_context(|| format!("failed to save {}", save.display()))?;
        info!("saved final checkpoint to {}", save.display());
    }

    Ok(status)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = OsString::from(path.as_os_str());
    s.push(suffix);
    PathBuf::from(s)
}
