use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use log::info;
use serde::{Deserialize, Serialize};

use super::{Hook, HookContext, Metric};
use crate::{
    MlErr, Result,
    optimization::{Optimizer, OptimizerState},
};

/// The parameters of a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
    pub size: usize,
    pub params: Vec<f32>,
}

/// A durable snapshot of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub model: ModelState,
    pub optimizer: OptimizerState,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Record {
    Full(Checkpoint),
    ModelOnly(ModelState),
}

impl Checkpoint {
    pub fn new(params: &[f32], optimizer: &dyn Optimizer) -> Self {
        Self {
            model: ModelState {
                size: params.len(),
                params: params.to_vec(),
            },
            optimizer: optimizer.state(),
        }
    }

    /// Writes the checkpoint to `path` as JSON, replacing any previous file.
    ///
    /// The record is written to a sibling `<path>.tmp` first and renamed into place, so a failed
    /// write leaves the previous file untouched.
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp = tmp_path(path);
        let written = File::create(&tmp).map_err(MlErr::from).and_then(|file| {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, self)?;
            writer.flush()?;
            Ok(())
        });

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Reads a full checkpoint or a model-only one.
    ///
    /// # Arguments
    /// * `path` - The checkpoint file.
    /// * `size` - The amount of parameters the model expects.
    ///
    /// # Returns
    /// The model parameters and, if present, the optimizer state.
    pub fn load(path: &Path, size: usize) -> Result<(Vec<f32>, Option<OptimizerState>)> {
        let reader = BufReader::new(File::open(path)?);
        let record: Record = serde_json::from_reader(reader).map_err(|e| MlErr::Checkpoint {
            path: path.to_path_buf(),
            msg: e.to_string(),
        })?;

        let (model, optimizer) = match record {
            Record::Full(Checkpoint { model, optimizer }) => (model, Some(optimizer)),
            Record::ModelOnly(model) => (model, None),
        };

        if model.size != size || model.params.len() != size {
            return Err(MlErr::Checkpoint {
                path: path.to_path_buf(),
                msg: format!(
                    "expected {size} parameters, found size {} with {} values",
                    model.size,
                    model.params.len()
                ),
            });
        }

        info!(
            "loaded {} checkpoint from {}",
            if optimizer.is_some() { "full" } else { "model-only" },
            path.display()
        );
        Ok((model.params, optimizer))
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Saves a checkpoint every time a metric reaches a new minimum.
#[derive(Debug, Clone)]
pub struct SaveModelCheckpointHook {
    metric: Metric,
    path: PathBuf,
    lowest: f64,
}

impl SaveModelCheckpointHook {
    /// Creates a new `SaveModelCheckpointHook`, creating the parent directories of `path`.
    ///
    /// # Arguments
    /// * `metric` - The metric to minimize.
    /// * `path` - Where the checkpoint is written.
    pub fn new(metric: Metric, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        Ok(Self {
            metric,
            path,
            lowest: f64::INFINITY,
        })
    }

    /// The lowest value seen so far, `+inf` before the first one.
    pub fn lowest(&self) -> f64 {
        self.lowest
    }
}

impl Hook for SaveModelCheckpointHook {
    fn call(&mut self, ctx: &HookContext<'_>) -> Result<()> {
        let Some(value) = ctx.state.meters.value(self.metric) else {
            return Ok(());
        };
        if value >= self.lowest {
            return Ok(());
        }

        self.lowest = value;
        info!("New lowest {}: {value}", self.metric);
        Checkpoint::new(ctx.params, ctx.optimizer).save(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{optimization::Sgd, training::TrainerState};

    fn state_with_cer(errors: usize) -> TrainerState {
        let mut state = TrainerState::default();
        let hyp = vec![1; 10 - errors];
        state.meters.valid_cer.add(&hyp, &[1; 10]);
        state
    }

    #[test]
    fn round_trip_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.ckpt");

        let params = vec![0.1, -3.5e-7, 1e10, f32::MIN_POSITIVE];
        let mut sgd = Sgd::new(4, 0.015, 0.9, 5e-5);
        sgd.update_params(&[1., 2., 3., 4.], &mut params.clone()).unwrap();

        let ckpt = Checkpoint::new(&params, &sgd);
        ckpt.save(&path).unwrap();

        let (loaded, optimizer) = Checkpoint::load(&path, 4).unwrap();
        assert_eq!(loaded, params);
        assert_eq!(optimizer, Some(sgd.state()));
    }

    #[test]
    fn loads_model_only_records_and_checks_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        fs::write(&path, r#"{"size": 2, "params": [1.0, 2.0]}"#).unwrap();

        let (params, optimizer) = Checkpoint::load(&path, 2).unwrap();
        assert_eq!(params, [1., 2.]);
        assert!(optimizer.is_none());

        let err = Checkpoint::load(&path, 3).unwrap_err();
        assert!(matches!(err, MlErr::Checkpoint { .. }));
    }

    #[test]
    fn hook_writes_only_on_a_strictly_lower_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/best.ckpt");
        let mut hook = SaveModelCheckpointHook::new(Metric::ValidCer, &path).unwrap();
        assert!(path.parent().unwrap().is_dir());
        assert_eq!(hook.lowest(), f64::INFINITY);

        let sgd = Sgd::new(1, 0.1, 0., 0.);
        let mut lowest = Vec::new();
        for (errors, param, saved) in [(5, 1., 1.), (3, 2., 2.), (3, 3., 2.), (7, 4., 2.)] {
            let state = state_with_cer(errors);
            let params = [param];
            let ctx = HookContext {
                state: &state,
                params: &params,
                optimizer: &sgd,
            };

            hook.call(&ctx).unwrap();
            let (best, _) = Checkpoint::load(&path, 1).unwrap();
            assert_eq!(best, [saved], "errors = {errors}");
            lowest.push(hook.lowest());
        }

        assert_eq!(lowest, [0.5, 0.3, 0.3, 0.3]);
    }

    #[test]
    fn save_replaces_the_previous_file_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.ckpt-valid-lowest-cer");
        let sgd = Sgd::new(2, 0.1, 0., 0.);

        Checkpoint::new(&[1., 2.], &sgd).save(&path).unwrap();
        Checkpoint::new(&[3., 4.], &sgd).save(&path).unwrap();

        let (params, _) = Checkpoint::load(&path, 2).unwrap();
        assert_eq!(params, [3., 4.]);
        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, [path.file_name().unwrap()]);
    }

    #[test]
    fn failed_save_keeps_the_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.ckpt");
        let sgd = Sgd::new(1, 0.1, 0., 0.);
        Checkpoint::new(&[1.], &sgd).save(&path).unwrap();

        // A directory where the temporary file should go makes the write fail.
        fs::create_dir(tmp_path(&path)).unwrap();
        assert!(Checkpoint::new(&[2.], &sgd).save(&path).is_err());

        let (params, _) = Checkpoint::load(&path, 1).unwrap();
        assert_eq!(params, [1.]);
    }

    #[test]
    fn hook_ignores_missing_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("best.ckpt");
        let mut hook = SaveModelCheckpointHook::new(Metric::ValidCer, &path).unwrap();

        let state = TrainerState::default();
        let sgd = Sgd::new(0, 0.1, 0., 0.);
        let ctx = HookContext {
            state: &state,
            params: &[],
            optimizer: &sgd,
        };
        hook.call(&ctx).unwrap();
        assert!(!path.exists());
    }
}
