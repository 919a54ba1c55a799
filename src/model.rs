use machine_learning::arch::{Sequential, activations::ActFn, layers::Layer};

use crate::ModelConfig;

/// Builds the recognizer: a frame-wise feature layer, a bidirectional recurrent encoder and a
/// linear projection onto the `num_outputs` symbols, blank included.
pub fn build_model(num_outputs: usize, config: &ModelConfig) -> Sequential {
    let height = config.adaptive_pool_height.get();
    let features = config.feature_size.get();
    let hidden = config.hidden_size.get();

    Sequential::new([
        Layer::dense((height, features), Some(ActFn::Relu)),
        Layer::birnn(features, hidden),
        Layer::dense((2 * hidden, num_outputs), None),
    ])
}
