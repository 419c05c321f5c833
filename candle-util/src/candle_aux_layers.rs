use candle_core::{Result, Tensor};
use candle_nn::{Activation, Linear, Module, VarBuilder};

/// Layers applied in order, each followed by its activation
pub struct StackLayers<M>
where
    M: Module,
{
    layers: Vec<(M, Activation)>,
}

impl<M> Module for StackLayers<M>
where
    M: Module,
{
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        self.layers
            .iter()
            .try_fold(input.clone(), |x, (layer, act)| act.forward(&layer.forward(&x)?))
    }
}

impl<M> StackLayers<M>
where
    M: Module,
{
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    pub fn push_with_act(&mut self, layer: M, activation: Activation) {
        self.layers.push((layer, activation));
    }
}

impl<M> Default for StackLayers<M>
where
    M: Module,
{
    fn default() -> Self {
        Self::new()
    }
}

/// A fully connected ReLU stack `in_dim -> layers[0] -> ... -> layers[-1]`
///
/// Variables are named `{prefix}.{j}.weight` and `{prefix}.{j}.bias`.
/// Returns the stack and the output dimension (`in_dim` if `layers`
/// is empty).
pub fn relu_stack(
    in_dim: usize,
    layers: &[usize],
    prefix: &str,
    vs: VarBuilder,
) -> Result<(StackLayers<Linear>, usize)> {
    let mut fc = StackLayers::<Linear>::new();
    let mut prev_dim = in_dim;
    for (j, &next_dim) in layers.iter().enumerate() {
        let layer = candle_nn::linear(prev_dim, next_dim, vs.pp(format!("{}.{}", prefix, j)))?;
        fc.push_with_act(layer, Activation::Relu);
        prev_dim = next_dim;
    }
    Ok((fc, prev_dim))
}
