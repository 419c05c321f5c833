use crate::candle_aux_layers::*;
use crate::candle_model_traits::*;
use candle_core::{Result, Tensor};
use candle_nn::{ops, Linear, Module, VarBuilder};

/// Bernoulli decoder: `z -> hidden -> logit(p)`
pub struct SigmoidDecoder {
    n_features: usize,
    n_latent: usize,
    fc: StackLayers<Linear>,
    logit: Linear,
}

impl DecoderModuleT for SigmoidDecoder {
    fn forward(&self, z_nk: &Tensor) -> Result<Tensor> {
        let h_nl = self.fc.forward(z_nk)?;
        self.logit.forward(&h_nl)
    }

    fn dim_obs(&self) -> usize {
        self.n_features
    }

    fn dim_latent(&self) -> usize {
        self.n_latent
    }
}

impl SigmoidDecoder {
    /// Reconstruction on the probability scale (imputation)
    pub fn impute(&self, z_nk: &Tensor) -> Result<Tensor> {
        ops::sigmoid(&self.forward(z_nk)?)
    }

    /// Variables:
    ///
    /// * `nn.dec.fc.{}.weight` where {} is the layer index
    /// * `nn.dec.logit.weight`
    ///
    /// # Arguments
    /// * `n_features` - the number of output features
    /// * `n_latent` - the latent dimension
    /// * `layers` - hidden layers between latent and output (may be empty)
    /// * `vs` - variable builder
    pub fn new(n_features: usize, n_latent: usize, layers: &[usize], vs: VarBuilder) -> Result<Self> {
        let (fc, prev_dim) = relu_stack(n_latent, layers, "nn.dec.fc", vs.clone())?;
        let logit = candle_nn::linear(prev_dim, n_features, vs.pp("nn.dec.logit"))?;

        Ok(Self {
            n_features,
            n_latent,
            fc,
            logit,
        })
    }
}
