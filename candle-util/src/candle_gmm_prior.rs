use crate::candle_loss_functions::*;
use crate::candle_model_traits::LatentPriorT;
use candle_core::{Result, Tensor};
use candle_nn::{ops, VarBuilder};

pub const GMM_LOGIT_PI: &str = "logit_pi";
pub const GMM_MEAN: &str = "mu_c";
pub const GMM_LNVAR: &str = "lnvar_c";

/// Gaussian mixture prior on the latent space
///
/// p(z) = sum_c pi(c) N(z | mu(c,:), diag(var(c,:)))
///
/// Variables (under the builder's prefix):
/// * `logit_pi` - mixture logits (c)
/// * `mu_c` - component means (c x k)
/// * `lnvar_c` - component log-variances (c x k)
pub struct GaussianMixturePrior {
    n_components: usize,
    n_latent: usize,
    logit_pi_c: Tensor,
    mu_ck: Tensor,
    lnvar_ck: Tensor,
}

impl GaussianMixturePrior {
    pub fn new(n_components: usize, n_latent: usize, vs: VarBuilder) -> Result<Self> {
        let logit_pi_c = vs.get_with_hints(n_components, GMM_LOGIT_PI, candle_nn::init::ZERO)?;
        let mu_ck = vs.get_with_hints((n_components, n_latent), GMM_MEAN, candle_nn::init::ZERO)?;
        let lnvar_ck =
            vs.get_with_hints((n_components, n_latent), GMM_LNVAR, candle_nn::init::ZERO)?;

        Ok(Self {
            n_components,
            n_latent,
            logit_pi_c,
            mu_ck,
            lnvar_ck,
        })
    }

    /// log pi(c), normalized
    pub fn log_weights(&self) -> Result<Tensor> {
        ops::log_softmax(&self.logit_pi_c, 0)
    }

    /// clamped component log-variances
    pub fn log_variances(&self) -> Result<Tensor> {
        self.lnvar_ck.clamp(-8., 8.)
    }

    /// log pi(c) + log N(z | mu(c), var(c)) (n x c)
    fn log_joint(&self, z_nk: &Tensor) -> Result<Tensor> {
        let log_pi_c = self.log_weights()?;
        diag_gaussian_log_density(z_nk, &self.mu_ck, &self.log_variances()?)?
            .broadcast_add(&log_pi_c.unsqueeze(0)?)
    }
}

impl LatentPriorT for GaussianMixturePrior {
    fn kl_loss(&self, z_nk: &Tensor, z_mean_nk: &Tensor, z_lnvar_nk: &Tensor) -> Result<Tensor> {
        let log_gamma_nc = ops::log_softmax(&self.log_joint(z_nk)?, 1)?;

        gaussian_mixture_kl_loss(
            z_mean_nk,
            z_lnvar_nk,
            &log_gamma_nc,
            &self.log_weights()?,
            &self.mu_ck,
            &self.log_variances()?,
        )
    }

    fn responsibility(&self, z_nk: &Tensor) -> Result<Tensor> {
        ops::softmax(&self.log_joint(z_nk)?, 1)
    }

    fn num_components(&self) -> usize {
        self.n_components
    }

    fn dim_latent(&self) -> usize {
        self.n_latent
    }
}
