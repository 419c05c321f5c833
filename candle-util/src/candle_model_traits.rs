use candle_core::{Result, Tensor};

pub trait EncoderModuleT {
    /// Gaussian posterior parameters of the latent states
    ///
    /// # Arguments
    /// * `x_nd` - input data (n x d)
    ///
    /// # Returns `(z_mean_nk, z_lnvar_nk)`
    /// * `z_mean_nk` - posterior mean (n x k)
    /// * `z_lnvar_nk` - posterior log-variance (n x k)
    fn latent_gaussian_params(&self, x_nd: &Tensor) -> Result<(Tensor, Tensor)>;

    fn dim_obs(&self) -> usize;

    fn dim_latent(&self) -> usize;
}

pub trait DecoderModuleT {
    /// A decoder that spits out reconstruction on the linear
    /// predictor (logit) scale
    fn forward(&self, z_nk: &Tensor) -> Result<Tensor>;

    /// A decoder that spits out reconstruction and log-likelihood
    /// * `z_nk` - latent states
    /// * `x_nd` - observed data to validate with
    /// * `llik` - fn (observed, reconstruction) -> log-likelihood
    fn forward_with_llik<LlikFn>(
        &self,
        z_nk: &Tensor,
        x_nd: &Tensor,
        llik: &LlikFn,
    ) -> Result<(Tensor, Tensor)>
    where
        LlikFn: Fn(&Tensor, &Tensor) -> Result<Tensor>,
    {
        let recon_nd = self.forward(z_nk)?;
        let llik_n = llik(x_nd, &recon_nd)?;
        Ok((recon_nd, llik_n))
    }

    fn dim_obs(&self) -> usize;

    fn dim_latent(&self) -> usize;
}

pub trait LatentPriorT {
    /// KL divergence between the Gaussian posterior and the prior,
    /// evaluated at a sample `z_nk` of the posterior
    ///
    /// # Returns `kl_n` (n)
    fn kl_loss(&self, z_nk: &Tensor, z_mean_nk: &Tensor, z_lnvar_nk: &Tensor) -> Result<Tensor>;

    /// Posterior membership probabilities `q(c|z)` (n x c)
    fn responsibility(&self, z_nk: &Tensor) -> Result<Tensor>;

    fn num_components(&self) -> usize;

    fn dim_latent(&self) -> usize;
}
