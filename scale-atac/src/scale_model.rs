use crate::scale_common::*;
use crate::scale_input::ScaleData;

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use candle_util::candle_data_loader::InMemoryData;
use candle_util::candle_decoder_sigmoid::SigmoidDecoder;
use candle_util::candle_encoder_gaussian::GaussianEncoder;
use candle_util::candle_gmm_prior::*;
use candle_util::candle_inference::{reseed_parameters, set_variable, TrainConfig};
use candle_util::candle_loss_functions::bernoulli_logit_likelihood;
use candle_util::candle_model_traits::*;
use candle_util::candle_vae_inference::{Vae, VaeT};
use matrix_util::dmatrix_util::argmax_rows;
use matrix_util::gaussian_mixture::{DiagGaussianMixture, GmmArgs};
use matrix_util::utils::generate_minibatch_intervals;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

const PRIOR_PREFIX: &str = "prior";

/// Number of cells pushed through the network at once outside training
const INFERENCE_BLOCK: usize = 1024;

/// Architecture `[input_dim, latent, encode_dim, decode_dim]`
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ScaleDims {
    pub input_dim: usize,
    pub latent: usize,
    pub encode_dim: Vec<usize>,
    pub decode_dim: Vec<usize>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FitArgs {
    pub lr: f64,
    pub weight_decay: f64,
    pub epochs: usize,
    pub batch_size: usize,
    pub verbose: bool,
    pub print_interval: usize,
}

/// What the pipeline needs from a clustering latent-variable model
pub trait LatentClusterModel {
    /// Initialize the mixture prior from the data embedded by the
    /// current encoder
    fn init_gmm_params(&mut self, data: &ScaleData) -> anyhow::Result<()>;

    /// Train and return the mean loss of each epoch
    fn fit(&mut self, loader: &mut InMemoryData, args: &FitArgs) -> anyhow::Result<Vec<f32>>;

    /// Replace every parameter by the ones stored in `path`
    fn load_model(&mut self, path: &str) -> anyhow::Result<()>;

    fn save_model(&self, path: &str) -> anyhow::Result<()>;

    /// Cluster of each cell
    fn predict(&self, data: &ScaleData) -> anyhow::Result<Vec<usize>>;

    /// Posterior means of the latent states (cells x latent)
    fn encode_batch(&self, data: &ScaleData) -> anyhow::Result<Mat>;

    /// Denoised accessibility on the probability scale (cells x peaks)
    fn impute(&self, data: &ScaleData) -> anyhow::Result<Mat>;
}

/// Variational deep embedding of cells with a Gaussian mixture prior
pub struct ScaleModel {
    dims: ScaleDims,
    n_centroids: usize,
    seed: u64,
    device: Device,
    rng: StdRng,
    parameters: VarMap,
    encoder: GaussianEncoder,
    decoder: SigmoidDecoder,
    prior: GaussianMixturePrior,
}

impl ScaleModel {
    /// Allocate all the parameters on `device` and initialize them
    /// from `seed`
    pub fn new(
        dims: ScaleDims,
        n_centroids: usize,
        device: &Device,
        seed: u64,
    ) -> anyhow::Result<Self> {
        if n_centroids == 0 {
            return Err(anyhow::anyhow!("need at least one centroid"));
        }

        let parameters = VarMap::new();
        let param_builder = VarBuilder::from_varmap(&parameters, DType::F32, device);

        let encoder = GaussianEncoder::new(
            dims.input_dim,
            dims.latent,
            &dims.encode_dim,
            param_builder.clone(),
        )?;

        let decoder = SigmoidDecoder::new(
            dims.input_dim,
            dims.latent,
            &dims.decode_dim,
            param_builder.clone(),
        )?;

        let prior =
            GaussianMixturePrior::new(n_centroids, dims.latent, param_builder.pp(PRIOR_PREFIX))?;

        let mut rng = StdRng::seed_from_u64(seed);
        reseed_parameters(&parameters, &mut rng)?;

        info!(
            "model: {} -> {:?} -> {} -> {:?} -> {}, {} centroids",
            dims.input_dim,
            dims.encode_dim,
            dims.latent,
            dims.decode_dim,
            dims.input_dim,
            n_centroids
        );

        Ok(Self {
            dims,
            n_centroids,
            seed,
            device: device.clone(),
            rng,
            parameters,
            encoder,
            decoder,
            prior,
        })
    }

    fn check_input(&self, data: &ScaleData) -> anyhow::Result<()> {
        if data.num_peaks() != self.dims.input_dim {
            return Err(anyhow::anyhow!(
                "data have {} peaks but the model expects {}",
                data.num_peaks(),
                self.dims.input_dim
            ));
        }
        Ok(())
    }

    /// Visit the data in blocks of rows and stack the per-block outputs
    fn map_blocks<F>(&self, data: &ScaleData, ncol_out: usize, f: F) -> anyhow::Result<Mat>
    where
        F: Fn(&Tensor) -> anyhow::Result<Tensor>,
    {
        self.check_input(data)?;

        let ntot = data.num_cells();
        let mut out = Mat::zeros(ntot, ncol_out);

        for (lb, ub) in generate_minibatch_intervals(ntot, INFERENCE_BLOCK) {
            let x_nd = data.data.rows(lb, ub - lb).into_owned().to_tensor(&self.device)?;
            let y = Mat::from_tensor(&f(&x_nd)?)?;
            out.rows_mut(lb, ub - lb).copy_from(&y);
        }
        Ok(out)
    }

    /// Posterior responsibilities `q(c|z)` at the posterior means
    /// (cells x centroids)
    pub fn responsibility(&self, data: &ScaleData) -> anyhow::Result<Mat> {
        self.map_blocks(data, self.n_centroids, |x_nd| {
            let (z_mean_nk, _) = self.encoder.latent_gaussian_params(x_nd)?;
            Ok(self.prior.responsibility(&z_mean_nk)?)
        })
    }
}

impl LatentClusterModel for ScaleModel {
    fn init_gmm_params(&mut self, data: &ScaleData) -> anyhow::Result<()> {
        let z_nk = self.encode_batch(data)?;

        let gmm = DiagGaussianMixture::fit(
            &z_nk,
            &GmmArgs {
                num_components: self.n_centroids,
                seed: self.seed,
                ..Default::default()
            },
        )?;

        let (kk, dd) = (self.n_centroids, self.dims.latent);

        let log_pi: Vec<f32> = gmm.weights.iter().map(|&w| w.max(1e-12).ln() as f32).collect();
        let mu: Vec<f32> = gmm.means.transpose().iter().map(|&x| x as f32).collect();
        let lnvar: Vec<f32> = gmm
            .variances
            .transpose()
            .iter()
            .map(|&v| v.ln() as f32)
            .collect();

        let prefixed = |name: &str| format!("{}.{}", PRIOR_PREFIX, name);

        set_variable(
            &self.parameters,
            &prefixed(GMM_LOGIT_PI),
            &Tensor::from_vec(log_pi, kk, &self.device)?,
        )?;
        set_variable(
            &self.parameters,
            &prefixed(GMM_MEAN),
            &Tensor::from_vec(mu, (kk, dd), &self.device)?,
        )?;
        set_variable(
            &self.parameters,
            &prefixed(GMM_LNVAR),
            &Tensor::from_vec(lnvar, (kk, dd), &self.device)?,
        )?;

        info!(
            "initialized {} mixture components (llik = {:.4})",
            kk, gmm.log_likelihood
        );
        Ok(())
    }

    fn fit(&mut self, loader: &mut InMemoryData, args: &FitArgs) -> anyhow::Result<Vec<f32>> {
        let train_config = TrainConfig {
            learning_rate: args.lr,
            weight_decay: args.weight_decay,
            batch_size: args.batch_size,
            num_epochs: args.epochs,
            print_interval: args.print_interval,
            device: self.device.clone(),
            verbose: args.verbose,
            show_progress: true,
        };

        let mut vae = Vae::build(&self.encoder, &self.decoder, &self.prior, &self.parameters)?;

        vae.train_encoder_decoder(
            loader,
            &bernoulli_logit_likelihood,
            &train_config,
            &mut self.rng,
        )
    }

    fn load_model(&mut self, path: &str) -> anyhow::Result<()> {
        self.parameters
            .load(path)
            .map_err(|e| anyhow::anyhow!("failed to load the model {}: {}", path, e))?;
        Ok(())
    }

    fn save_model(&self, path: &str) -> anyhow::Result<()> {
        self.parameters.save(path)?;
        Ok(())
    }

    fn predict(&self, data: &ScaleData) -> anyhow::Result<Vec<usize>> {
        Ok(argmax_rows(&self.responsibility(data)?))
    }

    fn encode_batch(&self, data: &ScaleData) -> anyhow::Result<Mat> {
        self.map_blocks(data, self.dims.latent, |x_nd| {
            let (z_mean_nk, _) = self.encoder.latent_gaussian_params(x_nd)?;
            Ok(z_mean_nk)
        })
    }

    fn impute(&self, data: &ScaleData) -> anyhow::Result<Mat> {
        self.map_blocks(data, self.dims.input_dim, |x_nd| {
            let (z_mean_nk, _) = self.encoder.latent_gaussian_params(x_nd)?;
            Ok(self.decoder.impute(&z_mean_nk)?)
        })
    }
}
