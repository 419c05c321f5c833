use crate::candle_data_loader::*;
use crate::candle_inference::{randn_seeded, TrainConfig};
use crate::candle_model_traits::{DecoderModuleT, EncoderModuleT, LatentPriorT};

use candle_core::{Result, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use indicatif::{ProgressBar, ProgressDrawTarget};
use log::info;
use rand::Rng;

/// Variational autoencoder with a learnable latent prior
pub struct Vae<'a, Enc, Dec, Prior>
where
    Enc: EncoderModuleT,
    Dec: DecoderModuleT,
    Prior: LatentPriorT,
{
    pub encoder: &'a Enc,
    pub decoder: &'a Dec,
    pub prior: &'a Prior,
    pub variable_map: &'a candle_nn::VarMap,
}

pub trait VaeT<'a, Enc, Dec, Prior>
where
    Enc: EncoderModuleT,
    Dec: DecoderModuleT,
    Prior: LatentPriorT,
{
    /// Train the encoder, decoder and prior jointly
    /// * `data` - data loader, reshuffled every epoch
    /// * `llik` - log likelihood function
    /// * `train_config` - training configuration
    /// * `rng` - source of shuffling and reparameterization noise
    ///
    /// Returns the average loss of each epoch
    fn train_encoder_decoder<DataL, LlikFn, R>(
        &mut self,
        data: &mut DataL,
        llik: &LlikFn,
        train_config: &TrainConfig,
        rng: &mut R,
    ) -> anyhow::Result<Vec<f32>>
    where
        DataL: DataLoader,
        LlikFn: Fn(&Tensor, &Tensor) -> Result<Tensor>,
        R: Rng;

    /// Build a VAE model
    /// * `encoder` - encoder module
    /// * `decoder` - decoder module
    /// * `prior` - latent prior
    fn build(
        encoder: &'a Enc,
        decoder: &'a Dec,
        prior: &'a Prior,
        variable_map: &'a candle_nn::VarMap,
    ) -> anyhow::Result<Self>
    where
        Self: Sized;
}

impl<'a, Enc, Dec, Prior> VaeT<'a, Enc, Dec, Prior> for Vae<'a, Enc, Dec, Prior>
where
    Enc: EncoderModuleT,
    Dec: DecoderModuleT,
    Prior: LatentPriorT,
{
    fn train_encoder_decoder<DataL, LlikFn, R>(
        &mut self,
        data: &mut DataL,
        llik_func: &LlikFn,
        train_config: &TrainConfig,
        rng: &mut R,
    ) -> anyhow::Result<Vec<f32>>
    where
        DataL: DataLoader,
        LlikFn: Fn(&Tensor, &Tensor) -> Result<Tensor>,
        R: Rng,
    {
        let device = &train_config.device;
        let mut adam = AdamW::new(
            self.variable_map.all_vars(),
            ParamsAdamW {
                lr: train_config.learning_rate,
                weight_decay: train_config.weight_decay,
                ..Default::default()
            },
        )?;

        let pb = ProgressBar::new(train_config.num_epochs as u64);

        if !train_config.show_progress || train_config.verbose {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }

        let mut loss_trace = Vec::with_capacity(train_config.num_epochs);
        let print_interval = train_config.print_interval.max(1);

        for epoch in 0..train_config.num_epochs {
            data.shuffle_minibatch(train_config.batch_size, rng)?;

            let mut loss_tot = 0f32;
            let mut ntot = 0usize;

            for b in 0..data.num_minibatch() {
                let mb = data.minibatch_data(b, device)?;
                let x_nd = &mb.input;

                let (z_mean_nk, z_lnvar_nk) = self.encoder.latent_gaussian_params(x_nd)?;
                let eps_nk = randn_seeded(rng, z_mean_nk.dims2()?, device)?;
                let z_nk = (&z_mean_nk + (&z_lnvar_nk * 0.5)?.exp()?.mul(&eps_nk)?)?;

                let (_, llik) = self.decoder.forward_with_llik(&z_nk, x_nd, llik_func)?;
                let kl = self.prior.kl_loss(&z_nk, &z_mean_nk, &z_lnvar_nk)?;

                let loss = (kl - &llik)?.mean_all()?;
                let loss_val = loss.to_scalar::<f32>()?;

                if !loss_val.is_finite() {
                    return Err(anyhow::anyhow!(
                        "non-finite loss {} at epoch {}, minibatch {}",
                        loss_val,
                        epoch + 1,
                        b
                    ));
                }

                adam.backward_step(&loss)?;

                loss_tot += loss_val * mb.samples.len() as f32;
                ntot += mb.samples.len();
            }

            loss_trace.push(loss_tot / ntot.max(1) as f32);
            pb.inc(1);

            if train_config.verbose && (epoch + 1) % print_interval == 0 {
                info!(
                    "[{}] loss: {:.4}",
                    epoch + 1,
                    loss_trace.last().ok_or(anyhow::anyhow!("loss"))?
                );
            }
        } // each epoch

        pb.finish_and_clear();
        Ok(loss_trace)
    }

    fn build(
        encoder: &'a Enc,
        decoder: &'a Dec,
        prior: &'a Prior,
        variable_map: &'a candle_nn::VarMap,
    ) -> anyhow::Result<Self> {
        if encoder.dim_latent() != decoder.dim_latent()
            || encoder.dim_latent() != prior.dim_latent()
        {
            return Err(anyhow::anyhow!(
                "latent dims disagree: encoder {}, decoder {}, prior {}",
                encoder.dim_latent(),
                decoder.dim_latent(),
                prior.dim_latent()
            ));
        }

        if encoder.dim_obs() != decoder.dim_obs() {
            return Err(anyhow::anyhow!(
                "observed dims disagree: encoder {}, decoder {}",
                encoder.dim_obs(),
                decoder.dim_obs()
            ));
        }

        Ok(Self {
            encoder,
            decoder,
            prior,
            variable_map,
        })
    }
}
