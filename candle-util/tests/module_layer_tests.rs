use approx::assert_abs_diff_eq;
use candle_core::{DType, Device, Result, Tensor};
use candle_nn::{VarBuilder, VarMap};
use candle_util::candle_data_loader::*;
use candle_util::candle_decoder_sigmoid::SigmoidDecoder;
use candle_util::candle_encoder_gaussian::GaussianEncoder;
use candle_util::candle_gmm_prior::GaussianMixturePrior;
use candle_util::candle_inference::*;
use candle_util::candle_loss_functions::*;
use candle_util::candle_model_traits::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn bernoulli_likelihood_matches_closed_form() -> Result<()> {
    let dev = Device::Cpu;
    let x = Tensor::new(&[[1f32, 0., 1.]], &dev)?;
    let logit = Tensor::new(&[[0.5f32, -2.0, 30.0]], &dev)?;

    let llik = bernoulli_logit_likelihood(&x, &logit)?.to_vec1::<f32>()?;

    // x * l - ln(1 + e^l) in f64; logit 30 saturates sigmoid in f32
    let expected = [(1., 0.5f64), (0., -2.0), (1., 30.0)]
        .iter()
        .map(|&(x, l): &(f64, f64)| x * l - l.exp().ln_1p())
        .sum::<f64>() as f32;

    assert_eq!(llik.len(), 1);
    assert_abs_diff_eq!(llik[0], expected, epsilon = 1e-4);
    Ok(())
}

#[test]
fn gaussian_log_density_matches_closed_form() -> Result<()> {
    let dev = Device::Cpu;
    let z = Tensor::new(&[[0f32, 1.]], &dev)?;
    let mu = Tensor::new(&[[0f32, 0.], [1., 1.]], &dev)?;
    let lnvar = Tensor::new(&[[0f32, 0.], [2f32.ln(), 2f32.ln()]], &dev)?;

    let dens = diag_gaussian_log_density(&z, &mu, &lnvar)?.to_vec2::<f32>()?;
    let ln2pi = (2. * std::f32::consts::PI).ln();

    let c0 = -0.5 * (2. * ln2pi + 1.);
    let c1 = -0.5 * (2. * ln2pi + 2. * 2f32.ln() + 0.5);

    assert_abs_diff_eq!(dens[0][0], c0, epsilon = 1e-5);
    assert_abs_diff_eq!(dens[0][1], c1, epsilon = 1e-5);
    Ok(())
}

#[test]
fn mixture_kl_vanishes_when_posterior_equals_prior() -> Result<()> {
    let dev = Device::Cpu;
    let n_latent = 3;
    let z_mean = Tensor::zeros((2, n_latent), DType::F32, &dev)?;
    let z_lnvar = Tensor::zeros((2, n_latent), DType::F32, &dev)?;
    let log_gamma = Tensor::zeros((2, 1), DType::F32, &dev)?;
    let log_pi = Tensor::zeros(1, DType::F32, &dev)?;
    let mu = Tensor::zeros((1, n_latent), DType::F32, &dev)?;
    let lnvar = Tensor::zeros((1, n_latent), DType::F32, &dev)?;

    let kl = gaussian_mixture_kl_loss(&z_mean, &z_lnvar, &log_gamma, &log_pi, &mu, &lnvar)?
        .to_vec1::<f32>()?;

    for k in kl {
        assert_abs_diff_eq!(k, 0., epsilon = 1e-6);
    }
    Ok(())
}

#[test]
fn encoder_decoder_prior_shapes() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let parameters = VarMap::new();
    let vb = VarBuilder::from_varmap(&parameters, DType::F32, &dev);

    let (nn, dd, kk, cc) = (7, 20, 4, 3);
    let encoder = GaussianEncoder::new(dd, kk, &[16, 8], vb.pp("enc"))?;
    let decoder = SigmoidDecoder::new(dd, kk, &[], vb.pp("dec"))?;
    let prior = GaussianMixturePrior::new(cc, kk, vb.pp("prior"))?;

    let mut rng = StdRng::seed_from_u64(1);
    reseed_parameters(&parameters, &mut rng)?;

    let x = Tensor::ones((nn, dd), DType::F32, &dev)?;
    let (z_mean, z_lnvar) = encoder.latent_gaussian_params(&x)?;
    assert_eq!(z_mean.dims(), &[nn, kk]);
    assert_eq!(z_lnvar.dims(), &[nn, kk]);

    let recon = decoder.impute(&z_mean)?;
    assert_eq!(recon.dims(), &[nn, dd]);
    let pmax = recon.max_all()?.to_scalar::<f32>()?;
    let pmin = recon.min_all()?.to_scalar::<f32>()?;
    assert!(pmin >= 0. && pmax <= 1.);

    let gamma = prior.responsibility(&z_mean)?;
    assert_eq!(gamma.dims(), &[nn, cc]);
    let row_sums = gamma.sum(1)?.to_vec1::<f32>()?;
    for s in row_sums {
        assert_abs_diff_eq!(s, 1., epsilon = 1e-5);
    }

    let kl = prior.kl_loss(&z_mean, &z_mean, &z_lnvar)?;
    assert_eq!(kl.dims(), &[nn]);
    Ok(())
}

#[test]
fn reseeded_parameters_are_reproducible() -> anyhow::Result<()> {
    let dev = Device::Cpu;

    let build = |seed: u64| -> anyhow::Result<Vec<f32>> {
        let parameters = VarMap::new();
        let vb = VarBuilder::from_varmap(&parameters, DType::F32, &dev);
        let encoder = GaussianEncoder::new(5, 2, &[4], vb.pp("enc"))?;
        let mut rng = StdRng::seed_from_u64(seed);
        reseed_parameters(&parameters, &mut rng)?;
        let x = Tensor::ones((1, 5), DType::F32, &dev)?;
        let (z, _) = encoder.latent_gaussian_params(&x)?;
        Ok(z.flatten_all()?.to_vec1::<f32>()?)
    };

    assert_eq!(build(18)?, build(18)?);
    assert_ne!(build(18)?, build(19)?);
    Ok(())
}

#[test]
fn set_variable_rejects_wrong_shape() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let parameters = VarMap::new();
    let vb = VarBuilder::from_varmap(&parameters, DType::F32, &dev);
    let _prior = GaussianMixturePrior::new(2, 3, vb.pp("prior"))?;

    let good = Tensor::ones((2, 3), DType::F32, &dev)?;
    set_variable(&parameters, "prior.mu_c", &good)?;

    let bad = Tensor::ones((3, 2), DType::F32, &dev)?;
    assert!(set_variable(&parameters, "prior.mu_c", &bad).is_err());
    assert!(set_variable(&parameters, "prior.nothing", &good).is_err());
    Ok(())
}

#[test]
fn loader_visits_every_row_once_per_epoch() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let nn = 10;
    let data = Tensor::arange(0f32, (nn * 2) as f32, &dev)?.reshape((nn, 2))?;
    let mut loader = InMemoryData::new(&data)?;
    let mut rng = StdRng::seed_from_u64(7);

    for _epoch in 0..3 {
        loader.shuffle_minibatch(4, &mut rng)?;
        assert_eq!(loader.num_minibatch(), 3);

        let mut seen = vec![];
        for b in 0..loader.num_minibatch() {
            let mb = loader.minibatch_data(b, &dev)?;
            let rows = mb.input.to_vec2::<f32>()?;
            assert_eq!(rows.len(), mb.samples.len());
            for (row, &i) in rows.iter().zip(mb.samples.iter()) {
                assert_eq!(row[0], (2 * i) as f32);
            }
            seen.extend(mb.samples);
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..nn).collect::<Vec<_>>());
    }

    assert_eq!(loader.chunks().last().map(|c| c.len()), Some(2));
    assert!(loader.minibatch_data(5, &dev).is_err());
    Ok(())
}
