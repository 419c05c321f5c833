use candle_core::{Device, Tensor};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal, Uniform};

pub struct TrainConfig {
    pub learning_rate: f64,
    pub weight_decay: f64,
    pub batch_size: usize,
    pub num_epochs: usize,
    pub print_interval: usize,
    pub device: Device,
    pub verbose: bool,
    pub show_progress: bool,
}

/// Sample an `N(0,1)` tensor of `shape` from the given generator
///
/// candle's own CPU generator cannot be seeded, so every noise
/// tensor that should be reproducible goes through this.
pub fn randn_seeded<R: Rng + ?Sized>(
    rng: &mut R,
    shape: (usize, usize),
    dev: &Device,
) -> anyhow::Result<Tensor> {
    let (nn, kk) = shape;
    let rvec: Vec<f32> = (0..(nn * kk)).map(|_| StandardNormal.sample(rng)).collect();
    Ok(Tensor::from_vec(rvec, shape, dev)?)
}

/// Re-initialize all the variables in `parameters` from `rng`
///
/// Variables are visited in the sorted order of their names.
/// * `*.weight` of shape (out, in) ~ U(-1/sqrt(in), 1/sqrt(in))
/// * everything else is set to zero
pub fn reseed_parameters<R: Rng + ?Sized>(
    parameters: &candle_nn::VarMap,
    rng: &mut R,
) -> anyhow::Result<()> {
    let vars = parameters
        .data()
        .lock()
        .map_err(|_| anyhow::anyhow!("failed to lock the variable map"))?;

    let mut names = vars.keys().cloned().collect::<Vec<_>>();
    names.sort();

    for name in names {
        let var = vars
            .get(&name)
            .ok_or(anyhow::anyhow!("missing variable {}", name))?;

        let dims = var.dims().to_vec();
        let ntot = dims.iter().product::<usize>();

        let values: Vec<f32> = match dims.as_slice() {
            [_, fan_in] if name.ends_with("weight") && *fan_in > 0 => {
                let bound = 1. / (*fan_in as f32).sqrt();
                let unif = Uniform::new(-bound, bound).map_err(|e| anyhow::anyhow!("{}", e))?;
                (0..ntot).map(|_| unif.sample(rng)).collect()
            }
            _ => vec![0_f32; ntot],
        };

        let value = Tensor::from_vec(values, dims, var.device())?.to_dtype(var.dtype())?;
        var.set(&value)?;
    }
    Ok(())
}

/// Overwrite one variable by its full name
pub fn set_variable(
    parameters: &candle_nn::VarMap,
    name: &str,
    value: &Tensor,
) -> anyhow::Result<()> {
    let vars = parameters
        .data()
        .lock()
        .map_err(|_| anyhow::anyhow!("failed to lock the variable map"))?;

    let var = vars
        .get(name)
        .ok_or(anyhow::anyhow!("missing variable {}", name))?;

    if var.dims() != value.dims() {
        return Err(anyhow::anyhow!(
            "shape mismatch for {}: {:?} vs. {:?}",
            name,
            var.dims(),
            value.dims()
        ));
    }

    var.set(&value.to_device(var.device())?.to_dtype(var.dtype())?)?;
    Ok(())
}
