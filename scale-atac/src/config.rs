use crate::device::*;
use crate::scale_common::*;
use crate::scale_model::{FitArgs, ScaleDims};
use clap::Parser;
use serde::Serialize;

/// Values used for anything not given on the command line
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleDefaults {
    pub batch_size: usize,
    pub lr: f64,
    pub weight_decay: f64,
    pub epochs: usize,
    pub latent: usize,
    pub encode_dim: Vec<usize>,
    pub decode_dim: Vec<usize>,
    pub print_interval: usize,
}

impl Default for ScaleDefaults {
    fn default() -> Self {
        Self {
            batch_size: 32,
            lr: 0.002,
            weight_decay: 5e-4,
            epochs: 300,
            latent: 10,
            encode_dim: vec![3200, 1600, 800, 400],
            decode_dim: vec![],
            print_interval: 10,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "scale",
    version,
    about = "SCALE: Single-Cell ATAC-seq analysis via Latent feature Extraction",
    long_about = "Single-Cell ATAC-seq analysis via Latent feature Extraction\n\
		  Input: a peaks x cells matrix (plain text or gzipped).\n\
		  Output: (1) latent features (2) cluster assignments\n\
		  (3) imputed data and (4) the fitted model."
)]
pub struct ScaleArgs {
    #[arg(
        long,
        short = 'd',
        required = true,
        help = "Input data matrix, peaks x cells",
        long_help = "Input data matrix with peaks in rows and cells in columns.\n\
		     The first line holds the cell names and the first column\n\
		     the peak names. Files ending with `.gz` are decompressed."
    )]
    pub data: Box<str>,

    #[arg(
        long = "n_centroids",
        visible_alias = "n-centroids",
        short = 'k',
        required = true,
        help = "Number of clusters"
    )]
    pub n_centroids: usize,

    #[arg(
        long,
        default_value = "\\t",
        help = "Field separator of the input",
        long_help = "Field separator of the input, e.g., `\\t` or `,`.\n\
		     `\\t` and `tab` both mean a tab."
    )]
    pub sep: Box<str>,

    #[arg(long, short = 'o', default_value = "output/", help = "Output directory")]
    pub outdir: Box<str>,

    #[arg(
        long = "no_results",
        visible_alias = "no-results",
        default_value_t = false,
        help = "Do not save the results"
    )]
    pub no_results: bool,

    #[arg(
        long,
        default_value_t = false,
        help = "Print the training loss",
        long_help = "Print the training loss every `print_interval` epochs\n\
		     instead of showing a progress bar."
    )]
    pub verbose: bool,

    #[arg(
        long,
        short = 'r',
        help = "Reference labels",
        long_help = "Reference labels to report clustering accuracy.\n\
		     One line per cell: `label` or `cell<tab>label`."
    )]
    pub reference: Option<Box<str>>,

    #[arg(
        long,
        help = "Load a trained model",
        long_help = "Load a trained model (`model.safetensors` of an earlier run)\n\
		     instead of training."
    )]
    pub pretrain: Option<Box<str>>,

    #[arg(long, short = 'e', help = "Training epochs [default: 300]")]
    pub epochs: Option<usize>,

    #[arg(long, help = "Learning rate [default: 0.002]")]
    pub lr: Option<f64>,

    #[arg(
        long = "weight_decay",
        visible_alias = "weight-decay",
        help = "AdamW weight decay [default: 5e-4]"
    )]
    pub weight_decay: Option<f64>,

    #[arg(
        long = "batch_size",
        visible_alias = "batch-size",
        short = 'b',
        help = "Minibatch size [default: 32]"
    )]
    pub batch_size: Option<usize>,

    #[arg(
        long,
        value_enum,
        default_value = "cuda",
        help = "Candle device",
        long_help = "Candle device: cpu, cuda or metal.\n\
		     An accelerator that is not available falls back to cpu."
    )]
    pub device: ComputeDevice,

    #[arg(
        long = "device_no",
        visible_alias = "device-no",
        default_value_t = 0,
        help = "Accelerator ordinal"
    )]
    pub device_no: usize,

    #[arg(long, default_value_t = 18, help = "Random seed for repeatable results")]
    pub seed: u64,

    #[arg(
        long = "input_dim",
        visible_alias = "input-dim",
        help = "Number of peaks to keep",
        long_help = "Keep this many peaks, those open in the most cells."
    )]
    pub input_dim: Option<usize>,

    #[arg(
        long = "log_transform",
        visible_alias = "log-transform",
        default_value_t = false,
        help = "Transform the input by log2(x + 1)"
    )]
    pub log_transform: bool,

    #[arg(
        long = "gene_filter",
        visible_alias = "gene-filter",
        default_value_t = false,
        help = "Filter peaks as SC3 does"
    )]
    pub gene_filter: bool,

    #[arg(
        long,
        short = 'x',
        default_value_t = 6.,
        help = "Percent of cells used by the gene filter"
    )]
    pub pct: f32,

    #[arg(long, help = "Latent dimension [default: 10]")]
    pub latent: Option<usize>,

    #[arg(
        long = "encode_dim",
        visible_alias = "encode-dim",
        value_delimiter(','),
        help = "Encoder layers [default: 3200,1600,800,400]"
    )]
    pub encode_dim: Option<Vec<usize>>,

    #[arg(
        long = "decode_dim",
        visible_alias = "decode-dim",
        value_delimiter(','),
        help = "Decoder hidden layers [default: none]"
    )]
    pub decode_dim: Option<Vec<usize>>,

    #[arg(
        long = "print_interval",
        visible_alias = "print-interval",
        help = "Epochs between loss lines [default: 10]"
    )]
    pub print_interval: Option<usize>,
}

/// Train a fresh model or load a trained one
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "plan", rename_all = "snake_case")]
pub enum RunPlan {
    TrainFromScratch(FitArgs),
    LoadCheckpoint { path: Box<str> },
}

/// Everything a run needs, resolved once from the command line
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub data: Box<str>,
    pub sep: Box<str>,
    pub n_centroids: usize,
    pub batch_size: usize,
    pub device: ComputeDevice,
    pub device_no: usize,
    pub seed: u64,
    pub input_dim: Option<usize>,
    pub log_transform: bool,
    pub gene_filter: bool,
    pub pct: f32,
    /// training epochs as resolved, shown even when loading
    pub epochs: usize,
    pub plan: RunPlan,
    pub reference: Option<Box<str>>,
    pub outdir: Box<str>,
    pub no_results: bool,
    pub verbose: bool,
    pub latent: usize,
    pub encode_dim: Vec<usize>,
    pub decode_dim: Vec<usize>,
}

impl RunConfig {
    /// Merge the command line with the defaults and check the result
    pub fn resolve(
        args: &ScaleArgs,
        defaults: &ScaleDefaults,
        available: &AvailableDevices,
    ) -> anyhow::Result<Self> {
        if args.n_centroids == 0 {
            return Err(anyhow::anyhow!("n_centroids must be positive"));
        }

        // only to validate; the loader parses it again
        Delimiter::from_user_str(&args.sep)?;

        if !(0. ..=100.).contains(&args.pct) {
            return Err(anyhow::anyhow!("pct {} is not in [0, 100]", args.pct));
        }

        if args.input_dim == Some(0) {
            return Err(anyhow::anyhow!("input_dim must be positive"));
        }

        let batch_size = args.batch_size.unwrap_or(defaults.batch_size);
        if batch_size == 0 {
            return Err(anyhow::anyhow!("batch_size must be positive"));
        }

        let latent = args.latent.unwrap_or(defaults.latent);
        if latent == 0 {
            return Err(anyhow::anyhow!("latent dimension must be positive"));
        }

        let encode_dim = args
            .encode_dim
            .clone()
            .unwrap_or_else(|| defaults.encode_dim.clone());
        let decode_dim = args
            .decode_dim
            .clone()
            .unwrap_or_else(|| defaults.decode_dim.clone());

        if encode_dim.iter().chain(decode_dim.iter()).any(|&d| d == 0) {
            return Err(anyhow::anyhow!("layer sizes must be positive"));
        }

        let epochs = args.epochs.unwrap_or(defaults.epochs);

        let plan = match args.pretrain.as_deref().filter(|p| !p.is_empty()) {
            Some(path) => RunPlan::LoadCheckpoint { path: path.into() },
            None => {
                let fit = FitArgs {
                    lr: args.lr.unwrap_or(defaults.lr),
                    weight_decay: args.weight_decay.unwrap_or(defaults.weight_decay),
                    epochs,
                    batch_size,
                    verbose: args.verbose,
                    print_interval: args.print_interval.unwrap_or(defaults.print_interval),
                };

                if fit.epochs == 0 {
                    return Err(anyhow::anyhow!("epochs must be positive"));
                }
                if !(fit.lr.is_finite() && fit.lr > 0.) {
                    return Err(anyhow::anyhow!("lr must be positive, got {}", fit.lr));
                }
                if !(fit.weight_decay.is_finite() && fit.weight_decay >= 0.) {
                    return Err(anyhow::anyhow!(
                        "weight_decay must be non-negative, got {}",
                        fit.weight_decay
                    ));
                }
                if fit.print_interval == 0 {
                    return Err(anyhow::anyhow!("print_interval must be positive"));
                }
                RunPlan::TrainFromScratch(fit)
            }
        };

        let device = resolve_device(args.device, available);
        if device != args.device {
            info!("{} is not available; using {}", args.device, device);
        }

        Ok(Self {
            data: args.data.clone(),
            sep: args.sep.clone(),
            n_centroids: args.n_centroids,
            batch_size,
            device,
            device_no: args.device_no,
            seed: args.seed,
            input_dim: args.input_dim,
            log_transform: args.log_transform,
            gene_filter: args.gene_filter,
            pct: args.pct,
            epochs,
            plan,
            reference: args.reference.clone().filter(|r| !r.is_empty()),
            outdir: args.outdir.clone(),
            no_results: args.no_results,
            verbose: args.verbose,
            latent,
            encode_dim,
            decode_dim,
        })
    }

    /// Model architecture for data with `input_dim` peaks
    pub fn dims(&self, input_dim: usize) -> ScaleDims {
        ScaleDims {
            input_dim,
            latent: self.latent,
            encode_dim: self.encode_dim.clone(),
            decode_dim: self.decode_dim.clone(),
        }
    }

    pub fn epochs(&self) -> usize {
        self.epochs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> anyhow::Result<RunConfig> {
        let mut argv = vec!["scale", "-d", "data.txt", "-k", "5"];
        argv.extend_from_slice(extra);
        let args = ScaleArgs::try_parse_from(argv)?;
        RunConfig::resolve(&args, &ScaleDefaults::default(), &AvailableDevices::cpu_only())
    }

    #[test]
    fn unset_options_take_defaults() -> anyhow::Result<()> {
        let config = parse(&[])?;
        let defaults = ScaleDefaults::default();

        assert_eq!(config.batch_size, defaults.batch_size);
        assert_eq!(config.encode_dim, defaults.encode_dim);
        assert!(!config.verbose);
        assert!(!config.no_results);
        assert_eq!(config.seed, 18);
        assert_eq!(config.pct, 6.);
        assert_eq!(&*config.outdir, "output/");
        assert_eq!(config.reference, None);

        match config.plan {
            RunPlan::TrainFromScratch(fit) => {
                assert_eq!(fit.epochs, defaults.epochs);
                assert_eq!(fit.lr, defaults.lr);
                assert_eq!(fit.batch_size, defaults.batch_size);
                assert_eq!(fit.print_interval, defaults.print_interval);
            }
            RunPlan::LoadCheckpoint { .. } => panic!("expected training"),
        }
        Ok(())
    }

    #[test]
    fn given_options_override_defaults() -> anyhow::Result<()> {
        let config = parse(&[
            "--batch_size",
            "64",
            "--epochs",
            "7",
            "--lr",
            "0.01",
            "--encode_dim",
            "64,32",
            "--verbose",
        ])?;
        assert_eq!(config.batch_size, 64);
        assert_eq!(config.encode_dim, vec![64, 32]);
        assert!(config.verbose);
        assert_eq!(config.epochs(), 7);
        Ok(())
    }

    #[test]
    fn pretrain_selects_loading() -> anyhow::Result<()> {
        let config = parse(&["--pretrain", "out/model.safetensors", "-e", "0"])?;
        // zero epochs is fine when nothing is trained
        assert_eq!(
            config.plan,
            RunPlan::LoadCheckpoint {
                path: "out/model.safetensors".into()
            }
        );
        assert_eq!(config.epochs(), 0);
        Ok(())
    }

    #[test]
    fn cuda_request_falls_back_on_cpu_host() -> anyhow::Result<()> {
        let config = parse(&["--device", "cuda"])?;
        assert_eq!(config.device, ComputeDevice::Cpu);
        Ok(())
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(parse(&["-b", "0"]).is_err());
        assert!(parse(&["-e", "0"]).is_err());
        assert!(parse(&["--lr", "-1"]).is_err());
        assert!(parse(&["-x", "120"]).is_err());
        assert!(parse(&["--input_dim", "0"]).is_err());
        assert!(parse(&["--encode_dim", "64,0"]).is_err());
        assert!(parse(&["--sep", ""]).is_err());

        let zero_k = ScaleArgs::try_parse_from(["scale", "-d", "x", "-k", "0"]);
        let zero_k = zero_k.map_err(anyhow::Error::from).and_then(|args| {
            RunConfig::resolve(&args, &ScaleDefaults::default(), &AvailableDevices::cpu_only())
        });
        assert!(zero_k.is_err());
    }
}
