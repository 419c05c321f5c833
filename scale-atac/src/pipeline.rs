use crate::cluster_report::*;
use crate::config::*;
use crate::device::*;
use crate::save_results::save_results;
use crate::scale_common::*;
use crate::scale_input::*;
use crate::scale_model::*;
use candle_util::candle_data_loader::InMemoryData;
use std::io::Write;
use std::time::Instant;

const RULE: &str = "**********************************************************************";

/// What a run produced besides the files it wrote
#[derive(Debug, Default)]
pub struct PipelineOutput {
    pub loss_trace: Option<Vec<f32>>,
    pub scores: Option<ClusterScores>,
}

pub fn print_banner<W: Write>(
    out: &mut W,
    config: &RunConfig,
    n_cells: usize,
    input_dim: usize,
) -> anyhow::Result<()> {
    writeln!(out, "\n{}", RULE)?;
    writeln!(
        out,
        "  SCALE: Single-Cell ATAC-seq analysis via Latent feature Extraction"
    )?;
    writeln!(out, "{}\n", RULE)?;
    writeln!(out, "======== Parameters ========")?;
    writeln!(out, "Cell number: {}", n_cells)?;
    writeln!(out, "Input_dim: {}", input_dim)?;
    writeln!(out, "n_centroids: {}", config.n_centroids)?;
    writeln!(out, "Epoch: {}", config.epochs())?;
    writeln!(out, "Seed: {}", config.seed)?;
    writeln!(out, "Device: {}", config.device)?;
    writeln!(out, "============================")?;
    out.flush()?;
    Ok(())
}

/// Train or load `model`, then report and save as configured
pub fn run_pipeline<M, W>(
    model: &mut M,
    data: &ScaleData,
    loader: &mut InMemoryData,
    config: &RunConfig,
    out: &mut W,
) -> anyhow::Result<PipelineOutput>
where
    M: LatentClusterModel,
    W: Write,
{
    let loss_trace = match &config.plan {
        RunPlan::TrainFromScratch(fit_args) => {
            writeln!(out, "\n## Training Model ##")?;
            out.flush()?;

            let t0 = Instant::now();
            model.init_gmm_params(data)?;
            let loss_trace = model.fit(loader, fit_args)?;

            writeln!(
                out,
                "\nRunning Time: {:.2} s",
                t0.elapsed().as_secs_f64()
            )?;
            Some(loss_trace)
        }
        RunPlan::LoadCheckpoint { path } => {
            writeln!(out, "\n## Loading Model {} ##\n", path)?;
            model.load_model(path)?;
            None
        }
    };

    let scores = match &config.reference {
        Some(reference) => {
            let ReferenceLabels { labels, classes } = read_labels(reference, &data.cells)?;
            let pred = model.predict(data)?;
            Some(cluster_report(&labels, &pred, &classes, out)?)
        }
        None => None,
    };

    if !config.no_results {
        save_results(model, data, &config.outdir, config, loss_trace.as_deref())?;
        writeln!(out, "Saved results to {}", config.outdir)?;
    }

    out.flush()?;
    Ok(PipelineOutput { loss_trace, scores })
}

/// The whole run: resolve options, load data, build the model on the
/// resolved device, then train or load, report and save
pub fn run_scale<W: Write>(args: &ScaleArgs, out: &mut W) -> anyhow::Result<PipelineOutput> {
    let available = match args.device {
        ComputeDevice::Cpu => AvailableDevices::cpu_only(),
        _ => AvailableDevices::detect(args.device_no),
    };

    let config = RunConfig::resolve(args, &ScaleDefaults::default(), &available)?;

    let data = read_scale_input(&ScaleInputArgs {
        file: &config.data,
        delim: Delimiter::from_user_str(&config.sep)?,
        input_dim: config.input_dim,
        gene_filter: config.gene_filter,
        pct: config.pct,
        log_transform: config.log_transform,
    })?;

    let mut loader = data.to_loader()?;

    print_banner(out, &config, data.num_cells(), data.num_peaks())?;

    let dev = open_device(config.device, config.device_no, config.seed)?;
    let mut model = ScaleModel::new(
        config.dims(data.num_peaks()),
        config.n_centroids,
        &dev,
        config.seed,
    )?;

    run_pipeline(&mut model, &data, &mut loader, &config, out)
}
