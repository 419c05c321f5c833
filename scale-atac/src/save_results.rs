use crate::config::RunConfig;
use crate::scale_common::*;
use crate::scale_input::ScaleData;
use crate::scale_model::LatentClusterModel;
use matrix_util::common_io::{mkdir_all, write_lines};
use std::path::Path;

pub const FEATURE_FILE: &str = "feature.txt";
pub const CLUSTER_FILE: &str = "cluster_assignments.txt";
pub const IMPUTED_FILE: &str = "imputed_data.txt";
pub const MODEL_FILE: &str = "model.safetensors";
pub const CONFIG_FILE: &str = "run_config.json";
pub const LOSS_FILE: &str = "loss.txt";

fn out_path(outdir: &str, name: &str) -> anyhow::Result<String> {
    Path::new(outdir)
        .join(name)
        .to_str()
        .map(|s| s.to_string())
        .ok_or(anyhow::anyhow!("invalid output path under {}", outdir))
}

/// Write everything a later run needs into `outdir`, replacing what
/// is already there:
///
/// * `feature.txt` - latent means of each cell
/// * `cluster_assignments.txt` - cluster of each cell
/// * `imputed_data.txt` - imputed peaks x cells
/// * `model.safetensors` - parameters, loadable by `--pretrain`
/// * `run_config.json` - the resolved configuration
/// * `loss.txt` - loss of each epoch, when trained
pub fn save_results<M: LatentClusterModel>(
    model: &M,
    data: &ScaleData,
    outdir: &str,
    config: &RunConfig,
    loss_trace: Option<&[f32]>,
) -> anyhow::Result<()> {
    mkdir_all(outdir)?;

    let feature_file = out_path(outdir, FEATURE_FILE)?;
    model
        .encode_batch(data)?
        .write_with_names(&feature_file, "\t", &data.cells, None)?;
    info!("Wrote latent features: {}", feature_file);

    let cluster_file = out_path(outdir, CLUSTER_FILE)?;
    let lines: Vec<Box<str>> = data
        .cells
        .iter()
        .zip(model.predict(data)?)
        .map(|(c, k)| format!("{}\t{}", c, k).into_boxed_str())
        .collect();
    write_lines(&lines, &cluster_file)?;
    info!("Wrote cluster assignments: {}", cluster_file);

    let imputed_file = out_path(outdir, IMPUTED_FILE)?;
    model.impute(data)?.transpose().write_with_names(
        &imputed_file,
        "\t",
        &data.peaks,
        Some(data.cells.as_slice()),
    )?;
    info!("Wrote imputed data: {}", imputed_file);

    let model_file = out_path(outdir, MODEL_FILE)?;
    model.save_model(&model_file)?;
    info!("Wrote model parameters: {}", model_file);

    let config_file = out_path(outdir, CONFIG_FILE)?;
    std::fs::write(&config_file, serde_json::to_string_pretty(config)?)?;

    if let Some(loss_trace) = loss_trace {
        let loss_file = out_path(outdir, LOSS_FILE)?;
        let lines: Vec<Box<str>> = loss_trace
            .iter()
            .enumerate()
            .map(|(e, l)| format!("{}\t{}", e + 1, l).into_boxed_str())
            .collect();
        write_lines(&lines, &loss_file)?;
    }

    Ok(())
}
