use clap::Parser;
use log::info;
use scale_atac::config::ScaleArgs;
use scale_atac::pipeline::run_scale;

fn main() -> anyhow::Result<()> {
    let args = ScaleArgs::parse();

    let default_level = if args.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Stdout)
        .init();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run_scale(&args, &mut out)?;

    info!("Done");
    Ok(())
}
