use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use repomine::cli::Cli;
use repomine::config::Settings;
use repomine::logging::init_logger;
use repomine::pipeline::MiningRun;
use repomine::progress::{IndicatifProgress, report_while};
use repomine::repository::GitSource;
use repomine::util::{format_hms, format_size};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.quiet);

    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    cli.apply(&mut settings);
    settings.validate().context("Invalid settings")?;

    let input = settings.input_file();
    info!(
        "Mining {} into {} ({}, {} threads)",
        input.display(),
        settings.target.display(),
        if settings.incremental { "incremental" } else { "fresh" },
        settings.threads
    );

    let run = MiningRun::start(settings, Arc::new(GitSource::new()))
        .context("Failed to open the target directory")?;
    let fed = run
        .feed_from(&input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    if fed.invalid > 0 {
        info!("{} input lines were invalid", fed.invalid);
    }

    let reporter = IndicatifProgress::new(cli.quiet);
    report_while(&run, &reporter, Duration::from_millis(500), || run.wait());

    let summary = run.finalize().context("Failed to finalize the run")?;
    info!(
        "{} projects ({} failed), {} distinct files ({}), {} snapshots in {}",
        summary.completed,
        summary.errors,
        summary.distinct_contents,
        format_size(summary.bytes),
        summary.snapshots,
        format_hms(summary.elapsed)
    );
    Ok(())
}
