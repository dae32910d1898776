use crate::exporter;
use crate::importer;
use crate::utils::{ExportConfig, Sink, Tally, deliver};
use eyre::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

/// The single-threaded convert pipeline, with a progress bar.
pub fn execute(config: ExportConfig) -> Result<()> {
    let items = importer::read_export(&config.input)?;
    let mut sink = Sink::open(&config)?;
    let total = items.len() as u64;

    let pb = if config.quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
        );
        bar.println(format!("Found {} conversations.", total));
        bar
    };

    let mut tally = Tally::default();
    for (index, value) in items.into_iter().enumerate() {
        let result = importer::parse_conversation(value)
            .and_then(|conversation| exporter::convert(&conversation, config.zone));
        deliver(index, result, &mut sink, &mut tally, config.quiet, &mut |line: String| {
            pb.println(line)
        });
        pb.inc(1);
    }

    pb.finish_and_clear();

    if let Some(bundle) = sink.finish().wrap_err("Failed to write bundle")?
        && !config.quiet
    {
        eprintln!("Created: {}", bundle.display());
    }

    if !config.quiet {
        eprintln!("{}", tally.summary());
    }

    Ok(())
}
