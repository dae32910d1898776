use crate::error::ConvertError;
use crate::exporter::{self, Document};
use crate::importer;
use crate::utils::{ExportConfig, Sink, Tally, deliver};
use crossbeam_channel::bounded;
use eyre::{Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;

/// Convert every conversation of the export.
///
/// Parsing, linearizing and assembling run on a pool of worker threads.
/// Naming and writing happen on the calling thread only, in input order, so
/// collision suffixes come out the same on every run.
pub fn execute(config: ExportConfig) -> Result<()> {
    let items = importer::read_export(&config.input)?;
    let mut sink = Sink::open(&config)?;

    let total = items.len();
    let (job_tx, job_rx) = bounded::<(usize, Value)>(64);
    let (doc_tx, doc_rx) = bounded::<(usize, Result<Document, ConvertError>)>(64);
    let n_workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(8)
        .min(total.max(1));

    let mut tally = Tally::default();
    let quiet = config.quiet;
    let zone = config.zone;

    std::thread::scope(|s| {
        for _ in 0..n_workers {
            let job_rx = job_rx.clone();
            let doc_tx = doc_tx.clone();

            s.spawn(move || {
                while let Ok((index, value)) = job_rx.recv() {
                    let result = importer::parse_conversation(value)
                        .and_then(|conversation| exporter::convert(&conversation, zone));
                    if doc_tx.send((index, result)).is_err() {
                        break;
                    }
                }
            });
        }

        drop(job_rx);
        drop(doc_tx);

        s.spawn(move || {
            for job in items.into_iter().enumerate() {
                if job_tx.send(job).is_err() {
                    break;
                }
            }
        });

        // Results arrive out of order; hold them until their turn.
        let mut pending = BTreeMap::new();
        let mut next = 0usize;
        for (index, result) in doc_rx.iter() {
            pending.insert(index, result);
            while let Some(result) = pending.remove(&next) {
                deliver(next, result, &mut sink, &mut tally, quiet, &mut |line: String| {
                    eprintln!("{}", line)
                });
                next += 1;
            }
        }
    });

    if let Some(bundle) = sink.finish().wrap_err("Failed to write bundle")?
        && !quiet
    {
        eprintln!("Created: {}", bundle.display());
    }

    if !quiet {
        eprintln!("{}", tally.summary());
    }

    Ok(())
}
