use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Deserialize;
use tempfile::NamedTempFile;

use crate::error::ConvertError;
use crate::exporter::{self, Document};
use crate::importer::Timestamp;
use crate::naming;

/// Configuration required to run the convert pipeline.
/// This decouples the logic from how the arguments were parsed (CLI/Config file).
#[derive(Clone)]
pub struct ExportConfig {
    pub input: PathBuf,
    pub target_dir: PathBuf,
    /// Write every document into this one bundle file instead of one file each.
    pub bundle: Option<PathBuf>,
    pub zone: Zone,
    pub quiet: bool,
}

/// Written in place of a timestamp the export holds but that cannot be read.
pub const TIMESTAMP_PLACEHOLDER: &str = "invalid-timestamp";

/// Time zone used to display timestamps and to date filenames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    #[default]
    Utc,
    Local,
}

impl Zone {
    fn format(self, dt: DateTime<Utc>, pattern: &str) -> String {
        match self {
            Self::Utc => dt.format(pattern).to_string(),
            Self::Local => dt.with_timezone(&Local).format(pattern).to_string(),
        }
    }

    fn date(self, dt: DateTime<Utc>) -> NaiveDate {
        match self {
            Self::Utc => dt.date_naive(),
            Self::Local => dt.with_timezone(&Local).date_naive(),
        }
    }
}

/// `YYYY-MM-DD HH:MM:SS`, empty when absent, a placeholder when unreadable.
pub fn format_datetime(ts: &Timestamp, zone: Zone) -> String {
    match ts.resolve() {
        Ok(Some(dt)) => zone.format(dt, "%Y-%m-%d %H:%M:%S"),
        Ok(None) => String::new(),
        Err(e) => {
            tracing::warn!("{e}, writing {TIMESTAMP_PLACEHOLDER:?} instead");
            TIMESTAMP_PLACEHOLDER.to_string()
        }
    }
}

/// Calendar date of a timestamp in the display zone.
pub fn calendar_date(ts: &Timestamp, zone: Zone) -> Option<NaiveDate> {
    ts.instant().map(|dt| zone.date(dt))
}

/// Write a file through a temporary sibling so readers never see half of it.
///
/// With `overwrite` unset an existing file at `path` is left alone and the
/// write fails instead.
pub fn write_atomically(path: &Path, contents: &[u8], overwrite: bool) -> Result<(), ConvertError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let context = || format!("failed to write {}", path.display());

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| ConvertError::io(context(), e))?;
    tmp.write_all(contents)
        .and_then(|_| tmp.flush())
        .map_err(|e| ConvertError::io(context(), e))?;

    let persisted = if overwrite {
        tmp.persist(path)
    } else {
        tmp.persist_noclobber(path)
    };
    persisted.map_err(|e| ConvertError::io(context(), e.error))?;
    Ok(())
}

/// Where finished documents go.
pub enum Sink {
    /// One canonically named file per document.
    Directory(PathBuf),
    /// All documents, delimited, in one file written at the end.
    Bundle { path: PathBuf, text: String },
}

impl Sink {
    pub fn open(config: &ExportConfig) -> Result<Self, ConvertError> {
        match &config.bundle {
            Some(path) => Ok(Self::Bundle {
                path: path.clone(),
                text: String::new(),
            }),
            None => {
                std::fs::create_dir_all(&config.target_dir).map_err(|e| {
                    ConvertError::io(
                        format!(
                            "failed to create target directory {}",
                            config.target_dir.display()
                        ),
                        e,
                    )
                })?;
                Ok(Self::Directory(config.target_dir.clone()))
            }
        }
    }

    /// Store one document. Returns the file written, if any.
    pub fn accept(&mut self, doc: &Document) -> Result<Option<PathBuf>, ConvertError> {
        match self {
            Self::Directory(dir) => {
                let name = doc.descriptor().file_name();
                let path = naming::resolve_collision(dir, &name);
                write_atomically(&path, doc.text().as_bytes(), false)?;
                Ok(Some(path))
            }
            Self::Bundle { text, .. } => {
                exporter::append_to_bundle(text, doc);
                Ok(None)
            }
        }
    }

    /// Flush whatever was held back. Returns the bundle file, if any.
    pub fn finish(self) -> Result<Option<PathBuf>, ConvertError> {
        match self {
            Self::Directory(_) => Ok(None),
            Self::Bundle { path, text } => {
                if let Some(parent) = path.parent()
                    && !parent.as_os_str().is_empty()
                {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        ConvertError::io(format!("failed to create {}", parent.display()), e)
                    })?;
                }
                write_atomically(&path, text.as_bytes(), true)?;
                Ok(Some(path))
            }
        }
    }
}

/// Running totals for one pipeline run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub written: usize,
    pub bundled: usize,
    pub errors: usize,
}

impl Tally {
    pub fn summary(&self) -> String {
        let mut summary = if self.bundled > 0 {
            format!("Done. {} bundled.", self.bundled)
        } else {
            format!("Done. {} created.", self.written)
        };
        if self.errors > 0 {
            summary.push_str(&format!(" Completed with {} error(s).", self.errors));
        }
        summary
    }
}

/// Hand one conversion result to the sink, reporting the outcome via `report`.
///
/// Failures are always reported; acknowledgements only when not `quiet`.
pub fn deliver(
    item: usize,
    result: Result<Document, ConvertError>,
    sink: &mut Sink,
    tally: &mut Tally,
    quiet: bool,
    report: &mut dyn FnMut(String),
) {
    let outcome = result.and_then(|doc| sink.accept(&doc).map(|path| (doc, path)));
    match outcome {
        Ok((_, Some(path))) => {
            tally.written += 1;
            if !quiet {
                report(format!("Created: {}", path.display()));
            }
        }
        Ok((doc, None)) => {
            tally.bundled += 1;
            tracing::debug!(title = %doc.title(), "added to bundle");
        }
        Err(e) => {
            tally.errors += 1;
            report(format!("Error [#{item}]: {e:#}"));
        }
    }
}
