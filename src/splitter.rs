use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use eyre::{Context, Result};

use crate::error::ConvertError;
use crate::naming::{self, FilenameDescriptor};
use crate::renderer::DELIMITER;
use crate::utils::write_atomically;

/// Configuration for splitting one bundle file.
#[derive(Clone)]
pub struct SplitConfig {
    pub input: PathBuf,
    /// Where parts are written; defaults to the bundle's own directory.
    pub out_dir: Option<PathBuf>,
    /// Rename each part after the title and date found in it.
    pub rename: bool,
    pub quiet: bool,
}

/// Cut a bundle into its documents.
///
/// Every line that is exactly the delimiter is a cut point. Parts are trimmed
/// and parts left empty are dropped.
pub fn split(bundle: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut offset = 0;

    for line in bundle.split_inclusive('\n') {
        let content = line.trim_end_matches(['\n', '\r']);
        if content == DELIMITER {
            parts.push(&bundle[start..offset]);
            start = offset + line.len();
        }
        offset += line.len();
    }
    parts.push(&bundle[start..]);

    parts
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect()
}

/// Title and creation date recovered from a rendered document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartMetadata {
    /// Heading text with quote characters removed, not yet sanitized.
    pub title: String,
    pub create_date: NaiveDate,
}

impl PartMetadata {
    pub fn descriptor(&self) -> FilenameDescriptor {
        naming::canonicalize(&self.title, Some(self.create_date))
    }
}

/// Read the title heading and `Creation Time:` line a document starts with.
///
/// Only the first line of each kind counts, and only the date before any
/// time of day is used. An empty heading is still a title; naming falls back
/// to the default stem for it, as conversion does.
pub fn parse_metadata(text: &str) -> Option<PartMetadata> {
    let mut title: Option<String> = None;
    let mut created: Option<Option<NaiveDate>> = None;

    for line in text.lines() {
        if title.is_none()
            && let Some(rest) = line.strip_prefix("# ").or((line == "#").then_some(""))
        {
            title = Some(rest.trim().replace(['\'', '"'], ""));
        } else if created.is_none()
            && let Some(rest) = line.strip_prefix("Creation Time:")
        {
            created = Some(
                rest.split_whitespace()
                    .next()
                    .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()),
            );
        }
        if title.is_some() && created.is_some() {
            break;
        }
    }

    Some(PartMetadata {
        title: title?,
        create_date: created.flatten()?,
    })
}

/// Rename a Markdown file after the metadata in its own text.
///
/// Returns the new path, which is the old one when the file already carries
/// its canonical name. Fails with [`ConvertError::NameResolution`] when the
/// file has no usable title or creation date; the file is then left alone.
pub fn rename(path: &Path) -> Result<PathBuf, ConvertError> {
    let text = fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ConvertError::InputNotFound {
            path: path.to_path_buf(),
        },
        _ => ConvertError::io(format!("failed to read {}", path.display()), e),
    })?;

    let metadata = parse_metadata(&text).ok_or_else(|| {
        tracing::warn!(path = %path.display(), "no title heading or creation date found");
        ConvertError::NameResolution {
            path: path.to_path_buf(),
        }
    })?;
    let name = metadata.descriptor().file_name();

    if path.file_name().and_then(|n| n.to_str()) == Some(name.as_str()) {
        return Ok(path.to_path_buf());
    }

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let target = naming::resolve_collision(dir, &name);
    fs::rename(path, &target).map_err(|e| {
        ConvertError::io(
            format!("failed to rename {} to {}", path.display(), target.display()),
            e,
        )
    })?;
    Ok(target)
}

/// Split a bundle file into one file per document, optionally renaming each.
///
/// Parts are first written as `<bundle>_part<N>.md`. A part whose name cannot
/// be derived keeps that name and is reported; the rest of the batch goes on.
pub fn execute_split(config: &SplitConfig) -> Result<()> {
    let text = fs::read_to_string(&config.input).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ConvertError::InputNotFound {
            path: config.input.clone(),
        },
        _ => ConvertError::io(format!("failed to read {}", config.input.display()), e),
    })?;

    let out_dir = match (&config.out_dir, config.input.parent()) {
        (Some(dir), _) => dir.clone(),
        (None, Some(parent)) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&out_dir)
        .wrap_err_with(|| format!("Failed to create output directory: {}", out_dir.display()))?;

    let bundle_stem = config
        .input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "bundle".to_string());

    let parts = split(&text);
    let mut count_written = 0usize;
    let mut count_renamed = 0usize;
    let mut count_errors = 0usize;

    for (i, part) in parts.iter().enumerate() {
        let temp_path = naming::resolve_collision(&out_dir, &format!("{bundle_stem}_part{i}.md"));
        let mut contents = String::with_capacity(part.len() + 1);
        contents.push_str(part);
        contents.push('\n');

        if let Err(e) = write_atomically(&temp_path, contents.as_bytes(), false) {
            count_errors += 1;
            eprintln!("Error [part {i}]: {e}");
            continue;
        }
        count_written += 1;

        if !config.rename {
            if !config.quiet {
                eprintln!("Created: {}", temp_path.display());
            }
            continue;
        }

        match rename(&temp_path) {
            Ok(new_path) => {
                count_renamed += 1;
                if !config.quiet {
                    eprintln!("Created: {}", new_path.display());
                }
            }
            Err(e) => {
                count_errors += 1;
                eprintln!("Error [part {i}]: {e}; kept as {}", temp_path.display());
            }
        }
    }

    if !config.quiet {
        let mut summary = format!(
            "Done. {} part(s) written, {} renamed.",
            count_written, count_renamed
        );
        if count_errors > 0 {
            summary.push_str(&format!(" Completed with {} error(s).", count_errors));
        }
        eprintln!("{}", summary);
    }

    Ok(())
}

/// Rename existing Markdown files in place. Each file is handled on its own.
pub fn execute_rename(paths: &[PathBuf], quiet: bool) -> Result<()> {
    let mut count_renamed = 0usize;
    let mut count_errors = 0usize;

    for path in paths {
        match rename(path) {
            Ok(new_path) => {
                count_renamed += 1;
                if !quiet {
                    eprintln!("Renamed: {} -> {}", path.display(), new_path.display());
                }
            }
            Err(e) => {
                count_errors += 1;
                eprintln!("Error [{}]: {}", path.display(), e);
            }
        }
    }

    if !quiet {
        let mut summary = format!("Done. {} renamed.", count_renamed);
        if count_errors > 0 {
            summary.push_str(&format!(" Completed with {} error(s).", count_errors));
        }
        eprintln!("{}", summary);
    }

    Ok(())
}
