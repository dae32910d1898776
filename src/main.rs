#[cfg(not(feature = "sequential"))]
use chat_markdown_export::parallel;
#[cfg(feature = "sequential")]
use chat_markdown_export::sequential;
use chat_markdown_export::splitter::{self, SplitConfig};
use chat_markdown_export::utils::{ExportConfig, Zone};
use clap::{Parser, Subcommand};
use eyre::{Context, Result, eyre};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Convert exported AI chat transcripts to Markdown, and split Markdown bundles
/// back into named files.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a specific configuration file.
    /// Defaults to $XDG_CONFIG_HOME/chat-markdown-export/config.toml
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Log diagnostics down to debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only report errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert an exported conversations JSON file to Markdown.
    Convert {
        /// The JSON file containing the conversations.
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Directory to write markdown files to.
        /// Defaults to ./chat-markdown-export if not set in config.
        #[arg(value_name = "TARGET_DIR")]
        target_dir: Option<PathBuf>,

        /// Write all conversations into this single bundle file instead.
        #[arg(long, value_name = "FILE")]
        bundle: Option<PathBuf>,

        /// Time zone for timestamps and filename dates.
        #[arg(long, value_enum)]
        timezone: Option<Zone>,
    },

    /// Split a bundle at every line holding only "* * *".
    Split {
        /// The markdown bundle to split.
        #[arg(value_name = "BUNDLE")]
        bundle: PathBuf,

        /// Directory for the parts. Defaults to the bundle's directory.
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,

        /// Keep the <bundle>_part<N>.md names instead of renaming parts.
        #[arg(long)]
        no_rename: bool,
    },

    /// Rename markdown files after their title heading and creation time.
    Rename {
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
    },
}

#[derive(Deserialize, Default)]
struct FileConfig {
    target_dir: Option<PathBuf>,
    timezone: Option<Zone>,
}

fn load_file_config(explicit_path: Option<&Path>) -> Result<FileConfig> {
    let path = if let Some(p) = explicit_path {
        if !p.exists() {
            return Err(eyre!("Config file not found: {}", p.display()));
        }
        Some(p.to_path_buf())
    } else {
        // Only the per-user config dir is searched.
        dirs::config_dir()
            .map(|d| d.join("chat-markdown-export/config.toml"))
            .filter(|p| p.exists())
    };

    match path {
        None => Ok(FileConfig::default()),
        Some(p) => {
            let content = fs::read_to_string(&p)
                .wrap_err_with(|| format!("Failed to read config: {}", p.display()))?;
            toml::from_str(&content)
                .wrap_err_with(|| format!("Failed to parse config: {}", p.display()))
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_convert(config: ExportConfig) -> Result<()> {
    #[cfg(feature = "sequential")]
    return sequential::execute(config);

    #[cfg(not(feature = "sequential"))]
    parallel::execute(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Convert {
            input,
            target_dir,
            bundle,
            timezone,
        } => {
            // 1. Load config file (CLI path > default path)
            let file_cfg = load_file_config(cli.config.as_deref())?;

            // 2. Resolve target_dir and timezone (CLI > Config > Default)
            let target_dir = target_dir
                .or(file_cfg.target_dir)
                .unwrap_or_else(|| PathBuf::from("chat-markdown-export"));
            let zone = timezone.or(file_cfg.timezone).unwrap_or_default();

            run_convert(ExportConfig {
                input,
                target_dir,
                bundle,
                zone,
                quiet: cli.quiet,
            })
        }
        Command::Split {
            bundle,
            out,
            no_rename,
        } => splitter::execute_split(&SplitConfig {
            input: bundle,
            out_dir: out,
            rename: !no_rename,
            quiet: cli.quiet,
        }),
        Command::Rename { files } => splitter::execute_rename(&files, cli.quiet),
    }
}
