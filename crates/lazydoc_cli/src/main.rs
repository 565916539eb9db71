//! CLI entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `lazydoc_core` linkage.
//! - Ingest one content file and print a projection of it.
//!
//! Usage: `lazydoc_cli [--log-dir <dir> [--log-level <level>]] [<command> <file>]`

use clap::{Parser, Subcommand};
use lazydoc_core::{
    active_annotation_ids, active_mention_ids, extract_text, ingest_str, init_logging_with,
    render_html, Document, LoggingConfig,
};
use log::info;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "lazydoc_cli", version, about = "Inspect LazyDoc content files")]
struct Cli {
    /// Directory for rolling log files; logging stays off without it.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// One of trace|debug|info|warn|error. Defaults to debug in debug
    /// builds and info in release builds.
    #[arg(long, global = true, requires = "log_dir")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Plain-text projection.
    Text { path: PathBuf },
    /// Escaped HTML projection.
    Html { path: PathBuf },
    /// Annotation ids in document order.
    Annotations { path: PathBuf },
    /// Mention ids in document order.
    Mentions { path: PathBuf },
    /// Canonical JSON form.
    Canonical { path: PathBuf },
}

impl Command {
    fn path(&self) -> &Path {
        match self {
            Self::Text { path }
            | Self::Html { path }
            | Self::Annotations { path }
            | Self::Mentions { path }
            | Self::Canonical { path } => path,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Html { .. } => "html",
            Self::Annotations { .. } => "annotations",
            Self::Mentions { .. } => "mentions",
            Self::Canonical { .. } => "canonical",
        }
    }

    fn project(&self, document: &Document) -> String {
        match self {
            Self::Text { .. } => extract_text(document),
            Self::Html { .. } => render_html(document),
            Self::Annotations { .. } => active_annotation_ids(document).join("\n"),
            Self::Mentions { .. } => active_mention_ids(document).join("\n"),
            Self::Canonical { .. } => document.to_canonical_json(),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(log_dir) = &cli.log_dir {
        let initialized =
            logging_config(log_dir, cli.log_level.as_deref()).and_then(init_logging_with);
        if let Err(err) = initialized {
            eprintln!("failed to initialize logging: {err}");
            return ExitCode::FAILURE;
        }
    }

    let Some(command) = cli.command else {
        println!("lazydoc_core ping={}", lazydoc_core::ping());
        println!("lazydoc_core version={}", lazydoc_core::core_version());
        return ExitCode::SUCCESS;
    };

    match std::fs::read_to_string(command.path()) {
        Ok(raw) => {
            let output = command.project(&ingest_str(&raw));
            info!(
                "event=cli_project module=cli status=ok command={} input_chars={}",
                command.name(),
                raw.chars().count()
            );
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("failed to read `{}`: {err}", command.path().display());
            ExitCode::FAILURE
        }
    }
}

/// Resolves a relative `--log-dir` against the working directory.
fn logging_config(log_dir: &Path, level: Option<&str>) -> Result<LoggingConfig, String> {
    let log_dir = if log_dir.is_absolute() {
        log_dir.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|err| format!("cannot resolve working directory: {err}"))?
            .join(log_dir)
    };
    let log_dir = log_dir
        .to_str()
        .ok_or_else(|| format!("log dir `{}` is not valid UTF-8", log_dir.display()))?;

    match level {
        Some(level) => LoggingConfig::new(level, log_dir),
        None => LoggingConfig::with_default_level(log_dir),
    }
}
