//! `grader`: offline export and preview for annotated scripts.
//!
//! Each script is described by a JSON manifest (see [`manifest`]). `export`
//! turns manifests into one PDF per script; `render` writes a single
//! composited page as PNG.

mod manifest;

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use pipeline::{CancelToken, ExportConfig, ExportError, ExportPipeline, ImageSource, PdfError};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::manifest::Manifest;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("reading {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid manifest {}: {source}", .path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("writing {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("export failed: {0}")]
    Export(#[from] ExportError),
    #[error(transparent)]
    Pdf(#[from] PdfError),
    #[error("writing png: {0}")]
    Image(#[from] image::ImageError),
    #[error("page {page_no} not found in {filename}")]
    PageNotFound { filename: String, page_no: u32 },
    #[error("{failed} of {total} scripts failed to export")]
    ScriptsFailed { failed: usize, total: usize },
}

#[derive(Parser, Debug)]
#[command(name = "grader", about = "Export annotated scripts to PDF")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export each manifest to `<out-dir>/<filename>.pdf`.
    Export(ExportArgs),
    /// Render one composited page to PNG.
    Render(RenderArgs),
}

#[derive(Args, Debug)]
struct ExportArgs {
    #[arg(required = true)]
    manifests: Vec<PathBuf>,

    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Overrides `EXPORT_MAX_CONCURRENCY`.
    #[arg(long)]
    concurrency: Option<usize>,
}

#[derive(Args, Debug)]
struct RenderArgs {
    manifest: PathBuf,

    #[arg(long)]
    page: u32,

    #[arg(long)]
    out: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupted; cancelling export");
            on_interrupt.cancel();
        }
    });

    match cli.command {
        Command::Export(args) => run_export(args, &cancel).await,
        Command::Render(args) => run_render(args, &cancel).await,
    }
}

/// Scripts are exported one after another; pages within a script in
/// parallel. A failed script is reported and skipped.
async fn run_export(args: ExportArgs, cancel: &CancelToken) -> Result<(), CliError> {
    let mut config = ExportConfig::from_env();
    if let Some(n) = args.concurrency {
        config = config.with_max_concurrency(n);
    }
    let pipeline = ExportPipeline::new(ImageSource::new(&config), config);

    tokio::fs::create_dir_all(&args.out_dir)
        .await
        .map_err(|source| CliError::Write { path: args.out_dir.clone(), source })?;

    let total = args.manifests.len();
    let mut failed = 0;
    for path in &args.manifests {
        match export_one(&pipeline, path, &args.out_dir, cancel).await {
            Ok(out) => eprintln!("wrote {}", out.display()),
            Err(CliError::Export(ExportError::Cancelled)) => return Err(ExportError::Cancelled.into()),
            Err(e) => {
                error!(manifest = %path.display(), error = %e, "script export failed");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(CliError::ScriptsFailed { failed, total });
    }
    Ok(())
}

async fn export_one(
    pipeline: &ExportPipeline<ImageSource>,
    path: &Path,
    out_dir: &Path,
    cancel: &CancelToken,
) -> Result<PathBuf, CliError> {
    let manifest = Manifest::load(path).await?;
    let out = manifest.pdf_path(out_dir);
    info!(filename = %manifest.filename, pages = manifest.pages.len(), "exporting script");

    let document = pipeline.export(manifest.pages, cancel).await?;
    let bytes = document.to_pdf()?;
    tokio::fs::write(&out, bytes)
        .await
        .map_err(|source| CliError::Write { path: out.clone(), source })?;
    Ok(out)
}

async fn run_render(args: RenderArgs, cancel: &CancelToken) -> Result<(), CliError> {
    let manifest = Manifest::load(&args.manifest).await?;
    let Some(page) = manifest.page(args.page).cloned() else {
        return Err(CliError::PageNotFound { filename: manifest.filename, page_no: args.page });
    };

    let config = ExportConfig::from_env();
    let pipeline = ExportPipeline::new(ImageSource::new(&config), config);
    let document = pipeline.export(vec![page], cancel).await?;
    let Some(rendered) = document.pages.first() else {
        return Err(ExportError::Empty.into());
    };

    rendered.raster.save(&args.out)?;
    eprintln!("wrote {} ({}x{})", args.out.display(), rendered.width(), rendered.height());
    Ok(())
}
