//! CLI binary for imgkit.
//!
//! A thin shim over the library crate that maps subcommands to an
//! `Operation`, runs one batch through a `Session` and writes the results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use imgkit::pipeline::input::expand_inputs;
use imgkit::{
    format_file_size, write_outputs, BatchSummary, CancelToken, CropOptions, CropRect, FileId,
    FileStatus, Operation, PdfPageMode, ProgressCallback, Session, SessionConfig,
    SessionProgressCallback, SourceFile,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the batch plus a log line per file.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<FileId, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading files…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Processing");
        self.bar.reset_eta();
    }

    fn elapsed(&self, id: FileId) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&id))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Stop the bar if the batch never started (nothing pending).
    fn abandon(&self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

impl SessionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        self.activate_bar(total_files);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_files} file(s)…"))
        ));
    }

    fn on_file_start(&self, id: FileId, name: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(id, Instant::now());
        }
        self.bar.set_message(name.to_string());
    }

    fn on_file_complete(&self, id: FileId, name: &str, output_bytes: u64) {
        let secs = self.elapsed(id);
        self.bar.println(format!(
            "  {} {:<32}  {:>10}  {}",
            green("✓"),
            name,
            dim(&format_file_size(output_bytes)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, id: FileId, name: &str, error: &str) {
        let secs = self.elapsed(id);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:<32}  {}  {}",
            red("✗"),
            name,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, _id: FileId, page: usize, error: &str) {
        self.bar
            .println(format!("    {} page {}: {}", cyan("⚠"), page, dim(error)));
    }

    fn on_batch_complete(&self, total_files: usize, converted: usize) {
        let failed = total_files.saturating_sub(converted);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} file(s) processed successfully",
                green("✔"),
                bold(&converted.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} file(s) processed  ({} failed)",
                if failed == total_files {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&converted.to_string()),
                total_files,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert everything in a folder to JPEG
  imgkit convert ./photos -o ./out

  # Compress to 70% quality, at most 1920x1080, and bundle as a ZIP
  imgkit compress --quality 70 --max-width 1920 --max-height 1080 *.png --zip out.zip

  # Resize by percentage, or to a box keeping the aspect ratio
  imgkit resize --percentage 50 banner.webp
  imgkit resize --width 800 --height 600 --keep-aspect photo.jpg

  # Crop to a square, a ratio, or an explicit rectangle
  imgkit crop --square avatar.png
  imgkit crop --ratio 16:9 wallpaper.jpg
  imgkit crop --rect 10,20,300,200 screenshot.png

  # Every page of a PDF to JPEG
  imgkit convert --all-pages report.pdf -o pages/

  # Operation described as JSON
  imgkit run --params resize.json *.png
    {"operation":"resize","options":{"mode":"percentage","percentage":25}}

LIMITS:
  Images up to 10 MB (PNG, JPEG, GIF, BMP, TIFF, WebP, SVG).
  PDFs up to 50 MB, convert only.

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH         Path to a libpdfium shared library (PDF input)
  RUST_LOG                Override log filtering (e.g. imgkit=debug)
"#;

/// Convert, compress, resize and crop images.
#[derive(Parser, Debug)]
#[command(
    name = "imgkit",
    version,
    about = "Convert, compress, resize and crop images",
    long_about = "Convert images (and PDF pages) to JPEG, compress, resize or crop them. \
Files are processed one at a time; a file that fails never stops the rest.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory to write output files into.
    #[arg(short, long, global = true, env = "IMGKIT_OUTPUT", default_value = ".")]
    output: PathBuf,

    /// Also bundle every output into this ZIP file.
    #[arg(long, global = true, env = "IMGKIT_ZIP")]
    zip: Option<PathBuf>,

    /// Skip writing individual files (useful with --zip).
    #[arg(long, global = true)]
    zip_only: bool,

    /// Print a JSON report to stdout.
    #[arg(long, global = true, env = "IMGKIT_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "IMGKIT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "IMGKIT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "IMGKIT_QUIET")]
    quiet: bool,
}

#[derive(Args, Debug)]
struct Inputs {
    /// Image files, PDFs, or directories (listed one level deep).
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Re-encode as JPEG over a white background (PDF: render pages at 2×).
    Convert {
        /// JPEG quality (0.0–1.0).
        #[arg(long, default_value_t = 0.9)]
        quality: f32,

        /// Render every PDF page instead of only the first.
        #[arg(long)]
        all_pages: bool,

        #[command(flatten)]
        files: Inputs,
    },

    /// Scale down to fit a box and re-encode in the source format.
    Compress {
        /// Quality percentage (10–100).
        #[arg(long, default_value_t = 80,
              value_parser = clap::value_parser!(u32).range(10..=100))]
        quality: u32,

        /// Maximum width in pixels (100–4096).
        #[arg(long, default_value_t = 2048,
              value_parser = clap::value_parser!(u32).range(100..=4096))]
        max_width: u32,

        /// Maximum height in pixels (100–4096).
        #[arg(long, default_value_t = 2048,
              value_parser = clap::value_parser!(u32).range(100..=4096))]
        max_height: u32,

        #[command(flatten)]
        files: Inputs,
    },

    /// Resize to a pixel size or by a percentage.
    Resize {
        /// Target width in pixels.
        #[arg(long, requires = "height", conflicts_with = "percentage")]
        width: Option<u32>,

        /// Target height in pixels.
        #[arg(long, requires = "width")]
        height: Option<u32>,

        /// Fit inside width x height, keeping the source aspect ratio.
        #[arg(long, requires = "width")]
        keep_aspect: bool,

        /// Scale both sides by this percentage (1–500).
        #[arg(long, required_unless_present = "width",
              value_parser = clap::value_parser!(u32).range(1..=500))]
        percentage: Option<u32>,

        #[command(flatten)]
        files: Inputs,
    },

    /// Crop to a square, an aspect ratio, or a rectangle.
    Crop {
        /// Largest centred square.
        #[arg(long, conflicts_with_all = ["ratio", "rect"], required_unless_present_any = ["ratio", "rect"])]
        square: bool,

        /// Largest centred region with this aspect ratio, e.g. 16:9.
        #[arg(long, conflicts_with = "rect")]
        ratio: Option<String>,

        /// Explicit rectangle as x,y,width,height (clamped to the image).
        #[arg(long, value_parser = parse_rect)]
        rect: Option<CropRect>,

        #[command(flatten)]
        files: Inputs,
    },

    /// Run an operation described in a JSON file.
    Run {
        /// JSON file, e.g. {"operation":"crop","options":{"mode":"square"}}.
        #[arg(long)]
        params: PathBuf,

        #[command(flatten)]
        files: Inputs,
    },
}

/// JSON report printed with `--json`.
#[derive(Serialize)]
struct Report<'a> {
    operation: &'a Operation,
    summary: &'a BatchSummary,
    rejected: usize,
    outputs: Vec<OutputEntry<'a>>,
    errors: Vec<ErrorEntry<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    archive: Option<PathBuf>,
}

#[derive(Serialize)]
struct OutputEntry<'a> {
    #[serde(flatten)]
    file: &'a imgkit::ConvertedFile,
    compression_ratio: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<PathBuf>,
}

#[derive(Serialize)]
struct ErrorEntry<'a> {
    id: FileId,
    name: &'a str,
    error: &'a str,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Resolve operation and inputs ─────────────────────────────────────
    let (operation, inputs) = build_operation(&cli.command).await?;
    operation.validate().context("Invalid operation parameters")?;

    let paths = expand_inputs(inputs).await.context("Failed to list inputs")?;
    let mut sources = Vec::with_capacity(paths.len());
    for path in &paths {
        let source = SourceFile::from_path(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        sources.push(source);
    }

    // ── Build session ────────────────────────────────────────────────────
    let progress = show_progress.then(CliProgressCallback::new);
    let mut builder = SessionConfig::builder()
        .accept_pdf(operation.accepts_pdf())
        .generate_previews(false);
    if let Some(ref cb) = progress {
        builder = builder.progress_callback(Arc::clone(cb) as ProgressCallback);
    }
    let config = builder.build().context("Invalid configuration")?;

    let mut session = Session::new(config);
    let report = session.add_files(sources).await;
    if report.rejected > 0 && !cli.quiet {
        eprintln!(
            "{} {} file(s) skipped: unsupported format or too large",
            cyan("⚠"),
            report.rejected
        );
    }

    // ── Run batch (Ctrl-C stops after the current file) ──────────────────
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let summary = session
        .convert_all_with_cancel(&operation, &cancel)
        .await
        .context("Batch failed")?;
    if let Some(ref cb) = progress {
        cb.abandon();
    }

    // ── Write outputs ────────────────────────────────────────────────────
    let written = if cli.zip_only {
        Vec::new()
    } else {
        write_outputs(&cli.output, session.converted_files())
            .await
            .context("Failed to write outputs")?
    };

    if let Some(ref zip_path) = cli.zip {
        let archive = session
            .download_all_as_zip()
            .context("Failed to build archive")?;
        archive
            .save(zip_path)
            .await
            .with_context(|| format!("Failed to write {}", zip_path.display()))?;
        if !cli.quiet && !cli.json {
            eprintln!(
                "{} {}  ({})",
                green("✔"),
                bold(&zip_path.display().to_string()),
                format_file_size(archive.size())
            );
        }
    }

    // ── Report ───────────────────────────────────────────────────────────
    if cli.json {
        let outputs = session
            .converted_files()
            .iter()
            .enumerate()
            .map(|(i, file)| OutputEntry {
                file,
                compression_ratio: file.compression_ratio(),
                path: written.get(i).cloned(),
            })
            .collect();
        let errors = session
            .files()
            .iter()
            .filter(|f| f.status() == FileStatus::Error)
            .map(|f| ErrorEntry {
                id: f.id(),
                name: f.name(),
                error: f.error().unwrap_or_default(),
            })
            .collect();
        let report = Report {
            operation: &operation,
            summary: &summary,
            rejected: report.rejected,
            outputs,
            errors,
            archive: cli.zip.clone(),
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        if !show_progress {
            for file in session.converted_files() {
                eprintln!(
                    "{} → {}  {}",
                    file.original_name(),
                    file.output_name(),
                    format_file_size(file.size())
                );
            }
            for item in session.files().iter().filter(|f| f.status() == FileStatus::Error) {
                eprintln!("{}: {}", item.name(), item.error().unwrap_or_default());
            }
            eprintln!(
                "Processed {}/{} file(s)",
                summary.converted, summary.attempted
            );
        }
        for item in session.files().iter().filter(|f| !f.page_errors().is_empty()) {
            if let Some(total) = item.page_count() {
                let failed = item.page_errors().len();
                eprintln!(
                    "{} {}: {} of {} page(s) failed",
                    cyan("⚠"),
                    item.name(),
                    failed,
                    total
                );
            }
        }
        if summary.cancelled {
            eprintln!(
                "{} cancelled, {} file(s) not processed",
                cyan("⚠"),
                summary.skipped
            );
        }
        if !written.is_empty() {
            eprintln!(
                "   {} written to {}",
                dim(&format!("{} file(s)", written.len())),
                bold(&cli.output.display().to_string())
            );
        }
    }

    if summary.attempted > 0 && summary.converted == 0 {
        anyhow::bail!("No file could be processed");
    }
    Ok(())
}

/// Map a subcommand to an `Operation` and its input list.
async fn build_operation(command: &Command) -> Result<(Operation, &[PathBuf])> {
    let op = match command {
        Command::Convert {
            quality,
            all_pages,
            files,
        } => (
            Operation::Convert(imgkit::ConvertOptions {
                quality: *quality,
                pdf_pages: if *all_pages {
                    PdfPageMode::All
                } else {
                    PdfPageMode::First
                },
            }),
            &files.inputs[..],
        ),
        Command::Compress {
            quality,
            max_width,
            max_height,
            files,
        } => (
            Operation::compress(*quality, *max_width, *max_height),
            &files.inputs[..],
        ),
        Command::Resize {
            width,
            height,
            keep_aspect,
            percentage,
            files,
        } => {
            let op = match (width, height, percentage) {
                (Some(w), Some(h), _) => Operation::resize_pixels(*w, *h, *keep_aspect),
                (_, _, Some(p)) => Operation::resize_percentage(*p),
                _ => anyhow::bail!("Give --width and --height, or --percentage"),
            };
            (op, &files.inputs[..])
        }
        Command::Crop {
            square,
            ratio,
            rect,
            files,
        } => {
            let op = match (square, ratio, rect) {
                (true, _, _) => Operation::crop_square(),
                (_, Some(r), _) => Operation::Crop(CropOptions::Ratio { ratio: r.clone() }),
                (_, _, Some(r)) => Operation::crop_custom(*r),
                _ => anyhow::bail!("Give one of --square, --ratio or --rect"),
            };
            (op, &files.inputs[..])
        }
        Command::Run { params, files } => {
            let text = tokio::fs::read_to_string(params)
                .await
                .with_context(|| format!("Failed to read {}", params.display()))?;
            let op: Operation = serde_json::from_str(&text)
                .with_context(|| format!("Invalid operation in {}", params.display()))?;
            (op, &files.inputs[..])
        }
    };
    Ok(op)
}

/// Parse `--rect x,y,width,height`.
fn parse_rect(s: &str) -> Result<CropRect> {
    let parts: Vec<u32> = s
        .split(',')
        .map(|p| {
            p.trim()
                .parse::<u32>()
                .with_context(|| format!("Invalid number in rectangle: '{}'", p.trim()))
        })
        .collect::<Result<Vec<_>>>()?;

    match parts[..] {
        [x, y, width, height] => {
            if width == 0 || height == 0 {
                anyhow::bail!("Rectangle width and height must be positive");
            }
            Ok(CropRect::new(x, y, width, height))
        }
        _ => anyhow::bail!("Expected x,y,width,height (got '{}')", s),
    }
}
