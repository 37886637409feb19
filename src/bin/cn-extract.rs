//! CLI binary for cn-extract.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, runs one pass over the store and prints the outcome.
//! Row progress and the summary go to stdout; tracing logs go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use cn_extract::{
    PipelineConfig, ProgressCallback, RowProcessor, RowProgressCallback, RowStore, RunSummary,
};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────

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

fn row_label(row_id: Option<u64>) -> String {
    row_id.map_or_else(|| "row ?".to_string(), |id| format!("row {id}"))
}

// ── Row progress output ──────────────────────────────────────────────────

/// Per-row log lines plus a progress bar, both on stdout.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Start time of the row in flight.
    row_started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new(plain: bool) -> Arc<Self> {
        // Plain mode keeps the row lines and drops the animated bar.
        let target = if plain {
            ProgressDrawTarget::hidden()
        } else {
            ProgressDrawTarget::stdout()
        };
        let bar = ProgressBar::with_draw_target(Some(0), target);
        Arc::new(Self {
            bar,
            row_started: Mutex::new(None),
        })
    }

    fn say(&self, line: String) {
        if self.bar.is_hidden() {
            println!("{line}");
        } else {
            self.bar.println(line);
        }
    }

    fn elapsed(&self) -> String {
        let secs = self
            .row_started
            .lock()
            .ok()
            .and_then(|mut t| t.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        dim(&format!("{secs:.1}s"))
    }
}

impl RowProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_rows: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} rows  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        self.bar.set_style(style);
        self.bar.set_length(total_rows as u64);
        self.bar.set_prefix("Processing");
        self.bar.enable_steady_tick(Duration::from_millis(80));
        self.say(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_rows} rows…"))
        ));
    }

    fn on_row_start(&self, row_id: Option<u64>, file_name: &str) {
        if let Ok(mut t) = self.row_started.lock() {
            *t = Some(Instant::now());
        }
        self.bar
            .set_message(format!("{}: {}", row_label(row_id), file_name));
    }

    fn on_row_stage(&self, row_id: Option<u64>, stage: &str) {
        self.bar.set_message(format!("{}: {}", row_label(row_id), stage));
    }

    fn on_row_complete(&self, row_id: Option<u64>, fields_found: usize) {
        self.say(format!(
            "  {} {:<8} {}  {}",
            green("✓"),
            row_label(row_id),
            dim(&format!("{fields_found:>2}/12 fields")),
            self.elapsed(),
        ));
        self.bar.inc(1);
    }

    fn on_row_error(&self, row_id: Option<u64>, marker: &str) {
        self.say(format!(
            "  {} {:<8} {}  {}",
            red("✗"),
            row_label(row_id),
            red(marker),
            self.elapsed(),
        ));
        self.bar.inc(1);
    }

    fn on_row_skipped(&self, row_id: Option<u64>, reason: &str) {
        self.say(format!("  {} {:<8} {}", dim("–"), row_label(row_id), dim(reason)));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, _processed: usize, _failed: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Process every pending row
  cn-extract cn_database.json

  # Another sheet, lower resolution, save after every 5 rows
  cn-extract --sheet "CN 2024" --dpi 200 --persist-every 5 book.json

  # Hosted models instead of a local server
  cn-extract --provider openai --model gpt-4.1-mini --ocr-model gpt-4.1-mini book.json

  # Re-extract rows that already have fields
  cn-extract --reprocess book.json

STORE FORMAT:
  A JSON workbook: {"sheets": [{"name": "CN Database", "rows": [[...], ...]}]}
  Row 1 is a header. Column 1 id, column 2 file path (relative to the store
  file), columns 3–14 extracted fields, columns 16–18 candidate passwords.

EXIT STATUS:
  0  at least one row was processed
  1  no row was processed, or the store could not be read or saved

ENVIRONMENT VARIABLES:
  EDGEQUAKE_LLM_PROVIDER  Provider when --provider is not given (default: ollama)
  OLLAMA_HOST             Local model server address
  PDFIUM_LIB_PATH         Path to libpdfium
  RUST_LOG                Log filter (overrides --verbose / --quiet)
"#;

/// Extract Confirmation Note fields from the PDFs listed in a row store.
#[derive(Parser, Debug)]
#[command(
    name = "cn-extract",
    version,
    about = "Extract Confirmation Note fields from PDFs listed in a row store",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Path to the row store (JSON workbook).
    store: PathBuf,

    /// Name of the row sheet.
    #[arg(long, env = "CN_EXTRACT_SHEET", default_value = cn_extract::config::DEFAULT_SHEET)]
    sheet: String,

    /// Rendering DPI (72–600).
    #[arg(long, env = "CN_EXTRACT_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Characters of recognised text sent to the extractor.
    #[arg(long, env = "CN_EXTRACT_MAX_TEXT_CHARS", default_value_t = 4000)]
    max_text_chars: usize,

    /// LLM provider: ollama, openai, anthropic, gemini, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Text model for field extraction.
    #[arg(long, env = "EDGEQUAKE_MODEL", default_value = cn_extract::config::DEFAULT_MODEL)]
    model: String,

    /// Vision model for text recognition.
    #[arg(long, env = "CN_EXTRACT_OCR_MODEL", default_value = cn_extract::config::DEFAULT_OCR_MODEL)]
    ocr_model: String,

    /// Time budget per model call in seconds (0 = none).
    #[arg(long, env = "CN_EXTRACT_TIMEOUT", default_value_t = 300)]
    timeout: u64,

    /// Retries per model call on failure.
    #[arg(long, env = "CN_EXTRACT_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Save the store after this many finished rows (0 = only at the end).
    #[arg(long, env = "CN_EXTRACT_PERSIST_EVERY", default_value_t = 1)]
    persist_every: usize,

    /// Re-run rows whose fields are already filled.
    #[arg(long, env = "CN_EXTRACT_REPROCESS")]
    reprocess: bool,

    /// Disable the progress bar (row lines are still printed).
    #[arg(long, env = "CN_EXTRACT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "CN_EXTRACT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "CN_EXTRACT_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar carries user feedback, so library INFO logs are
    // suppressed while it is shown.
    let show_progress = !cli.quiet && !cli.no_progress;
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

    match run(&cli).await {
        Ok(summary) => {
            if !cli.quiet {
                print_summary(&summary);
            }
            if summary.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            println!("{} {:#}", red("ERROR:"), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<RunSummary> {
    let progress: Option<ProgressCallback> = if cli.quiet {
        None
    } else {
        Some(CliProgressCallback::new(cli.no_progress) as Arc<dyn RowProgressCallback>)
    };
    let config = build_config(cli, progress)?;

    let mut store = RowStore::open(&cli.store, &config.sheet_name)
        .with_context(|| format!("Failed to open store {}", cli.store.display()))?;
    let processor = RowProcessor::from_config(config).context("Failed to set up the pipeline")?;

    processor
        .run(&mut store)
        .await
        .context("Processing aborted")
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .sheet_name(&cli.sheet)
        .dpi(cli.dpi)
        .max_text_chars(cli.max_text_chars)
        .model(&cli.model)
        .ocr_model(&cli.ocr_model)
        .capability_timeout_secs(cli.timeout)
        .max_retries(cli.max_retries)
        .persist_every(cli.persist_every)
        .reprocess_completed(cli.reprocess);

    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(s: &RunSummary) {
    let mark = if s.failed == 0 && s.processed > 0 {
        green("✔")
    } else if s.processed > 0 {
        cyan("⚠")
    } else {
        red("✘")
    };
    println!(
        "{}  {} processed, {} failed, {} skipped  {}",
        mark,
        bold(&s.processed.to_string()),
        if s.failed > 0 {
            red(&s.failed.to_string())
        } else {
            s.failed.to_string()
        },
        s.skipped_empty + s.skipped_completed,
        dim(&format!("{}ms", s.duration_ms)),
    );
}
