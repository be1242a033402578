//! CLI binary for pagescribe.
//!
//! A thin shim over the library crate that maps CLI flags to `BatchConfig`,
//! draws progress, asks the operator what to do when an item fails, and
//! prints the run summary.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use pagescribe::{
    render_document, transcribe_images, AbortAfter, AlwaysAbort, AlwaysContinue, BatchConfig,
    BatchProgress, BatchProgressCallback, BatchReport, Decision, FailureContext, FailureDecision,
    InstructionPolicy, ItemError, PageRange, ProgressCallback, RendererBackend, UsageTotals,
};
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
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

/// Terminal progress callback: a live progress bar plus one log line per item.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Noun shown next to the counter ("chunks", "pages").
    unit: &'static str,
}

impl CliProgressCallback {
    fn new(unit: &'static str) -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar, unit })
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_items: usize) {
        let style = ProgressStyle::with_template(&format!(
            "{{spinner:.cyan}} {{prefix:.bold}}  \
             [{{bar:42.green/238}}] {{pos:>3}}/{{len}} {}  \
             ⏱ {{elapsed_precise}}  {{msg}}",
            self.unit
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_items as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Working");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_items} {}…", self.unit))
        ));
    }

    fn on_item_start(&self, _progress: BatchProgress, label: &str) {
        self.bar.set_message(label.to_string());
    }

    fn on_item_complete(
        &self,
        progress: BatchProgress,
        label: &str,
        elapsed: Duration,
        totals: &UsageTotals,
        cost_usd: f64,
    ) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            green("✓"),
            progress.ordinal(),
            progress.total,
            label,
            dim(&format!(
                "{:.1}s  {} in / {} out  ${:.4}",
                elapsed.as_secs_f64(),
                totals.input_tokens,
                totals.output_tokens,
                cost_usd
            )),
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, progress: BatchProgress, label: &str, error: &ItemError) {
        let error = error.to_string();
        let msg = if error.chars().count() > 100 {
            let cut: String = error.chars().take(99).collect();
            format!("{cut}\u{2026}")
        } else {
            error
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            red("✗"),
            progress.ordinal(),
            progress.total,
            label,
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, _report: &BatchReport) {
        self.bar.finish_and_clear();
    }
}

// ── Interactive failure decision ─────────────────────────────────────────────

/// Asks the operator on stderr/stdin whether to continue after a failure.
///
/// The progress bar (if any) is suspended while waiting for the answer.
/// Without a terminal on stdin there is nobody to ask, so the run aborts.
struct AskOperator {
    bar: Option<ProgressBar>,
}

impl AskOperator {
    fn prompt(failure: &FailureContext<'_>) -> Decision {
        if !io::stdin().is_terminal() {
            eprintln!("{} stdin is not a terminal; aborting", red("✘"));
            return Decision::Abort;
        }
        eprintln!(
            "{} {} failed: {}",
            red("✘"),
            bold(failure.label),
            failure.error
        );
        eprintln!(
            "   {} of {} done so far: {} tokens in / {} tokens out, ${:.4}",
            failure.completed,
            failure.progress.total,
            failure.totals.input_tokens,
            failure.totals.output_tokens,
            failure.cost_usd
        );
        let stdin = io::stdin();
        loop {
            eprint!("   Continue with the next item? [y/N] ");
            let _ = io::stderr().flush();
            let mut answer = String::new();
            if stdin.lock().read_line(&mut answer).unwrap_or(0) == 0 {
                return Decision::Abort;
            }
            match answer.trim().to_lowercase().as_str() {
                "y" | "yes" => return Decision::Continue,
                "" | "n" | "no" => return Decision::Abort,
                _ => continue,
            }
        }
    }
}

impl FailureDecision for AskOperator {
    fn decide(&self, failure: &FailureContext<'_>) -> Decision {
        tokio::task::block_in_place(|| match self.bar {
            Some(ref bar) => bar.suspend(|| Self::prompt(failure)),
            None => Self::prompt(failure),
        })
    }
}

// ── Arguments ────────────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  # Render a whole book to page images next to it
  pagescribe render book.pdf

  # Render pages 10-60 at 400 DPI into scans/ with poppler
  pagescribe render book.pdf 10 60 --dpi 400 --backend poppler --image-dir scans

  # Transcribe every image in scans/, writing Markdown to transcripts/
  pagescribe transcribe scans --output-dir transcripts

  # Unattended run: skip failures, print the report as JSON
  pagescribe transcribe scans --on-error continue --json > report.json

ARTIFACT FORMAT:
  ---
  source_path: "scans/book_p0012.png"
  input_tokens: 1532
  output_tokens: 611
  elapsed_seconds: 4.217
  estimated_cost_usd: 0.0003976
  manually_edited: false
  ---

  <transcribed page>

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium for the pdfium backend
  RUST_LOG                Log filter (overrides -v / -q)
"#;

/// Render scanned PDFs to page images and transcribe them with Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "pagescribe",
    version,
    about = "Render scanned PDFs to page images and transcribe them with Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rasterise a page range of a PDF into PNG page images.
    Render(RenderArgs),
    /// Transcribe page images into Markdown artifacts.
    Transcribe(TranscribeArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// What to do when an item fails: ask, continue, abort.
    #[arg(long, global = true, env = "PAGESCRIBE_ON_ERROR", value_enum, default_value = "ask")]
    on_error: OnErrorArg,

    /// Abort after this many failures (with --on-error continue).
    #[arg(long, global = true, env = "PAGESCRIBE_MAX_FAILURES")]
    max_failures: Option<usize>,

    /// Print the batch report as JSON on stdout.
    #[arg(long, global = true, env = "PAGESCRIBE_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "PAGESCRIBE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PAGESCRIBE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PAGESCRIBE_QUIET")]
    quiet: bool,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Source PDF.
    input: PathBuf,

    /// First page (1-indexed, inclusive). Default: 1.
    #[arg(allow_negative_numbers = true)]
    start: Option<i64>,

    /// Last page (1-indexed, inclusive). Default: last page.
    #[arg(allow_negative_numbers = true)]
    end: Option<i64>,

    /// Rendering DPI (72–600).
    #[arg(long, env = "PAGESCRIBE_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Cap on the longest edge of a page image, in pixels.
    #[arg(long, env = "PAGESCRIBE_MAX_PIXELS")]
    max_pixels: Option<u32>,

    /// Rasteriser: pdfium (in-process) or poppler (pdftoppm).
    #[arg(long, env = "PAGESCRIBE_BACKEND", value_enum, default_value = "pdfium")]
    backend: BackendArg,

    /// Directory for page images. Default: next to the PDF.
    #[arg(long, env = "PAGESCRIBE_IMAGE_DIR")]
    image_dir: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PAGESCRIBE_PASSWORD")]
    password: Option<String>,
}

#[derive(Args, Debug)]
struct TranscribeArgs {
    /// Page images, or directories containing them.
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Directory for Markdown artifacts. Default: next to each image.
    #[arg(short, long, env = "PAGESCRIBE_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Replace existing artifacts (they may contain manual edits).
    #[arg(long, env = "PAGESCRIBE_OVERWRITE")]
    overwrite: bool,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Margin layout: mirrored (notes switch sides by page parity) or uniform.
    #[arg(long, env = "PAGESCRIBE_LAYOUT", value_enum, default_value = "mirrored")]
    layout: LayoutArg,

    /// Text file with a custom per-page instruction (implies a uniform layout).
    #[arg(long, env = "PAGESCRIBE_INSTRUCTIONS")]
    instructions: Option<PathBuf>,

    /// Text file with a custom system prompt.
    #[arg(long, env = "PAGESCRIBE_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// USD per million input tokens.
    #[arg(long, env = "PAGESCRIBE_INPUT_RATE", default_value_t = 0.10)]
    input_rate: f64,

    /// USD per million output tokens.
    #[arg(long, env = "PAGESCRIBE_OUTPUT_RATE", default_value_t = 0.40)]
    output_rate: f64,

    /// Max LLM output tokens per page.
    #[arg(long, env = "PAGESCRIBE_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PAGESCRIBE_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OnErrorArg {
    Ask,
    Continue,
    Abort,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    Pdfium,
    Poppler,
}

impl From<BackendArg> for RendererBackend {
    fn from(v: BackendArg) -> Self {
        match v {
            BackendArg::Pdfium => RendererBackend::Pdfium,
            BackendArg::Poppler => RendererBackend::Poppler,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LayoutArg {
    Mirrored,
    Uniform,
}

// ── Main ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let common = &cli.common;

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !common.quiet && !common.no_progress && !common.json;
    let filter = if common.verbose {
        "debug"
    } else if common.quiet || show_progress {
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

    let unit = match cli.command {
        Command::Render(_) => "chunks",
        Command::Transcribe(_) => "pages",
    };
    let progress = show_progress.then(|| CliProgressCallback::new(unit));
    let decision = failure_decision(common, progress.as_ref().map(|p| p.bar.clone()));

    let mut builder = BatchConfig::builder().on_failure(decision);
    if let Some(cb) = progress.clone() {
        builder = builder.progress_callback(cb as ProgressCallback);
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let outcome = match cli.command {
        Command::Render(ref args) => {
            let config = render_config(builder, args)?;
            // Pages are typed 1-indexed; the library works zero-indexed.
            render_document(
                &args.input,
                PageRange::zero_indexed(args.start),
                PageRange::zero_indexed(args.end),
                &config,
            )
            .await
            .context("Render failed")
        }
        Command::Transcribe(ref args) => {
            let config = transcribe_config(builder, args).await?;
            transcribe_images(&args.paths, &config)
                .await
                .context("Transcription failed")
        }
    };

    if let Some(ref cb) = progress {
        cb.bar.finish_and_clear();
    }
    let report = outcome?;

    if common.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !common.quiet {
        print_summary(&report);
    }

    Ok(())
}

fn failure_decision(common: &CommonArgs, bar: Option<ProgressBar>) -> Arc<dyn FailureDecision> {
    match (common.on_error, common.max_failures) {
        (OnErrorArg::Continue, Some(n)) => Arc::new(AbortAfter(n.max(1))),
        (OnErrorArg::Continue, None) => Arc::new(AlwaysContinue),
        (OnErrorArg::Abort, _) => Arc::new(AlwaysAbort),
        (OnErrorArg::Ask, _) => Arc::new(AskOperator { bar }),
    }
}

/// Map `render` args to `BatchConfig`.
fn render_config(
    builder: pagescribe::BatchConfigBuilder,
    args: &RenderArgs,
) -> Result<BatchConfig> {
    let mut builder = builder.dpi(args.dpi).renderer(args.backend.into());
    if let Some(px) = args.max_pixels {
        builder = builder.max_rendered_pixels(px);
    }
    if let Some(ref dir) = args.image_dir {
        builder = builder.image_dir(dir);
    }
    if let Some(ref pwd) = args.password {
        builder = builder.password(pwd);
    }
    builder.build().context("Invalid configuration")
}

/// Map `transcribe` args to `BatchConfig`.
async fn transcribe_config(
    builder: pagescribe::BatchConfigBuilder,
    args: &TranscribeArgs,
) -> Result<BatchConfig> {
    let instructions = match (args.instructions.as_ref(), args.layout) {
        (Some(path), _) => InstructionPolicy::Uniform(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read instructions from {:?}", path))?,
        ),
        (None, LayoutArg::Mirrored) => InstructionPolicy::default(),
        (None, LayoutArg::Uniform) => InstructionPolicy::uniform(),
    };

    let mut builder = builder
        .instructions(instructions)
        .rates(args.input_rate, args.output_rate)
        .max_tokens(args.max_tokens)
        .temperature(args.temperature)
        .fail_if_exists(!args.overwrite);

    if let Some(ref path) = args.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref dir) = args.output_dir {
        builder = builder.output_dir(dir);
    }
    if let Some(ref model) = args.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider);
    }
    builder.build().context("Invalid configuration")
}

fn print_summary(report: &BatchReport) {
    let skipped = report.failures.len();
    eprintln!(
        "{}  {}/{} done  {:.1}s",
        if skipped == 0 { green("✔") } else { cyan("⚠") },
        report.completed,
        report.total_items,
        report.elapsed_ms as f64 / 1000.0,
    );
    if report.totals.records > 0 {
        eprintln!(
            "   {} tokens in  /  {} tokens out  —  ${:.4}",
            dim(&report.totals.input_tokens.to_string()),
            dim(&report.totals.output_tokens.to_string()),
            report.cost_usd,
        );
    }
    for failure in &report.failures {
        eprintln!("   {} skipped {}: {}", red("✗"), failure.label, failure.error);
    }
}
