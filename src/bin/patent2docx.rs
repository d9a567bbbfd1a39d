//! CLI binary for edgequake-patent2docx.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `AnalysisConfig`, runs one analysis and writes the report.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_patent2docx::config::{DEFAULT_PROMPT_PATH, ENV_API_KEY, ENV_BASE_URL, ENV_MODEL};
use edgequake_patent2docx::{
    inspect, write_report, AnalysisConfigBuilder, AnalysisProgressCallback, Analyzer,
    ProgressCallback, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner showing the current stage, with one log line per finished stage
/// and per rate-limit wait.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl AnalysisProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_message(bold(stage.label()));
    }

    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        self.bar.println(format!(
            "  {} {}  {}",
            green("✓"),
            stage.label(),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
    }

    fn on_rate_limited(&self, attempt: u32, max_attempts: u32, delay: Duration) {
        self.bar.println(format!(
            "  {} Rate limited (attempt {}/{}), retrying in {:.1}s",
            yellow("⚠"),
            attempt,
            max_attempts,
            delay.as_secs_f64(),
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyse a patent; writes CN112233445A_patent-analysis-report.docx
  patent2docx CN112233445A.pdf

  # Choose the output path
  patent2docx US10123456B2.pdf -o reports/US10123456B2.docx

  # Long patents: read fewer pages or use a long-context model
  patent2docx --max-pages 60 EP3456789A1.pdf
  patent2docx --model moonshot-v1-128k EP3456789A1.pdf

  # Print the raw model reply as well
  patent2docx --show-raw CN112233445A.pdf

  # Inspect PDF metadata (no API key needed)
  patent2docx --inspect-only CN112233445A.pdf

  # JSON summary (sections + stats) on stdout
  patent2docx --json CN112233445A.pdf > summary.json

ENVIRONMENT VARIABLES:
  KIMI_API_KEY       API key for the chat endpoint (required)
  KIMI_TEXT_MODEL    Model ID (default: moonshot-v1-8k)
  KIMI_BASE_URL      OpenAI-compatible base URL (default: https://api.moonshot.cn/v1)
  RUST_LOG           Log filter, e.g. RUST_LOG=edgequake_patent2docx=debug

  Variables are also read from a .env file in the working directory.

NOTES:
  Only PDFs with a text layer are supported. Scanned patents need OCR first.
  HTTP 429 responses are retried up to 6 times with exponential backoff.
"#;

/// Analyse patent PDFs with an LLM and write a Word report.
#[derive(Parser, Debug)]
#[command(
    name = "patent2docx",
    version,
    about = "Analyse patent PDFs with an LLM and write a Word report",
    long_about = "Extract the text of a patent PDF, ask an OpenAI-compatible chat model \
(Moonshot/Kimi by default) for a brief summary, a full analysis and a translation, and \
write the result as a .docx report.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local patent PDF.
    input: PathBuf,

    /// Report path. Default: <stem>_patent-analysis-report.docx in the
    /// current directory.
    #[arg(short, long, env = "PATENT2DOCX_OUTPUT")]
    output: Option<PathBuf>,

    /// Maximum number of pages to read (1–600).
    #[arg(long, env = "PATENT2DOCX_MAX_PAGES", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(1..=600))]
    max_pages: u32,

    /// Sampling temperature (0.0–1.0).
    #[arg(long, env = "PATENT2DOCX_TEMPERATURE", default_value_t = 0.2,
          value_parser = parse_temperature)]
    temperature: f32,

    /// Max output tokens for the analysis.
    #[arg(long, env = "PATENT2DOCX_MAX_TOKENS", default_value_t = 2000)]
    max_tokens: u32,

    /// Chat model ID.
    #[arg(long, env = ENV_MODEL)]
    model: Option<String>,

    /// OpenAI-compatible base URL.
    #[arg(long, env = ENV_BASE_URL)]
    base_url: Option<String>,

    /// API key for the chat endpoint.
    #[arg(long, env = ENV_API_KEY, hide_env_values = true)]
    api_key: Option<String>,

    /// Prompt template file.
    #[arg(long, env = "PATENT2DOCX_PROMPT", default_value = DEFAULT_PROMPT_PATH)]
    prompt: PathBuf,

    /// Chat request timeout in seconds.
    #[arg(long, env = "PATENT2DOCX_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Also print the raw model reply to stdout.
    #[arg(long)]
    show_raw: bool,

    /// Print a JSON summary (sections + stats) to stdout.
    #[arg(long, env = "PATENT2DOCX_JSON")]
    json: bool,

    /// Print PDF metadata only, no analysis.
    #[arg(long)]
    inspect_only: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "PATENT2DOCX_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PATENT2DOCX_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PATENT2DOCX_QUIET")]
    quiet: bool,
}

fn parse_temperature(s: &str) -> std::result::Result<f32, String> {
    let t: f32 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a number"))?;
    if (0.0..=1.0).contains(&t) {
        Ok(t)
    } else {
        Err(format!("temperature must be within 0.0–1.0, got {t}"))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner provides the feedback that matters; keep INFO logs from
    // tearing through it unless --verbose asks for them.
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

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let info = inspect(&cli.input).await.context("Failed to inspect PDF")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialize metadata")?
            );
        } else {
            println!("File:         {}", cli.input.display());
            println!("Pages:        {}", info.page_count);
            println!("PDF Version:  {}", info.pdf_version);
            println!("Encrypted:    {}", info.is_encrypted);
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress = if show_progress {
        Some(CliProgressCallback::new())
    } else {
        None
    };

    let analyzer = build_analyzer(
        &cli,
        progress.clone().map(|cb| cb as ProgressCallback),
    )?;

    // Ctrl-C aborts the chat call or a rate-limit wait instead of killing
    // the process mid-write.
    let cancel = analyzer.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    // ── Run analysis ─────────────────────────────────────────────────────
    let result = analyzer.analyze_file(&cli.input).await;
    if let Some(ref cb) = progress {
        cb.finish();
    }
    let output = result.with_context(|| format!("Analysis of {} failed", cli.input.display()))?;

    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&output.file_name));
    write_report(&output_path, &output.report)
        .await
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    }

    if cli.show_raw {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(output.raw_text.as_bytes())
            .context("Failed to write to stdout")?;
        if !output.raw_text.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet && !cli.json {
        let stats = &output.stats;
        eprintln!(
            "{}  {}/{} pages  {}ms  →  {}",
            green("✔"),
            stats.processed_pages,
            stats.total_pages,
            stats.total_ms,
            bold(&output_path.display().to_string()),
        );
        eprintln!(
            "   {} chars sent  /  {} chat attempt(s)",
            dim(&stats.cleaned_chars.to_string()),
            dim(&stats.chat_attempts.to_string()),
        );
        if !output.sections.has_brief() || !output.sections.has_translation() {
            eprintln!(
                "   {} some sections were not detected in the reply; see {}",
                cyan("ℹ"),
                dim("--show-raw"),
            );
        }
    }

    Ok(())
}

/// Map CLI args to an `Analyzer`.
fn build_analyzer(cli: &Cli, progress: Option<ProgressCallback>) -> Result<Analyzer> {
    let mut builder = AnalysisConfigBuilder::from_env()
        .max_pages(cli.max_pages as usize)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .prompt_path(&cli.prompt)
        .request_timeout_secs(cli.api_timeout);

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref url) = cli.base_url {
        builder = builder.base_url(url);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    let config = builder.build().context("Invalid configuration")?;
    Analyzer::new(config).context("Cannot create the analyzer")
}
