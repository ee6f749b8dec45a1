//! CLI binary for receipt-extract.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, reads saved model responses and prints JSON results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use receipt_extract::{
    build_receipt_prompt, extract, extract_batch, write_result_json, CategoryOverride,
    ExtractionConfig, ExtractionProgressCallback, ExtractionResult, ExtractionStatus,
    ProgressCallback, MAX_REPAIR_ATTEMPTS,
};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
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
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

fn status_mark(status: ExtractionStatus) -> String {
    match status {
        ExtractionStatus::Ok => green("✓"),
        ExtractionStatus::Degraded => yellow("⚠"),
        ExtractionStatus::Failed => red("✗"),
    }
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the batch plus a log line per
/// receipt. Receipts may complete out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Display name per input, indexed like the batch.
    labels: Vec<String>,
    degraded: AtomicUsize,
}

impl CliProgressCallback {
    fn new(labels: Vec<String>) -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} receipts  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        let bar = ProgressBar::new(labels.len() as u64);
        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            labels,
            degraded: AtomicUsize::new(0),
        })
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_length(total as u64);
    }

    fn on_receipt_complete(
        &self,
        index: usize,
        total: usize,
        status: ExtractionStatus,
        items: usize,
    ) {
        if status == ExtractionStatus::Degraded {
            self.degraded.fetch_add(1, Ordering::SeqCst);
        }
        let label = self.labels.get(index).map(String::as_str).unwrap_or("?");
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {:<9}  {}",
            status_mark(status),
            index + 1,
            total,
            dim(&format!("{items:>3} items")),
            label,
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, usable: usize) {
        self.bar.finish_and_clear();
        let failed = total.saturating_sub(usable);
        let degraded = self.degraded.load(Ordering::SeqCst);
        eprintln!(
            "{} {}/{} receipts usable  ({} degraded, {} failed)",
            if failed == 0 { green("✔") } else { red("✘") },
            bold(&usable.to_string()),
            total,
            degraded,
            if failed == 0 {
                failed.to_string()
            } else {
                red(&failed.to_string())
            },
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract one saved model response (JSON to stdout)
  receipt-extract response.txt

  # Read from stdin
  cat response.txt | receipt-extract -

  # Write the result atomically to a file
  receipt-extract response.txt -o result.json

  # Many responses at once; prints a JSON array in input order
  receipt-extract responses/*.txt --concurrency 8 > results.json

  # Only accept responses that parse verbatim
  receipt-extract --strict response.txt

  # Extra keyword rules, checked before the built-in ones
  receipt-extract --override "salt block=feed_supplies" --override "diesel=fuel" response.txt

  # Fail the shell pipeline unless every receipt is clean
  receipt-extract --require-ok responses/*.txt

  # Print the system prompt to send to the model
  receipt-extract --print-prompt --override "diesel=fuel"

CATEGORIES:
  feed_supplies  veterinary_health  equipment  uncategorized_supplies
  An --override naming any other category adds it to the taxonomy.

EXIT CODES:
  0  success
  1  fatal error (unreadable input, bad configuration, unwritable output)
  2  --require-ok was given and at least one result is not "ok"

ENVIRONMENT VARIABLES:
  RUST_LOG                       tracing filter (overrides -v / -q)
  RECEIPT_EXTRACT_CONFIG         default for --config
  RECEIPT_EXTRACT_STRICT         default for --strict
  RECEIPT_EXTRACT_CONCURRENCY    default for --concurrency
"#;

/// Turn language-model receipt responses into validated purchase records.
#[derive(Parser, Debug)]
#[command(
    name = "receipt-extract",
    version,
    about = "Turn language-model receipt responses into validated purchase records",
    long_about = "Reads the raw text a language model returned for a photographed receipt \
(fenced, chatty, truncated or slightly malformed JSON) and prints a validated, categorised \
purchase record with a diagnostic for everything that had to be fixed or dropped.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Files holding raw model responses, or `-` for stdin.
    #[arg(default_value = "-")]
    inputs: Vec<String>,

    /// Write the JSON result to this file instead of stdout.
    #[arg(short, long, env = "RECEIPT_EXTRACT_OUTPUT")]
    output: Option<PathBuf>,

    /// JSON config file (camelCase keys); flags below override it.
    #[arg(long, env = "RECEIPT_EXTRACT_CONFIG")]
    config: Option<PathBuf>,

    /// Only accept responses that parse verbatim; no repair or heuristics.
    #[arg(long, env = "RECEIPT_EXTRACT_STRICT")]
    strict: bool,

    /// Repair passes before heuristic recovery (1–8).
    #[arg(long, env = "RECEIPT_EXTRACT_MAX_REPAIR_ATTEMPTS",
          value_parser = clap::value_parser!(u32).range(1..=MAX_REPAIR_ATTEMPTS as i64))]
    max_repair_attempts: Option<u32>,

    /// Keyword rule `keyword=category`, checked before the built-ins. Repeatable.
    #[arg(long = "override", value_name = "KEYWORD=CATEGORY")]
    overrides: Vec<CategoryOverride>,

    /// Number of responses processed in parallel.
    #[arg(short, long, env = "RECEIPT_EXTRACT_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Single-line JSON instead of pretty-printed.
    #[arg(long, env = "RECEIPT_EXTRACT_COMPACT")]
    compact: bool,

    /// Exit with code 2 when any result is not `ok`.
    #[arg(long, env = "RECEIPT_EXTRACT_REQUIRE_OK")]
    require_ok: bool,

    /// Print the system prompt for the configured taxonomy and exit.
    #[arg(long)]
    print_prompt: bool,

    /// Disable progress bar.
    #[arg(long, env = "RECEIPT_EXTRACT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "RECEIPT_EXTRACT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "RECEIPT_EXTRACT_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active.
    let show_progress = !cli.quiet && !cli.no_progress && cli.inputs.len() > 1;
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

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new(cli.inputs.clone());
        Some(cb as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    if cli.print_prompt {
        println!("{}", build_receipt_prompt(&config.custom_categories()));
        return Ok(());
    }

    // ── Read inputs ──────────────────────────────────────────────────────
    let mut responses = Vec::with_capacity(cli.inputs.len());
    for input in &cli.inputs {
        responses.push(read_input(input).await?);
    }

    // ── Run extraction ───────────────────────────────────────────────────
    let results: Vec<ExtractionResult> = if responses.len() == 1 {
        let raw = responses.remove(0);
        vec![tokio::task::spawn_blocking({
            let config = config.clone();
            move || extract(raw, &config)
        })
        .await
        .context("Extraction task failed")?]
    } else {
        extract_batch(responses, &config)
            .await
            .context("Batch extraction failed")?
    };

    // ── Emit ─────────────────────────────────────────────────────────────
    let single = results.len() == 1;
    if let Some(ref path) = cli.output {
        let written = if single {
            write_result_json(&results[0], path)
        } else {
            write_result_json(&results, path)
        };
        written.with_context(|| format!("Failed to write {}", path.display()))?;
        if !cli.quiet {
            eprintln!("{}  →  {}", summary_line(&results), bold(&path.display().to_string()));
        }
    } else {
        let json = match (single, cli.compact) {
            (true, true) => serde_json::to_string(&results[0]),
            (true, false) => serde_json::to_string_pretty(&results[0]),
            (false, true) => serde_json::to_string(&results),
            (false, false) => serde_json::to_string_pretty(&results),
        }
        .context("Failed to serialise results")?;
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        writeln!(handle, "{json}").context("Failed to write to stdout")?;
        if !cli.quiet && !show_progress {
            eprintln!("{}", summary_line(&results));
        }
    }

    if !cli.quiet && single {
        for d in &results[0].diagnostics {
            eprintln!("  {} {}", dim(&format!("{:?}", d.severity).to_lowercase()), d);
        }
    }

    if cli.require_ok && results.iter().any(|r| r.status != ExtractionStatus::Ok) {
        std::process::exit(2);
    }
    Ok(())
}

/// Map CLI args (and the optional config file) to `ExtractionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut config = match cli.config {
        Some(ref path) => ExtractionConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ExtractionConfig::default(),
    };

    if cli.strict {
        config.strict_mode = true;
    }
    if let Some(n) = cli.max_repair_attempts {
        config.max_repair_attempts = n;
    }
    if let Some(n) = cli.concurrency {
        config.concurrency = n;
    }
    // Command-line overrides win over the ones from the file.
    if !cli.overrides.is_empty() {
        let mut overrides = cli.overrides.clone();
        overrides.append(&mut config.category_overrides);
        config.category_overrides = overrides;
    }
    config.progress_callback = progress;

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read response from stdin")?;
        return Ok(buf);
    }
    tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("Failed to read response from {input}"))
}

fn summary_line(results: &[ExtractionResult]) -> String {
    let count = |s: ExtractionStatus| results.iter().filter(|r| r.status == s).count();
    let items: usize = results
        .iter()
        .filter_map(|r| r.record.as_ref())
        .map(|r| r.items.len())
        .sum();
    let failed = count(ExtractionStatus::Failed);
    format!(
        "{} {} ok, {} degraded, {} failed  {}",
        if failed == 0 { green("✔") } else { red("✘") },
        count(ExtractionStatus::Ok),
        count(ExtractionStatus::Degraded),
        failed,
        dim(&format!("({items} items)")),
    )
}
