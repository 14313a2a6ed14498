//! CLI binary for rescheck.
//!
//! A thin shim over the library crate: maps flags to `ReviewConfig`, wires
//! the directory-backed stores, and prints records.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rescheck::{
    build_backends, load_document, BackendSpec, Category, DirKvStore, DirObjectStore,
    FeedbackReport, InvocationMethod, JobContext, KvStore, ModelAttempt, ObjectStore,
    Orchestrator, PdfiumRenderer, ProgressCallback, Rasterizer, ReviewConfig, ScoreBand,
    SubmissionProgressCallback, SubmissionRecord, SubmissionState,
};
use std::io;
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
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner whose message tracks the submission status; failed model
/// attempts are logged above it.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(SPINNER),
        );
        bar.set_prefix("Review");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl SubmissionProgressCallback for CliProgressCallback {
    fn on_state(&self, _id: &str, state: &SubmissionState, status: &str) {
        match state {
            SubmissionState::Complete => self.bar.finish_and_clear(),
            SubmissionState::Failed { .. } => {
                self.bar.finish_and_clear();
                eprintln!("{} {}", red("✘"), status);
            }
            _ => self.bar.set_message(status.to_string()),
        }
    }

    fn on_attempt_start(&self, backend: &str, method: InvocationMethod, _index: usize, _total: usize) {
        self.bar.set_prefix(format!("{backend} ({method})"));
    }

    fn on_attempt_complete(&self, attempt: &ModelAttempt) {
        if let Some(ref message) = attempt.message {
            self.bar.println(format!(
                "  {} {} {}  {}",
                yellow("⚠"),
                attempt.backend,
                dim(attempt.method.as_str()),
                message
            ));
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Review a résumé for a role
  rescheck submit resume.pdf --company Acme --title "Backend Engineer" \
      --description-file job.txt

  # Review a résumé hosted somewhere
  rescheck submit https://example.com/jane-doe.pdf --title "Data Analyst"

  # Only try one model
  rescheck --backend openai:gpt-4o-mini submit resume.pdf --title Engineer

  # List and inspect stored reviews
  rescheck list
  rescheck show 2f1c...

  # Re-run the AI step for a pending or failed submission
  rescheck reanalyze 2f1c...

  # Delete every stored file and record
  rescheck wipe --yes

DEFAULT BACKEND ORDER:
  anthropic  claude-3-5-sonnet-20241022
  anthropic  claude-3-sonnet-20240229
  anthropic  claude-3-haiku-20240307
  openai     gpt-4o
  openai     gpt-4o-mini
  openai     gpt-4-turbo
  openai     gpt-4.1-nano

  Backends whose API key is missing are skipped.

ENVIRONMENT VARIABLES:
  ANTHROPIC_API_KEY       Anthropic API key
  OPENAI_API_KEY          OpenAI API key
  RESCHECK_DATA_DIR       Where files and records are stored (default: .rescheck)
  PDFIUM_LIB_PATH         Path to an existing libpdfium; skips auto-download
  PDFIUM_AUTO_CACHE_DIR   Override the default pdfium cache directory
"#;

/// Review résumés against job descriptions using vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "rescheck",
    version,
    about = "Review résumés against job descriptions using vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory holding uploaded files and the record store.
    #[arg(long, global = true, env = "RESCHECK_DATA_DIR", default_value = ".rescheck")]
    data_dir: PathBuf,

    #[command(flatten)]
    models: ModelArgs,

    /// Print records as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, global = true, env = "RESCHECK_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "RESCHECK_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "RESCHECK_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// Backend as provider:model; repeat to build a priority list.
    #[arg(long = "backend", global = true, value_name = "PROVIDER:MODEL")]
    backends: Vec<BackendSpec>,

    /// Provider for a single backend (use with --model).
    #[arg(long, global = true, env = "RESCHECK_PROVIDER", requires = "model")]
    provider: Option<String>,

    /// Model for a single backend (use with --provider).
    #[arg(long, global = true, env = "RESCHECK_MODEL", requires = "provider")]
    model: Option<String>,

    /// Deadline for the primary call to each backend, in seconds.
    #[arg(long, global = true, default_value_t = 60)]
    primary_timeout: u64,

    /// Deadline for the fallback call to each backend, in seconds.
    #[arg(long, global = true, default_value_t = 45)]
    fallback_timeout: u64,

    /// Pause before moving to the next backend, in milliseconds.
    #[arg(long, global = true, default_value_t = 2000)]
    backoff_ms: u64,

    /// Largest accepted document, in MiB.
    #[arg(long, global = true, default_value_t = 20)]
    max_size_mb: u64,

    /// Page-1 upscaling factor (0.5–4.0).
    #[arg(long, global = true, default_value_t = 2.0)]
    scale: f32,

    /// HTTP download timeout in seconds.
    #[arg(long, global = true, default_value_t = 120)]
    download_timeout: u64,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a résumé (path or URL) and review it.
    Submit {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,

        /// Company the application is for.
        #[arg(long, default_value = "")]
        company: String,

        /// Job title.
        #[arg(long, default_value = "")]
        title: String,

        /// Job description text.
        #[arg(long, conflicts_with = "description_file")]
        description: Option<String>,

        /// Read the job description from a file.
        #[arg(long)]
        description_file: Option<PathBuf>,
    },
    /// Show one stored review.
    Show { id: String },
    /// List stored reviews.
    List,
    /// Run the AI step again for a stored submission.
    Reanalyze { id: String },
    /// Delete every stored file and record.
    Wipe {
        /// Required; wiping cannot be undone.
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as ProgressCallback)
    } else {
        None
    };
    let config = build_config(&cli.models, progress)?;

    let objects: Arc<dyn ObjectStore> = Arc::new(DirObjectStore::new(cli.data_dir.join("files")));
    let kv: Arc<dyn KvStore> = Arc::new(
        DirKvStore::open(cli.data_dir.join("kv.json"))
            .await
            .with_context(|| format!("Failed to open record store in {}", cli.data_dir.display()))?,
    );

    match cli.command {
        Command::Submit {
            ref input,
            ref company,
            ref title,
            ref description,
            ref description_file,
        } => {
            let description = match (description, description_file) {
                (Some(text), _) => text.clone(),
                (None, Some(path)) => tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read job description from {:?}", path))?,
                (None, None) => String::new(),
            };
            let document =
                load_document(input, config.download_timeout_secs, config.max_document_bytes)
                    .await
                    .context("Failed to load résumé")?;

            let rasterizer = Rasterizer::new(Arc::new(bind_pdfium(cli.quiet)?), &config);
            let backends = build_backends(&config, Arc::clone(&objects))?;
            let orchestrator = Orchestrator::new(&config, objects, kv, rasterizer, backends);

            let record = orchestrator
                .submit(document, JobContext::new(company, title, description))
                .await
                .context("Review failed")?;
            print_record(&record, cli.json)?;
        }
        Command::Show { ref id } => {
            let orchestrator = read_only(&config, objects, kv)?;
            let record = orchestrator
                .get(id)
                .await?
                .with_context(|| format!("No submission with id '{id}'"))?;
            print_record(&record, cli.json)?;
        }
        Command::List => {
            let orchestrator = read_only(&config, objects, kv)?;
            let records = orchestrator.list().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("{}", dim("No reviews stored."));
            } else {
                for record in &records {
                    print_summary_line(record);
                }
            }
        }
        Command::Reanalyze { ref id } => {
            let rasterizer = Rasterizer::new(Arc::new(NoRenderer), &config);
            let backends = build_backends(&config, Arc::clone(&objects))?;
            let orchestrator = Orchestrator::new(&config, objects, kv, rasterizer, backends);
            let record = orchestrator
                .reanalyze(id)
                .await
                .context("Re-analysis failed")?;
            print_record(&record, cli.json)?;
        }
        Command::Wipe { yes } => {
            if !yes {
                bail!("Refusing to wipe {} without --yes", cli.data_dir.display());
            }
            let orchestrator = read_only(&config, objects, kv)?;
            let summary = orchestrator.wipe().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                eprintln!(
                    "{} Deleted {} files and {} records",
                    green("✔"),
                    summary.objects_deleted,
                    summary.records_flushed
                );
                for path in &summary.objects_failed {
                    eprintln!("  {} could not delete {}", yellow("⚠"), path);
                }
            }
        }
    }

    Ok(())
}

/// Map CLI args to `ReviewConfig`.
fn build_config(args: &ModelArgs, progress: Option<ProgressCallback>) -> Result<ReviewConfig> {
    let mut builder = ReviewConfig::builder()
        .primary_timeout_secs(args.primary_timeout)
        .fallback_timeout_secs(args.fallback_timeout)
        .backoff_ms(args.backoff_ms)
        .max_document_bytes(args.max_size_mb.saturating_mul(1024 * 1024))
        .render_scale(args.scale)
        .download_timeout_secs(args.download_timeout);

    if let (Some(provider), Some(model)) = (&args.provider, &args.model) {
        builder = builder.backends(vec![BackendSpec::new(provider, model)]);
    } else if !args.backends.is_empty() {
        builder = builder.backends(args.backends.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Bind pdfium, showing a download bar the first time the library is fetched.
fn bind_pdfium(quiet: bool) -> Result<PdfiumRenderer> {
    if quiet || pdfium_auto::is_pdfium_cached() {
        return tokio::task::block_in_place(PdfiumRenderer::bind)
            .context("Failed to load the PDF engine");
    }

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER),
    );
    bar.set_prefix("PDF engine");
    bar.enable_steady_tick(Duration::from_millis(80));

    let on_progress = |downloaded: u64, total: Option<u64>| {
        if let Some(t) = total {
            if bar.length() != Some(t) {
                bar.set_length(t);
            }
        }
        bar.set_position(downloaded);
    };
    let renderer = tokio::task::block_in_place(|| {
        PdfiumRenderer::bind_with_progress(Some(&on_progress))
    })
    .context("Failed to download the PDF engine")?;
    bar.finish_and_clear();
    Ok(renderer)
}

/// Stand-in renderer for commands that never rasterise.
struct NoRenderer;

impl rescheck::PageRenderer for NoRenderer {
    fn render_first_page(
        &self,
        _bytes: &[u8],
        _scale: f32,
        _max_pixels: u32,
    ) -> Result<image::DynamicImage, rescheck::RasterError> {
        Err(rescheck::RasterError::EngineInit(
            "rendering is not available for this command".into(),
        ))
    }
}

fn read_only(
    config: &ReviewConfig,
    objects: Arc<dyn ObjectStore>,
    kv: Arc<dyn KvStore>,
) -> Result<Orchestrator> {
    let rasterizer = Rasterizer::new(Arc::new(NoRenderer), config);
    Ok(Orchestrator::new(config, objects, kv, rasterizer, Vec::new()))
}

// ── Output ───────────────────────────────────────────────────────────────────

fn paint_score(score: rescheck::Score) -> String {
    paint_band(score.band(), &score.to_string())
}

fn paint_band(band: ScoreBand, text: &str) -> String {
    match band {
        ScoreBand::Strong => green(text),
        ScoreBand::Fair => yellow(text),
        ScoreBand::Weak => red(text),
    }
}

fn print_summary_line(record: &SubmissionRecord) {
    println!("{}", summary_line(record));
}

fn summary_line(record: &SubmissionRecord) -> String {
    // pad before colouring: escape codes would count toward the width
    let score = match record.feedback.as_ref().and_then(FeedbackReport::overall_score) {
        Some(score) => paint_band(score.band(), &format!("{:<10}", score.to_string())),
        None if record.is_pending() => dim(&format!("{:<10}", "pending")),
        None => dim(&format!("{:<10}", "no score")),
    };
    format!(
        "{}  {}  {} {}",
        record.id,
        score,
        bold(if record.job_title.is_empty() { "(untitled)" } else { &record.job_title }),
        dim(&record.company_name),
    )
}

fn print_record(record: &SubmissionRecord, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(record)?);
        return Ok(());
    }

    println!("{}  {}", bold("Submission"), record.id);
    if !record.company_name.is_empty() {
        println!("Company:      {}", record.company_name);
    }
    if !record.job_title.is_empty() {
        println!("Job title:    {}", record.job_title);
    }
    println!("Résumé:       {}", record.raw_document_ref);
    println!("Page image:   {}", record.raster_image_ref);

    let Some(ref report) = record.feedback else {
        println!("\n{}", dim("Feedback pending."));
        return Ok(());
    };

    if let Some(score) = report.overall_score() {
        println!(
            "\n{} {}  {}",
            bold("Overall"),
            paint_score(score),
            score.band().label()
        );
    }

    if let Some(score) = report.ats_score() {
        println!("\n{} {}", bold("ATS"), paint_score(score));
        for suggestion in report.ats_suggestions() {
            println!("  • {suggestion}");
        }
    }

    for category in Category::ALL {
        println!();
        let Some(feedback) = report.category(category).filter(|f| !f.is_empty()) else {
            println!("{} {}", bold(category.label()), dim("no data"));
            continue;
        };
        match feedback.score() {
            Some(score) => println!("{} {}", bold(category.label()), paint_score(score)),
            None => println!("{}", bold(category.label())),
        }
        if let Some(summary) = feedback.summary() {
            println!("  {summary}");
        }
        for tip in feedback.tips() {
            let mark = match tip.kind {
                rescheck::TipKind::Good => green("✓"),
                rescheck::TipKind::Improve => yellow("!"),
            };
            println!("  {mark} {}", tip.tip);
            if let Some(ref explanation) = tip.explanation {
                println!("    {}", dim(explanation));
            }
        }
        for (label, items) in [
            ("Strengths", feedback.strengths()),
            ("Weaknesses", feedback.weaknesses()),
            ("Recommendations", feedback.recommendations()),
        ] {
            if !items.is_empty() {
                println!("  {}", dim(label));
                for item in items {
                    println!("    • {item}");
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rescheck::JobContext;

    fn visible(s: &str) -> String {
        regex::Regex::new("\x1b\\[[0-9;]*m").unwrap().replace_all(s, "").into_owned()
    }

    #[test]
    fn summary_columns_line_up_across_score_colours() {
        let context = JobContext::new("Acme", "Engineer", "");
        let pending = SubmissionRecord::provisional("id-1", "a.pdf", "a.png", &context);
        let mut scored = pending.clone();
        scored
            .attach_feedback(serde_json::from_str(r#"{"overallScore": 91}"#).unwrap())
            .unwrap();
        let mut weak = pending.clone();
        weak.attach_feedback(serde_json::from_str(r#"{"overallScore": 5}"#).unwrap())
            .unwrap();

        let columns: Vec<usize> = [&pending, &scored, &weak]
            .iter()
            .map(|r| visible(&summary_line(r)).find("Engineer").unwrap())
            .collect();
        assert_eq!(columns, vec![columns[0]; 3]);
        assert!(visible(&summary_line(&scored)).contains("91/100    "));
    }
}
