//! CLI flags, tracing setup, and the one-shot local pipeline run (§6.4).

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use docforge_core::{ProgressReporter, run_generation};
use docforge_shared::{DocforgeError, JobInputs, JobPhase, ServiceDefaults};
use docforge_summarizer::SummarizerConfig;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// docforge — turn a documentation site into a compact `llms.txt`.
#[derive(Parser)]
#[command(
    name = "docforge",
    version,
    about = "Crawl a documentation site and emit an LLM-optimized llms.txt (and optionally llms-full.txt).",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Root documentation URL to crawl.
    #[arg(long)]
    pub url: String,

    /// Maximum number of pages to crawl (1-1000).
    #[arg(long, default_value_t = 100)]
    pub max_pages: u32,

    /// Maximum crawl depth from the seed URL (1-10).
    #[arg(long, default_value_t = 3)]
    pub max_depth: u32,

    /// Size budget for llms.txt, in kilobytes.
    #[arg(long, default_value_t = 500)]
    pub max_kb: u64,

    /// Also emit the uncompressed llms-full.txt companion artifact.
    #[arg(long)]
    pub full: bool,

    /// Ignore robots.txt (disabled by default — crawling respects it).
    #[arg(long)]
    pub no_robots: bool,

    /// Where to write llms.txt (llms-full.txt is written alongside it).
    #[arg(long, default_value = "llms.txt")]
    pub output: PathBuf,

    /// Prefer pages whose declared `<html lang>` matches (soft filter, §9 OQ4).
    #[arg(long)]
    pub language: Option<String>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Initialize tracing based on CLI flags (§B).
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "docforge=info",
        1 => "docforge=debug",
        _ => "docforge=trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

/// Run the one-shot pipeline and return the process exit code (§6.4).
pub(crate) async fn run(cli: Cli) -> Result<ExitCode> {
    let defaults = ServiceDefaults::from_env().wrap_err("invalid environment configuration")?;

    let inputs = JobInputs {
        root_url: cli.url.clone(),
        max_pages: cli.max_pages,
        max_depth: cli.max_depth,
        max_kb: cli.max_kb,
        respect_robots: !cli.no_robots,
        request_full: cli.full,
        language: cli.language.clone(),
        user_agent: defaults.user_agent.clone(),
        request_delay_secs: defaults.request_delay_secs,
    };

    if let Err(message) = inputs.validate() {
        eprintln!("invalid input: {message}");
        return Ok(ExitCode::from(2));
    }

    let summarizer_config = SummarizerConfig::new(defaults.llm_api_base.clone(), defaults.llm_api_key.clone(), defaults.llm_model_id.clone());

    info!(url = %cli.url, max_pages = cli.max_pages, max_depth = cli.max_depth, "starting generation");

    let progress = CliProgress::new();
    {
        let cancelled = progress.cancelled.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancelled.store(true, Ordering::Relaxed);
            }
        });
    }

    let ceiling = Duration::from_secs(docforge_core::DEFAULT_JOB_CEILING_SECS);
    let result = run_generation(&inputs, &summarizer_config, ceiling, &progress).await;
    progress.finish();

    match result {
        Ok(output) => {
            write_artifacts(&cli.output, &output.llm_txt, output.llms_full_txt.as_deref()).wrap_err("failed to write output artifacts")?;

            println!();
            println!("  Generation complete!");
            println!("  Pages discovered: {}", output.pages_discovered);
            println!("  Pages processed:  {}", output.pages_processed);
            println!("  Pages crawled:    {}", output.pages_crawled);
            println!("  Size:             {} KB", output.total_size_kb);
            println!("  Output:           {}", cli.output.display());
            if output.llms_full_txt_written() {
                println!("  Full output:      {}", full_output_path(&cli.output).display());
            }
            println!();

            Ok(ExitCode::from(0))
        }
        Err(DocforgeError::Input { message }) => {
            eprintln!("invalid input: {message}");
            Ok(ExitCode::from(2))
        }
        Err(e @ DocforgeError::Composition(_)) => {
            eprintln!("generation failed: {e}");
            Ok(ExitCode::from(3))
        }
        Err(DocforgeError::Cancelled(reason)) => {
            eprintln!("cancelled: {reason}");
            Ok(ExitCode::from(4))
        }
        Err(e) => {
            eprintln!("generation failed: {e}");
            Ok(ExitCode::from(1))
        }
    }
}

/// Small extension so the summary print above reads naturally without
/// re-deriving whether a full artifact was requested.
trait GenerationOutputExt {
    fn llms_full_txt_written(&self) -> bool;
}

impl GenerationOutputExt for docforge_core::GenerationOutput {
    fn llms_full_txt_written(&self) -> bool {
        self.llms_full_txt.is_some()
    }
}

fn write_artifacts(output_path: &Path, llm_txt: &str, llms_full_txt: Option<&str>) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(output_path, llm_txt)?;

    if let Some(full) = llms_full_txt {
        std::fs::write(full_output_path(output_path), full)?;
    }
    Ok(())
}

/// Derive the `llms-full.txt` sibling path from the `llms.txt` output path
/// (e.g. `out/llms.txt` -> `out/llms-full.txt`).
fn full_output_path(output_path: &Path) -> PathBuf {
    match output_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join("llms-full.txt"),
        _ => PathBuf::from("llms-full.txt"),
    }
}

/// CLI progress reporter: an indicatif spinner driven by the orchestrator's
/// synchronous [`ProgressReporter`] callbacks, plus a ctrl-c-driven
/// cancellation flag (§5 checkpoints).
struct CliProgress {
    spinner: ProgressBar,
    cancelled: Arc<AtomicBool>,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self {
            spinner,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, phase: JobPhase) {
        let label = match phase {
            JobPhase::Initializing => "initializing",
            JobPhase::Crawling => "crawling",
            JobPhase::Extracting => "extracting",
            JobPhase::Composing => "composing",
        };
        self.spinner.set_message(label.to_string());
    }

    fn record(&self, pages_discovered: u32, pages_processed: u32, pages_crawled: u32, current_page_url: Option<&str>) {
        match current_page_url {
            Some(url) => self.spinner.set_message(format!("[{pages_processed}/{pages_discovered} discovered, {pages_crawled} crawled] {url}")),
            None => self.spinner.set_message(format!("[{pages_processed}/{pages_discovered} discovered, {pages_crawled} crawled]")),
        }
    }

    fn log(&self, line: &str) {
        self.spinner.println(line);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_output_path_lands_alongside_llm_txt() {
        assert_eq!(full_output_path(Path::new("out/llms.txt")), PathBuf::from("out/llms-full.txt"));
        assert_eq!(full_output_path(Path::new("llms.txt")), PathBuf::from("llms-full.txt"));
    }
}
