use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::{style, Term};
use img_webp::{
    validate_selection, BatchSummary, Candidate, CollisionPolicy, ConvertError, EstimationRecord,
    Scheduler, SchedulerOptions, WebpCodec, DEFAULT_MAX_FILES,
};
use shared_utils::logging::{init_logging, LogConfig};
use shared_utils::{
    format_bytes, format_duration, install_ctrlc_handler, print_summary_report,
    CancellationToken, UnifiedProgressBar,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "img-webp")]
#[command(version, about = "Batch-convert JPEG/PNG images to WebP", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Preview the WebP size of each file without writing anything
    Estimate {
        #[arg(value_name = "FILES")]
        files: Vec<PathBuf>,

        /// Largest selection accepted in one batch
        #[arg(long, default_value_t = DEFAULT_MAX_FILES)]
        max_files: usize,

        /// Worker threads (default 5)
        #[arg(short, long)]
        jobs: Option<usize>,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Convert each file to `<name>.webp` next to the original
    Convert {
        #[arg(value_name = "FILES")]
        files: Vec<PathBuf>,

        /// Largest selection accepted in one batch
        #[arg(long, default_value_t = DEFAULT_MAX_FILES)]
        max_files: usize,

        /// Worker threads (default: --max-files)
        #[arg(short, long)]
        jobs: Option<usize>,

        /// What to do when the .webp already exists
        #[arg(long, value_enum, default_value = "overwrite")]
        on_conflict: OnConflict,

        /// Show the size preview and ask before converting
        #[arg(long)]
        confirm: bool,

        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args)]
struct CommonArgs {
    #[arg(short, long, value_enum, default_value = "human")]
    output: OutputFormat,

    /// Mirror debug logs to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Human,
    Json,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OnConflict {
    Overwrite,
    Skip,
    Rename,
}

impl From<OnConflict> for CollisionPolicy {
    fn from(value: OnConflict) -> Self {
        match value {
            OnConflict::Overwrite => CollisionPolicy::Overwrite,
            OnConflict::Skip => CollisionPolicy::Skip,
            OnConflict::Rename => CollisionPolicy::Rename,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let common = match &cli.command {
        Commands::Estimate { common, .. } | Commands::Convert { common, .. } => common,
    };
    let log_config = LogConfig::default()
        .with_stderr(common.verbose)
        .with_level(if common.verbose { Level::DEBUG } else { Level::INFO });
    if let Err(e) = init_logging("img_webp", log_config) {
        eprintln!("⚠️  Could not initialize logging: {:#}", e);
    }

    match cli.command {
        Commands::Estimate {
            files,
            max_files,
            jobs,
            common,
        } => {
            let mut options = SchedulerOptions::new().with_max_files(max_files);
            if let Some(jobs) = jobs {
                options = options.with_pool_size(jobs);
            }
            run_estimate(&files, options, common.output)
        }

        Commands::Convert {
            files,
            max_files,
            jobs,
            on_conflict,
            confirm,
            common,
        } => {
            let mut options = SchedulerOptions::new()
                .with_max_files(max_files)
                .with_collision(on_conflict.into());
            if let Some(jobs) = jobs {
                options = options.with_pool_size(jobs);
            }
            run_convert(&files, options, confirm, common.output)
        }
    }
}

/// Unreadable paths are kept; they fail individually inside the batch.
fn load_candidates(files: &[PathBuf]) -> Vec<Candidate> {
    files.iter().map(Candidate::discover).collect()
}

fn run_estimate(files: &[PathBuf], options: SchedulerOptions, output: OutputFormat) -> Result<()> {
    validate_selection(files.len(), options.max_files)?;
    let candidates = load_candidates(files);
    let scheduler = Scheduler::with_webp_codec(options);

    let progress = UnifiedProgressBar::new(
        candidates.len() as u64,
        "Estimating",
        output == OutputFormat::Json,
    );
    let records = scheduler.estimate(&candidates, |_, record| {
        progress.set_message(record.name.clone());
        progress.inc(1);
    })?;
    progress.finish_with_message("Estimation complete");

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        OutputFormat::Human => print_preview(&records),
    }
    Ok(())
}

fn run_convert(
    files: &[PathBuf],
    options: SchedulerOptions,
    confirm: bool,
    output: OutputFormat,
) -> Result<()> {
    validate_selection(files.len(), options.max_files)?;
    if !WebpCodec::encoder_available() {
        return Err(ConvertError::NoEncoderAvailable.into());
    }
    let candidates = load_candidates(files);
    let scheduler = Arc::new(Scheduler::with_webp_codec(options));

    if confirm {
        let records = scheduler.estimate(&candidates, |_, _| {})?;
        print_preview(&records);
        if !ask_to_continue(candidates.len())? {
            println!("Conversion cancelled.");
            return Ok(());
        }
    }

    let cancel = CancellationToken::new();
    install_ctrlc_handler(&cancel)?;

    let total = candidates.len();
    let progress = UnifiedProgressBar::new(total as u64, "Converting", output == OutputFormat::Json);
    let bar = Arc::clone(&progress);
    let start = Instant::now();
    info!(total, "Converting to WebP");

    let handle = Arc::clone(&scheduler).spawn(candidates, cancel, move |snapshot| {
        bar.set_position(snapshot.processed as u64);
        bar.set_message(snapshot.text.clone());
    })?;
    let summary = handle.join()?;

    if summary.completed {
        progress.finish_with_message("Conversion complete");
    } else {
        progress.abandon_with_message("Interrupted");
    }

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Human => print_report(&summary, start.elapsed()),
    }

    summary.ensure_complete()?;
    Ok(())
}

fn ask_to_continue(count: usize) -> Result<bool> {
    let term = Term::stderr();
    term.write_str(&format!("Convert {} file(s) to WebP? [y/N] ", count))?;
    let answer = term.read_line().context("Failed to read answer")?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn print_preview(records: &[EstimationRecord]) {
    let name_width = records
        .iter()
        .map(|r| r.name.chars().count())
        .max()
        .unwrap_or(0)
        .max("File Name".len());

    println!();
    println!(
        "{:<w$}  {:>14}  {:>14}  {:>10}",
        style("File Name").bold(),
        style("Current Size").bold(),
        style("Estimated Size").bold(),
        style("Reduction").bold(),
        w = name_width
    );
    println!("{}", "─".repeat(name_width + 44));
    for record in records {
        println!(
            "{:<w$}  {:>14}  {:>14}  {:>10}",
            record.name,
            record.current_size_cell(),
            record.estimated_size_cell(),
            record.reduction_cell(),
            w = name_width
        );
    }

    let source: u64 = records.iter().map(|r| r.source_size).sum();
    let estimated: u64 = records.iter().filter_map(|r| r.estimated_size).sum();
    println!("{}", "─".repeat(name_width + 44));
    println!(
        "Total: {} → {} (estimated)",
        format_bytes(source),
        format_bytes(estimated)
    );
    println!();
}

fn print_report(summary: &BatchSummary, elapsed: Duration) {
    let report = &summary.report;
    println!();
    if report.success {
        println!("{} {}", style("✅").green(), report.message);
    } else {
        println!("{}", style(report.title.as_str()).yellow().bold());
        print!("{}", report.message);
    }
    if summary.cancelled {
        println!(
            "{}",
            style(format!(
                "⚠️  Interrupted after {} of {} files ({})",
                summary.processed,
                summary.total,
                format_duration(elapsed)
            ))
            .red()
        );
    }

    print_summary_report(
        &summary.counts,
        summary.total,
        elapsed,
        summary.input_bytes,
        summary.output_bytes,
        "WebP Conversion",
    );
}
