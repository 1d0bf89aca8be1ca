// `pgrid run`: one column job over a file

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use promptgrid_ai::batch::{request_cancel, JobError, JOB_FAILED_MESSAGE};
use promptgrid_ai::{build_provider, BatchProcessor, JobOptions, JobOutcome, JobReport, RateLimiter};
use promptgrid_config::settings::{AIProvider, Settings, StatusChannel};
use promptgrid_config::ResolvedAIConfig;
use promptgrid_engine::Spreadsheet;

use crate::exit_codes::{EXIT_JOB_CANCELLED, EXIT_JOB_FAILED};
use crate::output::{parse_filters, print_table};
use crate::{block_on, load_settings, CliError};

#[derive(Args)]
pub struct RunArgs {
    /// Input file (.csv, .tsv, .json, .xlsx, .xls, .ods)
    pub file: PathBuf,

    /// Column to process: header name, or 0-based index
    #[arg(long, short = 'c')]
    pub column: String,

    /// Instruction sent with every cell of the column
    #[arg(long, short = 'p')]
    pub prompt: String,

    /// Write the full result here (format from extension). Without it the
    /// result goes to stdout, or over the input when autoSave is on.
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Only print rows passing this filter; every row is still processed. Repeatable.
    #[arg(long = "filter", short = 'f', value_name = "EXPR")]
    pub filters: Vec<String>,

    /// Provider override (gemini, chatgpt, mistral)
    #[arg(long, env = "PROMPTGRID_PROVIDER")]
    pub provider: Option<String>,

    /// Model override (default: the provider's default model)
    #[arg(long, env = "PROMPTGRID_MODEL")]
    pub model: Option<String>,

    /// Pause after each processed row, in milliseconds
    #[arg(long, value_name = "MS")]
    pub delay_ms: Option<u64>,

    /// Provider requests allowed per minute
    #[arg(long, value_name = "N")]
    pub rate_limit: Option<u32>,

    /// Settings file to use instead of the default location
    #[arg(long, value_name = "PATH")]
    pub settings: Option<PathBuf>,

    /// Report guidance and failures in the column's first cell
    #[arg(long)]
    pub first_cell_status: bool,

    /// First row is data, not headers
    #[arg(long)]
    pub no_headers: bool,

    /// Suppress the summary on stderr
    #[arg(long, short = 'q')]
    pub quiet: bool,
}

/// Command-line flags take precedence over the settings file
fn apply_overrides(settings: &mut Settings, args: &RunArgs) -> Result<(), CliError> {
    if let Some(name) = &args.provider {
        let provider = AIProvider::from_name(name).ok_or_else(|| {
            let known: Vec<&str> = AIProvider::ALL.iter().map(|p| p.name()).collect();
            CliError::args(format!("unknown provider '{}'", name))
                .with_hint(format!("expected one of: {}", known.join(", ")))
        })?;
        if provider != settings.ai_provider {
            // A model chosen for another provider does not carry over
            settings.ai_model.clear();
        }
        settings.ai_provider = provider;
    }
    if let Some(model) = &args.model {
        settings.ai_model = model.trim().to_string();
    }
    if let Some(delay) = args.delay_ms {
        settings.processing_delay_ms = delay;
    }
    if let Some(limit) = args.rate_limit {
        settings.rate_limit_per_minute = limit;
    }
    if args.first_cell_status {
        settings.status_channel = StatusChannel::FirstCell;
    }
    Ok(())
}

/// Header name (exact, then case-insensitive) or 0-based index
fn resolve_column(sheet: &Spreadsheet, spec: &str) -> Result<usize, CliError> {
    let columns = sheet.columns();
    let wanted = spec.trim();

    if let Some(i) = columns.iter().position(|c| c.name == wanted) {
        return Ok(i);
    }
    if let Some(i) = columns.iter().position(|c| c.name.eq_ignore_ascii_case(wanted)) {
        return Ok(i);
    }
    if let Ok(i) = wanted.parse::<usize>() {
        if i < columns.len() {
            return Ok(i);
        }
    }

    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    Err(CliError::args(format!("no column named or numbered '{}'", spec))
        .with_hint(format!("columns: {}", names.join(", "))))
}

pub fn cmd_run(args: RunArgs) -> Result<(), CliError> {
    let mut settings = load_settings(args.settings.as_deref())?;
    apply_overrides(&mut settings, &args)?;
    let settings = settings.validated();

    let table = promptgrid_io::import(&args.file, !args.no_headers)?;
    let mut sheet = Spreadsheet::from_table(&table)?;
    let col = resolve_column(&sheet, &args.column)?;
    for filter in parse_filters(&args.filters, sheet.column_count())? {
        sheet.add_filter(filter)?;
    }
    sheet.set_prompt(col, &args.prompt)?;

    let config = ResolvedAIConfig::from_settings(&settings);
    if !config.status.is_ready() {
        return Err(CliError::missing_key(&config));
    }
    let provider = build_provider(&config)?;
    let limiter = Arc::new(RateLimiter::per_minute(settings.rate_limit_per_minute));
    let options = JobOptions::from_settings(&settings);

    let sheet = sheet.into_shared();
    let processor = BatchProcessor::new(sheet.clone(), provider, limiter, options);

    let report = block_on(run_until_interrupted(&processor, col))??;

    let (full, filtered, column_name, status) = {
        let sheet = sheet.lock();
        let column = sheet.columns().get(col);
        (
            sheet.export(),
            sheet.export_filtered(),
            column.map(|c| c.name.clone()).unwrap_or_default(),
            column.and_then(|c| c.last_error.clone()),
        )
    };

    if !args.quiet {
        eprintln!(
            "{} ({}) on column '{}': {}, {} call(s), {} cell(s) written, {} rate-limit wait(s)",
            config.provider.label(),
            config.model,
            column_name,
            report.outcome.as_str(),
            report.provider_calls,
            report.rows_written,
            report.rate_limit_waits
        );
    }

    let destination = args
        .output
        .clone()
        .or_else(|| settings.auto_save.then(|| args.file.clone()));
    if let Some(path) = &destination {
        promptgrid_io::export(&full, path)?;
        if !args.quiet {
            eprintln!("Wrote {}", path.display());
        }
    }
    if destination.is_none() || !args.filters.is_empty() {
        print_table(&filtered, false)?;
    }

    job_exit(report.outcome, status)
}

fn job_exit(outcome: JobOutcome, status: Option<String>) -> Result<(), CliError> {
    match outcome {
        JobOutcome::Completed => Ok(()),
        JobOutcome::Cancelled => Err(CliError::new(
            EXIT_JOB_CANCELLED,
            "job cancelled; rows finished before the stop were kept",
        )),
        JobOutcome::Failed => Err(CliError::new(
            EXIT_JOB_FAILED,
            status.unwrap_or_else(|| JOB_FAILED_MESSAGE.to_string()),
        )
        .with_hint("run again with -v for details")),
    }
}

async fn run_until_interrupted(processor: &BatchProcessor, col: usize) -> Result<JobReport, CliError> {
    drive_job(processor, col, tokio::signal::ctrl_c).await
}

/// Drive the job. The first interrupt asks it to stop at the next row
/// boundary; the second aborts the call in flight.
async fn drive_job<F, Fut>(processor: &BatchProcessor, col: usize, mut interrupt: F) -> Result<JobReport, CliError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    let mut job = processor.spawn_column(col);
    let mut interrupts = 0;

    let joined = loop {
        tokio::select! {
            joined = &mut job => break joined,
            signal = interrupt(), if interrupts < 2 => match signal {
                Ok(()) => {
                    interrupts += 1;
                    if interrupts == 1 {
                        if request_cancel(processor.sheet(), col) {
                            eprintln!("Stopping after the current row (Ctrl-C again to abort)...");
                        }
                    } else {
                        eprintln!("Aborting the request in flight...");
                        processor.abort();
                    }
                }
                Err(e) => {
                    log::warn!("Cannot listen for Ctrl-C: {}", e);
                    break (&mut job).await;
                }
            }
        }
    };

    let report = joined.map_err(|e| JobError::Join(e.to_string()))??;
    Ok(report)
}
