// PromptGrid CLI - run AI prompts over spreadsheet columns, headless

mod doctor;
mod exit_codes;
mod output;
mod remote;
mod run;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use promptgrid_ai::batch::{JobError, MISSING_PROMPT_MESSAGE};
use promptgrid_ai::ProviderError;
use promptgrid_config::settings::Settings;
use promptgrid_config::{ConfigError, ResolvedAIConfig};
use promptgrid_engine::filter::FilterParseError;
use promptgrid_engine::DocumentError;
use promptgrid_io::IoError;
use tracing_subscriber::EnvFilter;

use exit_codes::{
    EXIT_AI_MISSING_KEY, EXIT_AI_PROVIDER, EXIT_API, EXIT_ERROR, EXIT_FORMAT, EXIT_IO,
    EXIT_PARSE, EXIT_SUCCESS, EXIT_USAGE,
};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("PGRID_COMMIT"),
    ")",
    "\ntarget:    ",
    env!("PGRID_TARGET"),
    "\nproviders: gemini, chatgpt, mistral",
);

#[derive(Parser)]
#[command(name = "pgrid")]
#[command(about = "Run an AI prompt over every row of a spreadsheet column")]
#[command(version, long_version = LONG_VERSION)]
struct Cli {
    /// Log more on stderr (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send each non-empty cell of a column through a prompt and write the replies back
    #[command(after_help = "\
The column is both input and output: each non-empty cell is sent with the
prompt and replaced by the reply. Blank cells are skipped. Press Ctrl-C to
stop after the row in flight, twice to drop it; finished rows are kept.

Examples:
  pgrid run reviews.csv --column Review --prompt 'Classify the sentiment'
  pgrid run leads.xlsx -c 2 -p 'Extract the company name' -o leads.out.xlsx
  pgrid run data.json -c Notes -p 'Summarize' --provider mistral --delay-ms 0
  pgrid run items.csv -c Item -p 'Translate to French' --filter '0:text:notEmpty'")]
    Run(run::RunArgs),

    /// Print the rows of a file that pass every filter
    #[command(after_help = "\
Filters are <col>:<kind>:<op>[:<value>] with a 0-based column index.
Kinds: text, number, date, boolean. Operators: contains, equals, startsWith,
endsWith, greaterThan, lessThan, between (low..high), empty, notEmpty.

Examples:
  pgrid filter sales.csv --filter '2:number:greaterThan:100'
  pgrid filter sales.csv --filter '0:text:contains:apple' --filter '3:date:between:2024-01-01..2024-03-31'
  pgrid filter tasks.json --filter '1:boolean:equals:true' --json")]
    Filter {
        /// Input file (.csv, .tsv, .json, .xlsx, .xls, .ods)
        file: PathBuf,

        /// Filter expression. Repeatable; rows must pass all of them.
        #[arg(long = "filter", short = 'f', value_name = "EXPR", required = true)]
        filters: Vec<String>,

        /// Print an array of objects instead of CSV
        #[arg(long)]
        json: bool,

        /// First row is data, not headers
        #[arg(long)]
        no_headers: bool,
    },

    /// Download a table from a REST endpoint
    #[command(after_help = "\
The config file is JSON:
  { \"url\": \"https://api.example.com/items\", \"method\": \"GET\",
    \"headers\": { \"Authorization\": \"Bearer ...\" }, \"body\": { ... },
    \"dataPath\": \"data.items\", \"headerMapping\": { \"sku\": \"Product\" } }
Only url is required. The array at dataPath (or the whole response) must
hold objects or arrays; object keys become the headers.

Examples:
  pgrid fetch items-source.json
  pgrid fetch items-source.json -o items.xlsx")]
    Fetch {
        /// Source config (.json)
        config: PathBuf,

        /// Write here (format from extension) instead of printing
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Print an array of objects instead of CSV
        #[arg(long)]
        json: bool,
    },

    /// Send the rows of a file to a REST endpoint
    #[command(after_help = "\
The config file is JSON:
  { \"url\": \"https://api.example.com/import\", \"method\": \"POST\",
    \"headers\": { ... }, \"format\": \"json\", \"dataKey\": \"rows\" }
method is POST (default) or PUT. format is json (array of objects, default)
or csv. With dataKey the payload is sent as { \"<dataKey>\": payload }.

Examples:
  pgrid push results.csv crm-destination.json
  pgrid push results.csv crm-destination.json --filter '2:text:notEmpty'")]
    Push {
        /// Input file (.csv, .tsv, .json, .xlsx, .xls, .ods)
        file: PathBuf,

        /// Destination config (.json)
        config: PathBuf,

        /// Only send rows passing this filter. Repeatable.
        #[arg(long = "filter", short = 'f', value_name = "EXPR")]
        filters: Vec<String>,

        /// First row is data, not headers
        #[arg(long)]
        no_headers: bool,
    },

    /// AI configuration and diagnostics
    Ai {
        #[command(subcommand)]
        command: AiCommands,
    },
}

#[derive(Subcommand)]
enum AiCommands {
    /// Show the resolved provider, model and key status
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Settings file to use instead of the default location
        #[arg(long, value_name = "PATH")]
        settings: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Run(args) => run::cmd_run(args),
        Commands::Filter {
            file,
            filters,
            json,
            no_headers,
        } => output::cmd_filter(&file, &filters, json, no_headers),
        Commands::Fetch { config, output, json } => remote::cmd_fetch(&config, output.as_deref(), json),
        Commands::Push {
            file,
            config,
            filters,
            no_headers,
        } => remote::cmd_push(&file, &config, &filters, no_headers),
        Commands::Ai { command } => match command {
            AiCommands::Doctor { json, settings } => doctor::cmd_ai_doctor(json, settings.as_deref()),
        },
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

/// Library crates log through `log`; the fmt subscriber picks those records up.
fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Settings from an explicit file, or the user's settings (defaults when absent)
pub(crate) fn load_settings(path: Option<&Path>) -> Result<Settings, CliError> {
    match path {
        Some(path) => Ok(Settings::load_from(path)?),
        None => Ok(Settings::load()),
    }
}

/// Run a future on a fresh current-thread runtime
pub(crate) fn block_on<F: Future>(future: F) -> Result<F::Output, CliError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::general(format!("failed to start async runtime: {}", e)))?;
    Ok(runtime.block_on(future))
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn args(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(EXIT_IO, msg)
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::new(EXIT_PARSE, msg)
    }

    pub fn general(msg: impl Into<String>) -> Self {
        Self::new(EXIT_ERROR, msg)
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Provider selected without a key
    pub fn missing_key(config: &ResolvedAIConfig) -> Self {
        let message = config
            .blocking_reason
            .clone()
            .unwrap_or_else(|| format!("no API key for {}", config.provider.label()));
        Self::new(EXIT_AI_MISSING_KEY, message).with_hint(format!(
            "export {}=<key>, or check with `pgrid ai doctor`",
            promptgrid_config::ai::env_var_name(config.provider_name())
        ))
    }
}

impl From<IoError> for CliError {
    fn from(err: IoError) -> Self {
        match err {
            IoError::Unsupported(_) => Self::new(EXIT_FORMAT, err.to_string()).with_hint(
                "supported: .csv .txt .tsv .json .xlsx (import also reads .xls .xlsb .ods)",
            ),
            IoError::Csv(_) | IoError::Json(_) | IoError::Layout(_) => Self::parse(err.to_string()),
            IoError::File { .. } | IoError::Spreadsheet(_) => Self::io(err.to_string()),
            IoError::Api(_) => Self::new(EXIT_API, err.to_string()),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Parse { .. } => Self::parse(err.to_string()),
            _ => Self::io(err.to_string()),
        }
    }
}

impl From<FilterParseError> for CliError {
    fn from(err: FilterParseError) -> Self {
        Self::parse(err.to_string()).with_hint("expected <col>:<kind>:<op>[:<value>], see `pgrid filter --help`")
    }
}

impl From<DocumentError> for CliError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::NoColumns => Self::parse(err.to_string()),
            _ => Self::args(err.to_string()),
        }
    }
}

impl From<ProviderError> for CliError {
    fn from(err: ProviderError) -> Self {
        Self::new(EXIT_AI_PROVIDER, err.to_string())
    }
}

impl From<JobError> for CliError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Document(e) => e.into(),
            JobError::MissingPrompt(_) => Self::args(MISSING_PROMPT_MESSAGE).with_hint("pass a non-empty --prompt"),
            JobError::AlreadyRunning(_) | JobError::Join(_) => Self::general(err.to_string()),
        }
    }
}
