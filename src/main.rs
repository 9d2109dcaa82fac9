use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueHint};

use adaptive_quiz::config::Config;
use adaptive_quiz::logging;
use adaptive_quiz::personalization::requests::{
    CalibrateRequest, PlanRequest, SelectRequest, TrackRequest, UpdateRequest,
};
use adaptive_quiz::personalization::{PersonalizationConfig, PersonalizationError};

#[derive(Parser, Debug)]
#[command(name = "adaptive-quiz", about = "Personalization core for adaptive quizzes")]
struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "FILE",
        value_hint = ValueHint::FilePath,
        help = "JSON personalization config (overrides PERSONALIZATION_CONFIG)"
    )]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Apply one response worth of evidence to a trait profile")]
    Update(RequestArgs),
    #[command(about = "Advance misconception records with one response")]
    Track(RequestArgs),
    #[command(about = "Recommend a difficulty level for a profile")]
    Calibrate(RequestArgs),
    #[command(about = "Build the weakness-focused target mix")]
    Select(RequestArgs),
    #[command(about = "Build the full personalization directive")]
    Plan(RequestArgs),
}

#[derive(Args, Debug)]
struct RequestArgs {
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "-",
        value_hint = ValueHint::FilePath,
        help = "Request JSON file, or - for stdin"
    )]
    request: PathBuf,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("failed to read request: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Personalization(#[from] PersonalizationError),
    #[error("failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),
}

fn read_request(args: &RequestArgs) -> Result<String, std::io::Error> {
    if args.request.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        std::fs::read_to_string(&args.request)
    }
}

fn run(command: &Command, personalization: &PersonalizationConfig) -> Result<String, CliError> {
    let output = match command {
        Command::Update(args) => {
            let request = UpdateRequest::from_json(&read_request(args)?)?;
            serde_json::to_string_pretty(&request.execute(personalization)?)?
        }
        Command::Track(args) => {
            let request = TrackRequest::from_json(&read_request(args)?)?;
            serde_json::to_string_pretty(&request.execute(personalization)?)?
        }
        Command::Calibrate(args) => {
            let request = CalibrateRequest::from_json(&read_request(args)?)?;
            serde_json::to_string_pretty(&request.execute(personalization))?
        }
        Command::Select(args) => {
            let request = SelectRequest::from_json(&read_request(args)?)?;
            serde_json::to_string_pretty(&request.execute(personalization)?)?
        }
        Command::Plan(args) => {
            let request = PlanRequest::from_json(&read_request(args)?)?;
            request.execute(personalization)?.into_json()?
        }
    };
    Ok(output)
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let mut runtime = Config::from_env();
    if let Some(path) = cli.config.clone() {
        runtime.config_path = Some(path);
    }

    let _log_guard = logging::init_tracing(&runtime);

    let personalization = match runtime.load_personalization() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "failed to load personalization config");
            return ExitCode::from(2);
        }
    };
    if let Some(path) = &runtime.config_path {
        tracing::debug!(path = %path.display(), "personalization config loaded");
    }

    match run(&cli.command, &personalization) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(error = %err, "request failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

