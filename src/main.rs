use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use ignore::WalkBuilder;
use serde::Serialize;
use thiserror::Error;

use phpunit_explorer::config::ConfigError;
use phpunit_explorer::observer::{DatasetChildObserver, TestRunnerEvent, TestRunnerObserver};
use phpunit_explorer::testing::{RecordingTestRun, RunEvent, TestController, TestItem};
use phpunit_explorer::{Configuration, EditorTestCollection, FileEntry, TestSuite, TestSuiteTag};

#[derive(Parser)]
#[command(name = "phpunit-explorer", version)]
#[command(about = "Discover PHPUnit and Pest tests in a PHP workspace", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover the tests of a workspace and print them as JSON
    Discover(DiscoverArgs),
}

#[derive(Args)]
struct DiscoverArgs {
    /// Workspace root
    #[arg(default_value = ".")]
    root: PathBuf,

    /// JSON configuration ({"root": ..., "testSuites": [...]})
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory test suite (repeatable)
    #[arg(long = "suite", value_name = "NAME=PATH")]
    suites: Vec<String>,

    /// Single-file test suite entry (repeatable)
    #[arg(long = "file", value_name = "NAME=PATH")]
    files: Vec<String>,

    /// Exclusion within a test suite (repeatable)
    #[arg(long = "exclude", value_name = "NAME=PATH")]
    excludes: Vec<String>,

    /// File suffix of directory suites
    #[arg(long)]
    suffix: Option<String>,

    /// Replay JSON-lines runner events against the discovered tree
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write output: {0}")]
    Output(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct Report<'a> {
    groups: Vec<&'a str>,
    files: Vec<&'a FileEntry>,
    tree: Vec<TestItem>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    run: Vec<RunEvent>,
}

/// warn+ to stderr unless RUST_LOG says otherwise; stdout carries the JSON.
fn init_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn canonical(path: &Path) -> Result<PathBuf, CliError> {
    tokio::fs::canonicalize(path).await.map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

async fn configuration(args: &DiscoverArgs) -> Result<Configuration, CliError> {
    let mut configuration = match &args.config {
        Some(path) => Configuration::load(path)?,
        None => Configuration::new(&args.root, Vec::new()),
    };

    let flags = [
        (&args.suites, TestSuiteTag::Directory),
        (&args.files, TestSuiteTag::File),
        (&args.excludes, TestSuiteTag::Exclude),
    ];
    for (values, tag) in flags {
        for value in values {
            let mut suite = TestSuite::parse_flag(value, tag)?;
            if tag == TestSuiteTag::Directory {
                suite.suffix = args.suffix.clone();
            }
            configuration.test_suites.push(suite);
        }
    }

    if !configuration
        .test_suites
        .iter()
        .any(|suite| suite.tag != TestSuiteTag::Exclude)
    {
        tracing::debug!("no test suites configured, using tests/");
        let mut suite = TestSuite::new("default", TestSuiteTag::Directory, "tests");
        suite.suffix = args.suffix.clone();
        configuration.test_suites.push(suite);
    }

    configuration.root = canonical(&configuration.root).await?;
    Ok(configuration)
}

async fn replay(collection: &EditorTestCollection, run: &RecordingTestRun, events: &Path) -> Result<(), CliError> {
    let content = tokio::fs::read_to_string(events)
        .await
        .map_err(|source| CliError::Io {
            path: events.to_path_buf(),
            source,
        })?;

    let queue = collection.controller().items().to_vec();
    let mut observer = DatasetChildObserver::new(collection, run, queue);
    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match TestRunnerEvent::from_json_line(line) {
            Ok(event) => observer.dispatch(&event),
            Err(err) => tracing::warn!("skipping event on line {}: {}", index + 1, err),
        }
    }
    Ok(())
}

async fn discover(args: DiscoverArgs) -> Result<(), CliError> {
    let configuration = configuration(&args).await?;
    let root = configuration.root.clone();
    let mut collection = EditorTestCollection::with_controller(configuration, TestController::new());

    let walker = WalkBuilder::new(&root).hidden(true).git_ignore(true).build();
    for entry in walker.flatten() {
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("php") {
            continue;
        }
        collection.add(path).await;
    }
    tracing::debug!("{} test files under {}", collection.size(), root.display());

    let run = RecordingTestRun::new();
    if let Some(events) = &args.events {
        replay(&collection, &run, events).await?;
    }

    let report = Report {
        groups: collection.groups(),
        files: collection.gather_files(),
        tree: collection.controller().items().to_vec(),
        run: run.events(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Discover(args) => discover(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}
