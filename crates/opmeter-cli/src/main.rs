//! opmeter CLI
//!
//! Usage:
//!   opmeter compare before.json after.json           Diff two records
//!   opmeter compare a.json b.json --fail-on-regression
//!   opmeter aggregate runs/*.jsonl --format json     Percentiles per operation
//!   opmeter check record.json --thresholds t.yaml    Threshold warnings

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use opmeter::{
    render, EngineConfig, MetricsCollector, MetricsComparator, PerformanceMonitor,
    ThresholdConfig,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

mod input;

/// Exit status when `--fail-on-regression` is set and the comparison regressed
const REGRESSION_EXIT_CODE: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "opmeter")]
#[command(about = "Compare, aggregate and check operation metric records")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "warn")]
    log_level: Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compare two records and report regressions
    Compare {
        /// Baseline record
        before: PathBuf,

        /// Candidate record
        after: PathBuf,

        /// Slowdown fraction counted as a regression (0.1 = 10%)
        #[arg(long, default_value = "0.1")]
        regression_threshold: f64,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Exit with status 2 when the candidate regressed
        #[arg(long)]
        fail_on_regression: bool,
    },
    /// Aggregate records from one or more files
    Aggregate {
        /// Files holding a record, a JSON array or JSON lines
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Check records against performance thresholds
    Check {
        /// File holding a record, a JSON array or JSON lines
        file: PathBuf,

        /// YAML or JSON thresholds (defaults to OPMETER_* variables)
        #[arg(long)]
        thresholds: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install log subscriber")?;

    match cli.command {
        Commands::Compare {
            before,
            after,
            regression_threshold,
            format,
            fail_on_regression,
        } => {
            let regressed = compare(&before, &after, regression_threshold, format)?;
            if regressed && fail_on_regression {
                std::process::exit(REGRESSION_EXIT_CODE);
            }
        }
        Commands::Aggregate { files, format } => aggregate(&files, format)?,
        Commands::Check { file, thresholds } => check(&file, thresholds.as_deref())?,
    }

    Ok(())
}

fn compare(
    before: &Path,
    after: &Path,
    regression_threshold: f64,
    format: OutputFormat,
) -> Result<bool> {
    let before = input::read_single_record(before)?;
    let after = input::read_single_record(after)?;

    let comparator = MetricsComparator::new()
        .regression_threshold(regression_threshold)
        .context("Invalid --regression-threshold")?;
    let result = comparator.compare(&before, &after);
    info!(status = %result.summary.status, "comparison finished");

    match format {
        OutputFormat::Text => print!("{}", render::comparison_text(&result)),
        OutputFormat::Json => println!("{}", render::to_json(&result)?),
    }

    Ok(result.is_regression())
}

fn aggregate(files: &[PathBuf], format: OutputFormat) -> Result<()> {
    let collector = MetricsCollector::new();

    for path in files {
        let records = input::read_records(path)?;
        debug!(path = %path.display(), records = records.len(), "loaded records");
        for record in records {
            collector.record(record.operation.clone(), record);
        }
    }

    let stats = collector.aggregate();
    match format {
        OutputFormat::Text => print!("{}", render::aggregate_text(&stats)),
        OutputFormat::Json => println!("{}", render::to_json(&stats)?),
    }

    Ok(())
}

/// Thresholds from the file if given, else the environment, else defaults
fn resolve_thresholds(path: Option<&Path>) -> Result<ThresholdConfig> {
    if let Some(path) = path {
        return input::read_thresholds(path);
    }
    let config = EngineConfig::from_env().context("Invalid OPMETER_* environment")?;
    Ok(config.thresholds.unwrap_or_default())
}

fn check(file: &Path, thresholds: Option<&Path>) -> Result<()> {
    let monitor = PerformanceMonitor::new(resolve_thresholds(thresholds)?);
    let records = input::read_records(file)?;

    let mut total_warnings = 0;
    for record in &records {
        let warnings = monitor.check_thresholds(record);
        total_warnings += warnings.len();
        for warning in warnings {
            println!("{}", warning);
        }
    }

    if total_warnings == 0 {
        println!("No threshold warnings ({} records checked)", records.len());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_compare_args() {
        let cli = Cli::parse_from([
            "opmeter",
            "compare",
            "a.json",
            "b.json",
            "--regression-threshold",
            "0.2",
            "--format",
            "json",
            "--fail-on-regression",
        ]);
        match cli.command {
            Commands::Compare {
                regression_threshold,
                format,
                fail_on_regression,
                ..
            } => {
                assert_eq!(regression_threshold, 0.2);
                assert_eq!(format, OutputFormat::Json);
                assert!(fail_on_regression);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.log_level, Level::WARN);
    }

    #[test]
    fn test_aggregate_requires_files() {
        assert!(Cli::try_parse_from(["opmeter", "aggregate"]).is_err());
    }

    #[test]
    fn test_compare_detects_regression() {
        let dir = TempDir::new().unwrap();
        let before = dir.path().join("before.json");
        let after = dir.path().join("after.json");
        fs::write(&before, r#"{"operation": "op", "total": 0.5}"#).unwrap();
        fs::write(&after, r#"{"operation": "op", "total": 0.7}"#).unwrap();

        assert!(compare(&before, &after, 0.1, OutputFormat::Json).unwrap());
        assert!(!compare(&before, &after, 0.5, OutputFormat::Text).unwrap());
        assert!(compare(&before, &after, -1.0, OutputFormat::Text).is_err());
    }

    #[test]
    fn test_thresholds_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.yaml");
        fs::write(&path, "slow_operation_secs: 3.0\n").unwrap();

        let thresholds = resolve_thresholds(Some(path.as_path())).unwrap();
        assert_eq!(thresholds.slow_operation_secs, 3.0);
    }
}
