//! Command-line interface for the portfolio analytics engine.

use coinfolio::align::{align_series, PriceMatrix};
use coinfolio::alert::{dispatch_alert, DispatchStatus, LogNotifier};
use coinfolio::analysis::{analyze_strategy, run_investment_strategy, run_risk_check};
use coinfolio::config::EngineFileConfig;
use coinfolio::data::{load_many, tables_to_series, AssetTable};
use coinfolio::error::{AnalyticsError, Result};
use coinfolio::forecast::{ForecastInput, Forecaster};
use coinfolio::report::{to_json, ReportFormatter};
use coinfolio::technical::technical_metrics;
use coinfolio::weights::{compute_weights, WeightingStrategy};

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Coinfolio - portfolio analytics for crypto price histories.
#[derive(Parser)]
#[command(name = "coinfolio")]
#[command(version)]
#[command(about = "Weights, risk checks, stress tests and forecasts for a basket of assets")]
#[command(long_about = None)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub output: OutputFormat,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compute allocation weights
    Weights {
        /// CSV price files, one per asset
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Weighting strategy (equal, price, invvol, sharpe)
        #[arg(short = 'S', long)]
        strategy: Option<String>,

        /// Maximum weight per asset
        #[arg(long)]
        cap: Option<f64>,
    },

    /// Compare a strategy's portfolio returns with its assets
    Analyze {
        /// CSV price files, one per asset
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Weighting strategy (equal, price, invvol, sharpe)
        #[arg(short = 'S', long)]
        strategy: Option<String>,
    },

    /// Check equal-weighted risk metrics against thresholds
    Risk {
        /// CSV price files, one per asset
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Send the alert to this address
        #[arg(long)]
        notify: Option<String>,
    },

    /// Sharpe-weighted allocation with Monte Carlo stress scenarios
    Stress {
        /// CSV price files, one per asset
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Number of simulated trials per scenario
        #[arg(short = 'n', long)]
        trials: Option<usize>,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Forecast the next close of each asset
    Forecast {
        /// CSV price files, one per asset
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Per-asset technical indicators
    Metrics {
        /// CSV price files, one per asset
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Trailing rows to show per asset
        #[arg(short, long)]
        rows: Option<usize>,
    },

    /// Generate an example configuration file
    Init {
        /// Output path for config file
        #[arg(short = 'p', long, default_value = "coinfolio.toml")]
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl Cli {
    /// Initialize logging based on verbosity.
    pub fn init_logging(&self) {
        let level = match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };

        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .with_writer(std::io::stderr)
            .finish();

        if tracing::subscriber::set_global_default(subscriber).is_err() {
            eprintln!("A tracing subscriber is already installed");
        }
    }

    fn load_config(&self) -> Result<EngineFileConfig> {
        match &self.config {
            Some(path) => EngineFileConfig::load(path),
            None => Ok(EngineFileConfig::default()),
        }
    }

    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce(&T) -> String) -> Result<()> {
        match self.output {
            OutputFormat::Json => println!("{}", to_json(value)?),
            OutputFormat::Text => println!("{}", text(value)),
        }
        Ok(())
    }
}

/// Run the CLI application.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    cli.init_logging();
    let mut config = cli.load_config()?;

    match &cli.command {
        Commands::Weights {
            files,
            strategy,
            cap,
        } => {
            if let Some(cap) = cap {
                config.weighting.cap = *cap;
            }
            let strategy = resolve_strategy(strategy.as_deref(), &config)?;
            let matrix = load_matrix(files)?;
            let weights = compute_weights(strategy, &matrix, &config.weighting)?;
            cli.emit(&weights, |w| {
                ReportFormatter::weights(&format!("{} weights", strategy), w)
            })
        }
        Commands::Analyze { files, strategy } => {
            let strategy = resolve_strategy(strategy.as_deref(), &config)?;
            let matrix = load_matrix(files)?;
            let analysis = analyze_strategy(strategy, &matrix, &config.weighting)?;
            cli.emit(&analysis, ReportFormatter::strategy_analysis)
        }
        Commands::Risk { files, notify } => {
            if let Some(dest) = notify {
                config.alert.destination = Some(dest.clone());
            }
            let matrix = load_matrix(files)?;
            let report = run_risk_check(&matrix, &config.risk)?;
            match dispatch_alert(&report, &config.alert, &LogNotifier) {
                DispatchStatus::Failed(reason) => warn!("Alert delivery failed: {}", reason),
                status => info!("Alert dispatch: {:?}", status),
            }
            cli.emit(&report, ReportFormatter::risk)
        }
        Commands::Stress {
            files,
            trials,
            seed,
        } => {
            if let Some(n) = trials {
                config.stress.num_trials = *n;
            }
            if seed.is_some() {
                config.stress.seed = *seed;
            }
            let matrix = load_matrix(files)?;
            let result = run_investment_strategy(&matrix, &config.weighting, &config.stress)?;
            cli.emit(&result, ReportFormatter::investment_strategy)
        }
        Commands::Forecast { files } => {
            let tables = load_many(files)?;
            let inputs = tables
                .iter()
                .map(ForecastInput::from_table)
                .collect::<Result<Vec<_>>>()?;
            let forecaster = Forecaster::new(config.forecast.clone());

            let mut results = Vec::with_capacity(inputs.len());
            for (symbol, outcome) in forecaster.forecast_many(&inputs) {
                match outcome {
                    Ok(result) => results.push(result),
                    Err(e) => warn!("{}: {}", symbol, e),
                }
            }
            if results.is_empty() {
                return Err(AnalyticsError::EmptyData(
                    "no asset could be forecast".to_string(),
                ));
            }
            cli.emit(&results, |r| ReportFormatter::forecasts(r))
        }
        Commands::Metrics { files, rows } => {
            let tables = load_many(files)?;
            let rows = rows.unwrap_or(config.analysis.technical_rows);
            let metrics = technical_metrics(&tables, rows);
            cli.emit(&metrics, |m| ReportFormatter::technicals(m))
        }
        Commands::Init { path } => write_example_config(path),
    }
}

fn resolve_strategy(name: Option<&str>, config: &EngineFileConfig) -> Result<WeightingStrategy> {
    match name {
        Some(name) => name.parse(),
        None => Ok(config.analysis.strategy),
    }
}

fn load_matrix(files: &[PathBuf]) -> Result<PriceMatrix> {
    let tables: Vec<AssetTable> = load_many(files)?;
    let series = tables_to_series(&tables)?;
    let matrix = align_series(&series)?;
    info!(
        "Aligned {} assets over {} dates",
        matrix.num_assets(),
        matrix.len()
    );
    Ok(matrix)
}

fn write_example_config(path: &Path) -> Result<()> {
    fs::write(path, EngineFileConfig::example())?;
    println!("Wrote example configuration to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse() {
        let cli = Cli::try_parse_from([
            "coinfolio",
            "weights",
            "btc.csv",
            "eth.csv",
            "-S",
            "invvol",
            "--cap",
            "0.4",
        ]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["coinfolio", "risk", "btc.csv", "-vv", "-o", "json"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.output, OutputFormat::Json);
    }

    #[test]
    fn test_files_are_required() {
        assert!(Cli::try_parse_from(["coinfolio", "forecast"]).is_err());
    }

    #[test]
    fn test_init_command() {
        let cli = Cli::try_parse_from(["coinfolio", "init"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_resolve_strategy() {
        let config = EngineFileConfig::default();
        assert_eq!(resolve_strategy(None, &config).unwrap(), WeightingStrategy::Equal);
        assert_eq!(
            resolve_strategy(Some("sharpe"), &config).unwrap(),
            WeightingStrategy::Sharpe
        );
        assert!(matches!(
            resolve_strategy(Some("momentum"), &config),
            Err(AnalyticsError::UnknownStrategy(_))
        ));
    }
}
