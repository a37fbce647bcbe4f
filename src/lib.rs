//! Coinfolio - quantitative analytics for a basket of crypto assets.
//!
//! # Overview
//!
//! Coinfolio takes per-asset daily price histories and answers the usual
//! portfolio questions about them:
//!
//! - **Alignment**: outer-join asset histories on date with forward/backward fill
//! - **Weighting**: Equal, Price, Inverse-Volatility and Sharpe strategies with a per-asset cap
//! - **Risk**: annualized volatility, Sharpe, Sortino, drawdown, beta and threshold alerts
//! - **Stress testing**: Monte Carlo simulation of Bull, Bear and Volatile regimes
//! - **Forecasting**: ARIMA grid search with walk-forward validation and a moving-average fallback
//! - **Technical metrics**: rolling volatility, trailing returns and moving-average crossovers
//!
//! # Quick Start
//!
//! ```no_run
//! use coinfolio::{
//!     align::align_series,
//!     data::{load_many, tables_to_series},
//!     weights::{compute_weights, WeightingConfig, WeightingStrategy},
//! };
//!
//! let tables = load_many(&["data/BTC.csv", "data/ETH.csv"]).unwrap();
//! let series = tables_to_series(&tables).unwrap();
//! let matrix = align_series(&series).unwrap();
//!
//! let weights = compute_weights(
//!     WeightingStrategy::InverseVolatility,
//!     &matrix,
//!     &WeightingConfig::default(),
//! )
//! .unwrap();
//! for (symbol, w) in weights.iter() {
//!     println!("{}: {:.2}%", symbol, w * 100.0);
//! }
//! ```
//!
//! # Modules
//!
//! - [`types`]: Observations, asset series and trading signals
//! - [`data`]: CSV loading and column detection
//! - [`align`]: Date alignment into a price matrix
//! - [`stats`]: Return and dispersion helpers
//! - [`weights`]: Weighting strategies and the cap policy
//! - [`risk`]: Risk metrics and threshold evaluation
//! - [`stress`]: Monte Carlo stress scenarios
//! - [`forecast`]: ARIMA model selection and next-period forecasts
//! - [`technical`]: Per-asset technical indicators
//! - [`analysis`]: Strategy comparison, investment strategy and risk check flows
//! - [`alert`]: Risk alert composition and delivery
//! - [`config`]: TOML configuration file support
//! - [`report`]: Table and JSON rendering

pub mod alert;
pub mod align;
pub mod analysis;
pub mod config;
pub mod data;
pub mod error;
pub mod forecast;
pub mod report;
pub mod risk;
pub mod stats;
pub mod stress;
pub mod technical;
pub mod types;
pub mod weights;

// Re-exports for convenience
pub use align::{align_series, PriceMatrix};
pub use config::EngineFileConfig;
pub use data::{load_csv, load_many, tables_to_series, AssetTable};
pub use error::{AnalyticsError, Result};
pub use types::{AssetSeries, Observation, TradingSignal};

pub use weights::{compute_weights, WeightVector, WeightingConfig, WeightingStrategy};

pub use risk::{RiskMetricsSnapshot, RiskReport, RiskThresholds, RiskViolation};

pub use stress::{stress_test, MarketScenario, StressConfig, StressSimulator, StressTestResult};

pub use forecast::{
    AccuracyMetrics, ArimaOrder, ForecastConfig, ForecastInput, ForecastResult, Forecaster,
};

pub use analysis::{
    analyze_strategy, run_investment_strategy, run_risk_check, InvestmentStrategyResult,
    StrategyAnalysis,
};

pub use alert::{dispatch_alert, AlertConfig, AlertNotifier, DispatchStatus};

pub use technical::{technical_metrics, AssetTechnicals};
