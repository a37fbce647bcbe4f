//! Monte Carlo stress testing of an allocation under market scenarios.
//!
//! Each scenario draws independent normal returns per asset and combines
//! them with the portfolio weights. Cross-asset correlation is not modeled.
//!
//! # Example
//!
//! ```ignore
//! use coinfolio::stress::{StressConfig, StressSimulator};
//!
//! let simulator = StressSimulator::new(StressConfig::default().with_seed(42));
//! let result = simulator.run(&weights)?;
//! for line in result.insights() {
//!     println!("{}", line);
//! }
//! ```

use crate::error::{AnalyticsError, Result};
use crate::risk::pct;
use crate::stats;
use crate::weights::WeightVector;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const BULL_MARKET: &str = "Bull Market";
pub const BEAR_MARKET: &str = "Bear Market";
pub const VOLATILE_MARKET: &str = "Volatile Market";

/// A named market regime: per-period asset returns ~ N(mean, std_dev).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketScenario {
    pub name: String,
    pub mean: f64,
    pub std_dev: f64,
}

impl MarketScenario {
    pub fn new(name: impl Into<String>, mean: f64, std_dev: f64) -> Self {
        Self {
            name: name.into(),
            mean,
            std_dev,
        }
    }

    /// Bull, Bear and Volatile regimes.
    pub fn defaults() -> Vec<MarketScenario> {
        vec![
            MarketScenario::new(BULL_MARKET, 0.04, 0.01),
            MarketScenario::new(BEAR_MARKET, -0.04, 0.015),
            MarketScenario::new(VOLATILE_MARKET, 0.00, 0.08),
        ]
    }
}

/// Configuration for stress simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressConfig {
    /// Number of simulated trials per scenario.
    #[serde(default = "default_trials")]
    pub num_trials: usize,
    /// Random seed for reproducibility (None for entropy).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Scenarios to simulate, in report order.
    #[serde(default = "MarketScenario::defaults")]
    pub scenarios: Vec<MarketScenario>,
}

fn default_trials() -> usize {
    1000
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            num_trials: default_trials(),
            seed: None,
            scenarios: MarketScenario::defaults(),
        }
    }
}

impl StressConfig {
    /// Set number of trials.
    pub fn with_trials(mut self, n: usize) -> Self {
        self.num_trials = n;
        self
    }

    /// Set random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Replace the scenario table.
    pub fn with_scenarios(mut self, scenarios: Vec<MarketScenario>) -> Self {
        self.scenarios = scenarios;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_trials < 2 {
            return Err(AnalyticsError::ConfigError(format!(
                "stress test needs at least 2 trials, got {}",
                self.num_trials
            )));
        }
        if self.scenarios.is_empty() {
            return Err(AnalyticsError::ConfigError(
                "stress test needs at least one scenario".to_string(),
            ));
        }
        for s in &self.scenarios {
            if !s.mean.is_finite() || !s.std_dev.is_finite() || s.std_dev < 0.0 {
                return Err(AnalyticsError::ConfigError(format!(
                    "scenario '{}' has invalid parameters (mean {}, std dev {})",
                    s.name, s.mean, s.std_dev
                )));
            }
        }
        Ok(())
    }
}

/// Distribution of simulated portfolio returns under one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressScenarioResult {
    pub scenario: String,
    pub mean_return: f64,
    /// Sample standard deviation of the simulated returns.
    pub volatility: f64,
    pub min_return: f64,
    pub max_return: f64,
}

impl StressScenarioResult {
    fn from_trials(scenario: &str, trials: &[f64]) -> Self {
        Self {
            scenario: scenario.to_string(),
            mean_return: stats::mean(trials).unwrap_or(0.0),
            volatility: stats::sample_std(trials).unwrap_or(0.0),
            min_return: trials.iter().copied().fold(f64::INFINITY, f64::min),
            max_return: trials.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }

    /// One-line reading of the result.
    pub fn insight(&self) -> String {
        match self.scenario.as_str() {
            BEAR_MARKET => format!(
                "Bear Market -> Avg: {}, Worst-case: {}. Portfolio faces a downside, and diversification will determine the severity of the loss.",
                pct(self.mean_return, 2),
                pct(self.min_return, 2)
            ),
            BULL_MARKET => format!(
                "Bull Market -> Avg: {}, Best-case: {}. The current weights allow the portfolio to capture significant upside potential.",
                pct(self.mean_return, 2),
                pct(self.max_return, 2)
            ),
            VOLATILE_MARKET => format!(
                "Volatile Market -> Range: {} to {}. High swings show significant uncertainty, with potential for both large gains and losses.",
                pct(self.min_return, 2),
                pct(self.max_return, 2)
            ),
            other => format!(
                "{} -> Avg: {}, Range: {} to {}.",
                other,
                pct(self.mean_return, 2),
                pct(self.min_return, 2),
                pct(self.max_return, 2)
            ),
        }
    }
}

/// Results of all scenarios.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressTestResult {
    pub num_trials: usize,
    pub scenarios: Vec<StressScenarioResult>,
}

impl StressTestResult {
    /// Result for a scenario by name.
    pub fn get(&self, scenario: &str) -> Option<&StressScenarioResult> {
        self.scenarios.iter().find(|s| s.scenario == scenario)
    }

    /// Insight lines: Bear, Bull and Volatile first, then any other scenario
    /// in simulation order.
    pub fn insights(&self) -> Vec<String> {
        let known = [BEAR_MARKET, BULL_MARKET, VOLATILE_MARKET];
        let mut lines: Vec<String> = known
            .iter()
            .filter_map(|name| self.get(name))
            .map(StressScenarioResult::insight)
            .collect();
        lines.extend(
            self.scenarios
                .iter()
                .filter(|s| !known.contains(&s.scenario.as_str()))
                .map(StressScenarioResult::insight),
        );
        lines
    }
}

/// Monte Carlo stress simulator.
pub struct StressSimulator {
    config: StressConfig,
}

impl StressSimulator {
    pub fn new(config: StressConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StressConfig {
        &self.config
    }

    /// Simulate every scenario for the given allocation.
    pub fn run(&self, weights: &WeightVector) -> Result<StressTestResult> {
        self.config.validate()?;
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let n = self.config.num_trials;
        let mut scenarios = Vec::with_capacity(self.config.scenarios.len());

        for scenario in &self.config.scenarios {
            let normal = Normal::new(scenario.mean, scenario.std_dev).map_err(|e| {
                AnalyticsError::ConfigError(format!("scenario '{}': {}", scenario.name, e))
            })?;

            let mut trials = vec![0.0; n];
            for (_, weight) in weights.iter() {
                for trial in trials.iter_mut() {
                    *trial += weight * normal.sample(&mut rng);
                }
            }

            let result = StressScenarioResult::from_trials(&scenario.name, &trials);
            debug!(
                "{}: mean {:.4}, std {:.4}, range [{:.4}, {:.4}]",
                result.scenario, result.mean_return, result.volatility, result.min_return, result.max_return
            );
            scenarios.push(result);
        }

        Ok(StressTestResult {
            num_trials: n,
            scenarios,
        })
    }
}

/// Run a stress test with the given configuration.
pub fn stress_test(weights: &WeightVector, config: &StressConfig) -> Result<StressTestResult> {
    StressSimulator::new(config.clone()).run(weights)
}
