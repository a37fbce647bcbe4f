//! Configuration file support.
//!
//! Every tunable of the engine can be loaded from a TOML file so that runs
//! are reproducible. Missing tables and keys fall back to the defaults.

use crate::alert::AlertConfig;
use crate::error::{AnalyticsError, Result};
use crate::forecast::ForecastConfig;
use crate::risk::RiskThresholds;
use crate::stress::StressConfig;
use crate::technical::DEFAULT_ROWS;
use crate::weights::{WeightingConfig, WeightingStrategy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Complete engine configuration loaded from a file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineFileConfig {
    #[serde(default)]
    pub analysis: AnalysisSettings,
    #[serde(default)]
    pub weighting: WeightingConfig,
    #[serde(default)]
    pub risk: RiskThresholds,
    #[serde(default)]
    pub stress: StressConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub alert: AlertConfig,
}

/// Defaults for the analysis commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    /// Strategy used when none is given on the command line.
    #[serde(default = "default_strategy")]
    pub strategy: WeightingStrategy,
    /// Trailing rows reported by the technical metrics.
    #[serde(default = "default_technical_rows")]
    pub technical_rows: usize,
}

fn default_strategy() -> WeightingStrategy {
    WeightingStrategy::Equal
}

fn default_technical_rows() -> usize {
    DEFAULT_ROWS
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            technical_rows: default_technical_rows(),
        }
    }
}

impl EngineFileConfig {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineFileConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as TOML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Check value ranges across all sections.
    pub fn validate(&self) -> Result<()> {
        self.weighting.validate()?;
        self.stress.validate()?;
        self.forecast.validate()?;

        let r = &self.risk;
        let thresholds = [
            ("volatility", r.volatility),
            ("sharpe", r.sharpe),
            ("sortino", r.sortino),
            ("max_drawdown", r.max_drawdown),
            ("beta", r.beta),
            ("max_weight", r.max_weight),
        ];
        if let Some((name, _)) = thresholds.iter().find(|(_, v)| !v.is_finite()) {
            return Err(AnalyticsError::ConfigError(format!(
                "risk threshold '{}' must be a finite number",
                name
            )));
        }
        if self.analysis.technical_rows == 0 {
            return Err(AnalyticsError::ConfigError(
                "technical_rows must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Generate an example configuration file content.
    pub fn example() -> String {
        r#"# Coinfolio configuration file

[analysis]
strategy = "equal"          # equal | price | inverse-volatility | sharpe
technical_rows = 10

[weighting]
cap = 0.5                   # maximum weight of a single asset
risk_free_rate = 0.0        # per period, used by the sharpe strategy

[risk]
volatility = 0.05           # annualized volatility >= this triggers an alert
sharpe = 1.0
sortino = 1.0
max_drawdown = -0.20
beta = 1.2
max_weight = 0.5

[stress]
num_trials = 1000
# seed = 42

[[stress.scenarios]]
name = "Bull Market"
mean = 0.04
std_dev = 0.01

[[stress.scenarios]]
name = "Bear Market"
mean = -0.04
std_dev = 0.015

[[stress.scenarios]]
name = "Volatile Market"
mean = 0.0
std_dev = 0.08

[forecast]
min_observations = 30
train_ratio = 0.8
candidate_orders = [
    [1, 1, 0], [1, 1, 1], [2, 1, 0], [2, 1, 1],
    [3, 1, 0], [3, 1, 1], [5, 1, 0], [5, 1, 1],
    [1, 1, 2], [2, 1, 2], [3, 1, 2], [5, 1, 2],
]
fallback_order = [1, 1, 0]
fallback_window = 10
z_score = 1.96

[alert]
# destination = "you@example.com"
# [alert.mail]
# sender = "alerts@example.com"
# smtp_server = "smtp.example.com"
# smtp_port = 587
"#
        .to_string()
    }
}
