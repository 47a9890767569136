use anyhow::Result;
use chrono::NaiveTime;
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::Deserialize;
use std::path::Path;

use crate::domain::RiskLevel;
use crate::handler::EssControlMode;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub optimizer: OptimizerConfig,
    pub horizon: HorizonConfig,
    pub site: SiteConfig,
    pub ess: EssConfig,
    pub loads: Vec<FlexibleLoadConfig>,
    pub synthetic: SyntheticConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between two optimizer runs
    pub cadence_seconds: u64,
    /// Run once immediately instead of waiting for the first tick
    pub run_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cadence_seconds: 900, // one quarter
            run_on_start: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub population_size: usize,
    pub tournament_size: usize,
    /// Best candidates copied unchanged into the next generation
    pub elite_count: usize,
    pub crossover_probability: f64,
    /// Per-gene mutation probability
    pub mutation_probability: f64,
    /// Stop after this many generations without improvement
    pub steady_generations: usize,
    pub max_generations: usize,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
    /// Keep the running period's states from the previous result
    pub pin_current_period: bool,
    /// Seed the search with the previous result
    pub warm_start: bool,
    /// Safety margin before the next period boundary
    pub deadline_buffer_seconds: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            population_size: 40,
            tournament_size: 3,
            elite_count: 2,
            crossover_probability: 0.3,
            mutation_probability: 0.15,
            steady_generations: 20,
            max_generations: 500,
            seed: None,
            pin_current_period: true,
            warm_start: true,
            deadline_buffer_seconds: 30,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.population_size < 2 {
            return Err("population_size must be at least 2".to_string());
        }
        if self.tournament_size == 0 {
            return Err("tournament_size must be positive".to_string());
        }
        if self.elite_count >= self.population_size {
            return Err("elite_count must be smaller than population_size".to_string());
        }
        for (name, p) in [
            ("crossover_probability", self.crossover_probability),
            ("mutation_probability", self.mutation_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(format!("{name} must be between 0 and 1, got {p}"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HorizonConfig {
    /// Hours planned in quarter-hour periods before widening to hours
    pub quarter_hours: u32,
    pub max_hours: u32,
    /// Quarters taken from the total consumption forecast before switching
    /// to the unmanaged consumption forecast
    pub consumption_split: usize,
}

impl Default for HorizonConfig {
    fn default() -> Self {
        Self {
            quarter_hours: 6,
            max_hours: 36,
            consumption_split: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub risk_level: RiskLevel,
    /// Handler ids in the order their simulation steps run; unlisted handlers
    /// run afterwards in registration order
    pub controller_priority: Vec<String>,
    pub max_grid_buy_power_w: i32,
    pub ess_control_mode: EssControlMode,
    pub reserve_soc_percent: Option<u8>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            risk_level: RiskLevel::Medium,
            controller_priority: Vec::new(),
            max_grid_buy_power_w: 16_000,
            ess_control_mode: EssControlMode::ChargeConsumption,
            reserve_soc_percent: None,
        }
    }
}

/// Storage system of the synthetic site
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EssConfig {
    pub capacity_wh: i32,
    pub initial_soc_percent: i32,
    pub min_soc_percent: i32,
    pub max_charge_power_w: i32,
    pub max_discharge_power_w: i32,
}

impl Default for EssConfig {
    fn default() -> Self {
        Self {
            capacity_wh: 10_000,
            initial_soc_percent: 50,
            min_soc_percent: 10,
            max_charge_power_w: 5_000,
            max_discharge_power_w: 5_000,
        }
    }
}

/// Profiles of the synthetic site used when no real forecasters are wired
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub pv_peak_power_w: i32,
    pub base_load_w: i32,
    /// Relative noise on consumption, 0 disables it
    pub noise: f64,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            pv_peak_power_w: 6_000,
            base_load_w: 600,
            noise: 0.1,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlexibleLoadConfig {
    pub id: String,
    pub power_w: i32,
    pub energy_target_wh: i32,
    /// Daily availability window in UTC, e.g. "18:00:00" to "07:00:00".
    /// A window may wrap midnight; without one the load is always available.
    #[serde(default)]
    pub available_from: Option<NaiveTime>,
    #[serde(default)]
    pub available_until: Option<NaiveTime>,
}

impl FlexibleLoadConfig {
    pub fn window(&self) -> Option<(NaiveTime, NaiveTime)> {
        self.available_from.zip(self.available_until)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.available_from.is_some() != self.available_until.is_some() {
            return Err(format!(
                "load {}: available_from and available_until must be set together",
                self.id
            ));
        }
        Ok(())
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from("config/default.toml")
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("ESCHED__").split("__"));
        let config: Config = figment.extract()?;
        config.validate().map_err(anyhow::Error::msg)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.optimizer.validate()?;
        self.loads.iter().try_for_each(FlexibleLoadConfig::validate)
    }
}
