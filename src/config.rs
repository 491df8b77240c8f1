use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::error::SimulationError;

const ENV_PREFIX: &str = "CLOUDLET_SIM";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub datacenter: DatacenterConfig,
    pub vm: VmConfig,
    pub workload: WorkloadConfig,
    pub strategies: StrategyPresets,
    pub billing: BillingConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DatacenterConfig {
    pub name: String,
    pub arch: String,
    pub os: String,
    pub vmm: String,
    pub time_zone: f64,
    pub cost_per_second: f64,
    pub cost_per_mem: f64,
    pub cost_per_storage: f64,
    pub cost_per_bw: f64,
    pub hosts: Vec<HostConfig>,
}

/// A group of identical hosts.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HostConfig {
    pub count: u32,
    pub pes: u32,
    pub mips_per_pe: f64,
    pub ram: u64,
    pub storage: u64,
    pub bw: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct VmConfig {
    pub pes: u32,
    pub bw: u64,
    /// Image size, charged against host storage.
    pub size: u64,
    pub vmm: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadShape {
    /// `numberOfCloudlets` cloudlets of `unit_length` each.
    Split,
    /// One cloudlet of `numberOfCloudlets * unit_length`.
    Single,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkloadConfig {
    pub shape: WorkloadShape,
    pub unit_length: u64,
    pub pes: u32,
    pub file_size: u64,
    pub output_size: u64,
    /// Gap between consecutive cloudlet submissions; 0 submits one batch.
    pub submission_interval: f64,
}

/// Per-strategy parameters. The VM processing rate is a property of the
/// experiment preset, not of the allocation algorithm itself.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct PolicyParameters {
    pub vm_mips: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StrategyPresets {
    pub best_fit: PolicyParameters,
    pub round_robin: PolicyParameters,
    pub time_shared: PolicyParameters,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BillingConfig {
    pub cost_per_second: f64,
    pub energy_per_second: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How many times BestFit may re-queue a cloudlet that did not fit.
    pub max_retries: u32,
    pub parallel: bool,
    /// Wall-clock limit for a single strategy run.
    pub time_limit_seconds: Option<f64>,
}

impl Default for DatacenterConfig {
    fn default() -> Self {
        Self {
            name: "Datacenter_0".to_string(),
            arch: "x86".to_string(),
            os: "Linux".to_string(),
            vmm: "Xen".to_string(),
            time_zone: 10.0,
            cost_per_second: 3.0,
            cost_per_mem: 0.05,
            cost_per_storage: 0.001,
            cost_per_bw: 0.0,
            hosts: vec![HostConfig::default()],
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            count: 1,
            pes: 1,
            mips_per_pe: 1000.0,
            ram: 2048,
            storage: 1_000_000,
            bw: 10_000,
        }
    }
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            pes: 1,
            bw: 1000,
            size: 10_000,
            vmm: "Xen".to_string(),
        }
    }
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            shape: WorkloadShape::Split,
            unit_length: 1000,
            pes: 1,
            file_size: 300,
            output_size: 300,
            submission_interval: 0.0,
        }
    }
}

impl Default for StrategyPresets {
    fn default() -> Self {
        Self {
            best_fit: PolicyParameters { vm_mips: 1000.0 },
            round_robin: PolicyParameters { vm_mips: 1500.0 },
            time_shared: PolicyParameters { vm_mips: 2000.0 },
        }
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            cost_per_second: 3.0,
            energy_per_second: 0.5,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            parallel: false,
            time_limit_seconds: None,
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Defaults, then the optional TOML file, then `CLOUDLET_SIM__SECTION__KEY`
    /// environment variables.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?);
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::new(path, config::FileFormat::Toml).required(true),
            );
        }
        let config: Config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        let dc = &self.datacenter;
        if dc.hosts.is_empty() || dc.hosts.iter().all(|h| h.count == 0) {
            return Err(SimulationError::invalid("datacenter must have at least one host"));
        }
        for (index, host) in dc.hosts.iter().enumerate() {
            if host.pes == 0 {
                return Err(SimulationError::invalid(format!(
                    "host group {index}: pes must be positive"
                )));
            }
            ensure_positive(&format!("host group {index}: mips_per_pe"), host.mips_per_pe)?;
            if host.ram == 0 || host.storage == 0 || host.bw == 0 {
                return Err(SimulationError::invalid(format!(
                    "host group {index}: ram, storage and bw must be positive"
                )));
            }
        }
        for (name, price) in [
            ("cost_per_second", dc.cost_per_second),
            ("cost_per_mem", dc.cost_per_mem),
            ("cost_per_storage", dc.cost_per_storage),
            ("cost_per_bw", dc.cost_per_bw),
            ("billing.cost_per_second", self.billing.cost_per_second),
            ("billing.energy_per_second", self.billing.energy_per_second),
        ] {
            if !price.is_finite() || price < 0.0 {
                return Err(SimulationError::invalid(format!(
                    "{name} must be a non-negative number"
                )));
            }
        }

        if self.vm.pes == 0 {
            return Err(SimulationError::invalid("vm.pes must be positive"));
        }
        if self.vm.bw == 0 || self.vm.size == 0 {
            return Err(SimulationError::invalid("vm.bw and vm.size must be positive"));
        }
        ensure_positive("strategies.best_fit.vm_mips", self.strategies.best_fit.vm_mips)?;
        ensure_positive("strategies.round_robin.vm_mips", self.strategies.round_robin.vm_mips)?;
        ensure_positive("strategies.time_shared.vm_mips", self.strategies.time_shared.vm_mips)?;

        let workload = &self.workload;
        if workload.unit_length == 0 {
            return Err(SimulationError::invalid("workload.unit_length must be positive"));
        }
        if workload.pes == 0 || workload.pes > self.vm.pes {
            return Err(SimulationError::invalid(format!(
                "workload.pes must be between 1 and vm.pes ({})",
                self.vm.pes
            )));
        }
        if !workload.submission_interval.is_finite() || workload.submission_interval < 0.0 {
            return Err(SimulationError::invalid(
                "workload.submission_interval must be non-negative",
            ));
        }

        if let Some(limit) = self.engine.time_limit_seconds {
            if Duration::try_from_secs_f64(limit).is_err() {
                return Err(SimulationError::invalid(format!(
                    "engine.time_limit_seconds must be a non-negative duration, got {limit}"
                )));
            }
        }
        Ok(())
    }
}

pub(crate) fn ensure_positive(name: &str, value: f64) -> Result<(), SimulationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SimulationError::invalid(format!("{name} must be positive, got {value}")))
    }
}
