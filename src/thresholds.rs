use crate::snapshot::{Collected, CpuSnapshot, DiskSnapshot, MemorySnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Subsystem {
    Cpu,
    Memory,
    Disk,
}

impl Subsystem {
    pub const ALL: [Subsystem; 3] = [Subsystem::Cpu, Subsystem::Memory, Subsystem::Disk];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
            Self::Disk => "disk",
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Normal,
    Warning,
    Critical,
}

impl AlertLevel {
    pub fn severity(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Warning => 1,
            Self::Critical => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ThresholdPair {
    pub warning_percent: f64,
    pub critical_percent: f64,
}

impl ThresholdPair {
    pub const fn new(warning_percent: f64, critical_percent: f64) -> Self {
        Self {
            warning_percent,
            critical_percent,
        }
    }

    /// Значение на самом пороге относится к более высокому уровню.
    pub fn classify(&self, value: f64) -> AlertLevel {
        if value >= self.critical_percent {
            AlertLevel::Critical
        } else if value >= self.warning_percent {
            AlertLevel::Warning
        } else {
            AlertLevel::Normal
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ThresholdConfig {
    #[serde(default = "default_cpu")]
    pub cpu: ThresholdPair,
    #[serde(default = "default_memory")]
    pub memory: ThresholdPair,
    #[serde(default = "default_disk")]
    pub disk: ThresholdPair,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            cpu: default_cpu(),
            memory: default_memory(),
            disk: default_disk(),
        }
    }
}

impl ThresholdConfig {
    pub fn pair(&self, subsystem: Subsystem) -> &ThresholdPair {
        match subsystem {
            Subsystem::Cpu => &self.cpu,
            Subsystem::Memory => &self.memory,
            Subsystem::Disk => &self.disk,
        }
    }

    pub fn pair_mut(&mut self, subsystem: Subsystem) -> &mut ThresholdPair {
        match subsystem {
            Subsystem::Cpu => &mut self.cpu,
            Subsystem::Memory => &mut self.memory,
            Subsystem::Disk => &mut self.disk,
        }
    }
}

const fn default_cpu() -> ThresholdPair {
    ThresholdPair::new(70.0, 85.0)
}

const fn default_memory() -> ThresholdPair {
    ThresholdPair::new(75.0, 90.0)
}

const fn default_disk() -> ThresholdPair {
    ThresholdPair::new(80.0, 90.0)
}

pub fn worst_partition_percent(disk: &DiskSnapshot) -> f64 {
    disk.partitions
        .iter()
        .map(|p| p.percent)
        .fold(0.0_f64, f64::max)
}

pub fn evaluate(
    cpu: &Collected<CpuSnapshot>,
    memory: &Collected<MemorySnapshot>,
    disk: &Collected<DiskSnapshot>,
    cfg: &ThresholdConfig,
) -> BTreeMap<Subsystem, AlertLevel> {
    let mut alerts = BTreeMap::new();
    if let Some(cpu) = cpu.snapshot() {
        alerts.insert(Subsystem::Cpu, cfg.cpu.classify(cpu.percent));
    }
    if let Some(memory) = memory.snapshot() {
        alerts.insert(
            Subsystem::Memory,
            cfg.memory.classify(memory.virtual_memory.percent),
        );
    }
    if let Some(disk) = disk.snapshot() {
        alerts.insert(
            Subsystem::Disk,
            cfg.disk.classify(worst_partition_percent(disk)),
        );
    }
    alerts
}
