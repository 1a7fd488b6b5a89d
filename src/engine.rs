use crate::collectors::CounterSource;
use crate::normalize::{normalize_cpu, normalize_disk, normalize_memory};
use crate::readiness::{self, Readiness};
use crate::snapshot::{Collected, CpuSnapshot, DiskSnapshot, MemorySnapshot, Timestamp};
use crate::thresholds::{evaluate, AlertLevel, Subsystem, ThresholdConfig};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub thresholds: ThresholdConfig,
    pub alerts_enabled: bool,
    pub cpu_window: Duration,
    pub readiness_window: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            thresholds: ThresholdConfig::default(),
            alerts_enabled: false,
            cpu_window: Duration::from_secs(1),
            readiness_window: readiness::DEFAULT_READINESS_WINDOW,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllMetrics {
    pub cpu: Collected<CpuSnapshot>,
    pub memory: Collected<MemorySnapshot>,
    pub disk: Collected<DiskSnapshot>,
    pub timestamp: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alerts: Option<BTreeMap<Subsystem, AlertLevel>>,
}

impl AllMetrics {
    pub fn failed_subsystems(&self) -> Vec<Subsystem> {
        let mut out = Vec::new();
        if self.cpu.is_failed() {
            out.push(Subsystem::Cpu);
        }
        if self.memory.is_failed() {
            out.push(Subsystem::Memory);
        }
        if self.disk.is_failed() {
            out.push(Subsystem::Disk);
        }
        out
    }
}

#[derive(Clone)]
pub struct MetricsEngine {
    source: Arc<dyn CounterSource>,
    settings: EngineSettings,
}

impl MetricsEngine {
    pub fn new(source: Arc<dyn CounterSource>, settings: EngineSettings) -> Self {
        Self { source, settings }
    }

    pub fn cpu(&self) -> Collected<CpuSnapshot> {
        let result = self
            .source
            .read_cpu(self.settings.cpu_window)
            .map(|raw| normalize_cpu(&raw, Timestamp::now()));
        log_failure(Subsystem::Cpu, result.into())
    }

    pub fn memory(&self) -> Collected<MemorySnapshot> {
        let result = self
            .source
            .read_memory()
            .map(|raw| normalize_memory(&raw, Timestamp::now()));
        log_failure(Subsystem::Memory, result.into())
    }

    pub fn disk(&self) -> Collected<DiskSnapshot> {
        let result = self
            .source
            .read_disk()
            .and_then(|raw| normalize_disk(&raw, Timestamp::now()));
        log_failure(Subsystem::Disk, result.into())
    }

    pub fn all(&self) -> AllMetrics {
        let cpu = self.cpu();
        let memory = self.memory();
        let disk = self.disk();
        let alerts = self
            .settings
            .alerts_enabled
            .then(|| evaluate(&cpu, &memory, &disk, &self.settings.thresholds));
        AllMetrics {
            cpu,
            memory,
            disk,
            timestamp: Timestamp::now(),
            alerts,
        }
    }

    pub fn readiness(&self) -> Readiness {
        let readiness = readiness::check(self.source.as_ref(), self.settings.readiness_window);
        if let Readiness::Error { error, .. } = &readiness {
            warn!(error = %error, "проба готовности не смогла собрать метрики");
        }
        readiness
    }
}

fn log_failure<T>(subsystem: Subsystem, collected: Collected<T>) -> Collected<T> {
    if let Collected::Failed(err) = &collected {
        warn!(subsystem = %subsystem, error = %err, "не удалось собрать метрики подсистемы");
    }
    collected
}
