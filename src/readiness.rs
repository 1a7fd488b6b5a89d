use crate::collectors::CounterSource;
use crate::normalize::{exact_percent, exact_usage_percent, round2};
use crate::snapshot::{CollectionError, Timestamp};
use serde::Serialize;
use std::time::Duration;

pub const READINESS_CEILING_PERCENT: f64 = 95.0;

pub const DEFAULT_READINESS_WINDOW: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReadinessChecks {
    pub cpu: bool,
    pub memory: bool,
    pub disk: bool,
}

impl ReadinessChecks {
    pub fn all_passed(&self) -> bool {
        self.cpu && self.memory && self.disk
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReadinessMetrics {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Readiness {
    Ready {
        timestamp: Timestamp,
        checks: ReadinessChecks,
        metrics: ReadinessMetrics,
    },
    NotReady {
        timestamp: Timestamp,
        checks: ReadinessChecks,
        metrics: ReadinessMetrics,
    },
    Error {
        error: String,
        timestamp: Timestamp,
    },
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

fn below_ceiling(value: f64) -> bool {
    value < READINESS_CEILING_PERCENT
}

// Сравнение идёт по точным значениям, в ответ попадают округлённые.
pub fn classify(raw: ReadinessMetrics, timestamp: Timestamp) -> Readiness {
    let checks = ReadinessChecks {
        cpu: below_ceiling(raw.cpu_percent),
        memory: below_ceiling(raw.memory_percent),
        disk: below_ceiling(raw.disk_percent),
    };
    let metrics = ReadinessMetrics {
        cpu_percent: round2(raw.cpu_percent),
        memory_percent: round2(raw.memory_percent),
        disk_percent: round2(raw.disk_percent),
    };
    if checks.all_passed() {
        Readiness::Ready {
            timestamp,
            checks,
            metrics,
        }
    } else {
        Readiness::NotReady {
            timestamp,
            checks,
            metrics,
        }
    }
}

fn sample(
    source: &dyn CounterSource,
    window: Duration,
) -> Result<ReadinessMetrics, CollectionError> {
    let cpu = source.read_cpu(window)?;
    let memory = source.read_memory()?;
    let root = source.read_root_usage()?;
    Ok(ReadinessMetrics {
        cpu_percent: cpu.usage_percent,
        memory_percent: exact_percent(memory.used_bytes, memory.total_bytes),
        disk_percent: exact_usage_percent(&root),
    })
}

/// Любая ошибка сбора даёт отдельное состояние `error`, а не `not_ready`.
pub fn check(source: &dyn CounterSource, window: Duration) -> Readiness {
    match sample(source, window) {
        Ok(metrics) => classify(metrics, Timestamp::now()),
        Err(err) => Readiness::Error {
            error: err.error,
            timestamp: err.timestamp,
        },
    }
}
