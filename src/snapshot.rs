use serde::{Serialize, Serializer};
use std::fmt;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(SystemTime);

impl Timestamp {
    pub fn now() -> Self {
        Self(SystemTime::now())
    }

    #[cfg(test)]
    pub fn from_system_time(at: SystemTime) -> Self {
        Self(at)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", humantime::format_rfc3339_micros(self.0))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuSnapshot {
    pub percent: f64,
    pub per_core: Vec<f64>,
    pub cores: CoreCounts,
    pub frequency: CpuFrequency,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoreCounts {
    pub physical: Option<u32>,
    pub logical: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CpuFrequency {
    pub current: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemorySnapshot {
    #[serde(rename = "virtual")]
    pub virtual_memory: VirtualMemory,
    pub swap: SwapMemory,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VirtualMemory {
    pub total_gb: f64,
    pub available_gb: f64,
    pub used_gb: f64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwapMemory {
    pub total_gb: f64,
    pub used_gb: f64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskSnapshot {
    pub partitions: Vec<PartitionStat>,
    pub io_stats: Option<DiskIoStat>,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionStat {
    pub device: String,
    pub mountpoint: String,
    pub fstype: String,
    pub total_gb: f64,
    pub used_gb: f64,
    pub free_gb: f64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskIoStat {
    pub read_count: u64,
    pub write_count: u64,
    pub read_mb: f64,
    pub write_mb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("{error}")]
pub struct CollectionError {
    pub error: String,
    pub timestamp: Timestamp,
}

impl CollectionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            timestamp: Timestamp::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Collected<T> {
    Snapshot(T),
    Failed(CollectionError),
}

impl<T> Collected<T> {
    pub fn snapshot(&self) -> Option<&T> {
        match self {
            Self::Snapshot(s) => Some(s),
            Self::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl<T> From<Result<T, CollectionError>> for Collected<T> {
    fn from(value: Result<T, CollectionError>) -> Self {
        match value {
            Ok(s) => Self::Snapshot(s),
            Err(err) => Self::Failed(err),
        }
    }
}
