pub mod system;

use crate::snapshot::CollectionError;
use std::io;
use std::time::Duration;

pub trait CounterSource: Send + Sync {
    /// Блокирует вызывающий поток на время окна усреднения `window`.
    fn read_cpu(&self, window: Duration) -> Result<RawCpu, CollectionError>;
    fn read_memory(&self) -> Result<RawMemory, CollectionError>;
    fn read_disk(&self) -> Result<RawDisk, CollectionError>;
    fn read_root_usage(&self) -> Result<RawUsage, CollectionError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawCpu {
    pub usage_percent: f64,
    pub per_core_percent: Vec<f64>,
    pub physical_cores: Option<u32>,
    pub logical_cores: u32,
    pub frequency_mhz: RawFrequency,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFrequency {
    pub current: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawMemory {
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub used_bytes: u64,
    pub swap_total_bytes: u64,
    pub swap_used_bytes: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawUsage {
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub available_bytes: u64,
}

#[derive(Debug)]
pub struct RawPartition {
    pub device: String,
    pub mount_point: String,
    pub fs_type: String,
    pub usage: io::Result<RawUsage>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawDiskIo {
    pub read_count: u64,
    pub write_count: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
}

#[derive(Debug)]
pub struct RawDisk {
    pub partitions: Vec<RawPartition>,
    pub io: Option<RawDiskIo>,
}
