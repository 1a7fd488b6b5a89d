use crate::collectors::{RawCpu, RawDisk, RawMemory, RawUsage};
use crate::snapshot::{
    CollectionError, CoreCounts, CpuFrequency, CpuSnapshot, DiskIoStat, DiskSnapshot,
    MemorySnapshot, PartitionStat, SwapMemory, Timestamp, VirtualMemory,
};
use std::io;

const BYTES_PER_GB: f64 = (1_u64 << 30) as f64;
const BYTES_PER_MB: f64 = (1_u64 << 20) as f64;

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn bytes_to_gb(bytes: u64) -> f64 {
    round2(bytes as f64 / BYTES_PER_GB)
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
    round2(bytes as f64 / BYTES_PER_MB)
}

pub fn exact_percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

pub fn percent(part: u64, whole: u64) -> f64 {
    round2(exact_percent(part, whole))
}

pub fn used_bytes(usage: &RawUsage) -> u64 {
    usage.total_bytes.saturating_sub(usage.free_bytes)
}

// Зарезервированные блоки не входят в знаменатель: used / (used + available).
pub fn exact_usage_percent(usage: &RawUsage) -> f64 {
    let used = used_bytes(usage);
    exact_percent(used, used.saturating_add(usage.available_bytes))
}

pub fn usage_percent(usage: &RawUsage) -> f64 {
    round2(exact_usage_percent(usage))
}

pub fn normalize_cpu(raw: &RawCpu, at: Timestamp) -> CpuSnapshot {
    CpuSnapshot {
        percent: round2(raw.usage_percent),
        per_core: raw.per_core_percent.iter().copied().map(round2).collect(),
        cores: CoreCounts {
            physical: raw.physical_cores,
            logical: raw.logical_cores,
        },
        frequency: CpuFrequency {
            current: raw.frequency_mhz.current.map(round2),
            min: raw.frequency_mhz.min.map(round2),
            max: raw.frequency_mhz.max.map(round2),
        },
        timestamp: at,
    }
}

pub fn normalize_memory(raw: &RawMemory, at: Timestamp) -> MemorySnapshot {
    MemorySnapshot {
        virtual_memory: VirtualMemory {
            total_gb: bytes_to_gb(raw.total_bytes),
            available_gb: bytes_to_gb(raw.available_bytes),
            used_gb: bytes_to_gb(raw.used_bytes),
            percent: percent(raw.used_bytes, raw.total_bytes),
        },
        swap: SwapMemory {
            total_gb: bytes_to_gb(raw.swap_total_bytes),
            used_gb: bytes_to_gb(raw.swap_used_bytes),
            percent: percent(raw.swap_used_bytes, raw.swap_total_bytes),
        },
        timestamp: at,
    }
}

pub fn normalize_disk(raw: &RawDisk, at: Timestamp) -> Result<DiskSnapshot, CollectionError> {
    let mut partitions = Vec::with_capacity(raw.partitions.len());
    for p in &raw.partitions {
        let usage = match &p.usage {
            Ok(usage) => usage,
            Err(err) if err.kind() == io::ErrorKind::PermissionDenied => continue,
            Err(err) => {
                return Err(CollectionError {
                    error: format!("раздел {}: {err}", p.mount_point),
                    timestamp: at,
                })
            }
        };
        partitions.push(PartitionStat {
            device: p.device.clone(),
            mountpoint: p.mount_point.clone(),
            fstype: p.fs_type.clone(),
            total_gb: bytes_to_gb(usage.total_bytes),
            used_gb: bytes_to_gb(used_bytes(usage)),
            free_gb: bytes_to_gb(usage.available_bytes),
            percent: usage_percent(usage),
        });
    }

    let io_stats = raw.io.as_ref().map(|io| DiskIoStat {
        read_count: io.read_count,
        write_count: io.write_count,
        read_mb: bytes_to_mb(io.read_bytes),
        write_mb: bytes_to_mb(io.write_bytes),
    });

    Ok(DiskSnapshot {
        partitions,
        io_stats,
        timestamp: at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::{RawDiskIo, RawFrequency, RawPartition};

    const GIB: u64 = 1 << 30;

    fn partition(mount: &str, usage: io::Result<RawUsage>) -> RawPartition {
        RawPartition {
            device: "/dev/sda1".to_string(),
            mount_point: mount.to_string(),
            fs_type: "ext4".to_string(),
            usage,
        }
    }

    #[test]
    fn round2_is_half_away_from_zero() {
        assert_eq!(round2(1.005_000_1), 1.01);
        assert_eq!(round2(2.3451), 2.35);
        assert_eq!(round2(-2.5551), -2.56);
        assert_eq!(round2(84.994), 84.99);
        assert_eq!(round2(0.0), 0.0);
    }

    #[test]
    fn unit_conversions() {
        assert_eq!(bytes_to_gb(16 * GIB), 16.0);
        assert_eq!(bytes_to_gb(GIB / 2), 0.5);
        assert_eq!(bytes_to_mb(3 * (1 << 20) + (1 << 19)), 3.5);
        assert_eq!(percent(1, 3), 33.33);
        assert_eq!(percent(5, 0), 0.0);
    }

    #[test]
    fn memory_half_used_reports_fifty_percent() {
        let raw = RawMemory {
            total_bytes: 16 * GIB + 123,
            available_bytes: 8 * GIB,
            used_bytes: 8 * GIB + 61,
            swap_total_bytes: 4 * GIB,
            swap_used_bytes: GIB,
        };
        let snap = normalize_memory(&raw, Timestamp::now());
        assert_eq!(snap.virtual_memory.total_gb, 16.0);
        assert_eq!(snap.virtual_memory.used_gb, 8.0);
        assert_eq!(snap.virtual_memory.percent, 50.0);
        assert_eq!(snap.swap.percent, 25.0);
        assert_eq!(snap.swap.used_gb, 1.0);
    }

    #[test]
    fn swap_absent_is_zero_percent() {
        let raw = RawMemory {
            total_bytes: GIB,
            available_bytes: GIB,
            used_bytes: 0,
            swap_total_bytes: 0,
            swap_used_bytes: 0,
        };
        assert_eq!(normalize_memory(&raw, Timestamp::now()).swap.percent, 0.0);
    }

    #[test]
    fn cpu_keeps_core_order_and_missing_frequency() {
        let raw = RawCpu {
            usage_percent: 12.346,
            per_core_percent: vec![90.126, 0.0, 33.333],
            physical_cores: None,
            logical_cores: 3,
            frequency_mhz: RawFrequency {
                current: Some(2400.456),
                min: None,
                max: None,
            },
        };
        let at = Timestamp::now();
        let snap = normalize_cpu(&raw, at);
        assert_eq!(snap.percent, 12.35);
        assert_eq!(snap.per_core, vec![90.13, 0.0, 33.33]);
        assert_eq!(snap.cores.physical, None);
        assert_eq!(snap.frequency.current, Some(2400.46));
        assert_eq!(snap.frequency.min, None);
        assert_eq!(snap.timestamp, at);
    }

    #[test]
    fn disk_skips_permission_denied_partitions() {
        let raw = RawDisk {
            partitions: vec![
                partition(
                    "/",
                    Ok(RawUsage {
                        total_bytes: 100 * GIB,
                        free_bytes: 25 * GIB,
                        available_bytes: 25 * GIB,
                    }),
                ),
                partition(
                    "/secret",
                    Err(io::Error::from(io::ErrorKind::PermissionDenied)),
                ),
            ],
            io: Some(RawDiskIo {
                read_count: 7,
                write_count: 9,
                read_bytes: 10 << 20,
                write_bytes: 5 << 19,
            }),
        };
        let snap = normalize_disk(&raw, Timestamp::now()).expect("диск должен нормализоваться");
        assert_eq!(snap.partitions.len(), 1);
        let root = &snap.partitions[0];
        assert_eq!(root.mountpoint, "/");
        assert_eq!(root.used_gb, 75.0);
        assert_eq!(root.free_gb, 25.0);
        assert_eq!(root.percent, 75.0);
        let io = snap.io_stats.expect("счётчики I/O должны быть");
        assert_eq!(io.read_mb, 10.0);
        assert_eq!(io.write_mb, 2.5);
    }

    #[test]
    fn disk_reserved_blocks_count_as_used_but_not_free() {
        let raw = RawDisk {
            partitions: vec![partition(
                "/",
                Ok(RawUsage {
                    total_bytes: 100 * GIB,
                    free_bytes: 30 * GIB,
                    available_bytes: 25 * GIB,
                }),
            )],
            io: None,
        };
        let snap = normalize_disk(&raw, Timestamp::now()).unwrap();
        let root = &snap.partitions[0];
        assert_eq!(root.total_gb, 100.0);
        assert_eq!(root.used_gb, 70.0);
        assert_eq!(root.free_gb, 25.0);
        assert_eq!(root.percent, 73.68);
    }

    #[test]
    fn disk_other_io_errors_fail_whole_snapshot() {
        let raw = RawDisk {
            partitions: vec![partition(
                "/broken",
                Err(io::Error::from(io::ErrorKind::NotFound)),
            )],
            io: None,
        };
        let err = normalize_disk(&raw, Timestamp::now()).unwrap_err();
        assert!(err.error.contains("/broken"));
    }

    #[test]
    fn disk_without_io_counters_has_no_io_stats() {
        let raw = RawDisk {
            partitions: Vec::new(),
            io: None,
        };
        let snap = normalize_disk(&raw, Timestamp::now()).unwrap();
        assert!(snap.partitions.is_empty());
        assert!(snap.io_stats.is_none());
    }
}
