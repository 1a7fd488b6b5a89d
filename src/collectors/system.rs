use crate::collectors::{
    CounterSource, RawCpu, RawDisk, RawDiskIo, RawFrequency, RawMemory, RawPartition, RawUsage,
};
use crate::snapshot::CollectionError;
#[cfg(unix)]
use nix::sys::statvfs::statvfs;
#[cfg(any(target_os = "linux", not(unix)))]
use std::fs;
use std::io;
use std::path::Path;
use std::thread;
use std::time::Duration;
use sysinfo::{CpuExt, Disk, DiskExt, System, SystemExt};
use tracing::debug;

#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoSource;

impl CounterSource for SysinfoSource {
    fn read_cpu(&self, window: Duration) -> Result<RawCpu, CollectionError> {
        let mut system = System::new();
        system.refresh_cpu();
        thread::sleep(window.max(System::MINIMUM_CPU_UPDATE_INTERVAL));
        system.refresh_cpu();

        let cpus = system.cpus();
        if cpus.is_empty() {
            return Err(CollectionError::new("ядра процессора не обнаружены"));
        }

        let per_core_percent: Vec<f64> = cpus.iter().map(|c| c.cpu_usage() as f64).collect();
        let usage_percent = system.global_cpu_info().cpu_usage() as f64;
        let current = average_frequency(cpus.iter().map(|c| c.frequency()));
        let (min, max) = read_frequency_limits();
        debug!(
            cores = cpus.len(),
            window_ms = window.as_millis() as u64,
            "снят срез загрузки CPU"
        );

        Ok(RawCpu {
            usage_percent,
            per_core_percent,
            physical_cores: system.physical_core_count().map(|n| n as u32),
            logical_cores: cpus.len() as u32,
            frequency_mhz: RawFrequency { current, min, max },
        })
    }

    fn read_memory(&self) -> Result<RawMemory, CollectionError> {
        let mut system = System::new();
        system.refresh_memory();
        let total_bytes = system.total_memory();
        if total_bytes == 0 {
            return Err(CollectionError::new(
                "объём оперативной памяти недоступен",
            ));
        }

        Ok(RawMemory {
            total_bytes,
            available_bytes: system.available_memory(),
            used_bytes: system.used_memory(),
            swap_total_bytes: system.total_swap(),
            swap_used_bytes: system.used_swap(),
        })
    }

    fn read_disk(&self) -> Result<RawDisk, CollectionError> {
        let mut system = System::new();
        system.refresh_disks_list();

        let mut partitions = Vec::with_capacity(system.disks().len());
        for d in system.disks() {
            let mount = d.mount_point();
            partitions.push(RawPartition {
                device: d.name().to_string_lossy().to_string(),
                mount_point: mount.to_string_lossy().to_string(),
                fs_type: String::from_utf8_lossy(d.file_system()).to_string(),
                usage: mount_usage(mount, d),
            });
        }

        Ok(RawDisk {
            partitions,
            io: read_disk_io(),
        })
    }

    fn read_root_usage(&self) -> Result<RawUsage, CollectionError> {
        let mut system = System::new();
        system.refresh_disks_list();
        let disks = system.disks();
        let root = disks
            .iter()
            .find(|d| d.mount_point() == Path::new("/"))
            .or_else(|| disks.first())
            .ok_or_else(|| CollectionError::new("корневая файловая система не найдена"))?;
        mount_usage(root.mount_point(), root).map_err(|err| {
            CollectionError::new(format!(
                "не удалось прочитать раздел {}: {err}",
                root.mount_point().display()
            ))
        })
    }
}

// free_bytes включает блоки, зарезервированные для root; available_bytes нет.
#[cfg(unix)]
fn mount_usage(mount: &Path, _disk: &Disk) -> io::Result<RawUsage> {
    let stat = statvfs(mount)?;
    let fragment = stat.fragment_size() as u64;
    Ok(RawUsage {
        total_bytes: stat.blocks() as u64 * fragment,
        free_bytes: stat.blocks_free() as u64 * fragment,
        available_bytes: stat.blocks_available() as u64 * fragment,
    })
}

#[cfg(not(unix))]
fn mount_usage(mount: &Path, disk: &Disk) -> io::Result<RawUsage> {
    fs::metadata(mount)?;
    Ok(RawUsage {
        total_bytes: disk.total_space(),
        free_bytes: disk.available_space(),
        available_bytes: disk.available_space(),
    })
}

fn average_frequency(mhz: impl Iterator<Item = u64>) -> Option<f64> {
    let (sum, count) = mhz
        .filter(|f| *f > 0)
        .fold((0_u64, 0_u64), |(sum, count), f| (sum + f, count + 1));
    (count > 0).then(|| sum as f64 / count as f64)
}

#[cfg(target_os = "linux")]
fn read_frequency_limits() -> (Option<f64>, Option<f64>) {
    const CPUFREQ: &str = "/sys/devices/system/cpu/cpu0/cpufreq";
    let read_khz = |name: &str| -> Option<f64> {
        let raw = fs::read_to_string(format!("{CPUFREQ}/{name}")).ok()?;
        let khz = raw.trim().parse::<u64>().ok()?;
        (khz > 0).then(|| khz as f64 / 1000.0)
    };
    (read_khz("cpuinfo_min_freq"), read_khz("cpuinfo_max_freq"))
}

#[cfg(not(target_os = "linux"))]
fn read_frequency_limits() -> (Option<f64>, Option<f64>) {
    (None, None)
}

#[cfg(target_os = "linux")]
fn read_disk_io() -> Option<RawDiskIo> {
    let raw = fs::read_to_string("/proc/diskstats").ok()?;
    parse_diskstats(&raw)
}

#[cfg(not(target_os = "linux"))]
fn read_disk_io() -> Option<RawDiskIo> {
    None
}

const SECTOR_BYTES: u64 = 512;

fn parse_diskstats(raw: &str) -> Option<RawDiskIo> {
    let mut total = RawDiskIo {
        read_count: 0,
        write_count: 0,
        read_bytes: 0,
        write_bytes: 0,
    };
    let mut disks = 0_u32;

    for line in raw.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 10 || !is_whole_disk(parts[2]) {
            continue;
        }
        let field = |i: usize| parts[i].parse::<u64>().ok();
        let (Some(reads), Some(read_sectors), Some(writes), Some(write_sectors)) =
            (field(3), field(5), field(7), field(9))
        else {
            continue;
        };
        disks += 1;
        total.read_count += reads;
        total.read_bytes += read_sectors * SECTOR_BYTES;
        total.write_count += writes;
        total.write_bytes += write_sectors * SECTOR_BYTES;
    }

    (disks > 0).then_some(total)
}

fn is_whole_disk(name: &str) -> bool {
    let virtual_prefixes = ["loop", "ram", "dm-", "md", "zram", "sr", "fd", "nbd"];
    if virtual_prefixes.iter().any(|p| name.starts_with(p)) {
        return false;
    }
    if name.starts_with("nvme") || name.starts_with("mmcblk") {
        return !name.contains('p');
    }
    !name.chars().last().is_some_and(|c| c.is_ascii_digit())
}
