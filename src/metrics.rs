use crate::engine::AllMetrics;
use crate::snapshot::{CpuSnapshot, DiskSnapshot, MemorySnapshot};
use crate::thresholds::{worst_partition_percent, Subsystem};
use prometheus::core::Collector;
use prometheus::{opts, Counter, CounterVec, Encoder, Gauge, GaugeVec, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub sysinsight_requests_total: CounterVec,
    pub sysinsight_collect_errors_total: CounterVec,
    pub sysinsight_cpu_usage_percent: Gauge,
    pub sysinsight_memory_usage_percent: Gauge,
    pub sysinsight_swap_usage_percent: Gauge,
    pub sysinsight_disk_usage_percent: GaugeVec,
    pub sysinsight_disk_worst_usage_percent: Gauge,
    pub sysinsight_alert_level: GaugeVec,
    pub sysinsight_readiness_checks_total: CounterVec,
    pub sysinsight_scrape_count_total: Counter,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let sysinsight_requests_total = CounterVec::new(
            opts!("sysinsight_requests_total", "API requests by endpoint"),
            &["endpoint"],
        )?;
        let sysinsight_collect_errors_total = CounterVec::new(
            opts!(
                "sysinsight_collect_errors_total",
                "Failed counter collections by subsystem"
            ),
            &["subsystem"],
        )?;
        let sysinsight_cpu_usage_percent = Gauge::with_opts(opts!(
            "sysinsight_cpu_usage_percent",
            "Last observed overall CPU usage in percent"
        ))?;
        let sysinsight_memory_usage_percent = Gauge::with_opts(opts!(
            "sysinsight_memory_usage_percent",
            "Last observed virtual memory usage in percent"
        ))?;
        let sysinsight_swap_usage_percent = Gauge::with_opts(opts!(
            "sysinsight_swap_usage_percent",
            "Last observed swap usage in percent"
        ))?;
        let sysinsight_disk_usage_percent = GaugeVec::new(
            opts!(
                "sysinsight_disk_usage_percent",
                "Last observed disk usage in percent by mount"
            ),
            &["mount"],
        )?;
        let sysinsight_disk_worst_usage_percent = Gauge::with_opts(opts!(
            "sysinsight_disk_worst_usage_percent",
            "Usage of the fullest partition in percent"
        ))?;
        let sysinsight_alert_level = GaugeVec::new(
            opts!(
                "sysinsight_alert_level",
                "Last alert level by subsystem (0 normal, 1 warning, 2 critical)"
            ),
            &["subsystem"],
        )?;
        let sysinsight_readiness_checks_total = CounterVec::new(
            opts!(
                "sysinsight_readiness_checks_total",
                "Readiness probe outcomes"
            ),
            &["status"],
        )?;
        let sysinsight_scrape_count_total = Counter::with_opts(opts!(
            "sysinsight_scrape_count_total",
            "Number of /metrics scrapes"
        ))?;

        register(&registry, &sysinsight_requests_total)?;
        register(&registry, &sysinsight_collect_errors_total)?;
        register(&registry, &sysinsight_cpu_usage_percent)?;
        register(&registry, &sysinsight_memory_usage_percent)?;
        register(&registry, &sysinsight_swap_usage_percent)?;
        register(&registry, &sysinsight_disk_usage_percent)?;
        register(&registry, &sysinsight_disk_worst_usage_percent)?;
        register(&registry, &sysinsight_alert_level)?;
        register(&registry, &sysinsight_readiness_checks_total)?;
        register(&registry, &sysinsight_scrape_count_total)?;

        Ok(Arc::new(Self {
            registry,
            sysinsight_requests_total,
            sysinsight_collect_errors_total,
            sysinsight_cpu_usage_percent,
            sysinsight_memory_usage_percent,
            sysinsight_swap_usage_percent,
            sysinsight_disk_usage_percent,
            sysinsight_disk_worst_usage_percent,
            sysinsight_alert_level,
            sysinsight_readiness_checks_total,
            sysinsight_scrape_count_total,
        }))
    }

    pub fn observe_cpu(&self, cpu: &CpuSnapshot) {
        self.sysinsight_cpu_usage_percent.set(cpu.percent);
    }

    pub fn observe_memory(&self, memory: &MemorySnapshot) {
        self.sysinsight_memory_usage_percent
            .set(memory.virtual_memory.percent);
        self.sysinsight_swap_usage_percent.set(memory.swap.percent);
    }

    pub fn observe_disk(&self, disk: &DiskSnapshot) {
        self.sysinsight_disk_usage_percent.reset();
        for p in &disk.partitions {
            self.sysinsight_disk_usage_percent
                .with_label_values(&[&p.mountpoint])
                .set(p.percent);
        }
        self.sysinsight_disk_worst_usage_percent
            .set(worst_partition_percent(disk));
    }

    pub fn observe_all(&self, all: &AllMetrics) {
        if let Some(cpu) = all.cpu.snapshot() {
            self.observe_cpu(cpu);
        }
        if let Some(memory) = all.memory.snapshot() {
            self.observe_memory(memory);
        }
        if let Some(disk) = all.disk.snapshot() {
            self.observe_disk(disk);
        }
        for subsystem in all.failed_subsystems() {
            self.inc_collect_error(subsystem);
        }
        if let Some(alerts) = &all.alerts {
            self.sysinsight_alert_level.reset();
            for (subsystem, level) in alerts {
                self.sysinsight_alert_level
                    .with_label_values(&[subsystem.as_str()])
                    .set(level.severity() as f64);
            }
        }
    }

    pub fn inc_request(&self, endpoint: &str) {
        self.sysinsight_requests_total
            .with_label_values(&[endpoint])
            .inc();
    }

    pub fn inc_collect_error(&self, subsystem: Subsystem) {
        self.sysinsight_collect_errors_total
            .with_label_values(&[subsystem.as_str()])
            .inc();
    }

    pub fn inc_readiness(&self, status: &str) {
        self.sysinsight_readiness_checks_total
            .with_label_values(&[status])
            .inc();
    }

    pub fn inc_scrape_count(&self) {
        self.sysinsight_scrape_count_total.inc();
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}
