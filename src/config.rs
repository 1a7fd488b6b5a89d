use crate::engine::EngineSettings;
use crate::thresholds::{Subsystem, ThresholdConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AlertsConfig {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SamplingConfig {
    #[serde(default = "default_cpu_interval_ms")]
    pub cpu_interval_ms: u64,
    #[serde(default = "default_readiness_interval_ms")]
    pub readiness_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            thresholds: ThresholdConfig::default(),
            alerts: AlertsConfig::default(),
            sampling: SamplingConfig::default(),
            cors_origins: default_cors_origins(),
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            cpu_interval_ms: default_cpu_interval_ms(),
            readiness_interval_ms: default_readiness_interval_ms(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("не удалось прочитать файл конфигурации {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("не удалось разобрать YAML в {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("переменная окружения {name}='{value}' не является корректным значением")]
    Env { name: String, value: String },
    #[error("ошибка валидации конфигурации: {0}")]
    Validation(String),
}

const THRESHOLD_ENV: [(Subsystem, &str, &str); 3] = [
    (Subsystem::Cpu, "CPU_WARNING", "CPU_CRITICAL"),
    (Subsystem::Memory, "MEMORY_WARNING", "MEMORY_CRITICAL"),
    (Subsystem::Disk, "DISK_WARNING", "DISK_CRITICAL"),
];

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        for (subsystem, warning_env, critical_env) in THRESHOLD_ENV {
            let pair = self.thresholds.pair_mut(subsystem);
            if let Some(v) = get(warning_env) {
                pair.warning_percent = parse_env(warning_env, &v)?;
            }
            if let Some(v) = get(critical_env) {
                pair.critical_percent = parse_env(critical_env, &v)?;
            }
        }
        if let Some(v) = get("ENABLE_ALERTS") {
            self.alerts.enabled = v.trim().eq_ignore_ascii_case("true");
        }
        if let Some(v) = get("CORS_ORIGINS") {
            self.cors_origins = v
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
        if let Some(v) = get("SYSINSIGHT_LISTEN") {
            self.listen = v.trim().to_string();
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.trim().is_empty() {
            return Err(ConfigError::Validation(
                "поле listen обязательно".to_string(),
            ));
        }
        if SocketAddr::from_str(&self.listen).is_err() {
            return Err(ConfigError::Validation(
                "поле listen должно быть корректным адресом host:port".to_string(),
            ));
        }
        if self.sampling.cpu_interval_ms < 1 {
            return Err(ConfigError::Validation(
                "sampling.cpu_interval_ms должно быть >= 1".to_string(),
            ));
        }
        if self.sampling.readiness_interval_ms < 1 {
            return Err(ConfigError::Validation(
                "sampling.readiness_interval_ms должно быть >= 1".to_string(),
            ));
        }

        validate_thresholds(&self.thresholds)?;

        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            thresholds: self.thresholds,
            alerts_enabled: self.alerts.enabled,
            cpu_window: Duration::from_millis(self.sampling.cpu_interval_ms),
            readiness_window: Duration::from_millis(self.sampling.readiness_interval_ms),
        }
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn validate_thresholds(cfg: &ThresholdConfig) -> Result<(), ConfigError> {
    for subsystem in Subsystem::ALL {
        let pair = cfg.pair(subsystem);
        for (kind, value) in [
            ("warning_percent", pair.warning_percent),
            ("critical_percent", pair.critical_percent),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::Validation(format!(
                    "thresholds.{subsystem}.{kind} должно быть в диапазоне 0..100"
                )));
            }
        }
    }
    Ok(())
}

fn parse_env(name: &str, value: &str) -> Result<f64, ConfigError> {
    value.trim().parse::<f64>().map_err(|_| ConfigError::Env {
        name: name.to_string(),
        value: value.to_string(),
    })
}

fn default_listen() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

const fn default_cpu_interval_ms() -> u64 {
    1000
}

const fn default_readiness_interval_ms() -> u64 {
    100
}
