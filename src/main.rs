mod collectors;
mod config;
mod engine;
mod http;
mod metrics;
mod normalize;
mod readiness;
mod snapshot;
mod thresholds;

use axum::serve;
use clap::Parser;
use collectors::system::SysinfoSource;
use config::Config;
use engine::MetricsEngine;
use metrics::Metrics;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sysinsight")]
#[command(version)]
struct Cli {
    /// YAML-файл конфигурации; без него используются значения по умолчанию
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    print_default_config: bool,
    #[arg(long, conflicts_with = "alerts_off")]
    alerts_on: bool,
    #[arg(long, conflicts_with = "alerts_on")]
    alerts_off: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let cfg = match load_config(&cli) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "не удалось загрузить конфигурацию");
            std::process::exit(1);
        }
    };

    let addr: SocketAddr = match cfg.listen.parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!(error = %err, listen = %cfg.listen, "некорректный адрес listen");
            std::process::exit(1);
        }
    };

    let metrics = match Metrics::new() {
        Ok(m) => m,
        Err(err) => {
            error!(error = %err, "не удалось инициализировать метрики");
            std::process::exit(1);
        }
    };

    let settings = cfg.engine_settings();
    info!(
        listen = %addr,
        alerts_enabled = settings.alerts_enabled,
        cpu_window_ms = settings.cpu_window.as_millis() as u64,
        "запуск sysinsight"
    );
    let engine = MetricsEngine::new(Arc::new(SysinfoSource), settings);
    let app = http::build_router(engine, metrics, &cfg.cors_origins);

    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(err) => {
            error!(error = %err, "не удалось запустить HTTP-сервер");
            std::process::exit(1);
        }
    };

    let server = serve(listener, app).with_graceful_shutdown(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "не удалось дождаться Ctrl+C");
        }
        info!("получен Ctrl+C, выполняется остановка");
    });

    if let Err(err) = server.await {
        error!(error = %err, "ошибка HTTP-сервера");
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(cli: &Cli) -> Result<Config, config::ConfigError> {
    load_config_with(cli, |name| std::env::var(name).ok())
}

// Файл, затем окружение, затем флаги командной строки.
fn load_config_with<F>(cli: &Cli, lookup: F) -> Result<Config, config::ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut cfg = match &cli.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::default(),
    };
    cfg.apply_env(lookup)?;
    if cli.alerts_on {
        cfg.alerts.enabled = true;
    } else if cli.alerts_off {
        cfg.alerts.enabled = false;
    }
    cfg.validate()?;
    Ok(cfg)
}
