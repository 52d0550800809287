use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use simgrid::{app::Application, batch::load_batch, shutdown::ShutdownManager};
use simgrid_core::config::AppConfig;
use simgrid_dispatcher::BatchReport;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("simgrid")
        .version("1.0.0")
        .about("分布式空间仿真执行层")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径")
                .default_value("config/simgrid.toml"),
        )
        .arg(
            Arg::new("batch")
                .short('b')
                .long("batch")
                .value_name("FILE")
                .help("批次文件路径 (JSON)")
                .required(true),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("报告输出路径, 默认输出到标准输出"),
        )
        .arg(
            Arg::new("metrics-file")
                .long("metrics-file")
                .value_name("FILE")
                .help("批次结束后写出Prometheus格式的指标"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别, 默认取配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式, 默认取配置文件")
                .value_parser(["json", "pretty"]),
        )
        .get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .context("缺少配置文件参数")?;
    let batch_path = matches
        .get_one::<String>("batch")
        .context("缺少批次文件参数")?;

    let config = AppConfig::load(Some(config_path))
        .with_context(|| format!("加载配置文件失败: {config_path}"))?;

    let log_level = matches
        .get_one::<String>("log-level")
        .unwrap_or(&config.observability.log_level);
    let log_format = matches
        .get_one::<String>("log-format")
        .unwrap_or(&config.observability.log_format);
    init_logging(log_level, log_format)?;

    let metrics = if config.observability.metrics_enabled {
        Some(init_metrics()?)
    } else {
        None
    };

    info!("启动SimGrid, 配置文件: {config_path}, 批次文件: {batch_path}");

    let jobs = load_batch(batch_path)?;
    let app = Application::new(config).await?;
    let shutdown_manager = ShutdownManager::new();

    let app_shutdown_rx = shutdown_manager.subscribe();
    let mut shutdown_rx = shutdown_manager.subscribe();
    let mut run = tokio::spawn(async move { app.run_batch(jobs, app_shutdown_rx).await });

    let signal_task = {
        let shutdown_manager = shutdown_manager.clone();
        tokio::spawn(async move {
            wait_for_shutdown_signal().await;
            info!("收到关闭信号, 开始优雅关闭...");
            shutdown_manager.shutdown();
        })
    };

    let finished = tokio::select! {
        joined = &mut run => Some(joined),
        _ = shutdown_rx.recv() => None,
    };
    signal_task.abort();

    let joined = match finished {
        Some(joined) => joined,
        // 等待Dispatcher交付已取消的作业, 设置超时
        None => match tokio::time::timeout(Duration::from_secs(30), run).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!("批次关闭超时, 强制退出");
                return Err(anyhow::anyhow!("批次关闭超时"));
            }
        },
    };

    let report = match joined {
        Ok(result) => result?,
        Err(e) => {
            error!("批次任务异常退出: {e}");
            return Err(anyhow::anyhow!("批次任务异常退出: {e}"));
        }
    };

    write_report(&report, matches.get_one::<String>("output"))?;
    if let (Some(handle), Some(path)) = (metrics, matches.get_one::<String>("metrics-file")) {
        std::fs::write(path, handle.render())
            .with_context(|| format!("写出指标文件失败: {path}"))?;
    }

    info!("SimGrid已退出");
    Ok(())
}

/// 初始化日志系统
fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    // 标准输出留给报告
    match log_format {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        "pretty" => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
        _ => {
            return Err(anyhow::anyhow!("不支持的日志格式: {log_format}"));
        }
    }

    Ok(())
}

/// 安装进程内的Prometheus记录器
fn init_metrics() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("安装指标记录器失败")
}

fn write_report(report: &BatchReport, output: Option<&String>) -> Result<()> {
    let json =
        serde_json::to_string_pretty(&report.summary()).context("序列化批次报告失败")?;
    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("写出报告失败: {path}"))?;
            info!("报告已写出到 {path}");
        }
        None => println!("{json}"),
    }
    Ok(())
}

/// 等待关闭信号
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("安装Ctrl+C信号处理器失败: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}
