use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use super::{
    cluster_dispatcher::{ClusterConfig, DispatcherConfig},
    estimator_observability::{EstimatorConfig, ObservabilityConfig},
    worker_pool::WorkerPoolConfig,
};

/// 系统配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub cluster: ClusterConfig,
    pub dispatcher: DispatcherConfig,
    pub worker_pool: WorkerPoolConfig,
    pub estimator: EstimatorConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序:
    /// 1. 默认配置
    /// 2. 配置文件 (TOML)
    /// 3. 环境变量覆盖 (前缀: SIMGRID__, 层级分隔符: __)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                debug!("加载配置文件: {}", path);
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = ["config/simgrid.toml", "simgrid.toml"];

            let mut config_file_found = false;
            for path in &default_paths {
                if Path::new(path).exists() {
                    debug!("使用默认路径的配置文件: {}", path);
                    builder = builder.add_source(File::new(path, FileFormat::Toml));
                    config_file_found = true;
                    break;
                }
            }

            if !config_file_found {
                debug!("未找到配置文件, 使用默认配置");
                let defaults = AppConfig::default();
                builder = builder
                    .set_default("cluster.probe_interval_ms", defaults.cluster.probe_interval_ms)?
                    .set_default("cluster.failure_threshold", defaults.cluster.failure_threshold)?
                    .set_default(
                        "cluster.eviction_timeout_ms",
                        defaults.cluster.eviction_timeout_ms,
                    )?
                    .set_default(
                        "cluster.selection_strategy",
                        defaults.cluster.selection_strategy,
                    )?
                    .set_default("dispatcher.max_retries", defaults.dispatcher.max_retries)?
                    .set_default(
                        "dispatcher.rejection_backoff_ms",
                        defaults.dispatcher.rejection_backoff_ms,
                    )?
                    .set_default("observability.log_level", defaults.observability.log_level)?
                    .set_default("observability.log_format", defaults.observability.log_format)?;
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("SIMGRID")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> Result<()> {
        self.cluster.validate().context("集群配置验证失败")?;

        self.dispatcher
            .validate()
            .context("Dispatcher配置验证失败")?;

        self.worker_pool
            .validate()
            .context("Worker池配置验证失败")?;

        self.estimator.validate().context("复杂度估算配置验证失败")?;

        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        Ok(())
    }
}
