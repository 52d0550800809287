use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub medium_node_threshold: u64,
    pub large_node_threshold: u64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            medium_node_threshold: 10_000,
            large_node_threshold: 100_000,
        }
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.medium_node_threshold == 0 {
            return Err(anyhow::anyhow!("中等内存阈值必须大于0"));
        }

        if self.large_node_threshold < self.medium_node_threshold {
            return Err(anyhow::anyhow!(
                "大内存阈值({})不能小于中等内存阈值({})",
                self.large_node_threshold,
                self.medium_node_threshold
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: true,
        }
    }
}

impl ObservabilityConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(anyhow::anyhow!(
                "无效的日志级别: {}，支持的级别: {:?}",
                self.log_level,
                valid_levels
            ));
        }

        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.log_format.as_str()) {
            return Err(anyhow::anyhow!(
                "无效的日志格式: {}，支持的格式: {:?}",
                self.log_format,
                valid_formats
            ));
        }

        Ok(())
    }
}
