use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const SELECTION_STRATEGIES: [&str; 2] = ["greedy_descending", "best_fit"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub probe_interval_ms: u64,
    /// 连续探测失败多少次后标记为Unreachable
    pub failure_threshold: u32,
    pub eviction_timeout_ms: u64,
    pub selection_strategy: String, // "greedy_descending", "best_fit"
    pub event_buffer: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            probe_interval_ms: 1_000,
            failure_threshold: 3,
            eviction_timeout_ms: 30_000,
            selection_strategy: "greedy_descending".to_string(),
            event_buffer: 256,
        }
    }
}

impl ClusterConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn eviction_timeout(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.eviction_timeout_ms as i64)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.probe_interval_ms == 0 {
            return Err(anyhow::anyhow!("探测间隔必须大于0"));
        }

        if self.failure_threshold == 0 {
            return Err(anyhow::anyhow!("探测失败阈值必须大于0"));
        }

        if self.eviction_timeout_ms < self.probe_interval_ms {
            return Err(anyhow::anyhow!(
                "驱逐超时({}ms)不能小于探测间隔({}ms)",
                self.eviction_timeout_ms,
                self.probe_interval_ms
            ));
        }

        if !SELECTION_STRATEGIES.contains(&self.selection_strategy.as_str()) {
            return Err(anyhow::anyhow!(
                "无效的选择策略: {}，支持的策略: {:?}",
                self.selection_strategy,
                SELECTION_STRATEGIES
            ));
        }

        if self.event_buffer == 0 {
            return Err(anyhow::anyhow!("事件缓冲区大小必须大于0"));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// 重试上限R: 失败次数超过R时作业不可恢复
    pub max_retries: u32,
    /// 单次尝试的兜底超时, 作业自身截止时间由Worker执行
    pub attempt_timeout_ms: Option<u64>,
    /// 所有成员都拒绝提交时的等待间隔
    pub rejection_backoff_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            attempt_timeout_ms: None,
            rejection_backoff_ms: 50,
        }
    }
}

impl DispatcherConfig {
    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout_ms.map(Duration::from_millis)
    }

    pub fn rejection_backoff(&self) -> Duration {
        Duration::from_millis(self.rejection_backoff_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.attempt_timeout_ms == Some(0) {
            return Err(anyhow::anyhow!("尝试超时时间必须大于0"));
        }

        if self.rejection_backoff_ms == 0 {
            return Err(anyhow::anyhow!("拒绝退避间隔必须大于0"));
        }

        Ok(())
    }
}
