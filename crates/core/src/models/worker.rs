use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Worker公布的容量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCapacity {
    pub units: u64,
    pub max_concurrent_jobs: usize,
}

impl WorkerCapacity {
    pub fn new(units: u64, max_concurrent_jobs: usize) -> Self {
        Self {
            units,
            max_concurrent_jobs,
        }
    }
}

/// Worker健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerHealth {
    #[serde(rename = "HEALTHY")]
    Healthy,
    #[serde(rename = "UNREACHABLE")]
    Unreachable,
    #[serde(rename = "DRAINING")]
    Draining,
}

/// 集群视角下的Worker信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub id: WorkerId,
    pub address: String,
    pub capacity: WorkerCapacity,
    pub health: WorkerHealth,
    pub consecutive_failures: u32,
    pub unreachable_since: Option<DateTime<Utc>>,
    pub current_load: usize,
    pub last_probe: Option<DateTime<Utc>>,
    pub joined_at: DateTime<Utc>,
}

impl WorkerInfo {
    pub fn new(id: WorkerId, address: String, capacity: WorkerCapacity) -> Self {
        Self {
            id,
            address,
            capacity,
            health: WorkerHealth::Healthy,
            consecutive_failures: 0,
            unreachable_since: None,
            current_load: 0,
            last_probe: None,
            joined_at: Utc::now(),
        }
    }

    /// 只有Healthy的Worker参与选择
    pub fn is_selectable(&self) -> bool {
        matches!(self.health, WorkerHealth::Healthy)
    }

    pub fn load_percentage(&self) -> f64 {
        if self.capacity.max_concurrent_jobs == 0 {
            0.0
        } else {
            (self.current_load as f64 / self.capacity.max_concurrent_jobs as f64) * 100.0
        }
    }

    /// 记录一次成功探测, 返回是否从Unreachable恢复
    pub fn record_probe_success(&mut self, load: usize, now: DateTime<Utc>) -> bool {
        self.consecutive_failures = 0;
        self.current_load = load;
        self.last_probe = Some(now);
        if self.health == WorkerHealth::Unreachable {
            self.health = WorkerHealth::Healthy;
            self.unreachable_since = None;
            return true;
        }
        false
    }

    /// 记录一次失败探测, 返回是否刚刚转为Unreachable
    pub fn record_probe_failure(&mut self, threshold: u32, now: DateTime<Utc>) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_probe = Some(now);
        if self.health == WorkerHealth::Healthy && self.consecutive_failures >= threshold {
            self.health = WorkerHealth::Unreachable;
            self.unreachable_since = Some(now);
            return true;
        }
        false
    }

    pub fn is_eviction_due(&self, eviction_timeout: Duration, now: DateTime<Utc>) -> bool {
        match (self.health, self.unreachable_since) {
            (WorkerHealth::Unreachable, Some(since)) => now - since >= eviction_timeout,
            _ => false,
        }
    }
}

/// 成员变化通知, 通过广播通道发布
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipEvent {
    Joined(WorkerId),
    Left(WorkerId),
    Unreachable(WorkerId),
    Recovered(WorkerId),
    Draining(WorkerId),
    Closed,
}
