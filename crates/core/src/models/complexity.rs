use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::job::JobSpec;

/// 一个容量单位可承载的 节点数 × 反应数
pub const WORK_PER_UNIT: u64 = 10_000;

/// 内存占用等级
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MemoryClass {
    #[default]
    Small,
    Medium,
    Large,
}

impl MemoryClass {
    pub fn factor(self) -> u64 {
        match self {
            MemoryClass::Small => 1,
            MemoryClass::Medium => 2,
            MemoryClass::Large => 4,
        }
    }
}

/// 一批仿真的资源需求描述
///
/// 按分量比较的偏序: 只有每个分量都不大于对方时才算 `<=`。
/// [`Complexity::demand`] 在每个分量上单调, 因此 `c1 <= c2` 时满足 `c2` 的容量也满足 `c1`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Complexity {
    pub batch_size: u64,
    pub node_count: u64,
    pub reactions_per_node: u64,
    pub memory_class: MemoryClass,
}

impl Complexity {
    pub fn new(
        batch_size: u64,
        node_count: u64,
        reactions_per_node: u64,
        memory_class: MemoryClass,
    ) -> Self {
        Self {
            batch_size,
            node_count,
            reactions_per_node,
            memory_class,
        }
    }

    /// 所需容量单位
    pub fn demand(&self) -> u64 {
        let work = self.node_count.saturating_mul(self.reactions_per_node);
        let per_instance = work.div_ceil(WORK_PER_UNIT).max(1);
        self.batch_size
            .saturating_mul(per_instance)
            .saturating_mul(self.memory_class.factor())
    }

    pub fn is_satisfied_by(&self, capacity_units: u64) -> bool {
        capacity_units >= self.demand()
    }
}

impl PartialOrd for Complexity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        let parts = [
            self.batch_size.cmp(&other.batch_size),
            self.node_count.cmp(&other.node_count),
            self.reactions_per_node.cmp(&other.reactions_per_node),
            self.memory_class.cmp(&other.memory_class),
        ];
        let any_less = parts.contains(&Ordering::Less);
        let any_greater = parts.contains(&Ordering::Greater);
        match (any_less, any_greater) {
            (false, false) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Less),
            (false, true) => Some(Ordering::Greater),
            (true, true) => None,
        }
    }
}

/// 复杂度估算器的输入
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProfile {
    pub batch_size: u64,
    pub node_count: u64,
    pub reactions_per_node: u64,
}

impl BatchProfile {
    /// 以批次中最大的仿真为准
    pub fn from_jobs(jobs: &[JobSpec]) -> Self {
        Self {
            batch_size: jobs.len() as u64,
            node_count: jobs
                .iter()
                .map(|job| job.simulation.node_count())
                .max()
                .unwrap_or(0),
            reactions_per_node: jobs
                .iter()
                .map(|job| job.simulation.reactions_per_node())
                .max()
                .unwrap_or(0),
        }
    }
}
