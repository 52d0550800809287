use crate::models::{BatchProfile, Complexity, WorkerId, WorkerInfo};

/// Worker集合选择策略
pub trait WorkerSelectionStrategy: Send + Sync {
    /// 从候选中选出合计容量不低于 `demand` 的Worker, 无法满足时返回 `None`
    fn select(&self, demand: u64, candidates: &[WorkerInfo]) -> Option<Vec<WorkerId>>;

    /// 获取策略名称
    fn name(&self) -> &str;
}

/// 复杂度估算, 必须是纯函数且在节点数与批量上单调
pub trait ComplexityEstimator: Send + Sync {
    fn estimate(&self, profile: &BatchProfile) -> Complexity;
}
