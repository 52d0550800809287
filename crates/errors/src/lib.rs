use thiserror::Error;

#[cfg(test)]
mod tests;

#[derive(Debug, Error)]
pub enum SimGridError {
    #[error("集群容量不足: 需要 {required} 单位, 可用 {available} 单位")]
    InsufficientCapacity { required: u64, available: u64 },
    #[error("Worker不可达: {id} - {reason}")]
    WorkerUnreachable { id: String, reason: String },
    #[error("Worker未找到: {id}")]
    WorkerNotFound { id: String },
    #[error("Worker已存在: {id}")]
    WorkerAlreadyJoined { id: String },
    #[error("作业未找到: {id}")]
    JobNotFound { id: String },
    #[error("作业无法恢复: {job_id} 已尝试 {attempts} 次, 最后失败原因: {last_failure}")]
    JobUnrecoverable {
        job_id: String,
        attempts: u32,
        last_failure: String,
    },
    #[error("环境状态不一致: {0}")]
    InconsistentEnvironment(String),
    #[error("无效的坐标: 期望 {expected} 维, 实际 {actual} 维")]
    InvalidPosition { expected: usize, actual: usize },
    #[error("节点未找到: {id}")]
    NodeNotFound { id: u64 },
    #[error("集群已关闭")]
    ClusterClosed,
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("不支持的快照版本: {found}, 当前支持 {supported}")]
    SnapshotVersion { found: u32, supported: u32 },
    #[error("操作超时: {0}")]
    Timeout(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type SimGridResult<T> = Result<T, SimGridError>;

impl SimGridError {
    pub fn worker_unreachable<S: Into<String>, R: Into<String>>(id: S, reason: R) -> Self {
        Self::WorkerUnreachable {
            id: id.into(),
            reason: reason.into(),
        }
    }
    pub fn worker_not_found<S: Into<String>>(id: S) -> Self {
        Self::WorkerNotFound { id: id.into() }
    }
    pub fn inconsistent<S: Into<String>>(msg: S) -> Self {
        Self::InconsistentEnvironment(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SimGridError::Internal(_)
                | SimGridError::Configuration(_)
                | SimGridError::JobUnrecoverable { .. }
                | SimGridError::ClusterClosed
        )
    }
    /// 瞬时故障，由调度器在重试预算内透明恢复
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SimGridError::WorkerUnreachable { .. }
                | SimGridError::Timeout(_)
                | SimGridError::InconsistentEnvironment(_)
        )
    }
}

impl From<serde_json::Error> for SimGridError {
    fn from(err: serde_json::Error) -> Self {
        SimGridError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for SimGridError {
    fn from(err: anyhow::Error) -> Self {
        SimGridError::Internal(err.to_string())
    }
}
