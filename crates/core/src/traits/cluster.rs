use std::sync::Arc;

use async_trait::async_trait;
use simgrid_errors::SimGridResult;
use tokio::sync::broadcast;

use crate::models::{Complexity, MembershipEvent, WorkerId, WorkerInfo, WorkersSet};
use crate::traits::WorkerEndpoint;

/// 集群成员管理与容量查询
#[async_trait]
pub trait Cluster: Send + Sync {
    /// 选出合计容量不低于需求的Healthy Worker集合, 失败时不修改成员状态
    async fn resolve(&self, complexity: &Complexity) -> SimGridResult<WorkersSet>;

    async fn join(&self, endpoint: Arc<dyn WorkerEndpoint>) -> SimGridResult<WorkerInfo>;

    /// 移除Worker; 调度器会收到 [`MembershipEvent::Left`] 并重新分派其作业
    async fn leave(&self, id: &WorkerId) -> SimGridResult<()>;

    /// 标记为Draining, 不再参与选择
    async fn drain(&self, id: &WorkerId) -> SimGridResult<()>;

    async fn workers(&self) -> Vec<WorkerInfo>;

    fn subscribe(&self) -> broadcast::Receiver<MembershipEvent>;

    /// 幂等关闭: 停止探测、撤销所有未完成作业并关闭全部Worker
    async fn close(&self) -> SimGridResult<()>;

    fn is_closed(&self) -> bool;
}
