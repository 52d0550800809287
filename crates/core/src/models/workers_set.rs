use std::fmt;
use std::sync::Arc;

use crate::traits::WorkerEndpoint;

use super::worker::{WorkerId, WorkerInfo};

/// 选中成员: 解析时刻的信息快照加上调用端点
#[derive(Clone)]
pub struct WorkerMember {
    info: WorkerInfo,
    endpoint: Arc<dyn WorkerEndpoint>,
}

impl WorkerMember {
    pub fn new(info: WorkerInfo, endpoint: Arc<dyn WorkerEndpoint>) -> Self {
        Self { info, endpoint }
    }

    pub fn id(&self) -> &WorkerId {
        &self.info.id
    }

    pub fn info(&self) -> &WorkerInfo {
        &self.info
    }

    pub fn endpoint(&self) -> &Arc<dyn WorkerEndpoint> {
        &self.endpoint
    }
}

impl fmt::Debug for WorkerMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerMember")
            .field("id", &self.info.id)
            .field("capacity", &self.info.capacity)
            .finish()
    }
}

/// `resolve` 返回的不可变快照
///
/// 之后的成员变化不会修改已返回的集合; 成员过期由调度器在分派时处理。
#[derive(Debug, Clone)]
pub struct WorkersSet {
    members: Vec<WorkerMember>,
    demand: u64,
}

impl WorkersSet {
    pub fn new(members: Vec<WorkerMember>, demand: u64) -> Self {
        Self { members, demand }
    }

    pub fn members(&self) -> &[WorkerMember] {
        &self.members
    }

    pub fn ids(&self) -> Vec<WorkerId> {
        self.members.iter().map(|m| m.id().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// 解析时请求的容量单位
    pub fn demand(&self) -> u64 {
        self.demand
    }

    pub fn total_capacity(&self) -> u64 {
        self.members.iter().map(|m| m.info.capacity.units).sum()
    }

    pub fn contains(&self, id: &WorkerId) -> bool {
        self.members.iter().any(|m| m.id() == id)
    }
}
