use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use simgrid_core::{
    config::ClusterConfig,
    models::{
        Complexity, MembershipEvent, WorkerHealth, WorkerId, WorkerInfo, WorkerMember, WorkersSet,
    },
    traits::{Cluster, WorkerEndpoint, WorkerSelectionStrategy},
};
use simgrid_errors::{SimGridError, SimGridResult};

use crate::health::HealthMonitor;
use crate::strategies::strategy_from_name;

pub(crate) struct MemberEntry {
    pub(crate) info: WorkerInfo,
    pub(crate) endpoint: Arc<dyn WorkerEndpoint>,
}

/// 集群共享状态, 成员变更全部经由这里串行化
pub(crate) struct ClusterState {
    pub(crate) members: RwLock<BTreeMap<WorkerId, MemberEntry>>,
    pub(crate) events: broadcast::Sender<MembershipEvent>,
    pub(crate) closed: AtomicBool,
    pub(crate) config: ClusterConfig,
}

impl ClusterState {
    pub(crate) fn publish(&self, event: MembershipEvent) {
        // 没有订阅者时发送失败, 可以忽略
        let _ = self.events.send(event);
    }

    pub(crate) fn ensure_open(&self) -> SimGridResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SimGridError::ClusterClosed);
        }
        Ok(())
    }

    pub(crate) async fn remove(&self, id: &WorkerId) -> SimGridResult<()> {
        self.ensure_open()?;
        let entry = {
            let mut members = self.members.write().await;
            members
                .remove(id)
                .ok_or_else(|| SimGridError::worker_not_found(id.as_str()))?
        };
        info!("Worker {} 离开集群", id);
        self.publish(MembershipEvent::Left(id.clone()));

        match tokio::time::timeout(self.config.probe_interval(), entry.endpoint.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("关闭Worker {} 连接失败: {}", id, e),
            Err(_) => warn!("关闭Worker {} 连接超时", id),
        }
        Ok(())
    }
}

/// 进程内集群实现
///
/// 成员表由 `RwLock` 保护; 调度器的作业簿记使用独立的锁, 通过广播通道接收成员变化。
pub struct LocalCluster {
    state: Arc<ClusterState>,
    strategy: Arc<dyn WorkerSelectionStrategy>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl LocalCluster {
    pub fn new(config: ClusterConfig) -> SimGridResult<Self> {
        let strategy = strategy_from_name(&config.selection_strategy)?;
        Ok(Self::with_strategy(config, strategy))
    }

    pub fn with_strategy(config: ClusterConfig, strategy: Arc<dyn WorkerSelectionStrategy>) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        Self {
            state: Arc::new(ClusterState {
                members: RwLock::new(BTreeMap::new()),
                events,
                closed: AtomicBool::new(false),
                config,
            }),
            strategy,
            monitor: Mutex::new(None),
        }
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    /// 手动驱动探测的健康监视器
    pub fn health_monitor(&self) -> HealthMonitor {
        HealthMonitor::new(self.state.clone())
    }

    /// 启动后台周期探测, 集群关闭时自动停止
    pub fn start_health_monitor(&self) -> SimGridResult<()> {
        self.state.ensure_open()?;
        let mut monitor = self
            .monitor
            .lock()
            .map_err(|_| SimGridError::Internal("健康监视器锁已损坏".to_string()))?;
        if monitor.is_some() {
            return Ok(());
        }
        *monitor = Some(self.health_monitor().spawn());
        info!(
            "健康探测已启动, 间隔 {}ms, 失败阈值 {}",
            self.state.config.probe_interval_ms, self.state.config.failure_threshold
        );
        Ok(())
    }

    pub async fn worker(&self, id: &WorkerId) -> Option<WorkerInfo> {
        self.state
            .members
            .read()
            .await
            .get(id)
            .map(|entry| entry.info.clone())
    }

    pub async fn len(&self) -> usize {
        self.state.members.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn stop_monitor(&self) {
        if let Ok(mut monitor) = self.monitor.lock() {
            if let Some(handle) = monitor.take() {
                handle.abort();
            }
        }
    }
}

#[async_trait]
impl Cluster for LocalCluster {
    async fn resolve(&self, complexity: &Complexity) -> SimGridResult<WorkersSet> {
        self.state.ensure_open()?;
        let demand = complexity.demand();
        let members = self.state.members.read().await;
        let candidates: Vec<WorkerInfo> = members
            .values()
            .filter(|entry| entry.info.is_selectable())
            .map(|entry| entry.info.clone())
            .collect();
        let available: u64 = candidates.iter().map(|w| w.capacity.units).sum();

        let Some(ids) = self.strategy.select(demand, &candidates) else {
            debug!("容量不足: 需要 {} 单位, 可用 {} 单位", demand, available);
            return Err(SimGridError::InsufficientCapacity {
                required: demand,
                available,
            });
        };

        let selected: Vec<WorkerMember> = ids
            .iter()
            .filter_map(|id| members.get(id))
            .filter(|entry| entry.info.is_selectable())
            .map(|entry| WorkerMember::new(entry.info.clone(), entry.endpoint.clone()))
            .collect();
        let set = WorkersSet::new(selected, demand);
        if set.is_empty() || set.total_capacity() < demand {
            return Err(SimGridError::Internal(format!(
                "选择策略 {} 返回的集合容量 {} 低于需求 {}",
                self.strategy.name(),
                set.total_capacity(),
                demand
            )));
        }
        debug!(
            "解析需求 {} 单位 → {:?} (合计 {} 单位)",
            demand,
            set.ids(),
            set.total_capacity()
        );
        Ok(set)
    }

    async fn join(&self, endpoint: Arc<dyn WorkerEndpoint>) -> SimGridResult<WorkerInfo> {
        self.state.ensure_open()?;
        let id = endpoint.id().clone();
        let capacity = endpoint.capacity().await?;
        let info = WorkerInfo::new(id.clone(), endpoint.address().to_string(), capacity);
        {
            let mut members = self.state.members.write().await;
            // 获取容量期间集群可能已关闭
            self.state.ensure_open()?;
            if members.contains_key(&id) {
                return Err(SimGridError::WorkerAlreadyJoined { id: id.to_string() });
            }
            members.insert(
                id.clone(),
                MemberEntry {
                    info: info.clone(),
                    endpoint,
                },
            );
        }
        info!(
            "Worker {} 加入集群 (容量: {} 单位, 最大并发: {})",
            id, capacity.units, capacity.max_concurrent_jobs
        );
        self.state.publish(MembershipEvent::Joined(id));
        Ok(info)
    }

    async fn leave(&self, id: &WorkerId) -> SimGridResult<()> {
        self.state.remove(id).await
    }

    async fn drain(&self, id: &WorkerId) -> SimGridResult<()> {
        self.state.ensure_open()?;
        {
            let mut members = self.state.members.write().await;
            let entry = members
                .get_mut(id)
                .ok_or_else(|| SimGridError::worker_not_found(id.as_str()))?;
            entry.info.health = WorkerHealth::Draining;
        }
        info!("Worker {} 进入Draining状态", id);
        self.state.publish(MembershipEvent::Draining(id.clone()));
        Ok(())
    }

    async fn workers(&self) -> Vec<WorkerInfo> {
        self.state
            .members
            .read()
            .await
            .values()
            .map(|entry| entry.info.clone())
            .collect()
    }

    fn subscribe(&self) -> broadcast::Receiver<MembershipEvent> {
        self.state.events.subscribe()
    }

    async fn close(&self) -> SimGridResult<()> {
        if self.state.closed.swap(true, Ordering::SeqCst) {
            debug!("集群已经关闭");
            return Ok(());
        }
        self.stop_monitor();
        self.state.publish(MembershipEvent::Closed);

        let entries: Vec<(WorkerId, MemberEntry)> =
            std::mem::take(&mut *self.state.members.write().await)
                .into_iter()
                .collect();
        let count = entries.len();
        let results = join_all(entries.iter().map(|(_, entry)| entry.endpoint.close())).await;
        for ((id, _), result) in entries.iter().zip(results) {
            if let Err(e) = result {
                warn!("关闭Worker {} 失败: {}", id, e);
            }
        }
        info!("集群已关闭, 释放 {} 个Worker", count);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }
}

impl Drop for LocalCluster {
    fn drop(&mut self) {
        self.stop_monitor();
    }
}
