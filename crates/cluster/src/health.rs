use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use simgrid_core::models::{MembershipEvent, WorkerId};
use simgrid_errors::SimGridError;

use crate::local_cluster::ClusterState;

/// 一轮探测的结果汇总
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeSummary {
    pub probed: usize,
    pub became_unreachable: Vec<WorkerId>,
    pub recovered: Vec<WorkerId>,
    pub evicted: Vec<WorkerId>,
}

/// 周期性探测每个成员
///
/// 连续 `failure_threshold` 次失败后 Healthy → Unreachable; 之后任意一次成功探测恢复为Healthy;
/// 不可达时间超过 `eviction_timeout` 的Worker被自动移出集群。
pub struct HealthMonitor {
    state: Arc<ClusterState>,
}

impl HealthMonitor {
    pub(crate) fn new(state: Arc<ClusterState>) -> Self {
        Self { state }
    }

    pub async fn probe_round(&self) -> ProbeSummary {
        self.probe_round_at(Utc::now()).await
    }

    /// 以给定时间执行一轮探测, 便于测试驱逐逻辑
    pub async fn probe_round_at(&self, now: DateTime<Utc>) -> ProbeSummary {
        let mut summary = ProbeSummary::default();
        if self.state.closed.load(Ordering::SeqCst) {
            return summary;
        }

        let targets: Vec<_> = {
            let members = self.state.members.read().await;
            members
                .iter()
                .map(|(id, entry)| (id.clone(), entry.endpoint.clone()))
                .collect()
        };
        let timeout = self.state.config.probe_interval();
        let results = join_all(targets.iter().map(|(id, endpoint)| async move {
            match tokio::time::timeout(timeout, endpoint.probe()).await {
                Ok(result) => result,
                Err(_) => Err(SimGridError::worker_unreachable(id.as_str(), "探测超时")),
            }
        }))
        .await;
        summary.probed = targets.len();

        let threshold = self.state.config.failure_threshold;
        let eviction_timeout = self.state.config.eviction_timeout();
        let mut to_evict = Vec::new();
        {
            let mut members = self.state.members.write().await;
            for ((id, _), result) in targets.iter().zip(results) {
                // 探测期间已离开
                let Some(entry) = members.get_mut(id) else {
                    continue;
                };
                match result {
                    Ok(load) => {
                        if entry.info.record_probe_success(load, now) {
                            info!("Worker {} 恢复为Healthy", id);
                            summary.recovered.push(id.clone());
                        }
                    }
                    Err(e) => {
                        debug!("探测Worker {} 失败: {}", id, e);
                        if entry.info.record_probe_failure(threshold, now) {
                            warn!(
                                "Worker {} 连续 {} 次探测失败, 标记为Unreachable",
                                id, entry.info.consecutive_failures
                            );
                            summary.became_unreachable.push(id.clone());
                        }
                    }
                }
                if entry.info.is_eviction_due(eviction_timeout, now) {
                    to_evict.push(id.clone());
                }
            }
        }

        for id in &summary.became_unreachable {
            self.state.publish(MembershipEvent::Unreachable(id.clone()));
        }
        for id in &summary.recovered {
            self.state.publish(MembershipEvent::Recovered(id.clone()));
        }
        for id in to_evict {
            info!("Worker {} 不可达超过驱逐超时, 自动移出集群", id);
            match self.state.remove(&id).await {
                Ok(()) => summary.evicted.push(id),
                Err(e) => error!("驱逐Worker {} 失败: {}", id, e),
            }
        }

        summary
    }

    pub(crate) fn spawn(self) -> JoinHandle<()> {
        let interval = self.state.config.probe_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if self.state.closed.load(Ordering::SeqCst) {
                    info!("集群已关闭, 退出健康探测循环");
                    break;
                }
                let summary = self.probe_round().await;
                if !summary.became_unreachable.is_empty() || !summary.evicted.is_empty() {
                    info!(
                        "探测 {} 个Worker: {} 个不可达, {} 个被驱逐",
                        summary.probed,
                        summary.became_unreachable.len(),
                        summary.evicted.len()
                    );
                }
            }
        })
    }
}
