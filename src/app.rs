use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use simgrid_cluster::{with_cluster, LocalCluster};
use simgrid_core::{
    config::AppConfig,
    models::{BatchProfile, JobSpec},
    traits::{Cluster, ComplexityEstimator, WorkerEndpoint},
    DefaultComplexityEstimator,
};
use simgrid_dispatcher::{BatchReport, Dispatcher};
use simgrid_worker::LocalWorker;

/// 主应用程序: 本地Worker池 + 集群 + Dispatcher
pub struct Application {
    config: AppConfig,
    cluster: Arc<LocalCluster>,
    workers: Vec<Arc<LocalWorker>>,
}

impl Application {
    /// 创建集群并加入配置中的全部本地Worker
    pub async fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;
        info!(
            "初始化应用程序, {} 个本地Worker, 选择策略 {}",
            config.worker_pool.workers.len(),
            config.cluster.selection_strategy
        );

        let cluster = Arc::new(LocalCluster::new(config.cluster.clone()).context("创建集群失败")?);
        let workers = LocalWorker::pool(&config.worker_pool);
        for worker in &workers {
            let endpoint: Arc<dyn WorkerEndpoint> = worker.clone();
            cluster
                .join(endpoint)
                .await
                .with_context(|| format!("Worker {} 加入集群失败", worker.id()))?;
        }
        cluster.start_health_monitor().context("启动健康检查失败")?;

        Ok(Self {
            config,
            cluster,
            workers,
        })
    }

    pub fn cluster(&self) -> Arc<LocalCluster> {
        self.cluster.clone()
    }

    pub fn workers(&self) -> &[Arc<LocalWorker>] {
        &self.workers
    }

    /// 运行一个批次, 结束后集群总会被关闭
    ///
    /// 收到关闭信号时关闭集群, 尚未交付的作业以"已取消"交付。
    pub async fn run_batch(
        &self,
        jobs: Vec<JobSpec>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<BatchReport> {
        let estimator = DefaultComplexityEstimator::from_config(&self.config.estimator);
        let complexity = estimator.estimate(&BatchProfile::from_jobs(&jobs));
        info!(
            "批次包含 {} 个作业, 需求 {} 个容量单位",
            jobs.len(),
            complexity.demand()
        );

        let watcher_cluster = self.cluster.clone();
        let watcher = tokio::spawn(async move {
            if shutdown_rx.recv().await.is_ok() {
                warn!("收到关闭信号, 关闭集群");
                if let Err(e) = watcher_cluster.close().await {
                    error!("关闭集群失败: {}", e);
                }
            }
        });

        let dispatcher_config = self.config.dispatcher.clone();
        let result = with_cluster(self.cluster.clone(), move |cluster| async move {
            let set = cluster.resolve(&complexity).await?;
            let cluster: Arc<dyn Cluster> = cluster;
            let dispatcher = Dispatcher::new(cluster, dispatcher_config);
            dispatcher.run_batch(set, complexity, jobs).await
        })
        .await;
        watcher.abort();

        let report = result.context("执行批次失败")?;
        info!(
            "批次结束: 完成 {}, 取消 {}, 不可恢复 {}, 耗时 {} ms",
            report.stats.completed,
            report.stats.cancelled,
            report.stats.unrecoverable,
            (report.finished_at - report.started_at).num_milliseconds()
        );
        Ok(report)
    }
}
