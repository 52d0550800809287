use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use simgrid_core::{
    config::{LocalWorkerConfig, WorkerPoolConfig},
    models::{
        FailureReason, JobHandle, JobResult, JobSpec, JobStatus, Submission, WorkerCapacity,
        WorkerId,
    },
    traits::WorkerEndpoint,
};
use simgrid_engine::CancelFlag;
use simgrid_errors::{SimGridError, SimGridResult};

use crate::execution::execute_job;

/// 结束的作业默认保留的数量, 超出后最早结束的先被移除
pub const FINISHED_JOB_RETENTION: usize = 256;

struct LocalJob {
    handle: JobHandle,
    cancel: CancelFlag,
    status: JobStatus,
    result: watch::Receiver<Option<JobResult>>,
}

/// 运行中的作业加上最近结束的作业; 更早结束的句柄查询时返回 `JobNotFound`
#[derive(Default)]
struct JobTable {
    jobs: HashMap<Uuid, LocalJob>,
    finished: VecDeque<Uuid>,
}

impl JobTable {
    fn finish(&mut self, token: Uuid, status: JobStatus, retention: usize) {
        if let Some(entry) = self.jobs.get_mut(&token) {
            entry.status = status;
            self.finished.push_back(token);
        }
        while self.finished.len() > retention {
            if let Some(oldest) = self.finished.pop_front() {
                self.jobs.remove(&oldest);
            }
        }
    }
}

#[derive(Default)]
struct WorkerState {
    table: RwLock<JobTable>,
    running: AtomicUsize,
    closed: AtomicBool,
}

/// 进程内Worker, 每个作业在独立的阻塞线程上运行一个引擎实例
///
/// 运行中的作业数达到 `max_concurrent_jobs` 时拒绝新的提交。
pub struct LocalWorker {
    id: WorkerId,
    address: String,
    capacity: WorkerCapacity,
    retention: usize,
    state: Arc<WorkerState>,
}

impl LocalWorker {
    pub fn new<S: Into<String>>(id: S, capacity: WorkerCapacity) -> Self {
        let id = WorkerId::new(id);
        let address = format!("local://{id}");
        Self {
            id,
            address,
            capacity,
            retention: FINISHED_JOB_RETENTION,
            state: Arc::new(WorkerState::default()),
        }
    }

    /// 结束后仍可查询状态的作业数
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_address<S: Into<String>>(mut self, address: S) -> Self {
        self.address = address.into();
        self
    }

    pub fn from_config(config: &LocalWorkerConfig) -> Self {
        Self::new(
            config.id.clone(),
            WorkerCapacity::new(config.capacity_units, config.max_concurrent_jobs),
        )
        .with_address(config.address())
    }

    /// 按配置创建整个本地Worker池
    pub fn pool(config: &WorkerPoolConfig) -> Vec<Arc<LocalWorker>> {
        config
            .workers
            .iter()
            .map(|worker| Arc::new(Self::from_config(worker)))
            .collect()
    }

    pub fn running(&self) -> usize {
        self.state.running.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// 表中保留的作业数, 包括运行中的和最近结束的
    pub async fn tracked_jobs(&self) -> usize {
        self.state.table.read().await.jobs.len()
    }

    /// 占用一个槽位; 已满时返回 false
    fn try_reserve_slot(&self) -> bool {
        let limit = self.capacity.max_concurrent_jobs;
        self.state
            .running
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |running| {
                (running < limit).then_some(running + 1)
            })
            .is_ok()
    }

    fn job_not_found(handle: &JobHandle) -> SimGridError {
        SimGridError::JobNotFound {
            id: handle.job_id.to_string(),
        }
    }
}

#[async_trait]
impl WorkerEndpoint for LocalWorker {
    fn id(&self) -> &WorkerId {
        &self.id
    }

    fn address(&self) -> &str {
        &self.address
    }

    async fn capacity(&self) -> SimGridResult<WorkerCapacity> {
        Ok(self.capacity)
    }

    async fn probe(&self) -> SimGridResult<usize> {
        if self.is_closed() {
            return Err(SimGridError::worker_unreachable(
                self.id.as_str(),
                "Worker已关闭",
            ));
        }
        Ok(self.running())
    }

    async fn submit(&self, job: JobSpec) -> SimGridResult<Submission> {
        if self.is_closed() {
            return Err(SimGridError::worker_unreachable(
                self.id.as_str(),
                "Worker已关闭",
            ));
        }
        if !self.try_reserve_slot() {
            debug!(
                "Worker {} 已达到并发上限 {}, 拒绝作业 {}",
                self.id, self.capacity.max_concurrent_jobs, job.id
            );
            return Ok(Submission::Rejected);
        }

        let handle = JobHandle::new(job.id, self.id.clone());
        let cancel = CancelFlag::new();
        let (result_tx, result_rx) = watch::channel(None);
        {
            let mut table = self.state.table.write().await;
            // close() 先置位再遍历表, 持锁复查保证作业不会漏掉取消
            if self.is_closed() {
                self.state.running.fetch_sub(1, Ordering::SeqCst);
                return Err(SimGridError::worker_unreachable(
                    self.id.as_str(),
                    "Worker已关闭",
                ));
            }
            table.jobs.insert(
                handle.token,
                LocalJob {
                    handle: handle.clone(),
                    cancel: cancel.clone(),
                    status: JobStatus::Running,
                    result: result_rx,
                },
            );
        }
        info!(
            "Worker {} 开始执行作业 {} ({}), 种子 {}",
            self.id, job.id, job.label, job.seed
        );

        let state = self.state.clone();
        let retention = self.retention;
        let token = handle.token;
        let worker_id = self.id.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let job_id = job.id;
            let result =
                match tokio::task::spawn_blocking(move || execute_job(&job, cancel, started)).await
                {
                    Ok(result) => result,
                    Err(e) => {
                        error!("Worker {} 上的作业 {} 执行线程异常: {}", worker_id, job_id, e);
                        JobResult::Failed(FailureReason::Crashed(format!("执行线程异常: {e}")))
                    }
                };

            let status = if result.is_completed() {
                JobStatus::Completed
            } else {
                JobStatus::Failed
            };
            state.table.write().await.finish(token, status, retention);
            state.running.fetch_sub(1, Ordering::SeqCst);
            // 没有等待者时发送失败, 结果仍保存在通道中
            let _ = result_tx.send(Some(result));
        });

        Ok(Submission::Accepted(handle))
    }

    async fn status(&self, handle: &JobHandle) -> SimGridResult<JobStatus> {
        self.state
            .table
            .read()
            .await
            .jobs
            .get(&handle.token)
            .map(|job| job.status)
            .ok_or_else(|| Self::job_not_found(handle))
    }

    async fn wait(&self, handle: &JobHandle) -> SimGridResult<JobResult> {
        let mut receiver = self
            .state
            .table
            .read()
            .await
            .jobs
            .get(&handle.token)
            .map(|job| job.result.clone())
            .ok_or_else(|| Self::job_not_found(handle))?;

        let result = receiver
            .wait_for(Option::is_some)
            .await
            .map_err(|_| SimGridError::Internal(format!("作业 {} 的结果通道已关闭", handle.job_id)))?;
        result
            .clone()
            .ok_or_else(|| SimGridError::Internal(format!("作业 {} 没有结果", handle.job_id)))
    }

    async fn cancel(&self, handle: &JobHandle) -> SimGridResult<()> {
        match self.state.table.read().await.jobs.get(&handle.token) {
            Some(job) => {
                if !job.cancel.is_cancelled() {
                    debug!("Worker {} 取消作业 {}", self.id, job.handle.job_id);
                    job.cancel.cancel();
                }
            }
            None => warn!("Worker {} 上没有作业 {}, 忽略取消", self.id, handle.job_id),
        }
        Ok(())
    }

    async fn close(&self) -> SimGridResult<()> {
        if self.state.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let table = self.state.table.read().await;
        let mut cancelled = 0;
        for job in table.jobs.values() {
            if job.status == JobStatus::Running && !job.cancel.is_cancelled() {
                job.cancel.cancel();
                cancelled += 1;
            }
        }
        info!("Worker {} 已关闭, 取消 {} 个运行中的作业", self.id, cancelled);
        Ok(())
    }
}
