use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use metrics::counter;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use simgrid_core::{
    config::DispatcherConfig,
    models::{
        Complexity, FailureReason, JobHandle, JobId, JobRecord, JobResult, JobSpec, JobState,
        JobStatus, MembershipEvent, Submission, WorkerHealth, WorkerId, WorkerMember, WorkersSet,
    },
    traits::{Cluster, WorkerEndpoint},
};
use simgrid_errors::{SimGridError, SimGridResult};

use crate::report::{BatchReport, BatchStats, JobDelivery};

/// 单个作业的簿记: 分派记录、失败计数与交付标记
struct JobEntry {
    spec: JobSpec,
    records: Vec<JobRecord>,
    failures: u32,
    /// 上一次失败所在的Worker, 重新分配时尽量避开
    avoid: Option<WorkerId>,
    live: Option<u64>,
    delivered: bool,
}

impl JobEntry {
    fn new(spec: JobSpec) -> Self {
        let records = vec![JobRecord::pending(spec.id, 1)];
        Self {
            spec,
            records,
            failures: 0,
            avoid: None,
            live: None,
            delivered: false,
        }
    }

    fn current(&mut self) -> Option<&mut JobRecord> {
        self.records.last_mut()
    }

    fn attempts(&self) -> u32 {
        self.records.iter().filter(|r| r.worker_id.is_some()).count() as u32
    }

    fn last_worker(&self) -> Option<WorkerId> {
        self.records.iter().rev().find_map(|r| r.worker_id.clone())
    }

    /// 当前记录失败后开启下一条记录
    fn open_next(&mut self, state: JobState) {
        let mut record = JobRecord::pending(self.spec.id, self.records.len() as u32 + 1);
        record.transition(state);
        self.records.push(record);
    }
}

/// 批次结束后保留分派记录的作业数上限
pub const HISTORY_CAPACITY: usize = 1024;

/// 进行中的作业, 以及最近结束批次的分派记录
#[derive(Default)]
struct Ledger {
    jobs: HashMap<JobId, JobEntry>,
    archive: HashMap<JobId, Vec<JobRecord>>,
    archived: VecDeque<JobId>,
}

impl Ledger {
    /// 批次结束: 移出作业条目, 只保留有限数量的分派记录
    fn retire(&mut self, job_ids: &[JobId]) {
        for job_id in job_ids {
            let Some(entry) = self.jobs.remove(job_id) else {
                continue;
            };
            if self.archive.insert(*job_id, entry.records).is_some() {
                self.archived.retain(|id| id != job_id);
            }
            self.archived.push_back(*job_id);
        }
        while self.archived.len() > HISTORY_CAPACITY {
            if let Some(oldest) = self.archived.pop_front() {
                self.archive.remove(&oldest);
            }
        }
    }
}

/// 作业分派与结果收集
///
/// 作业簿记位于调度器自己的互斥锁中, 成员变化通过集群的广播通道到达,
/// 两者互不阻塞。每个作业最多一次活跃分派, 失败次数超过 `max_retries`
/// 后以 `JobUnrecoverable` 交付, 任何作业都恰好交付一次。
pub struct Dispatcher {
    cluster: Arc<dyn Cluster>,
    config: DispatcherConfig,
    ledger: Mutex<Ledger>,
}

impl Dispatcher {
    pub fn new(cluster: Arc<dyn Cluster>, config: DispatcherConfig) -> Self {
        Self {
            cluster,
            config,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// 作业最近一次批次的全部分派记录, 按时间顺序
    ///
    /// 结束的批次只保留最近 [`HISTORY_CAPACITY`] 个作业的记录。
    pub async fn history(&self, job_id: &JobId) -> Vec<JobRecord> {
        let ledger = self.ledger.lock().await;
        match ledger.jobs.get(job_id) {
            Some(entry) => entry.records.clone(),
            None => ledger.archive.get(job_id).cloned().unwrap_or_default(),
        }
    }

    /// 仍在簿记中的作业数, 即进行中批次的作业
    pub async fn active_jobs(&self) -> usize {
        self.ledger.lock().await.jobs.len()
    }

    /// 在给定Worker集合上执行一批作业, 直到每个作业都被交付
    ///
    /// `complexity` 用于失败后重新解析集合。批次开始前集群已关闭时返回 `ClusterClosed`;
    /// 批次进行中关闭则所有未交付作业以 `Failed(Cancelled)` 交付。
    /// 作业ID只需在批次内以及与进行中的批次之间唯一, 已交付的作业可以重新提交。
    pub async fn run_batch(
        &self,
        set: WorkersSet,
        complexity: Complexity,
        jobs: Vec<JobSpec>,
    ) -> SimGridResult<BatchReport> {
        if self.cluster.is_closed() {
            return Err(SimGridError::ClusterClosed);
        }
        // 先订阅, 避免错过分派期间的成员变化
        let mut events = self.cluster.subscribe();
        let started_at = Utc::now();
        let order: Vec<JobId> = jobs.iter().map(|job| job.id).collect();
        {
            let mut ledger = self.ledger.lock().await;
            let mut seen = HashSet::new();
            for job in &jobs {
                if !seen.insert(job.id) || ledger.jobs.contains_key(&job.id) {
                    return Err(SimGridError::Internal(format!("重复的作业ID: {}", job.id)));
                }
            }
            for job in jobs {
                ledger.jobs.insert(job.id, JobEntry::new(job));
            }
        }
        info!(
            "开始分派 {} 个作业到 {} 个Worker (需求 {} 单位, 重试上限 {})",
            order.len(),
            set.len(),
            set.demand(),
            self.config.max_retries
        );

        let batch_ids = order.clone();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let mut run = BatchRun::new(self, set, complexity, order, done_tx);

        while run.remaining > 0 {
            run.dispatch_pending().await;
            if run.remaining == 0 {
                break;
            }
            if run.is_stalled() {
                if run.recover_members().await {
                    break;
                }
                continue;
            }

            let backoff = run.any_saturated();
            // 成员事件先于尝试结果处理: 离开的Worker关闭端点前已发布事件
            tokio::select! {
                biased;
                event = events.recv() => {
                    if run.on_membership(event).await {
                        break;
                    }
                }
                Some(done) = done_rx.recv() => run.on_attempt_done(done).await,
                _ = tokio::time::sleep(self.config.rejection_backoff()), if backoff => {
                    run.clear_saturation();
                }
            }
        }

        let report = run.finish(started_at);
        self.ledger.lock().await.retire(&batch_ids);
        info!(
            "批次结束: {} 个完成, {} 个取消, {} 个不可恢复, {} 次重新分配",
            report.stats.completed,
            report.stats.cancelled,
            report.stats.unrecoverable,
            report.stats.reassigned
        );
        Ok(report)
    }
}

struct Slot {
    member: WorkerMember,
    running: usize,
    /// 拒绝过提交, 直到它的某个尝试结束或退避到期
    saturated: bool,
    usable: bool,
}

impl Slot {
    fn new(member: WorkerMember) -> Self {
        Self {
            member,
            running: 0,
            saturated: false,
            usable: true,
        }
    }

    fn limit(&self) -> usize {
        self.member.info().capacity.max_concurrent_jobs.max(1)
    }

    fn is_open(&self) -> bool {
        self.usable && !self.saturated && self.running < self.limit()
    }
}

struct Attempt {
    job_id: JobId,
    worker_id: WorkerId,
    handle: JobHandle,
    endpoint: Arc<dyn WorkerEndpoint>,
}

struct AttemptDone {
    key: u64,
    result: SimGridResult<JobResult>,
}

#[derive(Debug, PartialEq, Eq)]
enum Submitted {
    Dispatched,
    Rejected,
    Failed,
}

/// 一次 `run_batch` 的运行状态, 只由分派循环访问
struct BatchRun<'a> {
    dispatcher: &'a Dispatcher,
    complexity: Complexity,
    order: Vec<JobId>,
    slots: Vec<Slot>,
    cursor: usize,
    pending: VecDeque<JobId>,
    attempts: HashMap<u64, Attempt>,
    next_key: u64,
    deliveries: HashMap<JobId, JobDelivery>,
    remaining: usize,
    stats: BatchStats,
    tasks: JoinSet<()>,
    done_tx: mpsc::UnboundedSender<AttemptDone>,
}

impl<'a> BatchRun<'a> {
    fn new(
        dispatcher: &'a Dispatcher,
        set: WorkersSet,
        complexity: Complexity,
        order: Vec<JobId>,
        done_tx: mpsc::UnboundedSender<AttemptDone>,
    ) -> Self {
        let stats = BatchStats {
            jobs: order.len(),
            ..BatchStats::default()
        };
        Self {
            dispatcher,
            complexity,
            slots: set.members().iter().cloned().map(Slot::new).collect(),
            cursor: 0,
            pending: order.iter().copied().collect(),
            remaining: order.len(),
            order,
            attempts: HashMap::new(),
            next_key: 0,
            deliveries: HashMap::new(),
            stats,
            tasks: JoinSet::new(),
            done_tx,
        }
    }

    fn any_saturated(&self) -> bool {
        self.slots.iter().any(|slot| slot.usable && slot.saturated)
    }

    fn clear_saturation(&mut self) {
        for slot in &mut self.slots {
            slot.saturated = false;
        }
    }

    /// 有作业等待但既没有进行中的尝试也没有可用成员
    fn is_stalled(&self) -> bool {
        !self.pending.is_empty()
            && self.attempts.is_empty()
            && !self.slots.iter().any(|slot| slot.usable)
    }

    fn slot_mut(&mut self, worker_id: &WorkerId) -> Option<&mut Slot> {
        self.slots
            .iter_mut()
            .find(|slot| slot.member.id() == worker_id)
    }

    /// 从游标开始轮询; 失败过的Worker只有在没有其他可用成员时才会被再次选中
    fn pick_slot(&self, avoid: Option<&WorkerId>) -> Option<usize> {
        let n = self.slots.len();
        let mut fallback = None;
        for offset in 0..n {
            let index = (self.cursor + offset) % n;
            let slot = &self.slots[index];
            if !slot.is_open() {
                continue;
            }
            if avoid == Some(slot.member.id()) {
                fallback = Some(index);
                continue;
            }
            return Some(index);
        }
        let others_usable = self
            .slots
            .iter()
            .any(|slot| slot.usable && avoid != Some(slot.member.id()));
        if others_usable {
            None
        } else {
            fallback
        }
    }

    fn merge(&mut self, set: WorkersSet) {
        for member in set.members() {
            match self.slot_mut(member.id()) {
                Some(slot) => {
                    if !slot.usable {
                        slot.member = member.clone();
                        slot.usable = true;
                        slot.saturated = false;
                    }
                }
                None => {
                    debug!("Worker {} 加入当前批次的成员", member.id());
                    self.slots.push(Slot::new(member.clone()));
                }
            }
        }
    }

    async fn dispatch_pending(&mut self) {
        let mut waiting = VecDeque::new();
        while let Some(job_id) = self.pending.pop_front() {
            if !self.slots.iter().any(Slot::is_open) {
                waiting.push_back(job_id);
                break;
            }
            let avoid = {
                let ledger = self.dispatcher.ledger.lock().await;
                match ledger.jobs.get(&job_id) {
                    Some(entry) if !entry.delivered => entry.avoid.clone(),
                    _ => continue,
                }
            };
            match self.pick_slot(avoid.as_ref()) {
                Some(index) => {
                    if self.submit(job_id, index).await == Submitted::Rejected {
                        waiting.push_back(job_id);
                    }
                }
                None => waiting.push_back(job_id),
            }
        }
        waiting.append(&mut self.pending);
        self.pending = waiting;
    }

    async fn submit(&mut self, job_id: JobId, index: usize) -> Submitted {
        let spec = {
            let ledger = self.dispatcher.ledger.lock().await;
            match ledger.jobs.get(&job_id) {
                Some(entry) => entry.spec.clone(),
                None => return Submitted::Failed,
            }
        };
        let member = self.slots[index].member.clone();
        let worker_id = member.id().clone();
        self.cursor = (index + 1) % self.slots.len();

        match member.endpoint().submit(spec).await {
            Ok(Submission::Accepted(handle)) => {
                let key = self.next_key;
                self.next_key += 1;
                // 查询失败或作业已结束时停留在Dispatched, 由结果推进状态
                let running = matches!(
                    member.endpoint().status(&handle).await,
                    Ok(JobStatus::Running)
                );
                let attempt = {
                    let mut ledger = self.dispatcher.ledger.lock().await;
                    match ledger.jobs.get_mut(&job_id) {
                        Some(entry) => {
                            entry.live = Some(key);
                            if let Some(record) = entry.current() {
                                record.dispatch(worker_id.clone());
                                if running {
                                    record.transition(JobState::Running);
                                }
                            }
                            entry.attempts()
                        }
                        None => 0,
                    }
                };
                self.slots[index].running += 1;
                self.stats.dispatched += 1;
                counter!("simgrid_jobs_dispatched_total").increment(1);
                debug!("作业 {} 第 {} 次分派到Worker {}", job_id, attempt, worker_id);

                self.spawn_wait(key, member.endpoint().clone(), handle.clone());
                self.attempts.insert(
                    key,
                    Attempt {
                        job_id,
                        worker_id,
                        handle,
                        endpoint: member.endpoint().clone(),
                    },
                );
                Submitted::Dispatched
            }
            Ok(Submission::Rejected) => {
                debug!("Worker {} 拒绝作业 {}, 作业保持Pending", worker_id, job_id);
                self.slots[index].saturated = true;
                self.stats.rejected += 1;
                Submitted::Rejected
            }
            Err(e) => {
                warn!("向Worker {} 提交作业 {} 失败: {}", worker_id, job_id, e);
                self.slots[index].usable = false;
                {
                    let mut ledger = self.dispatcher.ledger.lock().await;
                    if let Some(record) = ledger.jobs.get_mut(&job_id).and_then(JobEntry::current)
                    {
                        record.dispatch(worker_id.clone());
                    }
                }
                self.fail_attempt(job_id, &worker_id, e.to_string()).await;
                Submitted::Failed
            }
        }
    }

    fn spawn_wait(&mut self, key: u64, endpoint: Arc<dyn WorkerEndpoint>, handle: JobHandle) {
        let done = self.done_tx.clone();
        let limit = self.dispatcher.config.attempt_timeout();
        self.tasks.spawn(async move {
            let waiting = async {
                match limit {
                    Some(limit) => match tokio::time::timeout(limit, endpoint.wait(&handle)).await {
                        Ok(result) => result,
                        Err(_) => {
                            if let Err(e) = endpoint.cancel(&handle).await {
                                debug!("取消超时作业 {} 失败: {}", handle.job_id, e);
                            }
                            Ok(JobResult::Failed(FailureReason::Timeout))
                        }
                    },
                    None => endpoint.wait(&handle).await,
                }
            };
            let result = AssertUnwindSafe(waiting)
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    Err(SimGridError::Internal("等待作业结果时发生panic".to_string()))
                });
            // 批次已结束时接收端不存在
            let _ = done.send(AttemptDone { key, result });
        });
    }

    fn release_slot(&mut self, worker_id: &WorkerId) {
        if let Some(slot) = self.slot_mut(worker_id) {
            slot.running = slot.running.saturating_sub(1);
            slot.saturated = false;
        }
    }

    async fn on_attempt_done(&mut self, done: AttemptDone) {
        let Some(attempt) = self.attempts.remove(&done.key) else {
            debug!("丢弃过期的尝试结果 (尝试 {})", done.key);
            return;
        };
        self.release_slot(&attempt.worker_id);
        let job_id = attempt.job_id;

        match done.result {
            Ok(JobResult::Completed(outcome)) => {
                {
                    let mut ledger = self.dispatcher.ledger.lock().await;
                    if let Some(entry) = ledger.jobs.get_mut(&job_id) {
                        entry.live = None;
                        if let Some(record) = entry.current() {
                            record.transition(JobState::Completed);
                        }
                    }
                }
                debug!(
                    "作业 {} 在Worker {} 上完成: {} 步, 时间 {}",
                    job_id, attempt.worker_id, outcome.steps, outcome.final_time
                );
                self.stats.completed += 1;
                counter!("simgrid_jobs_completed_total").increment(1);
                self.deliver(job_id, Ok(JobResult::Completed(outcome))).await;
            }
            Ok(JobResult::Failed(FailureReason::Rejected)) => {
                // 接受后再拒绝等同于提交被拒绝, 不计入失败
                {
                    let mut ledger = self.dispatcher.ledger.lock().await;
                    if let Some(entry) = ledger.jobs.get_mut(&job_id) {
                        entry.live = None;
                        if let Some(record) = entry.current() {
                            record.fail(FailureReason::Rejected.to_string());
                        }
                        entry.open_next(JobState::Pending);
                    }
                }
                if let Some(slot) = self.slot_mut(&attempt.worker_id) {
                    slot.saturated = true;
                }
                self.stats.rejected += 1;
                self.pending.push_back(job_id);
            }
            Ok(JobResult::Failed(reason)) => {
                self.fail_attempt(job_id, &attempt.worker_id, reason.to_string())
                    .await;
            }
            Err(e) => {
                if matches!(e, SimGridError::WorkerUnreachable { .. }) {
                    if let Some(slot) = self.slot_mut(&attempt.worker_id) {
                        slot.usable = false;
                    }
                }
                self.fail_attempt(job_id, &attempt.worker_id, e.to_string())
                    .await;
            }
        }
    }

    /// 记录失败; 未超过重试上限时重新排队, 否则以不可恢复交付
    async fn fail_attempt(&mut self, job_id: JobId, worker_id: &WorkerId, reason: String) {
        self.stats.failed_attempts += 1;
        counter!("simgrid_job_attempts_failed_total").increment(1);
        let max_retries = self.dispatcher.config.max_retries;

        let exhausted = {
            let mut ledger = self.dispatcher.ledger.lock().await;
            let Some(entry) = ledger.jobs.get_mut(&job_id) else {
                return;
            };
            if entry.delivered {
                return;
            }
            entry.live = None;
            entry.failures += 1;
            if let Some(record) = entry.current() {
                record.fail(reason.clone());
            }
            if entry.failures > max_retries {
                Some(entry.failures)
            } else {
                entry.avoid = Some(worker_id.clone());
                entry.open_next(JobState::Reassigned);
                None
            }
        };

        match exhausted {
            Some(attempts) => {
                error!(
                    "作业 {} 已失败 {} 次, 超过重试上限 {}: {}",
                    job_id, attempts, max_retries, reason
                );
                self.stats.unrecoverable += 1;
                counter!("simgrid_jobs_unrecoverable_total").increment(1);
                self.deliver(
                    job_id,
                    Err(SimGridError::JobUnrecoverable {
                        job_id: job_id.to_string(),
                        attempts,
                        last_failure: reason,
                    }),
                )
                .await;
            }
            None => {
                warn!(
                    "作业 {} 在Worker {} 上失败 ({}), 重新分配",
                    job_id, worker_id, reason
                );
                self.stats.reassigned += 1;
                counter!("simgrid_jobs_reassigned_total").increment(1);
                self.refresh_members().await;
                self.pending.push_back(job_id);
            }
        }
    }

    /// 重新解析集合并合并新成员; 失败时沿用当前集合中仍可用的成员
    async fn refresh_members(&mut self) {
        match self.dispatcher.cluster.resolve(&self.complexity).await {
            Ok(set) => self.merge(set),
            Err(e) => debug!("重新解析Worker集合失败, 沿用当前成员: {}", e),
        }
    }

    /// 没有任何可用成员时的最后手段; 返回 true 表示批次应结束
    async fn recover_members(&mut self) -> bool {
        match self.dispatcher.cluster.resolve(&self.complexity).await {
            Ok(set) => {
                info!("当前成员全部不可用, 重新解析得到 {} 个Worker", set.len());
                self.merge(set);
                false
            }
            Err(SimGridError::ClusterClosed) => {
                self.cancel_all().await;
                true
            }
            Err(e) => {
                error!("没有可用的Worker且无法重新解析集合: {}", e);
                let stranded: Vec<JobId> = self.pending.drain(..).collect();
                for job_id in stranded {
                    let attempts = {
                        let ledger = self.dispatcher.ledger.lock().await;
                        ledger
                            .jobs
                            .get(&job_id)
                            .map(|entry| entry.failures)
                            .unwrap_or_default()
                    };
                    self.stats.unrecoverable += 1;
                    counter!("simgrid_jobs_unrecoverable_total").increment(1);
                    self.deliver(
                        job_id,
                        Err(SimGridError::JobUnrecoverable {
                            job_id: job_id.to_string(),
                            attempts,
                            last_failure: e.to_string(),
                        }),
                    )
                    .await;
                }
                false
            }
        }
    }

    /// 返回 true 表示批次应结束
    async fn on_membership(&mut self, event: Result<MembershipEvent, RecvError>) -> bool {
        match event {
            Ok(MembershipEvent::Left(id)) => {
                self.worker_lost(&id, true, format!("Worker {id} 离开集群"))
                    .await
            }
            Ok(MembershipEvent::Unreachable(id)) => {
                self.worker_lost(&id, false, format!("Worker {id} 不可达"))
                    .await
            }
            Ok(MembershipEvent::Draining(id)) => {
                // 已分派的作业继续执行
                if let Some(slot) = self.slot_mut(&id) {
                    slot.usable = false;
                }
            }
            Ok(MembershipEvent::Recovered(id)) => {
                if let Some(slot) = self.slot_mut(&id) {
                    slot.usable = true;
                }
            }
            Ok(MembershipEvent::Joined(_)) => {}
            Ok(MembershipEvent::Closed) | Err(RecvError::Closed) => {
                self.cancel_all().await;
                return true;
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("成员事件滞后 {} 条, 按集群当前状态重新同步", skipped);
                return self.resync().await;
            }
        }
        false
    }

    async fn resync(&mut self) -> bool {
        if self.dispatcher.cluster.is_closed() {
            self.cancel_all().await;
            return true;
        }
        let workers: HashMap<WorkerId, WorkerHealth> = self
            .dispatcher
            .cluster
            .workers()
            .await
            .into_iter()
            .map(|info| (info.id, info.health))
            .collect();
        let ids: Vec<WorkerId> = self.slots.iter().map(|s| s.member.id().clone()).collect();
        for id in ids {
            match workers.get(&id) {
                None => {
                    self.worker_lost(&id, true, format!("Worker {id} 离开集群"))
                        .await
                }
                Some(WorkerHealth::Unreachable) => {
                    self.worker_lost(&id, false, format!("Worker {id} 不可达"))
                        .await
                }
                Some(health) => {
                    if let Some(slot) = self.slot_mut(&id) {
                        slot.usable = *health == WorkerHealth::Healthy;
                    }
                }
            }
        }
        false
    }

    /// 该Worker上的进行中尝试全部判为失败, 之后到达的结果视为过期
    async fn worker_lost(&mut self, worker_id: &WorkerId, remove: bool, reason: String) {
        let mut lost: Vec<u64> = self
            .attempts
            .iter()
            .filter(|(_, attempt)| &attempt.worker_id == worker_id)
            .map(|(key, _)| *key)
            .collect();
        lost.sort_unstable();

        if let Some(position) = self
            .slots
            .iter()
            .position(|slot| slot.member.id() == worker_id)
        {
            if remove {
                self.slots.remove(position);
                if self.cursor >= self.slots.len() {
                    self.cursor = 0;
                }
            } else {
                let slot = &mut self.slots[position];
                slot.usable = false;
                slot.running = slot.running.saturating_sub(lost.len());
            }
        }
        if lost.is_empty() {
            return;
        }

        warn!("{}, {} 个进行中的作业需要重新分配", reason, lost.len());
        for key in lost {
            if let Some(attempt) = self.attempts.remove(&key) {
                let job_id = attempt.job_id;
                cancel_detached(attempt);
                self.fail_attempt(job_id, worker_id, reason.clone()).await;
            }
        }
    }

    /// 集群关闭: 撤销全部进行中的尝试, 未交付作业各交付一次 `Failed(Cancelled)`
    async fn cancel_all(&mut self) {
        info!("集群已关闭, 撤销 {} 个未交付的作业", self.remaining);
        let attempts: Vec<Attempt> = self.attempts.drain().map(|(_, attempt)| attempt).collect();
        for attempt in attempts {
            cancel_detached(attempt);
        }
        self.pending.clear();

        let order = self.order.clone();
        for job_id in order {
            let undelivered = {
                let mut ledger = self.dispatcher.ledger.lock().await;
                match ledger.jobs.get_mut(&job_id) {
                    Some(entry) if !entry.delivered => {
                        entry.live = None;
                        if let Some(record) = entry.current() {
                            record.fail(FailureReason::Cancelled.to_string());
                        }
                        true
                    }
                    _ => false,
                }
            };
            if undelivered {
                self.stats.cancelled += 1;
                counter!("simgrid_jobs_cancelled_total").increment(1);
                self.deliver(job_id, Ok(JobResult::Failed(FailureReason::Cancelled)))
                    .await;
            }
        }
    }

    async fn deliver(&mut self, job_id: JobId, result: SimGridResult<JobResult>) {
        let (label, attempts, worker) = {
            let mut ledger = self.dispatcher.ledger.lock().await;
            let Some(entry) = ledger.jobs.get_mut(&job_id) else {
                return;
            };
            if entry.delivered {
                debug!("作业 {} 已交付, 丢弃重复结果", job_id);
                return;
            }
            entry.delivered = true;
            (entry.spec.label.clone(), entry.attempts(), entry.last_worker())
        };
        self.remaining = self.remaining.saturating_sub(1);
        self.deliveries.insert(
            job_id,
            JobDelivery {
                job_id,
                label,
                attempts,
                worker,
                result,
            },
        );
    }

    fn finish(mut self, started_at: chrono::DateTime<Utc>) -> BatchReport {
        // 丢弃JoinSet会中止仍在等待的任务
        self.tasks.abort_all();
        let mut deliveries = std::mem::take(&mut self.deliveries);
        let ordered = self
            .order
            .iter()
            .filter_map(|job_id| deliveries.remove(job_id))
            .collect();
        BatchReport {
            deliveries: ordered,
            stats: self.stats,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

fn cancel_detached(attempt: Attempt) {
    tokio::spawn(async move {
        if let Err(e) = attempt.endpoint.cancel(&attempt.handle).await {
            debug!(
                "取消Worker {} 上的作业 {} 失败: {}",
                attempt.worker_id, attempt.job_id, e
            );
        }
    });
}
