use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use simgrid_core::models::{JobId, JobResult, WorkerId};
use simgrid_engine::TerminationReason;
use simgrid_errors::SimGridResult;

/// 交付给调用方的作业终态, 每个作业恰好一次
#[derive(Debug)]
pub struct JobDelivery {
    pub job_id: JobId,
    pub label: String,
    /// 实际分派的次数, 被拒绝的提交不计入
    pub attempts: u32,
    /// 最后一次分派所在的Worker
    pub worker: Option<WorkerId>,
    pub result: SimGridResult<JobResult>,
}

impl JobDelivery {
    pub fn is_completed(&self) -> bool {
        matches!(&self.result, Ok(result) if result.is_completed())
    }

    pub fn status(&self) -> DeliveryStatus {
        match &self.result {
            Ok(JobResult::Completed(_)) => DeliveryStatus::Completed,
            Ok(JobResult::Failed(_)) => DeliveryStatus::Failed,
            Err(_) => DeliveryStatus::Unrecoverable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "UNRECOVERABLE")]
    Unrecoverable,
}

/// 一个批次内的计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub jobs: usize,
    pub dispatched: usize,
    pub rejected: usize,
    pub failed_attempts: usize,
    pub reassigned: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub unrecoverable: usize,
}

#[derive(Debug)]
pub struct BatchReport {
    /// 与提交顺序一致
    pub deliveries: Vec<JobDelivery>,
    pub stats: BatchStats,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchReport {
    pub fn delivery(&self, job_id: &JobId) -> Option<&JobDelivery> {
        self.deliveries.iter().find(|d| &d.job_id == job_id)
    }

    pub fn all_completed(&self) -> bool {
        self.deliveries.iter().all(JobDelivery::is_completed)
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            started_at: self.started_at,
            finished_at: self.finished_at,
            elapsed_ms: (self.finished_at - self.started_at).num_milliseconds(),
            stats: self.stats,
            jobs: self.deliveries.iter().map(JobSummary::from).collect(),
        }
    }
}

/// 可序列化的批次摘要, 供命令行输出
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: i64,
    pub stats: BatchStats,
    pub jobs: Vec<JobSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: JobId,
    pub label: String,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub worker: Option<WorkerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination: Option<TerminationReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub molecule_totals: BTreeMap<String, f64>,
}

impl From<&JobDelivery> for JobSummary {
    fn from(delivery: &JobDelivery) -> Self {
        let mut summary = JobSummary {
            job_id: delivery.job_id,
            label: delivery.label.clone(),
            status: delivery.status(),
            attempts: delivery.attempts,
            worker: delivery.worker.clone(),
            detail: None,
            termination: None,
            final_time: None,
            steps: None,
            molecule_totals: BTreeMap::new(),
        };
        match &delivery.result {
            Ok(JobResult::Completed(outcome)) => {
                summary.termination = Some(outcome.reason);
                summary.final_time = Some(outcome.final_time);
                summary.steps = Some(outcome.steps);
                summary.molecule_totals = outcome
                    .molecule_totals
                    .iter()
                    .map(|(molecule, total)| (molecule.to_string(), *total))
                    .collect();
            }
            Ok(JobResult::Failed(reason)) => summary.detail = Some(reason.to_string()),
            Err(e) => summary.detail = Some(e.to_string()),
        }
        summary
    }
}
