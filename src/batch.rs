use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use simgrid_core::models::JobSpec;

/// 批次文件: `{"jobs": [...]}` 或直接是作业数组
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum BatchFile {
    Wrapped { jobs: Vec<JobSpec> },
    Bare(Vec<JobSpec>),
}

/// 解析批次JSON
///
/// 缺失的标签以 `job-<序号>` 补齐; 批次内作业ID重复视为错误。
pub fn parse_batch(json: &str) -> Result<Vec<JobSpec>> {
    let file: BatchFile = serde_json::from_str(json).context("解析批次JSON失败")?;
    let mut jobs = match file {
        BatchFile::Wrapped { jobs } | BatchFile::Bare(jobs) => jobs,
    };
    if jobs.is_empty() {
        return Err(anyhow::anyhow!("批次中没有作业"));
    }

    let mut seen = HashSet::new();
    for (index, job) in jobs.iter_mut().enumerate() {
        if job.label.is_empty() {
            job.label = format!("job-{index}");
        }
        if !seen.insert(job.id) {
            return Err(anyhow::anyhow!("批次中作业ID重复: {}", job.id));
        }
    }
    debug!("解析到 {} 个作业", jobs.len());
    Ok(jobs)
}

pub fn load_batch<P: AsRef<Path>>(path: P) -> Result<Vec<JobSpec>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("读取批次文件失败: {}", path.display()))?;
    parse_batch(&content).with_context(|| format!("批次文件无效: {}", path.display()))
}
