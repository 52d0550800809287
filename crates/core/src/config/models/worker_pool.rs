use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// 进程内Worker的定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalWorkerConfig {
    pub id: String,
    #[serde(default)]
    pub address: Option<String>,
    pub capacity_units: u64,
    pub max_concurrent_jobs: usize,
}

impl LocalWorkerConfig {
    pub fn address(&self) -> String {
        self.address
            .clone()
            .unwrap_or_else(|| format!("local://{}", self.id))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    pub workers: Vec<LocalWorkerConfig>,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: vec![
                LocalWorkerConfig {
                    id: "local-1".to_string(),
                    address: None,
                    capacity_units: 4,
                    max_concurrent_jobs: 2,
                },
                LocalWorkerConfig {
                    id: "local-2".to_string(),
                    address: None,
                    capacity_units: 2,
                    max_concurrent_jobs: 1,
                },
            ],
        }
    }
}

impl WorkerPoolConfig {
    pub fn total_capacity(&self) -> u64 {
        self.workers.iter().map(|w| w.capacity_units).sum()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workers.is_empty() {
            return Err(anyhow::anyhow!("Worker池不能为空"));
        }

        let mut seen = HashSet::new();
        for worker in &self.workers {
            if worker.id.is_empty() {
                return Err(anyhow::anyhow!("Worker ID不能为空"));
            }
            if !seen.insert(worker.id.as_str()) {
                return Err(anyhow::anyhow!("Worker ID重复: {}", worker.id));
            }
            if worker.capacity_units == 0 {
                return Err(anyhow::anyhow!("Worker {} 的容量必须大于0", worker.id));
            }
            if worker.max_concurrent_jobs == 0 {
                return Err(anyhow::anyhow!("Worker {} 的最大并发作业数必须大于0", worker.id));
            }
        }

        Ok(())
    }
}
