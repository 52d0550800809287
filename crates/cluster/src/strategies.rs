use std::cmp::Ordering;
use std::sync::Arc;

use tracing::debug;

use simgrid_core::{
    models::{WorkerId, WorkerInfo},
    traits::WorkerSelectionStrategy,
};
use simgrid_errors::{SimGridError, SimGridResult};

/// 容量降序, 负载升序, ID升序
fn by_capacity_desc(a: &&WorkerInfo, b: &&WorkerInfo) -> Ordering {
    b.capacity
        .units
        .cmp(&a.capacity.units)
        .then(a.current_load.cmp(&b.current_load))
        .then_with(|| a.id.cmp(&b.id))
}

fn selectable(candidates: &[WorkerInfo]) -> Vec<&WorkerInfo> {
    candidates.iter().filter(|w| w.is_selectable()).collect()
}

/// 按容量降序贪心累加, 直到满足需求
pub struct GreedyDescendingStrategy;

/// 优先选择单个能覆盖需求的最小Worker, 否则退化为贪心
pub struct BestFitStrategy;

impl GreedyDescendingStrategy {
    pub fn new() -> Self {
        Self
    }

    fn greedy(demand: u64, mut workers: Vec<&WorkerInfo>) -> Option<Vec<WorkerId>> {
        workers.sort_by(by_capacity_desc);
        let mut selected = Vec::new();
        let mut total = 0u64;
        for worker in workers {
            selected.push(worker.id.clone());
            total = total.saturating_add(worker.capacity.units);
            if total >= demand {
                return Some(selected);
            }
        }
        None
    }
}

impl Default for GreedyDescendingStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerSelectionStrategy for GreedyDescendingStrategy {
    fn select(&self, demand: u64, candidates: &[WorkerInfo]) -> Option<Vec<WorkerId>> {
        let workers = selectable(candidates);
        if workers.is_empty() {
            debug!("没有可用的Worker节点");
            return None;
        }
        let selected = Self::greedy(demand, workers);
        if let Some(ids) = &selected {
            debug!("贪心策略选择 {} 个Worker满足 {} 单位需求", ids.len(), demand);
        }
        selected
    }

    fn name(&self) -> &str {
        "greedy_descending"
    }
}

impl BestFitStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BestFitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerSelectionStrategy for BestFitStrategy {
    fn select(&self, demand: u64, candidates: &[WorkerInfo]) -> Option<Vec<WorkerId>> {
        let workers = selectable(candidates);
        if workers.is_empty() {
            debug!("没有可用的Worker节点");
            return None;
        }
        let single = workers
            .iter()
            .filter(|w| w.capacity.units >= demand)
            .min_by(|a, b| {
                a.capacity
                    .units
                    .cmp(&b.capacity.units)
                    .then(a.current_load.cmp(&b.current_load))
                    .then_with(|| a.id.cmp(&b.id))
            });
        if let Some(worker) = single {
            debug!(
                "最佳适配策略选择Worker: {} (容量: {}, 需求: {})",
                worker.id, worker.capacity.units, demand
            );
            return Some(vec![worker.id.clone()]);
        }
        GreedyDescendingStrategy::greedy(demand, workers)
    }

    fn name(&self) -> &str {
        "best_fit"
    }
}

/// 根据配置名称创建选择策略
pub fn strategy_from_name(name: &str) -> SimGridResult<Arc<dyn WorkerSelectionStrategy>> {
    match name {
        "greedy_descending" => Ok(Arc::new(GreedyDescendingStrategy::new())),
        "best_fit" => Ok(Arc::new(BestFitStrategy::new())),
        other => Err(SimGridError::config_error(format!("未知的选择策略: {other}"))),
    }
}
