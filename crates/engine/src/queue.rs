use std::collections::BTreeSet;

use crate::time::SimTime;

/// 待触发反应的优先结构
///
/// 以 `(触发时间, 反应序号)` 排序: 时间升序, 同一时间按插入序号打破平局,
/// 保证相同输入下出队顺序可复现。每个反应至多有一个有效条目。
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    ordered: BTreeSet<(SimTime, usize)>,
    keys: Vec<Option<SimTime>>,
}

impl EventQueue {
    pub fn new(reactions: usize) -> Self {
        Self {
            ordered: BTreeSet::new(),
            keys: vec![None; reactions],
        }
    }

    pub fn from_schedule(schedule: Vec<Option<SimTime>>) -> Self {
        let ordered = schedule
            .iter()
            .enumerate()
            .filter_map(|(index, time)| time.map(|t| (t, index)))
            .collect();
        Self {
            ordered,
            keys: schedule,
        }
    }

    /// 更新反应的触发时间, `None` 表示移出队列
    pub fn schedule(&mut self, index: usize, time: Option<SimTime>) {
        if let Some(previous) = self.keys[index].take() {
            self.ordered.remove(&(previous, index));
        }
        if let Some(time) = time {
            self.ordered.insert((time, index));
            self.keys[index] = Some(time);
        }
    }

    pub fn peek(&self) -> Option<(SimTime, usize)> {
        self.ordered.first().copied()
    }

    pub fn pop_min(&mut self) -> Option<(SimTime, usize)> {
        let entry = self.ordered.pop_first()?;
        self.keys[entry.1] = None;
        Some(entry)
    }

    pub fn scheduled_time(&self, index: usize) -> Option<SimTime> {
        self.keys.get(index).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn to_schedule(&self) -> Vec<Option<SimTime>> {
        self.keys.clone()
    }
}
