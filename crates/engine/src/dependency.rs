use std::collections::{BTreeMap, BTreeSet};

use crate::environment::Environment;
use crate::reaction::{ChangeSet, Reaction, StateKey};

/// 显式依赖图: 状态键 → 读取它的反应序号
///
/// 读集合随邻域变化而变化, 通过 [`DependencyGraph::refresh`] 增量更新,
/// 从不整体重建。
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    readers: BTreeMap<StateKey, BTreeSet<usize>>,
    reads: Vec<BTreeSet<StateKey>>,
}

impl DependencyGraph {
    pub fn build(reactions: &[Box<dyn Reaction>], environment: &Environment) -> Self {
        let mut graph = Self {
            readers: BTreeMap::new(),
            reads: vec![BTreeSet::new(); reactions.len()],
        };
        for (index, reaction) in reactions.iter().enumerate() {
            graph.refresh(index, reaction.reads(environment));
        }
        graph
    }

    /// 读集合与变更集合相交的反应, 按序号升序
    pub fn affected_by(&self, changes: &ChangeSet) -> BTreeSet<usize> {
        changes
            .iter()
            .filter_map(|key| self.readers.get(key))
            .flatten()
            .copied()
            .collect()
    }

    pub fn refresh(&mut self, index: usize, reads: BTreeSet<StateKey>) {
        if self.reads[index] == reads {
            return;
        }
        for stale in self.reads[index].difference(&reads) {
            if let Some(set) = self.readers.get_mut(stale) {
                set.remove(&index);
                if set.is_empty() {
                    self.readers.remove(stale);
                }
            }
        }
        for fresh in reads.difference(&self.reads[index]) {
            self.readers.entry(fresh.clone()).or_default().insert(index);
        }
        self.reads[index] = reads;
    }

    pub fn reads_of(&self, index: usize) -> Option<&BTreeSet<StateKey>> {
        self.reads.get(index)
    }
}
