use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use simgrid_errors::{SimGridError, SimGridResult};
use tracing::debug;

use crate::deployment::Deployment;
use crate::neighborhood::NeighborhoodRule;
use crate::position::Position;

/// 节点标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// 节点携带的命名数量
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Molecule(pub String);

impl Molecule {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self(name.into())
    }
}

impl From<&str> for Molecule {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl fmt::Display for Molecule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct NodeState {
    position: Position,
    molecules: BTreeMap<Molecule, f64>,
}

/// 可变空间: 节点坐标、分子数量与邻接关系
///
/// 邻接关系始终与当前邻域规则及坐标保持一致; 所有改变拓扑的操作都会返回
/// 邻域发生变化的节点集合, 供调度器做依赖失效。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    dimensions: usize,
    rule: NeighborhoodRule,
    next_node_id: u64,
    nodes: BTreeMap<NodeId, NodeState>,
    neighborhoods: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl Environment {
    pub fn new(dimensions: usize) -> Self {
        Self::with_rule(dimensions, NeighborhoodRule::default())
    }

    pub fn with_rule(dimensions: usize, rule: NeighborhoodRule) -> Self {
        Self {
            dimensions,
            rule,
            next_node_id: 0,
            nodes: BTreeMap::new(),
            neighborhoods: BTreeMap::new(),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// 坐标工厂, 拒绝维度不符或非有限的坐标
    pub fn make_position(&self, coordinates: &[f64]) -> SimGridResult<Position> {
        if coordinates.len() != self.dimensions {
            return Err(SimGridError::InvalidPosition {
                expected: self.dimensions,
                actual: coordinates.len(),
            });
        }
        if coordinates.iter().any(|c| !c.is_finite()) {
            return Err(SimGridError::inconsistent(format!(
                "坐标包含非有限值: {coordinates:?}"
            )));
        }
        Ok(Position::from_coordinates(coordinates.to_vec()))
    }

    pub fn neighborhood_rule(&self) -> &NeighborhoodRule {
        &self.rule
    }

    /// 替换邻域规则并重算全部邻接, 返回邻域发生变化的节点
    pub fn set_neighborhood_rule(&mut self, rule: NeighborhoodRule) -> BTreeSet<NodeId> {
        self.rule = rule;
        let ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        let mut changed = BTreeSet::new();
        for id in ids {
            changed.extend(self.relink(id));
        }
        changed
    }

    pub fn add_node(
        &mut self,
        position: Position,
        molecules: BTreeMap<Molecule, f64>,
    ) -> SimGridResult<NodeId> {
        self.check_dimensions(&position)?;
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        self.nodes.insert(id, NodeState { position, molecules });
        self.relink(id);
        Ok(id)
    }

    pub fn remove_node(&mut self, node: NodeId) -> SimGridResult<BTreeSet<NodeId>> {
        if self.nodes.remove(&node).is_none() {
            return Err(SimGridError::NodeNotFound { id: node.0 });
        }
        let former = self.neighborhoods.remove(&node).unwrap_or_default();
        for neighbor in &former {
            if let Some(set) = self.neighborhoods.get_mut(neighbor) {
                set.remove(&node);
            }
        }
        Ok(former)
    }

    /// 移动节点并重算受影响的邻接
    pub fn move_node_to(
        &mut self,
        node: NodeId,
        position: Position,
    ) -> SimGridResult<BTreeSet<NodeId>> {
        self.check_dimensions(&position)?;
        let state = self
            .nodes
            .get_mut(&node)
            .ok_or(SimGridError::NodeNotFound { id: node.0 })?;
        state.position = position;
        Ok(self.relink(node))
    }

    pub fn move_node_by(&mut self, node: NodeId, delta: &[f64]) -> SimGridResult<BTreeSet<NodeId>> {
        let current = self
            .position(node)
            .ok_or(SimGridError::NodeNotFound { id: node.0 })?;
        if delta.len() != self.dimensions {
            return Err(SimGridError::InvalidPosition {
                expected: self.dimensions,
                actual: delta.len(),
            });
        }
        let target = current.translated(delta);
        let target = self.make_position(target.coordinates())?;
        self.move_node_to(node, target)
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn position(&self, node: NodeId) -> Option<&Position> {
        self.nodes.get(&node).map(|s| &s.position)
    }

    pub fn neighbors(&self, node: NodeId) -> Option<&BTreeSet<NodeId>> {
        self.neighborhoods.get(&node)
    }

    pub fn distance(&self, a: NodeId, b: NodeId) -> Option<f64> {
        Some(self.position(a)?.distance_to(self.position(b)?))
    }

    /// 缺失的分子视为 0
    pub fn concentration(&self, node: NodeId, molecule: &Molecule) -> f64 {
        self.nodes
            .get(&node)
            .and_then(|s| s.molecules.get(molecule))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn molecules(&self, node: NodeId) -> Option<&BTreeMap<Molecule, f64>> {
        self.nodes.get(&node).map(|s| &s.molecules)
    }

    /// 写入分子数量; 负数或非有限值视为环境不一致
    pub fn set_concentration(
        &mut self,
        node: NodeId,
        molecule: Molecule,
        value: f64,
    ) -> SimGridResult<()> {
        if !value.is_finite() || value < 0.0 {
            return Err(SimGridError::inconsistent(format!(
                "{node} 上的分子 {molecule} 数量无效: {value}"
            )));
        }
        let state = self
            .nodes
            .get_mut(&node)
            .ok_or(SimGridError::NodeNotFound { id: node.0 })?;
        state.molecules.insert(molecule, value);
        Ok(())
    }

    /// 所有节点上某分子数量之和
    pub fn total(&self, molecule: &Molecule) -> f64 {
        self.nodes
            .values()
            .filter_map(|s| s.molecules.get(molecule))
            .sum()
    }

    pub fn molecule_totals(&self) -> BTreeMap<Molecule, f64> {
        let mut totals = BTreeMap::new();
        for state in self.nodes.values() {
            for (molecule, value) in &state.molecules {
                *totals.entry(molecule.clone()).or_insert(0.0) += value;
            }
        }
        totals
    }

    /// 应用部署: 若部署携带邻域规则则先挂载到环境, 再逐个放置节点
    pub fn apply_deployment(
        &mut self,
        deployment: &dyn Deployment,
        molecules: &BTreeMap<Molecule, f64>,
    ) -> SimGridResult<Vec<NodeId>> {
        if let Some(rule) = deployment.neighborhood_rule() {
            self.set_neighborhood_rule(rule);
        }
        let positions = deployment.positions(self)?;
        let mut ids = Vec::with_capacity(positions.len());
        for position in positions {
            ids.push(self.add_node(position, molecules.clone())?);
        }
        debug!("部署完成, 新增 {} 个节点", ids.len());
        Ok(ids)
    }

    /// 校验邻接关系与规则、坐标一致
    pub fn check_consistency(&self) -> SimGridResult<()> {
        for (id, state) in &self.nodes {
            let expected: BTreeSet<NodeId> = self
                .nodes
                .iter()
                .filter(|(other, s)| *other != id && self.rule.are_linked(&state.position, &s.position))
                .map(|(other, _)| *other)
                .collect();
            let actual = self.neighborhoods.get(id).cloned().unwrap_or_default();
            if expected != actual {
                return Err(SimGridError::inconsistent(format!(
                    "{id} 的邻接关系与邻域规则不一致"
                )));
            }
        }
        if self.neighborhoods.keys().any(|id| !self.nodes.contains_key(id)) {
            return Err(SimGridError::inconsistent("邻接表包含已删除的节点"));
        }
        Ok(())
    }

    fn check_dimensions(&self, position: &Position) -> SimGridResult<()> {
        if position.dimensions() != self.dimensions {
            return Err(SimGridError::InvalidPosition {
                expected: self.dimensions,
                actual: position.dimensions(),
            });
        }
        Ok(())
    }

    fn relink(&mut self, node: NodeId) -> BTreeSet<NodeId> {
        let mut changed = BTreeSet::new();
        let Some(state) = self.nodes.get(&node) else {
            return changed;
        };
        let updated: BTreeSet<NodeId> = self
            .nodes
            .iter()
            .filter(|(other, s)| **other != node && self.rule.are_linked(&state.position, &s.position))
            .map(|(other, _)| *other)
            .collect();
        let previous = self
            .neighborhoods
            .insert(node, updated.clone())
            .unwrap_or_default();
        if previous != updated {
            changed.insert(node);
        }
        for gained in updated.difference(&previous) {
            self.neighborhoods.entry(*gained).or_default().insert(node);
            changed.insert(*gained);
        }
        for lost in previous.difference(&updated) {
            if let Some(set) = self.neighborhoods.get_mut(lost) {
                set.remove(&node);
            }
            changed.insert(*lost);
        }
        changed
    }
}
