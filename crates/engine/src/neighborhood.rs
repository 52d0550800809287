use serde::{Deserialize, Serialize};

use crate::position::Position;

/// 邻域(连接)规则: 将节点坐标映射为邻接关系
///
/// 关系总是对称的, 节点不会与自身相连。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NeighborhoodRule {
    #[default]
    NoLinks,
    /// 距离不超过 `range` 的节点互为邻居
    ConnectWithinDistance { range: f64 },
    FullyConnected,
}

impl NeighborhoodRule {
    pub fn are_linked(&self, a: &Position, b: &Position) -> bool {
        match self {
            NeighborhoodRule::NoLinks => false,
            NeighborhoodRule::ConnectWithinDistance { range } => a.distance_to(b) <= *range,
            NeighborhoodRule::FullyConnected => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_within_distance() {
        let rule = NeighborhoodRule::ConnectWithinDistance { range: 1.5 };
        let a = Position::from_coordinates(vec![0.0, 0.0]);
        let b = Position::from_coordinates(vec![1.0, 1.0]);
        let c = Position::from_coordinates(vec![2.0, 0.0]);
        assert!(rule.are_linked(&a, &b));
        assert!(rule.are_linked(&b, &a));
        assert!(!rule.are_linked(&a, &c));
        assert!(!NeighborhoodRule::NoLinks.are_linked(&a, &b));
        assert!(NeighborhoodRule::FullyConnected.are_linked(&a, &c));
    }

    #[test]
    fn test_rule_serde_tag() {
        let json = serde_json::to_string(&NeighborhoodRule::ConnectWithinDistance { range: 2.0 })
            .unwrap();
        assert_eq!(json, r#"{"type":"connect_within_distance","range":2.0}"#);
    }
}
