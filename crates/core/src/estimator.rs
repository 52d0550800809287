use crate::config::EstimatorConfig;
use crate::models::{BatchProfile, Complexity, MemoryClass};
use crate::traits::ComplexityEstimator;

/// 按节点数阈值划分内存等级的默认估算器
#[derive(Debug, Clone)]
pub struct DefaultComplexityEstimator {
    medium_node_threshold: u64,
    large_node_threshold: u64,
}

impl DefaultComplexityEstimator {
    pub fn new(medium_node_threshold: u64, large_node_threshold: u64) -> Self {
        Self {
            medium_node_threshold,
            large_node_threshold: large_node_threshold.max(medium_node_threshold),
        }
    }

    pub fn from_config(config: &EstimatorConfig) -> Self {
        Self::new(config.medium_node_threshold, config.large_node_threshold)
    }

    fn memory_class(&self, node_count: u64) -> MemoryClass {
        if node_count >= self.large_node_threshold {
            MemoryClass::Large
        } else if node_count >= self.medium_node_threshold {
            MemoryClass::Medium
        } else {
            MemoryClass::Small
        }
    }
}

impl Default for DefaultComplexityEstimator {
    fn default() -> Self {
        Self::from_config(&EstimatorConfig::default())
    }
}

impl ComplexityEstimator for DefaultComplexityEstimator {
    fn estimate(&self, profile: &BatchProfile) -> Complexity {
        Complexity::new(
            profile.batch_size,
            profile.node_count,
            profile.reactions_per_node,
            self.memory_class(profile.node_count),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(batch_size: u64, node_count: u64) -> BatchProfile {
        BatchProfile {
            batch_size,
            node_count,
            reactions_per_node: 2,
        }
    }

    #[test]
    fn test_memory_class_thresholds() {
        let estimator = DefaultComplexityEstimator::new(100, 1000);
        assert_eq!(estimator.estimate(&profile(1, 99)).memory_class, MemoryClass::Small);
        assert_eq!(estimator.estimate(&profile(1, 100)).memory_class, MemoryClass::Medium);
        assert_eq!(estimator.estimate(&profile(1, 5000)).memory_class, MemoryClass::Large);
    }

    #[test]
    fn test_monotone_in_nodes_and_batch() {
        let estimator = DefaultComplexityEstimator::new(1_000, 50_000);
        let mut previous = 0;
        for nodes in (0..200_000).step_by(997) {
            let demand = estimator.estimate(&profile(3, nodes)).demand();
            assert!(demand >= previous, "nodes={nodes}");
            previous = demand;
        }
        let mut previous = 0;
        for batch in 0..64 {
            let c = estimator.estimate(&profile(batch, 20_000));
            assert!(c.demand() >= previous);
            assert!(estimator.estimate(&profile(batch, 20_000)) <= estimator.estimate(&profile(batch + 1, 20_000)));
            previous = c.demand();
        }
    }

    #[test]
    fn test_estimate_is_pure() {
        let estimator = DefaultComplexityEstimator::default();
        assert_eq!(estimator.estimate(&profile(5, 777)), estimator.estimate(&profile(5, 777)));
    }
}
