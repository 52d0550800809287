//! # 集群成员管理
//!
//! - [`LocalCluster`]: 成员表、容量解析、Draining与关闭
//! - [`HealthMonitor`]: 周期探测、不可达判定与自动驱逐
//! - [`strategies`]: Worker集合选择策略
//! - [`with_cluster`]: 保证关闭的作用域用法

pub mod health;
pub mod local_cluster;
pub mod scope;
pub mod strategies;

pub use health::{HealthMonitor, ProbeSummary};
pub use local_cluster::LocalCluster;
pub use scope::with_cluster;
pub use strategies::{strategy_from_name, BestFitStrategy, GreedyDescendingStrategy};
