pub mod app_config;
pub mod cluster_dispatcher;
pub mod estimator_observability;
pub mod worker_pool;

pub use app_config::AppConfig;
pub use cluster_dispatcher::{ClusterConfig, DispatcherConfig, SELECTION_STRATEGIES};
pub use estimator_observability::{EstimatorConfig, ObservabilityConfig};
pub use worker_pool::{LocalWorkerConfig, WorkerPoolConfig};
