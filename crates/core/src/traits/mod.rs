pub mod cluster;
pub mod strategy;
pub mod worker_endpoint;

pub use cluster::*;
pub use strategy::*;
pub use worker_endpoint::*;
