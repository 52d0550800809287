//! Common simulation fixtures and async wait helpers

use std::time::Duration;

use simgrid_engine::SimulationSpec;
use tokio::time::sleep;

/// One node, no reactions
pub fn single_point_simulation() -> SimulationSpec {
    serde_json::from_value(serde_json::json!({
        "dimensions": 2,
        "deployments": [{"shape": {"type": "point", "coordinates": [0.0, 0.0]}}]
    }))
    .expect("valid fixture")
}

/// A 3x3 grid passing `token` around, seeded from a single corner
pub fn gossip_simulation() -> SimulationSpec {
    serde_json::from_value(serde_json::json!({
        "dimensions": 2,
        "neighborhood": {"type": "connect_within_distance", "range": 1.0},
        "deployments": [
            {"shape": {"type": "grid", "start": [0.0, 0.0], "end": [2.0, 2.0], "step": [1.0, 1.0]}},
            {"shape": {"type": "point", "coordinates": [0.0, 0.0]}, "molecules": {"token": 20.0}}
        ],
        "reactions": [{
            "name": "spread",
            "conditions": [{"type": "molecule_at_least", "molecule": "token", "amount": 1.0}],
            "actions": [{"type": "send_to_neighbors", "molecule": "token", "amount": 0.25}],
            "distribution": {"type": "exponential", "rate": 2.0}
        }]
    }))
    .expect("valid fixture")
}

/// One node ticking forever; only cancellation, deadlines or horizons stop it
pub fn ticking_simulation() -> SimulationSpec {
    serde_json::from_value(serde_json::json!({
        "dimensions": 1,
        "deployments": [{"shape": {"type": "point", "coordinates": [0.0]}}],
        "reactions": [{
            "name": "tick",
            "actions": [{"type": "change", "molecule": "ticks", "delta": 1.0}],
            "distribution": {"type": "dirac_comb", "period": 0.001}
        }]
    }))
    .expect("valid fixture")
}

/// Test environment utilities
pub struct TestEnv;

impl TestEnv {
    /// Wait for a condition to be true with timeout
    pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let start = std::time::Instant::now();

        while start.elapsed() < timeout {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(10)).await;
        }

        false
    }
}
