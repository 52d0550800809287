use crate::*;

#[test]
fn test_simgrid_error_display() {
    let capacity_error = SimGridError::InsufficientCapacity {
        required: 12,
        available: 10,
    };
    assert_eq!(
        capacity_error.to_string(),
        "集群容量不足: 需要 12 单位, 可用 10 单位"
    );

    let worker_error = SimGridError::worker_unreachable("worker-1", "connection reset");
    assert_eq!(
        worker_error.to_string(),
        "Worker不可达: worker-1 - connection reset"
    );

    let unrecoverable = SimGridError::JobUnrecoverable {
        job_id: "job-7".to_string(),
        attempts: 3,
        last_failure: "crashed".to_string(),
    };
    assert_eq!(
        unrecoverable.to_string(),
        "作业无法恢复: job-7 已尝试 3 次, 最后失败原因: crashed"
    );

    let version_error = SimGridError::SnapshotVersion {
        found: 9,
        supported: 1,
    };
    assert_eq!(
        version_error.to_string(),
        "不支持的快照版本: 9, 当前支持 1"
    );
}

#[test]
fn test_error_classification() {
    assert!(SimGridError::worker_unreachable("w", "probe").is_retryable());
    assert!(SimGridError::Timeout("deadline".to_string()).is_retryable());
    assert!(!SimGridError::InsufficientCapacity {
        required: 1,
        available: 0
    }
    .is_retryable());

    assert!(SimGridError::ClusterClosed.is_fatal());
    assert!(SimGridError::config_error("bad").is_fatal());
    assert!(!SimGridError::worker_not_found("w").is_fatal());
}

#[test]
fn test_error_conversions() {
    let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    let converted: SimGridError = json_err.into();
    assert!(matches!(converted, SimGridError::Serialization(_)));

    let anyhow_err = anyhow::anyhow!("boom");
    let converted: SimGridError = anyhow_err.into();
    assert_eq!(converted.to_string(), "内部错误: boom");
}
