use super::*;

#[test]
fn test_fresh_metrics_are_healthy_and_zeroed() {
    let m = Metrics::new();
    let snap = m.snapshot(0, 64);
    assert_eq!(snap.total_items_processed, 0);
    assert_eq!(snap.total_errors, 0);
    assert!(snap.is_running);
    assert!(snap.is_healthy);
    assert_eq!(snap.queue_utilization, 0.0);
}

#[test]
fn test_record_batch_updates_counters_and_resets_consecutive_errors() {
    let m = Metrics::new();
    m.record_error();
    m.record_error();
    assert_eq!(m.consecutive_errors(), 2);
    m.record_batch(10, 5.0);
    assert_eq!(m.consecutive_errors(), 0);
    let snap = m.snapshot(0, 10);
    assert_eq!(snap.total_items_processed, 10);
    assert_eq!(snap.total_batches_processed, 1);
    assert_eq!(snap.avg_batch_latency_ms, 5.0);
    assert_eq!(snap.max_batch_latency_ms, 5.0);
}

#[test]
fn test_queue_utilization_is_depth_over_capacity() {
    let m = Metrics::new();
    let snap = m.snapshot(5, 20);
    assert_eq!(snap.queue_utilization, 0.25);
}

#[test]
fn test_unhealthy_at_ten_consecutive_errors() {
    let m = Metrics::new();
    for _ in 0..9 {
        m.record_error();
    }
    assert!(m.is_healthy());
    m.record_error();
    assert!(!m.is_healthy());
}

#[test]
fn test_p95_over_samples() {
    let m = Metrics::new();
    for i in 1..=100u64 {
        m.record_batch(1, i as f64);
    }
    let snap = m.snapshot(0, 10);
    assert!(snap.p95_batch_latency_ms >= 94.0 && snap.p95_batch_latency_ms <= 100.0);
}

#[test]
fn test_dlq_count_reflected_in_snapshot() {
    let m = Metrics::new();
    m.set_items_in_dlq(7);
    assert_eq!(m.snapshot(0, 10).items_in_dlq, 7);
}
