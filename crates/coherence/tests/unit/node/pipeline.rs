//! Delay Queue Unit Tests.

use cohsim_core::node::DelayQueue;

/// Items are held for the configured latency.
#[test]
fn holds_for_latency() {
    let mut q = DelayQueue::new(3);
    q.push(10, 'a');
    assert_eq!(q.pop_ready(12), None);
    assert_eq!(q.pop_ready(13), Some('a'));
    assert!(q.is_empty());
}

/// Items come out in push order.
#[test]
fn preserves_order() {
    let mut q = DelayQueue::new(1);
    q.push(1, 1);
    q.push(1, 2);
    q.push(2, 3);
    assert_eq!(q.len(), 3);

    let mut out = Vec::new();
    while let Some(x) = q.pop_ready(5) {
        out.push(x);
    }
    assert_eq!(out, vec![1, 2, 3]);
}

/// A zero-latency queue releases items in the same cycle.
#[test]
fn zero_latency() {
    let mut q = DelayQueue::new(0);
    q.push(4, "x");
    assert_eq!(q.pop_ready(4), Some("x"));
}
