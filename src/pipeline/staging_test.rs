use super::*;

#[test]
fn test_push_respects_capacity() {
    let mut buf: StagingBuffer<u32> = StagingBuffer::new(2);
    buf.push(1).unwrap();
    buf.push(2).unwrap();
    assert!(buf.is_full());
    assert!(buf.push(3).is_err());
    assert_eq!(buf.count(), 2);
}

#[test]
fn test_consume_drops_successes() {
    let mut buf: StagingBuffer<u32> = StagingBuffer::new(4);
    for i in 0..4 {
        buf.push(i).unwrap();
    }
    let requeued = buf.consume(|_entry| true, |_entry| false);
    assert_eq!(requeued, 0);
    assert!(buf.is_empty());
}

#[test]
fn test_consume_requeues_failed_entries_preserving_order() {
    let mut buf: StagingBuffer<u32> = StagingBuffer::new(4);
    for i in 0..4 {
        buf.push(i).unwrap();
    }
    // entries 1 and 3 fail the consumer and their error handler asks to
    // requeue; 0 and 2 succeed and are dropped.
    let requeued = buf.consume(|entry| entry % 2 == 0, |_entry| true);
    assert_eq!(requeued, 2);
    assert_eq!(buf.count(), 2);
    let remaining: Vec<u32> = buf.iter().copied().collect();
    assert_eq!(remaining, vec![1, 3]);
}

#[test]
fn test_consume_drops_when_error_handler_declines_requeue() {
    let mut buf: StagingBuffer<u32> = StagingBuffer::new(4);
    buf.push(1).unwrap();
    buf.push(2).unwrap();
    let requeued = buf.consume(|_entry| false, |_entry| false);
    assert_eq!(requeued, 0);
    assert!(buf.is_empty());
}

#[test]
fn test_push_after_consume_reuses_freed_capacity() {
    let mut buf: StagingBuffer<u32> = StagingBuffer::new(1);
    buf.push(10).unwrap();
    buf.consume(|_entry| true, |_entry| false);
    assert!(buf.push(20).is_ok());
}
