//! Integration tests for the LRU-K replacer

use quarry::buffer::LruKReplacer;
use quarry::common::FrameId;

#[test]
fn test_lru_k_eviction_order() {
    let replacer = LruKReplacer::new(2, 10);

    for i in 0..5 {
        replacer.record_access(FrameId::new(i));
        replacer.set_evictable(FrameId::new(i), true).unwrap();
    }

    assert_eq!(replacer.size(), 5);

    // All frames have a single access (< k=2): infinite distance, evicted
    // in order of earliest access
    for i in 0..5 {
        assert_eq!(replacer.evict(), Some(FrameId::new(i)));
    }

    assert_eq!(replacer.size(), 0);
    assert_eq!(replacer.evict(), None);
}

#[test]
fn test_lru_k_respects_k_distance() {
    let replacer = LruKReplacer::new(2, 10);

    // Frame 0: accessed once (infinite k-distance)
    replacer.record_access(FrameId::new(0));

    // Frames 1 and 2: accessed twice each, frame 1 earlier
    replacer.record_access(FrameId::new(1));
    replacer.record_access(FrameId::new(1));
    replacer.record_access(FrameId::new(2));
    replacer.record_access(FrameId::new(2));

    for i in 0..3 {
        replacer.set_evictable(FrameId::new(i), true).unwrap();
    }

    assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    assert_eq!(replacer.evict(), Some(FrameId::new(2)));
}

#[test]
fn test_lru_k_pinned_frames_not_evicted() {
    let replacer = LruKReplacer::new(2, 10);

    replacer.record_access(FrameId::new(0));
    replacer.record_access(FrameId::new(1));
    replacer.record_access(FrameId::new(2));

    replacer.set_evictable(FrameId::new(1), true).unwrap();
    replacer.set_evictable(FrameId::new(2), true).unwrap();

    assert_eq!(replacer.size(), 2);

    // Frame 0 is never chosen
    assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    assert_eq!(replacer.evict(), Some(FrameId::new(2)));
    assert_eq!(replacer.evict(), None);
}

#[test]
fn test_lru_k_recent_access_defers_eviction() {
    let replacer = LruKReplacer::new(2, 10);

    replacer.record_access(FrameId::new(0));
    replacer.record_access(FrameId::new(1));
    replacer.record_access(FrameId::new(0));
    replacer.record_access(FrameId::new(1));

    // Frame 0 accessed again: its k-th most recent access is now newer
    replacer.record_access(FrameId::new(0));

    replacer.set_evictable(FrameId::new(0), true).unwrap();
    replacer.set_evictable(FrameId::new(1), true).unwrap();

    assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    assert_eq!(replacer.evict(), Some(FrameId::new(0)));
}

#[test]
fn test_lru_k_toggle_evictable() {
    let replacer = LruKReplacer::new(2, 10);

    replacer.record_access(FrameId::new(0));
    replacer.set_evictable(FrameId::new(0), true).unwrap();
    assert_eq!(replacer.size(), 1);

    replacer.set_evictable(FrameId::new(0), false).unwrap();
    assert_eq!(replacer.size(), 0);
    assert_eq!(replacer.evict(), None);

    replacer.set_evictable(FrameId::new(0), true).unwrap();
    assert_eq!(replacer.size(), 1);
    assert_eq!(replacer.evict(), Some(FrameId::new(0)));
}

#[test]
fn test_lru_k_remove() {
    let replacer = LruKReplacer::new(2, 10);

    replacer.record_access(FrameId::new(0));
    replacer.record_access(FrameId::new(1));
    replacer.set_evictable(FrameId::new(0), true).unwrap();
    replacer.set_evictable(FrameId::new(1), true).unwrap();

    assert_eq!(replacer.size(), 2);

    replacer.remove(FrameId::new(0)).unwrap();
    assert_eq!(replacer.size(), 1);

    assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    assert_eq!(replacer.evict(), None);
}

#[test]
fn test_lru_k_multiple_inf_distance() {
    let replacer = LruKReplacer::new(3, 10);

    // All frames have fewer than k=3 accesses
    replacer.record_access(FrameId::new(0));

    replacer.record_access(FrameId::new(1));
    replacer.record_access(FrameId::new(1));

    replacer.record_access(FrameId::new(2));

    for i in 0..3 {
        replacer.set_evictable(FrameId::new(i), true).unwrap();
    }

    // Ordered by most recent access: frame 0 (t=0), frame 1 (t=2), frame 2 (t=3)
    assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    assert_eq!(replacer.evict(), Some(FrameId::new(2)));
}

#[test]
fn test_lru_k_history_limit() {
    let replacer = LruKReplacer::new(2, 10);

    for _ in 0..10 {
        replacer.record_access(FrameId::new(0));
    }

    replacer.record_access(FrameId::new(1));
    replacer.record_access(FrameId::new(1));

    replacer.set_evictable(FrameId::new(0), true).unwrap();
    replacer.set_evictable(FrameId::new(1), true).unwrap();

    // Only the last k accesses count; frame 0's are older
    assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    assert_eq!(replacer.evict(), Some(FrameId::new(1)));
}

#[test]
fn test_lru_k_concurrent_access() {
    use std::sync::Arc;
    use std::thread;

    let replacer = Arc::new(LruKReplacer::new(2, 100));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let replacer = Arc::clone(&replacer);
            thread::spawn(move || {
                for i in 0..25 {
                    let frame_id = FrameId::new((t * 25 + i) as u32);
                    replacer.record_access(frame_id);
                    replacer.set_evictable(frame_id, true).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(replacer.size(), 100);

    for _ in 0..100 {
        assert!(replacer.evict().is_some());
    }

    assert_eq!(replacer.size(), 0);
}
