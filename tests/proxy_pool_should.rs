use std::collections::HashSet;

use dlhd_edge::server::services::proxy_pool_services::ProxyPool;

fn pool(entries: &[&str]) -> ProxyPool {
    ProxyPool::new(entries.iter().map(|e| e.to_string()).collect())
}

#[test]
fn test_empty_pool_yields_nothing() {
    let pool = pool(&[]);

    assert!(pool.is_empty());
    assert!(pool.next_pair().is_empty());
    assert!(pool.next_pair().is_empty());
}

#[test]
fn test_blank_entries_are_dropped() {
    let pool = pool(&["", "  ", "http://a:1"]);

    assert_eq!(pool.len(), 1);
    assert_eq!(pool.next_pair(), vec!["http://a:1".to_string()]);
}

#[test]
fn test_single_entry_pool_always_yields_it() {
    let pool = pool(&["http://a:1"]);

    for _ in 0..3 {
        assert_eq!(pool.next_pair(), vec!["http://a:1".to_string()]);
    }
}

#[test]
fn test_pairs_rotate_and_cover_every_entry() {
    let entries = ["http://a:1", "http://b:1", "http://c:1"];
    let pool = pool(&entries);

    let mut seen = HashSet::new();
    for _ in 0..entries.len() {
        let pair = pool.next_pair();
        assert_eq!(pair.len(), 2);
        assert_ne!(pair[0], pair[1]);
        seen.extend(pair);
    }

    assert_eq!(seen.len(), entries.len());
}

#[test]
fn test_cursor_advances_by_two_and_wraps() {
    let pool = pool(&["http://a:1", "http://b:1", "http://c:1"]);

    assert_eq!(pool.next_pair(), vec!["http://a:1", "http://b:1"]);
    assert_eq!(pool.next_pair(), vec!["http://c:1", "http://a:1"]);
    assert_eq!(pool.next_pair(), vec!["http://b:1", "http://c:1"]);
    assert_eq!(pool.cursor(), 6);
}
