//! Property-based tests for run id and port allocation

use certrun::context::{allocate_port, generate_run_id, NODE_PORT_BASE, NODE_PORT_SPAN};
use proptest::prelude::*;
use std::time::{Duration, UNIX_EPOCH};

proptest! {
    #[test]
    fn test_allocated_port_stays_in_node_port_range(secs in 0u64..4_000_000_000) {
        let port = allocate_port(UNIX_EPOCH + Duration::from_secs(secs));
        prop_assert!(port >= NODE_PORT_BASE);
        prop_assert!((port as u64) < NODE_PORT_BASE as u64 + NODE_PORT_SPAN);
    }
}

#[test]
fn test_run_ids_are_decimal_and_non_negative() {
    for _ in 0..256 {
        let id = generate_run_id();
        assert!(!id.is_empty());
        assert!(id.chars().all(|c| c.is_ascii_digit()), "{id}");
        assert!(id.parse::<i64>().unwrap() <= i32::MAX as i64);
    }
}
