// tests/drain.rs
//! Allocation/release accounting across full pool drains.
//!
//! Single test in its own binary: with no other pool traffic in the
//! process, the counters must balance exactly.

use std::io::Write;

use segbuf::prelude::*;

const KIB: usize = 1024;
const MIB: usize = 1024 * 1024;

#[test]
fn test_drain_balances_allocation_counts() {
    // A mix of segmented and promoted lifetimes.
    for round in 0..6 {
        let mut stream = SegStream::new();
        stream.write_all(&vec![round as u8; 200 * KIB]).unwrap();
        if round % 2 == 0 {
            stream.set_len(2 * MIB).unwrap(); // promote
        }
        stream.close();
    }

    release_pooled_memory();

    // Nothing rented out, nothing idle: every allocated buffer has been
    // freed and reported.
    let blocks = block_pool_stats();
    assert_eq!(blocks.outstanding, 0);
    assert_eq!(blocks.free, 0);
    assert_eq!(blocks.allocated, blocks.released);
    assert_eq!(blocks.rented, blocks.returned);

    let large = large_pool_stats();
    assert_eq!(large.free, 0);
    assert_eq!(large.allocated, large.released);
    assert_eq!(large.rented, large.returned);
}
