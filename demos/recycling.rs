// demos/recycling.rs
//! Shows warm-up behavior: after the first stream lifecycle, repeated
//! multi-megabyte streams run allocation-free against the pools.

use std::io::Write;
use std::time::Instant;

use segbuf::prelude::*;

const ROUNDS: usize = 50;
const PAYLOAD: usize = 4 * 1024 * 1024;

fn main() -> std::io::Result<()> {
    let chunk = vec![0x42u8; 64 * 1024];

    // Cold round: every block and the large buffer are fresh allocations.
    run_round(&chunk)?;
    let cold = block_pool_stats();
    println!(
        "after cold round:  allocated={:3}  rented={:3}  hit_rate={:.1}%",
        cold.allocated,
        cold.rented,
        cold.hit_rate()
    );

    // Warm rounds: storage comes back out of the pools.
    let start = Instant::now();
    for _ in 0..ROUNDS {
        run_round(&chunk)?;
    }
    let elapsed = start.elapsed();

    let warm = block_pool_stats();
    println!(
        "after {} rounds: allocated={:3}  rented={:3}  hit_rate={:.1}%",
        ROUNDS + 1,
        warm.allocated,
        warm.rented,
        warm.hit_rate()
    );
    println!(
        "warm throughput: {:.1} MiB/s",
        (ROUNDS * PAYLOAD) as f64 / (1024.0 * 1024.0) / elapsed.as_secs_f64()
    );

    release_pooled_memory();
    Ok(())
}

fn run_round(chunk: &[u8]) -> std::io::Result<()> {
    let mut stream = SegStream::new();
    while stream.len() < PAYLOAD {
        stream.write_all(chunk)?;
    }
    stream.close();
    Ok(())
}
