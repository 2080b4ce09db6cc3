// demos/basic_usage.rs
//! Basic usage of pool-backed streams

use std::io::{Read, Seek, SeekFrom, Write};

use segbuf::prelude::*;

fn main() -> std::io::Result<()> {
    println!("=== Basic Stream Usage ===\n");

    // 1. Create and use a dynamic stream
    let mut stream = SegStream::new();

    stream.write_all(b"Hello, World!")?;
    println!("Stream length: {}", stream.len());
    println!("Stream position: {}", stream.position());
    println!("Stream capacity: {} (one pooled block)", stream.capacity());

    // Read the data back
    stream.seek(SeekFrom::Start(0))?;
    let mut text = String::new();
    stream.read_to_string(&mut text)?;
    println!("Read back: {:?}", text);

    println!("\n=== Seek Past End ===\n");

    // Writes past the end zero-fill the gap
    stream.seek(SeekFrom::Start(64))?;
    stream.write_all(b"tail")?;
    println!("Length after gap write: {}", stream.len());

    stream.seek(SeekFrom::Start(13))?;
    let mut gap = vec![0xAA; 8];
    stream.read_exact(&mut gap)?;
    println!("Gap bytes: {:?} (all zero)", gap);

    println!("\n=== Promotion to a Large Buffer ===\n");

    // Past the promotion threshold the stream moves its content into one
    // buffer rented from the ladder-indexed pool.
    stream.set_len(2 * 1024 * 1024)?;
    println!(
        "Contiguous buffer available: {}",
        stream.try_get_buffer().is_some()
    );

    stream.close();

    println!("\n=== Pool Statistics ===\n");

    let blocks = block_pool_stats();
    println!(
        "Block pool: rented={}, returned={}, hit_rate={:.1}%",
        blocks.rented,
        blocks.returned,
        blocks.hit_rate()
    );
    let large = large_pool_stats();
    println!(
        "Large pool: rented={}, returned={}, free={}",
        large.rented, large.returned, large.free
    );

    // Drop every idle pooled buffer (the scrub queue drains first).
    release_pooled_memory();
    println!("\nPooled memory released.");

    Ok(())
}
