// tests/integration_tests.rs
//! Integration tests for the stream and pool modules

use std::io::{Read, Seek, SeekFrom, Write};

use segbuf::prelude::*;

const KIB: usize = 1024;
const MIB: usize = 1024 * 1024;

#[test]
fn test_promotion_end_to_end() {
    // Write 192 KiB in 4 KiB chunks: three 64 KiB blocks, still segmented.
    let mut stream = SegStream::new();
    let prefix: Vec<u8> = (0..192 * KIB).map(|i| (i % 251) as u8).collect();
    for chunk in prefix.chunks(4 * KIB) {
        stream.write_all(chunk).unwrap();
    }
    assert!(stream.try_get_buffer().is_none(), "still segmented");

    // Growing past the 1 MiB threshold promotes to one large buffer.
    stream.set_len(2 * MIB).unwrap();
    assert!(stream.try_get_buffer().is_some(), "promoted");

    // Content is the prefix followed by zeros.
    stream.seek(SeekFrom::Start(0)).unwrap();
    let mut all = Vec::new();
    stream.read_to_end(&mut all).unwrap();
    assert_eq!(all.len(), 2 * MIB);
    assert_eq!(&all[..prefix.len()], &prefix[..]);
    assert!(all[prefix.len()..].iter().all(|&b| b == 0));
    stream.close();
}

#[test]
fn test_fixed_stream_wrapped_bounds() {
    let mut stream = SegStream::wrap(vec![0u8; 1024]);

    stream.seek(SeekFrom::Start(1024)).unwrap();
    let mut one = [0u8; 1];
    assert_eq!(stream.read(&mut one).unwrap(), 0, "read at end returns 0");

    let err = stream.write(b"x").unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::Unsupported);
    stream.close();
}

#[test]
fn test_fixed_stream_write_all_fails_after_span() {
    let mut stream = SegStream::wrap(vec![0u8; 16]);
    let err = stream.write_all(&[0xCC; 17]).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::Unsupported);
    // Exactly the wrapped span was written before the failure.
    assert_eq!(stream.position(), 16);
    stream.close();
}

#[test]
fn test_builder_cache_cascade() {
    // Dedicated thread: the thread-local level starts empty.
    std::thread::spawn(|| {
        builder::release(String::with_capacity(1024));
        builder::release(String::with_capacity(2048));

        let big = builder::acquire(2048);
        assert_eq!(big.capacity(), 2048);
        let small = builder::acquire(1024);
        assert_eq!(small.capacity(), 1024);

        big.detach();
        small.detach();
    })
    .join()
    .unwrap();
}

#[test]
fn test_stream_content_survives_shrink_grow() {
    let mut stream = SegStream::new();
    stream.write_all(&[0xFF; 8 * KIB]).unwrap();
    stream.set_len(4 * KIB).unwrap();
    stream.set_len(8 * KIB).unwrap();

    stream.seek(SeekFrom::Start(0)).unwrap();
    let mut all = Vec::new();
    stream.read_to_end(&mut all).unwrap();
    assert!(all[..4 * KIB].iter().all(|&b| b == 0xFF));
    assert!(all[4 * KIB..].iter().all(|&b| b == 0));
    stream.close();
}

#[test]
fn test_copy_to_between_streams() {
    let mut src = SegStream::new();
    let data: Vec<u8> = (0..300 * KIB).map(|i| (i % 247) as u8).collect();
    src.write_all(&data).unwrap();
    src.seek(SeekFrom::Start(0)).unwrap();

    let mut dst = SegStream::new();
    let copied = src.copy_to(&mut dst).unwrap();
    assert_eq!(copied as usize, data.len());
    assert_eq!(dst.to_vec().unwrap(), data);
    src.close();
    dst.close();
}

#[test]
fn test_stream_concurrency() {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    // Streams are single-owner; the pools underneath are shared.
    let failures = Arc::new(AtomicUsize::new(0));
    let mut handles = vec![];

    for t in 0..8u8 {
        let failures = Arc::clone(&failures);
        handles.push(thread::spawn(move || {
            for round in 0..20 {
                let mut stream = SegStream::new();
                let payload = vec![t ^ (round as u8); 100 * KIB];
                stream.write_all(&payload).unwrap();
                stream.seek(SeekFrom::Start(0)).unwrap();

                let mut out = Vec::new();
                stream.read_to_end(&mut out).unwrap();
                if out != payload {
                    failures.fetch_add(1, Ordering::Relaxed);
                }
                stream.close();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(failures.load(Ordering::Relaxed), 0);
}

#[test]
fn test_pool_warmup_improves_hit_rate() {
    segbuf::warm(8, 0, 0).unwrap();
    let before = block_pool_stats();

    let mut stream = SegStream::new();
    stream.write_all(&vec![1u8; 256 * KIB]).unwrap();
    stream.close();

    let after = block_pool_stats();
    assert!(after.rented > before.rented);
    assert!(after.returned > before.returned);
}

#[test]
fn test_double_close_is_idempotent() {
    let mut stream = SegStream::new();
    stream.write_all(b"bytes").unwrap();
    stream.close();
    stream.close();
    assert!(stream.is_closed());
}

#[test]
fn test_to_vec_equals_length_and_content() {
    let mut stream = SegStream::new();
    let data: Vec<u8> = (0..90 * KIB).map(|i| (i % 239) as u8).collect();
    stream.write_all(&data).unwrap();

    let arr = stream.to_vec().unwrap();
    assert_eq!(arr.len(), stream.len());
    assert_eq!(arr, data);
    stream.close();
}
