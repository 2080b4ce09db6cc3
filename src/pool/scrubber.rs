// src/pool/scrubber.rs
//! Background zeroing of returned pool memory.
//!
//! Under the `OutOfBand` policy, returned blocks and large buffers are not
//! zeroed on the caller's thread; they travel through an MPSC channel to a
//! single scrub worker, which zero-fills them and reinserts them into the
//! owning pool's free list (retention caps still apply there).
//!
//! The rent path re-zeroes anything still dirty, so the worker is purely a
//! latency optimization — but [`Scrubber::drain`] gives callers a hard
//! guarantee: once it returns, every submitted buffer has been scrubbed and
//! reinserted.

use std::sync::{Condvar, Mutex, OnceLock};
use std::thread;

use crossbeam::channel::{Receiver, Sender, unbounded};

use crate::alloc::{Block, LargeBuffer};
use crate::pool::block::block_pool;
use crate::pool::large::large_pool;

enum ScrubItem {
    Block(Block),
    Large(LargeBuffer),
}

#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    drained: Condvar,
}

/// Handle to the process-wide scrub worker.
pub(crate) struct Scrubber {
    tx: Sender<ScrubItem>,
    pending: &'static Pending,
}

impl Scrubber {
    fn start() -> Self {
        let (tx, rx) = unbounded();
        let pending: &'static Pending = Box::leak(Box::new(Pending::default()));
        thread::Builder::new()
            .name("segbuf-scrubber".into())
            .spawn(move || worker(rx, pending))
            .expect("failed to spawn scrub worker");
        Self { tx, pending }
    }

    pub(crate) fn submit_block(&self, block: Block) {
        *self.pending.count.lock().unwrap() += 1;
        // The worker owns the receiver for the life of the process.
        let _ = self.tx.send(ScrubItem::Block(block));
    }

    pub(crate) fn submit_large(&self, buf: LargeBuffer) {
        *self.pending.count.lock().unwrap() += 1;
        let _ = self.tx.send(ScrubItem::Large(buf));
    }

    /// Blocks until every submitted buffer has been scrubbed and reinserted.
    pub(crate) fn drain(&self) {
        let mut count = self.pending.count.lock().unwrap();
        while *count > 0 {
            count = self.pending.drained.wait(count).unwrap();
        }
    }
}

fn worker(rx: Receiver<ScrubItem>, pending: &'static Pending) {
    while let Ok(first) = rx.recv() {
        // Coalesce bursts: grab everything already queued before touching
        // the pending counter.
        let batch = std::iter::once(first).chain(rx.try_iter());
        let mut done = 0;
        for item in batch {
            match item {
                ScrubItem::Block(mut block) => {
                    block.scrub();
                    block_pool().insert(block);
                }
                ScrubItem::Large(mut buf) => {
                    buf.scrub();
                    large_pool().insert(buf);
                }
            }
            done += 1;
        }
        let mut count = pending.count.lock().unwrap();
        *count -= done;
        if *count == 0 {
            pending.drained.notify_all();
        }
    }
}

static SCRUBBER: OnceLock<Scrubber> = OnceLock::new();

/// The process-wide scrubber, spawned on first use.
pub(crate) fn scrubber() -> &'static Scrubber {
    SCRUBBER.get_or_init(Scrubber::start)
}

/// Drains the scrub queue without spawning a worker that never ran.
pub(crate) fn drain_pending() {
    if let Some(scrubber) = SCRUBBER.get() {
        scrubber.drain();
    }
}
