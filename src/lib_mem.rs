#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

//! Resident memory pressure.
//!
//! Each worker owns an [`Arena`] that grows by one 1 MiB [`Block`] per tick
//! toward the share of the ramp target it was handed, and keeps revisiting
//! its pages so the kernel never finds them idle.

use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::domain::{ResourceKind, Tuning};
use crate::ramp::RampSchedule;
use crate::service::WorkerSet;
use crate::status::{report, EventSender, StatusEvent};

pub const PAGE_SIZE: usize = 4096;
pub const PAGES_PER_BLOCK: usize = 256;
pub const BLOCK_SIZE: usize = PAGE_SIZE * PAGES_PER_BLOCK;

// small enough that every OS page of a fresh page buffer gets written
const FILL_STRIDE: usize = 128;
const BYTE_OFFSET: usize = 2739;

pub struct Page(Box<[u8; PAGE_SIZE]>);

impl Page {
    #[allow(clippy::cast_possible_truncation)]
    fn filled() -> Self {
        let mut buf = Box::new([0u8; PAGE_SIZE]);
        for pos in (0..PAGE_SIZE).step_by(FILL_STRIDE) {
            buf[pos] = pos as u8;
        }
        Self(buf)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0[..]
    }
}

pub struct Block {
    pages: Box<[Page]>,
}

impl Block {
    fn new() -> Self {
        Self {
            pages: (0..PAGES_PER_BLOCK).map(|_| Page::filled()).collect(),
        }
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }
}

/// Append-only sequence of blocks owned by a single worker.
pub struct Arena {
    blocks: Vec<Block>,
    cursor: usize,
    rng: ChaCha8Rng,
}

impl Arena {
    pub fn new(seed: u64) -> Self {
        Self {
            blocks: Vec::new(),
            cursor: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn size_mb(&self) -> u64 {
        self.blocks.len() as u64
    }

    pub fn page_count(&self) -> usize {
        self.blocks.len() * PAGES_PER_BLOCK
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn grow(&mut self) {
        self.blocks.push(Block::new());
    }

    fn page_mut(&mut self, idx: usize) -> &mut [u8; PAGE_SIZE] {
        &mut self.blocks[idx / PAGES_PER_BLOCK].pages[idx % PAGES_PER_BLOCK].0
    }

    /// Copies one byte between page pairs, `pages / 100 + 1` times. One side
    /// of each pair comes from a rotating cursor so every page is revisited
    /// periodically; the other is random. Returns the number of touches.
    pub fn touch(&mut self) -> usize {
        let pages = self.page_count();
        if pages == 0 {
            return 0;
        }
        let touches = pages / 100 + 1;
        for _ in 0..touches {
            let src = self.cursor;
            self.cursor = (self.cursor + 1) % pages;
            let dst = self.rng.gen_range(0..pages);
            let from = self.rng.gen_range(0..PAGE_SIZE);
            let to = (from + BYTE_OFFSET) % PAGE_SIZE;
            let byte = self.page_mut(src)[from];
            self.page_mut(dst)[to] = byte;
        }
        touches
    }
}

/// Splits `total_mb` over `workers`, handing the remainder out one MB at a
/// time to the lowest-numbered workers. The shares always sum to `total_mb`.
pub fn split_target(total_mb: u64, workers: usize) -> Vec<u64> {
    if workers == 0 {
        return Vec::new();
    }
    let count = workers as u64;
    let (base, extra) = (total_mb / count, total_mb % count);
    (0..count).map(|i| base + u64::from(i < extra)).collect()
}

/// Spawns the memory workers and the distributor that feeds them targets.
pub fn spawn_memory(
    set: &mut WorkerSet,
    configured_mb: u64,
    ramp: RampSchedule,
    token: &CancellationToken,
    tuning: &Tuning,
    events: &EventSender,
) {
    let count = tuning.memory_workers();
    let mut slots = Vec::with_capacity(count);
    for id in 0..count {
        let (tx, rx) = mpsc::channel(1);
        slots.push(tx);
        let token = token.clone();
        let events = events.clone();
        let tick = tuning.memory_tick;
        set.spawn(async move {
            memory_worker(id, rx, token, tick, events).await;
            (ResourceKind::Memory, Ok(()))
        });
    }
    let token = token.clone();
    let events = events.clone();
    let every = tuning.distribute_interval;
    set.spawn(async move {
        distribute(slots, configured_mb, ramp, token, every, events).await;
        (ResourceKind::Memory, Ok(()))
    });
    info!(workers = count, target_mb = configured_mb, "memory actuator started");
}

async fn distribute(
    slots: Vec<mpsc::Sender<u64>>,
    configured_mb: u64,
    ramp: RampSchedule,
    token: CancellationToken,
    every: Duration,
    events: EventSender,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut delivered: Option<u64> = None;
    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let current = ramp.target_mb(configured_mb);
        if delivered == Some(current) {
            continue;
        }
        let mut complete = true;
        for (slot, share) in slots.iter().zip(split_target(current, slots.len())) {
            match slot.try_send(share) {
                Ok(()) | Err(TrySendError::Closed(_)) => {}
                // superseded next round
                Err(TrySendError::Full(_)) => complete = false,
            }
        }
        report(&events, StatusEvent::MemoryAssigned(current));
        if complete {
            delivered = Some(current);
            if current > 0 {
                info!(target_mb = current, workers = slots.len(), "memory target assigned");
            }
        } else {
            debug!(target_mb = current, "some memory workers still hold a pending target");
        }
    }
}

async fn memory_worker(
    id: usize,
    mut targets: mpsc::Receiver<u64>,
    token: CancellationToken,
    tick: Duration,
    events: EventSender,
) {
    report(&events, StatusEvent::WorkerStarted(ResourceKind::Memory));
    let mut arena = Arena::new(id as u64);
    let mut target_mb = 0u64;
    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            Some(mb) = targets.recv() => target_mb = mb,
            _ = ticker.tick() => {
                if arena.size_mb() < target_mb {
                    arena.grow();
                    report(&events, StatusEvent::MemoryGrown { mb: 1 });
                }
                arena.touch();
            }
        }
    }
    let held = arena.size_mb();
    drop(arena);
    report(&events, StatusEvent::MemoryReleased { mb: held });
    report(&events, StatusEvent::WorkerExited(ResourceKind::Memory));
    trace!(worker = id, released_mb = held, "memory worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_gives_remainder_to_first_workers() {
        assert_eq!(split_target(10, 4), vec![3, 3, 2, 2]);
        assert_eq!(split_target(3, 5), vec![1, 1, 1, 0, 0]);
        assert_eq!(split_target(0, 3), vec![0, 0, 0]);
        assert!(split_target(7, 0).is_empty());
    }

    #[test]
    fn arena_grows_one_block_at_a_time() {
        let mut arena = Arena::new(7);
        assert_eq!(arena.touch(), 0);
        arena.grow();
        arena.grow();
        assert_eq!(arena.size_mb(), 2);
        assert_eq!(arena.page_count(), 2 * PAGES_PER_BLOCK);
        let bytes: usize = arena
            .blocks()
            .iter()
            .flat_map(Block::pages)
            .map(|p| p.bytes().len())
            .sum();
        assert_eq!(bytes, 2 * BLOCK_SIZE);
    }

    #[test]
    fn fresh_pages_carry_the_fill_pattern() {
        let page = Page::filled();
        assert_eq!(page.bytes()[0], 0);
        assert_eq!(page.bytes()[FILL_STRIDE], 128);
        assert_eq!(page.bytes()[2 * FILL_STRIDE], 0);
    }

    #[test]
    fn touch_count_scales_with_size() {
        let mut arena = Arena::new(1);
        arena.grow();
        // 256 pages -> 256 / 100 + 1
        assert_eq!(arena.touch(), 3);
        for _ in 0..3 {
            arena.grow();
        }
        assert_eq!(arena.touch(), 11);
    }
}
