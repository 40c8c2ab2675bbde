//! Ordering barrier between the render workers and the encoder.
//!
//! Workers finish frames in any order; the barrier buffers them by index and
//! hands the single consumer maximal contiguous runs starting at the next
//! expected index. The dispatcher reserves a slot before handing out each
//! frame, so at most `capacity` frames are in flight or buffered at once.

use std::collections::BTreeMap;
use std::sync::{Condvar, Mutex, MutexGuard};

#[derive(Debug)]
struct BarrierState<T> {
    /// Next index the consumer expects.
    next: u64,
    /// Completed frames waiting for their predecessors.
    pending: BTreeMap<u64, T>,
    /// Total frame count once the producer has seen the end of input.
    total: Option<u64>,
    aborted: bool,
}

/// Index-keyed reorder buffer with bounded capacity.
#[derive(Debug)]
pub struct OrderingBarrier<T> {
    state: Mutex<BarrierState<T>>,
    /// Signalled when the consumer advances or the barrier aborts.
    space: Condvar,
    /// Signalled when a frame completes, input ends, or the barrier aborts.
    ready: Condvar,
    capacity: u64,
}

impl<T> OrderingBarrier<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(BarrierState {
                next: 0,
                pending: BTreeMap::new(),
                total: None,
                aborted: false,
            }),
            space: Condvar::new(),
            ready: Condvar::new(),
            capacity: capacity.max(1) as u64,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BarrierState<T>> {
        // Poisoning only happens while the job is being torn down.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Block until frame `index` may be dispatched.
    ///
    /// Returns `false` if the barrier was aborted while waiting.
    pub fn reserve(&self, index: u64) -> bool {
        let mut state = self.lock();
        while !state.aborted && index >= state.next + self.capacity {
            state = self.space.wait(state).unwrap_or_else(|e| e.into_inner());
        }
        !state.aborted
    }

    /// Hand in a finished frame.
    pub fn complete(&self, index: u64, item: T) {
        let mut state = self.lock();
        if state.aborted || index < state.next {
            return;
        }
        let wake = index == state.next;
        state.pending.insert(index, item);
        if wake {
            self.ready.notify_one();
        }
    }

    /// Declare that frames `0..total` are all the input there is.
    pub fn close(&self, total: u64) {
        let mut state = self.lock();
        state.total = Some(total);
        self.ready.notify_all();
    }

    /// Stop the pipeline: wakes every waiter and drops buffered frames.
    pub fn abort(&self) {
        let mut state = self.lock();
        state.aborted = true;
        state.pending.clear();
        self.space.notify_all();
        self.ready.notify_all();
    }

    pub fn is_aborted(&self) -> bool {
        self.lock().aborted
    }

    /// Number of frames currently buffered.
    pub fn buffered(&self) -> usize {
        self.lock().pending.len()
    }

    /// Block until the next expected frame is available and return the
    /// longest contiguous run starting there, in index order.
    ///
    /// Returns `None` once every frame has been released or on abort.
    pub fn next_run(&self) -> Option<Vec<(u64, T)>> {
        let mut state = self.lock();
        loop {
            if state.aborted {
                return None;
            }
            let next = state.next;
            if state.pending.contains_key(&next) {
                break;
            }
            if state.total.is_some_and(|total| next >= total) {
                return None;
            }
            state = self.ready.wait(state).unwrap_or_else(|e| e.into_inner());
        }

        let mut run = Vec::new();
        loop {
            let next = state.next;
            match state.pending.remove(&next) {
                Some(item) => {
                    run.push((next, item));
                    state.next += 1;
                }
                None => break,
            }
        }
        self.space.notify_all();
        Some(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_releases_contiguous_runs_in_order() {
        let barrier = OrderingBarrier::new(8);
        barrier.complete(2, "c");
        barrier.complete(1, "b");
        barrier.complete(0, "a");
        barrier.complete(4, "e");

        let run = barrier.next_run().unwrap();
        assert_eq!(run, vec![(0, "a"), (1, "b"), (2, "c")]);
        assert_eq!(barrier.buffered(), 1);

        barrier.complete(3, "d");
        barrier.close(5);
        assert_eq!(barrier.next_run().unwrap(), vec![(3, "d"), (4, "e")]);
        assert!(barrier.next_run().is_none());
    }

    #[test]
    fn test_reserve_blocks_until_consumer_advances() {
        let barrier = Arc::new(OrderingBarrier::new(2));
        assert!(barrier.reserve(0));
        assert!(barrier.reserve(1));

        let producer = {
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || barrier.reserve(2))
        };
        std::thread::sleep(Duration::from_millis(50));
        assert!(!producer.is_finished());

        barrier.complete(0, ());
        assert_eq!(barrier.next_run().unwrap().len(), 1);
        assert!(producer.join().unwrap());
    }

    #[test]
    fn test_abort_wakes_blocked_producer_and_consumer() {
        let barrier = Arc::new(OrderingBarrier::<u32>::new(1));
        assert!(barrier.reserve(0));

        let producer = {
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || barrier.reserve(1))
        };
        let consumer = {
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || barrier.next_run())
        };
        std::thread::sleep(Duration::from_millis(20));
        barrier.abort();

        assert!(!producer.join().unwrap());
        assert!(consumer.join().unwrap().is_none());
        barrier.complete(0, 7);
        assert_eq!(barrier.buffered(), 0);
    }

    #[test]
    fn test_empty_input_finishes_immediately() {
        let barrier = OrderingBarrier::<()>::new(4);
        barrier.close(0);
        assert!(barrier.next_run().is_none());
    }
}
