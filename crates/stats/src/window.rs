//! Fixed-capacity circular buffer of `i32` samples.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{StatsError, StatsResult};

#[derive(Debug)]
struct WindowState {
    values: Box<[i32]>,
    /// Slot the next sample is written to; also the oldest sample once full.
    next: usize,
    len: usize,
}

/// Sliding window over the last `capacity` samples.
///
/// The backing storage is allocated once. One mutex covers both writes and
/// snapshots, so a snapshot never mixes two generations of the window.
#[derive(Debug)]
pub struct SlidingWindow {
    capacity: usize,
    state: Mutex<WindowState>,
}

impl SlidingWindow {
    pub fn new(capacity: usize) -> StatsResult<Self> {
        if capacity == 0 {
            return Err(StatsError::EmptyWindow);
        }
        Ok(Self {
            capacity,
            state: Mutex::new(WindowState {
                values: vec![0; capacity].into_boxed_slice(),
                next: 0,
                len: 0,
            }),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of samples received so far, capped at the capacity.
    pub fn len(&self) -> usize {
        self.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    /// Add a sample, overwriting the oldest one once full.
    pub fn add(&self, value: i32) {
        let mut state = self.lock();
        Self::write(&mut state, self.capacity, value);
    }

    /// Add a sample and, if the window is now full, return a snapshot of it taken
    /// under the same lock.
    pub fn push(&self, value: i32) -> Option<Vec<i32>> {
        let mut state = self.lock();
        Self::write(&mut state, self.capacity, value);
        (state.len == self.capacity).then(|| Self::snapshot(&state, self.capacity))
    }

    /// Current samples, oldest first. Holds fewer than `capacity` values until
    /// the window has filled up.
    pub fn samples(&self) -> Vec<i32> {
        let state = self.lock();
        Self::snapshot(&state, self.capacity)
    }

    fn write(state: &mut WindowState, capacity: usize, value: i32) {
        state.values[state.next] = value;
        state.next = (state.next + 1) % capacity;
        if state.len < capacity {
            state.len += 1;
        }
    }

    fn snapshot(state: &WindowState, capacity: usize) -> Vec<i32> {
        let oldest = (state.next + capacity - state.len) % capacity;
        (0..state.len)
            .map(|i| state.values[(oldest + i) % capacity])
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, WindowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
