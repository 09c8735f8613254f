use std::collections::VecDeque;

use rustc_hash::FxHashMap;

/// Hardware slot allocator for lights or clip planes.
///
/// Slot 0 is reserved (the head light uses it) and never handed out. Slots
/// are bound to an instruction's correlation id on acquire and found again
/// through it on release, so START/STOP pairs may interleave freely.
/// Released slots go to the back of the queue, giving round-robin reuse.
#[derive(Debug, Default)]
pub struct IdPool {
    free: VecDeque<u32>,
    bound: FxHashMap<u32, u32>,
    slots: u32,
}

impl IdPool {
    /// A pool over slots `1..max`.
    #[must_use]
    pub fn new(max: u32) -> Self {
        let mut pool = Self {
            free: VecDeque::with_capacity(max as usize),
            bound: FxHashMap::default(),
            slots: max,
        };
        pool.reset();
        pool
    }

    /// Binds a free slot to `correlation`. `None` when exhausted or when the
    /// correlation id is already bound.
    pub fn acquire(&mut self, correlation: u32) -> Option<u32> {
        if self.bound.contains_key(&correlation) {
            return None;
        }
        let slot = self.free.pop_front()?;
        self.bound.insert(correlation, slot);
        Some(slot)
    }

    /// Returns the slot bound to `correlation` to the pool.
    pub fn release(&mut self, correlation: u32) -> Option<u32> {
        let slot = self.bound.remove(&correlation)?;
        self.free.push_back(slot);
        Some(slot)
    }

    /// Unbinds everything, restoring the initial slot order.
    pub fn reset(&mut self) {
        self.bound.clear();
        self.free.clear();
        self.free.extend(1..self.slots);
    }

    #[must_use]
    pub fn available(&self) -> usize {
        self.free.len()
    }
}
