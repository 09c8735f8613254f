/// Clears references held by a pooled slot so nothing outlives its frame.
pub trait Recycle {
    fn recycle(&mut self);
}

impl<T> Recycle for Vec<T> {
    fn recycle(&mut self) {
        self.clear();
    }
}

/// Growable buffer whose slots survive [`Pool::clear`].
///
/// `len` is the logical length: slots beyond it are recycled storage waiting
/// to be handed out again, never visible through the accessors.
#[derive(Debug)]
pub struct Pool<T> {
    slots: Vec<T>,
    len: usize,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            len: 0,
        }
    }
}

impl<T: Default + Recycle> Pool<T> {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            len: 0,
        }
    }

    /// Returns the next free slot, reusing recycled storage when available.
    pub fn next_slot(&mut self) -> &mut T {
        if self.len == self.slots.len() {
            self.slots.push(T::default());
        }
        let index = self.len;
        self.len += 1;
        &mut self.slots[index]
    }

    /// Resets the logical length, recycling every used slot.
    pub fn clear(&mut self) {
        for slot in &mut self.slots[..self.len] {
            slot.recycle();
        }
        self.len = 0;
    }

    /// Drops the most recently handed-out slot.
    pub fn pop(&mut self) {
        if self.len > 0 {
            self.len -= 1;
            self.slots[self.len].recycle();
        }
    }
}

impl<T> Pool<T> {
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Ensures room for at least `capacity` slots without reallocating.
    pub fn reserve(&mut self, capacity: usize) {
        self.slots.reserve(capacity.saturating_sub(self.slots.len()));
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Number of allocated slots, used or not.
    #[inline]
    #[must_use]
    pub fn allocated(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.slots[..self.len]
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.slots[..self.len]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    #[must_use]
    pub fn last_mut(&mut self) -> Option<&mut T> {
        self.as_mut_slice().last_mut()
    }

    pub fn reverse(&mut self) {
        self.slots[..self.len].reverse();
    }
}

impl<T: Default + Recycle> Recycle for Pool<T> {
    fn recycle(&mut self) {
        self.clear();
    }
}

impl<'a, T> IntoIterator for &'a Pool<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
