//! Reusable work vectors for per-frame analysis.
//!
//! Every estimator declares the scratch buffers it needs — how many and
//! how large — once, at workspace construction time. During analysis the
//! buffers are borrowed back slot by slot, so the per-frame hot path never
//! allocates. Buffers are never resized after construction; a workspace
//! that is reconfigured for a different maximum order builds a new pool.
//!
//! Requesting a slot with a length different from the declared one is a
//! programming error in the calling estimator, not a data-dependent
//! condition, and panics immediately.
//!
//! A pool belongs to exactly one workspace. It is not meant to be shared
//! between threads; parallel analysis gives every worker its own
//! workspace and therefore its own pool.

/// Pre-sized scratch buffers indexed by slot.
#[derive(Debug)]
pub struct WorkvectorPool {
    buffers: Vec<Vec<f64>>,
    sizes: Vec<usize>,
}

impl WorkvectorPool {
    /// Create a pool with one buffer per entry of `sizes`.
    ///
    /// Each buffer is allocated to exactly its declared size up front.
    pub fn new(sizes: Vec<usize>) -> Self {
        let buffers = sizes.iter().map(|&len| vec![0.0; len]).collect();
        Self { buffers, sizes }
    }

    /// Number of slots declared at construction.
    #[inline]
    pub fn n_slots(&self) -> usize {
        self.sizes.len()
    }

    /// Borrow slot `slot` with its previous contents intact.
    ///
    /// `len` must equal the size declared for the slot at construction.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is out of range or `len` differs from the declared
    /// size.
    pub fn raw_buffer(&mut self, slot: usize, len: usize) -> &mut [f64] {
        self.check(slot, len);
        &mut self.buffers[slot]
    }

    /// Borrow slot `slot`, zero-filled.
    ///
    /// Same contract as [`WorkvectorPool::raw_buffer`].
    pub fn zero_buffer(&mut self, slot: usize, len: usize) -> &mut [f64] {
        self.check(slot, len);
        let buffer = &mut self.buffers[slot];
        buffer.fill(0.0);
        buffer
    }

    /// Borrow all `N` slots at once, each at its declared size.
    ///
    /// Estimators that need several work vectors in the same expression
    /// use this to split the pool into disjoint mutable views. `lens`
    /// must repeat the declared sizes in slot order.
    ///
    /// # Panics
    ///
    /// Panics if `N` differs from the number of declared slots or any
    /// length differs from the declared one.
    pub fn raw_buffers<const N: usize>(&mut self, lens: [usize; N]) -> [&mut [f64]; N] {
        assert!(
            N == self.sizes.len(),
            "work vector pool has {} slots, {} requested",
            self.sizes.len(),
            N
        );
        let views: Vec<&mut [f64]> = self
            .buffers
            .iter_mut()
            .zip(self.sizes.iter())
            .zip(lens.iter())
            .enumerate()
            .map(|(slot, ((buffer, &declared), &len))| {
                assert!(
                    len == declared,
                    "work vector slot {slot}: requested length {len}, declared {declared}"
                );
                buffer.as_mut_slice()
            })
            .collect();
        match views.try_into() {
            Ok(array) => array,
            Err(_) => unreachable!("slot count checked above"),
        }
    }

    fn check(&self, slot: usize, len: usize) {
        assert!(
            slot < self.sizes.len(),
            "work vector slot {slot} out of range (pool has {})",
            self.sizes.len()
        );
        assert!(
            len == self.sizes[slot],
            "work vector slot {slot}: requested length {len}, declared {}",
            self.sizes[slot]
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_keep_declared_sizes() {
        let mut pool = WorkvectorPool::new(vec![4, 7]);
        assert_eq!(pool.n_slots(), 2);
        assert_eq!(pool.raw_buffer(0, 4).len(), 4);
        assert_eq!(pool.raw_buffer(1, 7).len(), 7);
    }

    #[test]
    fn zero_buffer_clears_previous_contents() {
        let mut pool = WorkvectorPool::new(vec![3]);
        pool.raw_buffer(0, 3).fill(5.0);
        assert!(pool.zero_buffer(0, 3).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn raw_buffer_preserves_previous_contents() {
        let mut pool = WorkvectorPool::new(vec![3]);
        pool.raw_buffer(0, 3)[1] = 2.5;
        assert_eq!(pool.raw_buffer(0, 3)[1], 2.5);
    }

    #[test]
    fn split_borrows_are_disjoint() {
        let mut pool = WorkvectorPool::new(vec![2, 3, 4]);
        let [a, b, c] = pool.raw_buffers([2, 3, 4]);
        a[0] = 1.0;
        b[0] = 2.0;
        c[0] = 3.0;
        assert_eq!(pool.raw_buffer(1, 3)[0], 2.0);
    }

    #[test]
    #[should_panic(expected = "requested length")]
    fn wrong_size_is_a_programming_error() {
        let mut pool = WorkvectorPool::new(vec![4]);
        let _ = pool.raw_buffer(0, 5);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn wrong_slot_is_a_programming_error() {
        let mut pool = WorkvectorPool::new(vec![4]);
        let _ = pool.raw_buffer(1, 4);
    }
}
