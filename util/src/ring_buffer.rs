//! Fixed capacity circular buffer

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A circular buffer of `N` samples backed by a fixed array.
///
/// Samples are written at the push count modulo `N`, once full the oldest
/// sample is overwritten. Indexing is oldest-first. `N` must be non-zero.
#[derive(Debug, Clone, Copy)]
pub struct RingBuffer<const N: usize> {
    data: [f64; N],
    num_pushed: u64
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<const N: usize> RingBuffer<N> {
    pub fn new() -> Self {
        Self {
            data: [0.0; N],
            num_pushed: 0
        }
    }

    /// Push a new sample, evicting the oldest if the buffer is full.
    pub fn push(&mut self, value: f64) {
        let idx = (self.num_pushed % N as u64) as usize;
        self.data[idx] = value;
        self.num_pushed += 1;
    }

    /// Number of samples currently held.
    pub fn len(&self) -> usize {
        (self.num_pushed as usize).min(N)
    }

    pub fn is_empty(&self) -> bool {
        self.num_pushed == 0
    }

    pub fn capacity(&self) -> usize {
        N
    }

    /// Get the `index`th oldest sample, or `None` if there aren't that many.
    pub fn get(&self, index: usize) -> Option<f64> {
        if index >= self.len() {
            return None
        }

        let start = if self.num_pushed > N as u64 {
            (self.num_pushed % N as u64) as usize
        }
        else {
            0
        };

        Some(self.data[(start + index) % N])
    }

    /// Get the `index`th oldest sample, saturating at the newest sample.
    ///
    /// Returns `None` only if the buffer is empty.
    pub fn get_saturating(&self, index: usize) -> Option<f64> {
        if self.is_empty() {
            return None
        }

        self.get(index.min(self.len() - 1))
    }

    /// Iterate over the samples, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fill_and_evict() {
        let mut buf = RingBuffer::<3>::new();
        assert!(buf.is_empty());
        assert_eq!(buf.get_saturating(0), None);

        buf.push(1.0);
        buf.push(2.0);
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.get(0), Some(1.0));
        assert_eq!(buf.get(2), None);
        assert_eq!(buf.get_saturating(5), Some(2.0));

        buf.push(3.0);
        buf.push(4.0);
        buf.push(5.0);
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.capacity(), 3);
        assert_eq!(buf.iter().collect::<Vec<_>>(), vec![3.0, 4.0, 5.0]);
    }
}
