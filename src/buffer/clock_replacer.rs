use super::PoolPos;

/// ClockReplacer implements the clock page replacement policy for a buffer pool.
///
/// Which frames may be evicted at all is decided by the caller, the replacer
/// only decides the order in which evictable frames are chosen.
pub(in crate::buffer) struct ClockReplacer {
    pool_size: usize,
    clock_hand: PoolPos,
    ref_bits: Vec<bool>,
}

impl ClockReplacer {
    /// Construct a new ClockReplacer for a BufferPool with a given pool_size
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool_size,
            clock_hand: 0,
            ref_bits: vec![false; pool_size],
        }
    }

    /// The page at the given position in the pool was accessed
    pub fn record_access(&mut self, frame: PoolPos) {
        self.ref_bits[frame] = true;
    }

    /// The frame at the given position no longer holds a page
    pub fn remove(&mut self, frame: PoolPos) {
        self.ref_bits[frame] = false;
    }

    /// Returns None if no frame is evictable, else the next evictable frame
    /// whose reference bit is cleared. Gives every frame a second chance.
    pub fn find_victim(&mut self, evictable: impl Fn(PoolPos) -> bool) -> Option<PoolPos> {
        // the second round sees every reference bit cleared by the first
        for _ in 0..2 * self.pool_size {
            let frame = self.clock_hand;
            self.clock_hand = (self.clock_hand + 1) % self.pool_size;
            if !evictable(frame) {
                continue;
            }
            if !self.ref_bits[frame] {
                return Some(frame);
            } else {
                self.ref_bits[frame] = false;
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {

    use super::ClockReplacer;

    #[test]
    fn basic_test() {
        let mut clock_replacer = ClockReplacer::new(3);
        clock_replacer.record_access(0);
        clock_replacer.record_access(1);
        clock_replacer.record_access(2);

        let victim = clock_replacer.find_victim(|_| false);
        assert!(
            victim.is_none(),
            "There shouldn't be any victim if no frame is evictable"
        );

        // Every frame gets a second chance, then they are returned in clock order
        assert_eq!(clock_replacer.find_victim(|_| true), Some(0));
        assert_eq!(clock_replacer.find_victim(|_| true), Some(1));
        assert_eq!(clock_replacer.find_victim(|_| true), Some(2));

        // Only frame 2 is evictable
        clock_replacer.record_access(2);
        assert_eq!(clock_replacer.find_victim(|frame| frame == 2), Some(2));
    }

    #[test]
    fn correct_victim_order() {
        let mut clock_replacer = ClockReplacer::new(3);
        clock_replacer.record_access(0);
        clock_replacer.record_access(2);

        // Frame 1 was never accessed, so it's chosen right away
        assert_eq!(clock_replacer.find_victim(|_| true), Some(1));
        clock_replacer.record_access(1);

        // Frame 0 lost its reference bit in the previous sweep, frame 2 loses it now
        assert_eq!(clock_replacer.find_victim(|_| true), Some(0));
        // Frame 1 was recently used, so it appears later than frame 2
        assert_eq!(clock_replacer.find_victim(|_| true), Some(2));

        clock_replacer.record_access(1);
        clock_replacer.remove(1);
        assert_eq!(clock_replacer.find_victim(|frame| frame == 1), Some(1));
    }
}
