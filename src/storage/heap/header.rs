/// The occupancy bitmap at the start of a heap page.
/// Bit `slot % 8` of byte `slot / 8` is set if the slot holds a tuple.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotBitmap {
    bits: Vec<u8>,
    num_slots: usize,
}

/// Returns how many tuples of `tuple_size` bytes fit on a page, accounting
/// for one header bit per tuple.
pub fn slots_per_page(page_size: usize, tuple_size: usize) -> usize {
    (page_size * 8) / (tuple_size * 8 + 1)
}

/// Returns the size in bytes of the bitmap
pub fn bitmap_size(num_slots: usize) -> usize {
    (num_slots + 7) / 8
}

impl SlotBitmap {
    pub fn empty(num_slots: usize) -> Self {
        Self {
            bits: vec![0u8; bitmap_size(num_slots)],
            num_slots,
        }
    }

    pub fn from_bytes(bytes: &[u8], num_slots: usize) -> Self {
        Self {
            bits: bytes[..bitmap_size(num_slots)].to_vec(),
            num_slots,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    /// Returns whether the n-th slot is occupied
    pub fn is_set(&self, slot: usize) -> bool {
        let byte = self.bits[slot / 8];
        let mask = 1 << (slot % 8);
        (byte & mask) != 0
    }

    pub fn set(&mut self, slot: usize, occupied: bool) {
        let mask = 1 << (slot % 8);
        if occupied {
            self.bits[slot / 8] |= mask;
        } else {
            self.bits[slot / 8] &= !mask;
        }
    }

    /// Lowest unoccupied slot, if any.
    pub fn first_free(&self) -> Option<usize> {
        (0..self.num_slots).find(|slot| !self.is_set(*slot))
    }

    pub fn count_free(&self) -> usize {
        (0..self.num_slots).filter(|slot| !self.is_set(*slot)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::{bitmap_size, slots_per_page, SlotBitmap};

    #[test]
    fn layout_formulas() {
        assert_eq!(slots_per_page(4096, 20), 203);
        assert_eq!(bitmap_size(203), 26);
        assert_eq!(slots_per_page(4096, 4), 992);
        assert_eq!(bitmap_size(992), 124);
        assert_eq!(bitmap_size(8), 1);
        assert_eq!(bitmap_size(9), 2);
    }

    #[test]
    fn bits_are_lsb_first() {
        let mut bitmap = SlotBitmap::empty(12);
        bitmap.set(0, true);
        bitmap.set(9, true);
        assert_eq!(bitmap.as_bytes(), &[0b0000_0001, 0b0000_0010]);
        assert_eq!(bitmap.first_free(), Some(1));
        assert_eq!(bitmap.count_free(), 10);

        bitmap.set(0, false);
        assert!(!bitmap.is_set(0));
        assert_eq!(bitmap.first_free(), Some(0));
    }
}
