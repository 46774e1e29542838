use std::sync::Arc;

use super::header::{bitmap_size, slots_per_page, SlotBitmap};
use crate::common::PageId;
use crate::error::{Result, StorageError};
use crate::storage::RecordId;
use crate::tuple::schema::Schema;
use crate::tuple::Tuple;

/// A fixed-size page of a heap file.
///
/// Layout: `[occupancy bitmap][slot 0]...[slot n-1]`, where every slot is
/// `schema.byte_size()` bytes wide. The page only knows its own slots, not how
/// many pages its file has.
#[derive(Clone, Debug, PartialEq)]
pub struct HeapPage {
    page_id: PageId,
    schema: Arc<Schema>,
    page_size: usize,
    header: SlotBitmap,
    tuples: Vec<Option<Tuple>>,
}

/// Bytes of a page without any tuples.
pub fn empty_page_data(page_size: usize) -> Vec<u8> {
    vec![0u8; page_size]
}

impl HeapPage {
    pub fn empty(page_id: PageId, schema: Arc<Schema>, page_size: usize) -> Self {
        let num_slots = slots_per_page(page_size, schema.byte_size());
        Self {
            page_id,
            schema,
            page_size,
            header: SlotBitmap::empty(num_slots),
            tuples: vec![None; num_slots],
        }
    }

    /// Parses a page from its on-disk bytes.
    pub fn decode(
        page_id: PageId,
        schema: Arc<Schema>,
        bytes: &[u8],
        page_size: usize,
    ) -> Result<Self> {
        if bytes.len() != page_size {
            return Err(StorageError::corrupt_page(
                page_id,
                format!("expected {} bytes, got {}", page_size, bytes.len()),
            ));
        }
        schema.ensure_not_empty()?;

        let tuple_size = schema.byte_size();
        let num_slots = slots_per_page(page_size, tuple_size);
        let header = SlotBitmap::from_bytes(bytes, num_slots);
        let slots_start = bitmap_size(num_slots);

        let mut tuples = Vec::with_capacity(num_slots);
        for slot in 0..num_slots {
            if !header.is_set(slot) {
                tuples.push(None);
                continue;
            }
            let start = slots_start + slot * tuple_size;
            let mut tuple = Tuple::parse(&schema, &bytes[start..start + tuple_size])
                .ok_or_else(|| {
                    StorageError::corrupt_page(page_id, format!("slot {} does not decode", slot))
                })?;
            tuple.set_record_id(Some(RecordId::new(page_id, slot)));
            tuples.push(Some(tuple));
        }

        Ok(Self {
            page_id,
            schema,
            page_size,
            header,
            tuples,
        })
    }

    /// Serializes this page to exactly `page_size` bytes. Free slots are zeroed.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut data = empty_page_data(self.page_size);
        let header = self.header.as_bytes();
        data[..header.len()].copy_from_slice(header);

        let tuple_size = self.schema.byte_size();
        let slots_start = header.len();
        for (slot, tuple) in self.tuples.iter().enumerate() {
            if let Some(tuple) = tuple {
                let start = slots_start + slot * tuple_size;
                tuple.serialize(&mut data[start..start + tuple_size])?;
            }
        }
        Ok(data)
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn num_slots(&self) -> usize {
        self.header.num_slots()
    }

    pub fn header_size(&self) -> usize {
        self.header.as_bytes().len()
    }

    pub fn empty_slot_count(&self) -> usize {
        self.header.count_free()
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        slot < self.num_slots() && self.header.is_set(slot)
    }

    /// Iterates the occupied slots in ascending order.
    /// Each call starts a fresh pass over the page.
    pub fn iter_tuples(&self) -> SlotIterator<'_> {
        SlotIterator {
            page: self,
            next_slot: 0,
        }
    }

    /// Stores a tuple in the lowest free slot and returns its new record id.
    pub fn insert_tuple(&mut self, mut tuple: Tuple) -> Result<RecordId> {
        self.schema.ensure_same_types(tuple.schema())?;
        if let Some(index) = tuple.values().position(|value| value.is_none()) {
            return Err(StorageError::UnsetField(index));
        }
        let slot = self
            .header
            .first_free()
            .ok_or(StorageError::PageFull(self.page_id))?;

        let record_id = RecordId::new(self.page_id, slot);
        tuple.set_record_id(Some(record_id));
        self.header.set(slot, true);
        self.tuples[slot] = Some(tuple);
        Ok(record_id)
    }

    /// Frees a slot. Only the occupancy bit matters, the slot's bytes are not
    /// part of the page anymore.
    pub fn delete_tuple_at_slot(&mut self, slot: usize) -> Result<Tuple> {
        if slot >= self.num_slots() {
            return Err(StorageError::SlotOutOfRange {
                page_id: self.page_id,
                slot,
                num_slots: self.num_slots(),
            });
        }
        if !self.header.is_set(slot) {
            return Err(StorageError::SlotNotOccupied {
                page_id: self.page_id,
                slot,
            });
        }
        self.header.set(slot, false);
        let mut tuple = self.tuples[slot].take().ok_or(StorageError::SlotNotOccupied {
            page_id: self.page_id,
            slot,
        })?;
        tuple.set_record_id(None);
        Ok(tuple)
    }

    /// Deletes the tuple its record id points at.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> Result<Tuple> {
        let record_id = tuple.record_id().ok_or(StorageError::MissingRecordId)?;
        if record_id.page_id() != self.page_id {
            return Err(StorageError::SlotNotOccupied {
                page_id: self.page_id,
                slot: record_id.slot(),
            });
        }
        self.delete_tuple_at_slot(record_id.slot())
    }
}

/// Walks the slots of a page, yielding copies of the stored tuples.
pub struct SlotIterator<'a> {
    page: &'a HeapPage,
    next_slot: usize,
}

impl<'a> Iterator for SlotIterator<'a> {
    type Item = Tuple;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next_slot < self.page.tuples.len() {
            let slot = self.next_slot;
            self.next_slot += 1;
            if let Some(tuple) = &self.page.tuples[slot] {
                return Some(tuple.clone());
            }
        }
        None
    }
}
