use std::cmp::Ordering;

use crate::common::PAGE_SIZE;
use crate::index::KeyComparator;

// Layout: size (u32), max_size (u32), then up to max_size contiguous
// (key, value) entries. Key and value widths are fixed per table instance
// and supplied by the view's constructor.
const SIZE_OFFSET: usize = 0;
const MAX_SIZE_OFFSET: usize = 4;
const ENTRIES_OFFSET: usize = 8;

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
}

fn write_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Mutable view of a hash bucket page: an unordered array of fixed-width
/// key/value entries with unique keys.
pub struct BucketPage<'a> {
    data: &'a mut [u8],
    key_size: usize,
    value_size: usize,
}

impl<'a> BucketPage<'a> {
    pub fn new(data: &'a mut [u8], key_size: usize, value_size: usize) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        assert!(key_size > 0 && value_size > 0);
        Self {
            data,
            key_size,
            value_size,
        }
    }

    /// Initializes an empty bucket. The requested max size is clamped to
    /// what the page can physically hold.
    pub fn init(&mut self, max_size: u32) {
        let capacity = ((PAGE_SIZE - ENTRIES_OFFSET) / (self.key_size + self.value_size)) as u32;
        self.data.fill(0);
        write_u32(self.data, SIZE_OFFSET, 0);
        write_u32(self.data, MAX_SIZE_OFFSET, max_size.min(capacity));
    }

    pub fn size(&self) -> u32 {
        read_u32(self.data, SIZE_OFFSET)
    }

    pub fn max_size(&self) -> u32 {
        read_u32(self.data, MAX_SIZE_OFFSET)
    }

    pub fn is_full(&self) -> bool {
        self.size() == self.max_size()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn key_at(&self, idx: u32) -> &[u8] {
        let offset = self.entry_offset(idx);
        &self.data[offset..offset + self.key_size]
    }

    pub fn value_at(&self, idx: u32) -> &[u8] {
        let offset = self.entry_offset(idx) + self.key_size;
        &self.data[offset..offset + self.value_size]
    }

    /// Linear scan under the comparator
    pub fn lookup(&self, key: &[u8], cmp: &dyn KeyComparator) -> Option<&[u8]> {
        for idx in 0..self.size() {
            if cmp.compare(key, self.key_at(idx)) == Ordering::Equal {
                return Some(self.value_at(idx));
            }
        }
        None
    }

    /// Appends the entry. Fails on a full bucket or a duplicate key.
    pub fn insert(&mut self, key: &[u8], value: &[u8], cmp: &dyn KeyComparator) -> bool {
        assert_eq!(key.len(), self.key_size);
        assert_eq!(value.len(), self.value_size);

        if self.is_full() || self.lookup(key, cmp).is_some() {
            return false;
        }

        let size = self.size();
        let offset = self.entry_offset(size);
        self.data[offset..offset + self.key_size].copy_from_slice(key);
        self.data[offset + self.key_size..offset + self.key_size + self.value_size]
            .copy_from_slice(value);
        write_u32(self.data, SIZE_OFFSET, size + 1);
        true
    }

    /// Removes the entry for the key, if present. Order is not preserved:
    /// the last entry is swapped into the hole.
    pub fn remove(&mut self, key: &[u8], cmp: &dyn KeyComparator) -> bool {
        for idx in 0..self.size() {
            if cmp.compare(key, self.key_at(idx)) == Ordering::Equal {
                self.remove_at(idx);
                return true;
            }
        }
        false
    }

    /// Removes the entry at the index by swapping the last entry into it.
    pub fn remove_at(&mut self, idx: u32) {
        let size = self.size();
        if idx >= size {
            return;
        }

        let last = size - 1;
        if idx < last {
            let entry_size = self.key_size + self.value_size;
            let src = self.entry_offset(last);
            let dst = self.entry_offset(idx);
            self.data.copy_within(src..src + entry_size, dst);
        }
        write_u32(self.data, SIZE_OFFSET, last);
    }

    fn entry_offset(&self, idx: u32) -> usize {
        ENTRIES_OFFSET + (idx as usize) * (self.key_size + self.value_size)
    }
}

/// Read-only view of a hash bucket page
pub struct BucketPageRef<'a> {
    data: &'a [u8],
    key_size: usize,
    value_size: usize,
}

impl<'a> BucketPageRef<'a> {
    pub fn new(data: &'a [u8], key_size: usize, value_size: usize) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        assert!(key_size > 0 && value_size > 0);
        Self {
            data,
            key_size,
            value_size,
        }
    }

    pub fn size(&self) -> u32 {
        read_u32(self.data, SIZE_OFFSET)
    }

    pub fn max_size(&self) -> u32 {
        read_u32(self.data, MAX_SIZE_OFFSET)
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn key_at(&self, idx: u32) -> &[u8] {
        let offset = self.entry_offset(idx);
        &self.data[offset..offset + self.key_size]
    }

    pub fn value_at(&self, idx: u32) -> &[u8] {
        let offset = self.entry_offset(idx) + self.key_size;
        &self.data[offset..offset + self.value_size]
    }

    pub fn lookup(&self, key: &[u8], cmp: &dyn KeyComparator) -> Option<&[u8]> {
        for idx in 0..self.size() {
            if cmp.compare(key, self.key_at(idx)) == Ordering::Equal {
                return Some(self.value_at(idx));
            }
        }
        None
    }

    fn entry_offset(&self, idx: u32) -> usize {
        ENTRIES_OFFSET + (idx as usize) * (self.key_size + self.value_size)
    }
}
