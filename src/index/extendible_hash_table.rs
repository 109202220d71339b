use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::buffer::{BufferPoolManager, WritePageGuard};
use crate::common::{PageId, Result};
use crate::storage::page::{
    BucketPage, BucketPageRef, DirectoryPage, DirectoryPageRef, HeaderPage, HeaderPageRef,
};

use super::{KeyComparator, KeyHasher};

/// Disk-resident extendible hash table over fixed-width keys and values.
///
/// Routing is two-level: the header page maps the top `header_max_depth`
/// bits of a key's hash to a directory page, and the directory maps the low
/// `global_depth` bits to a bucket page. Buckets split (doubling the
/// directory when needed) on overflow and merge with their split image when
/// one side drains, shrinking the directory when no bucket uses its top bit.
///
/// A table-wide reader/writer lock serializes writers against each other
/// and against readers; per-page latches are still taken through the guards
/// underneath it. The buffer pool must have at least three frames (a
/// directory and two buckets are held across a split).
pub struct DiskExtendibleHashTable<C: KeyComparator, H: KeyHasher> {
    bpm: Arc<BufferPoolManager>,
    cmp: C,
    hasher: H,
    header_page_id: PageId,
    directory_max_depth: u32,
    bucket_max_size: u32,
    key_size: usize,
    value_size: usize,
    rwlatch: RwLock<()>,
}

impl<C: KeyComparator, H: KeyHasher> DiskExtendibleHashTable<C, H> {
    /// Creates a table, eagerly allocating and initializing its header page.
    /// Directories and buckets are allocated lazily on first insert.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bpm: Arc<BufferPoolManager>,
        cmp: C,
        hasher: H,
        header_max_depth: u32,
        directory_max_depth: u32,
        bucket_max_size: u32,
        key_size: usize,
        value_size: usize,
    ) -> Result<Self> {
        let header_page_id = bpm.new_page()?;

        {
            let mut guard = bpm.fetch_page_basic(header_page_id)?.upgrade_write();
            HeaderPage::new(guard.data_mut()).init(header_max_depth);
        }

        Ok(Self {
            bpm,
            cmp,
            hasher,
            header_page_id,
            directory_max_depth,
            bucket_max_size,
            key_size,
            value_size,
            rwlatch: RwLock::new(()),
        })
    }

    pub fn header_page_id(&self) -> PageId {
        self.header_page_id
    }

    /// Looks up the value stored under the key.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        assert_eq!(key.len(), self.key_size);
        let _lock = self.rwlatch.read();
        let hash = self.hasher.hash_key(key);

        let directory_page_id = {
            let guard = self.bpm.fetch_page_read(self.header_page_id)?;
            let header = HeaderPageRef::new(guard.data());
            header.directory_page_id(header.hash_to_directory_index(hash))
        };
        if !directory_page_id.is_valid() {
            return Ok(None);
        }

        let bucket_page_id = {
            let guard = self.bpm.fetch_page_read(directory_page_id)?;
            let directory = DirectoryPageRef::new(guard.data());
            directory.bucket_page_id(directory.hash_to_bucket_index(hash))
        };
        if !bucket_page_id.is_valid() {
            return Ok(None);
        }

        let guard = self.bpm.fetch_page_read(bucket_page_id)?;
        let bucket = BucketPageRef::new(guard.data(), self.key_size, self.value_size);
        Ok(bucket.lookup(key, &self.cmp).map(|value| value.to_vec()))
    }

    /// Inserts the key/value pair. Returns false when the key is already
    /// present, or when the bucket cannot split because its directory is at
    /// max depth (the pair is not stored).
    pub fn insert(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        assert_eq!(key.len(), self.key_size);
        assert_eq!(value.len(), self.value_size);
        let _lock = self.rwlatch.write();
        let hash = self.hasher.hash_key(key);

        let (directory_page_id, is_new_directory) = {
            let mut guard = self.bpm.fetch_page_write(self.header_page_id)?;
            let mut header = HeaderPage::new(guard.data_mut());
            let directory_idx = header.hash_to_directory_index(hash);
            let page_id = header.directory_page_id(directory_idx);
            if page_id.is_valid() {
                (page_id, false)
            } else {
                let page_id = self.bpm.new_page()?;
                header.set_directory_page_id(directory_idx, page_id);
                (page_id, true)
            }
        };

        let mut directory_guard = self.bpm.fetch_page_write(directory_page_id)?;
        if is_new_directory {
            DirectoryPage::new(directory_guard.data_mut()).init(self.directory_max_depth);
            debug!(
                directory_page_id = directory_page_id.as_u32(),
                "created directory"
            );
        }

        self.insert_into_directory(&mut directory_guard, hash, key, value)
    }

    /// Removes the key. Returns false when it is absent. Draining a bucket
    /// merges it with its split image while possible and then shrinks the
    /// directory as far as the remaining local depths allow.
    pub fn remove(&self, key: &[u8]) -> Result<bool> {
        assert_eq!(key.len(), self.key_size);
        let _lock = self.rwlatch.write();
        let hash = self.hasher.hash_key(key);

        let directory_page_id = {
            let guard = self.bpm.fetch_page_read(self.header_page_id)?;
            let header = HeaderPageRef::new(guard.data());
            header.directory_page_id(header.hash_to_directory_index(hash))
        };
        if !directory_page_id.is_valid() {
            return Ok(false);
        }

        let mut directory_guard = self.bpm.fetch_page_write(directory_page_id)?;

        let (bucket_idx, bucket_page_id) = {
            let directory = DirectoryPageRef::new(directory_guard.data());
            let bucket_idx = directory.hash_to_bucket_index(hash);
            (bucket_idx, directory.bucket_page_id(bucket_idx))
        };
        if !bucket_page_id.is_valid() {
            return Ok(false);
        }

        let mut bucket_guard = self.bpm.fetch_page_write(bucket_page_id)?;
        {
            let mut bucket =
                BucketPage::new(bucket_guard.data_mut(), self.key_size, self.value_size);
            if !bucket.remove(key, &self.cmp) {
                return Ok(false);
            }
        }

        self.merge_buckets(&mut directory_guard, &mut bucket_guard, bucket_idx)?;

        // Shrink while no live bucket needs the top global-depth bit
        while DirectoryPageRef::new(directory_guard.data()).can_shrink() {
            DirectoryPage::new(directory_guard.data_mut()).decr_global_depth();
        }

        Ok(true)
    }

    /// Checks the bookkeeping invariants of every allocated directory.
    /// Panics on violation; intended for tests and debugging.
    pub fn verify_integrity(&self) -> Result<()> {
        let _lock = self.rwlatch.read();

        let header_guard = self.bpm.fetch_page_read(self.header_page_id)?;
        let header = HeaderPageRef::new(header_guard.data());

        for directory_idx in 0..header.max_size() {
            let directory_page_id = header.directory_page_id(directory_idx);
            if !directory_page_id.is_valid() {
                continue;
            }
            let guard = self.bpm.fetch_page_read(directory_page_id)?;
            DirectoryPageRef::new(guard.data()).verify_integrity();
        }

        Ok(())
    }

    /// Split-and-retry loop. Each pass either stores the pair, rejects it
    /// (duplicate or directory overflow), or raises the local depth of the
    /// target bucket by one; depths are capped by the directory max depth,
    /// so the loop terminates.
    fn insert_into_directory(
        &self,
        directory_guard: &mut WritePageGuard,
        hash: u32,
        key: &[u8],
        value: &[u8],
    ) -> Result<bool> {
        loop {
            let (bucket_idx, bucket_page_id, is_new_bucket) = {
                let mut directory = DirectoryPage::new(directory_guard.data_mut());
                let bucket_idx = directory.hash_to_bucket_index(hash);
                let page_id = directory.bucket_page_id(bucket_idx);
                if page_id.is_valid() {
                    (bucket_idx, page_id, false)
                } else {
                    // Buckets are only missing before the first insert, when
                    // the directory is a single slot
                    debug_assert!(directory.size() == 1 && bucket_idx == 0);
                    let page_id = self.bpm.new_page()?;
                    directory.set_bucket_page_id(bucket_idx, page_id);
                    (bucket_idx, page_id, true)
                }
            };

            let mut bucket_guard = self.bpm.fetch_page_write(bucket_page_id)?;
            {
                let mut bucket =
                    BucketPage::new(bucket_guard.data_mut(), self.key_size, self.value_size);
                if is_new_bucket {
                    bucket.init(self.bucket_max_size);
                }
                if !bucket.is_full() {
                    return Ok(bucket.insert(key, value, &self.cmp));
                }
                // Splitting cannot separate a key from itself; reject the
                // duplicate before touching the directory
                if bucket.lookup(key, &self.cmp).is_some() {
                    return Ok(false);
                }
            }

            {
                let mut directory = DirectoryPage::new(directory_guard.data_mut());
                if directory.local_depth(bucket_idx) == directory.global_depth() {
                    if directory.global_depth() == directory.max_depth() {
                        return Ok(false);
                    }
                    directory.incr_global_depth();
                    debug!(
                        global_depth = directory.global_depth(),
                        "directory doubled"
                    );
                }
            }

            self.split_bucket(directory_guard, &mut bucket_guard, hash, bucket_idx)?;
        }
    }

    /// Splits the full bucket at `bucket_idx`: entries whose hash has the
    /// new depth bit set move to a fresh sibling, every directory slot in
    /// the bucket's old equivalence class gains one level of local depth,
    /// and the high half of the class is repointed at the sibling.
    fn split_bucket(
        &self,
        directory_guard: &mut WritePageGuard,
        bucket_guard: &mut WritePageGuard,
        hash: u32,
        bucket_idx: usize,
    ) -> Result<()> {
        let local_depth = DirectoryPageRef::new(directory_guard.data()).local_depth(bucket_idx);
        let new_mask: u32 = 1 << local_depth;

        let sibling_page_id = self.bpm.new_page()?;
        let mut sibling_guard = self.bpm.fetch_page_write(sibling_page_id)?;

        {
            let mut bucket =
                BucketPage::new(bucket_guard.data_mut(), self.key_size, self.value_size);
            let mut sibling =
                BucketPage::new(sibling_guard.data_mut(), self.key_size, self.value_size);
            sibling.init(self.bucket_max_size);

            let mut idx = bucket.size();
            while idx > 0 {
                idx -= 1;
                if self.hasher.hash_key(bucket.key_at(idx)) & new_mask != 0 {
                    sibling.insert(bucket.key_at(idx), bucket.value_at(idx), &self.cmp);
                    bucket.remove_at(idx);
                }
            }
        }

        let mut directory = DirectoryPage::new(directory_guard.data_mut());
        let size = directory.size();
        let mut idx = (hash as usize) & ((new_mask as usize) - 1);
        while idx < size {
            directory.incr_local_depth(idx);
            if idx & (new_mask as usize) != 0 {
                directory.set_bucket_page_id(idx, sibling_page_id);
            }
            idx += new_mask as usize;
        }

        debug!(
            bucket_page_id = bucket_guard.page_id().as_u32(),
            sibling_page_id = sibling_page_id.as_u32(),
            local_depth = local_depth + 1,
            "bucket split"
        );

        Ok(())
    }

    /// Merge loop after a removal: while the bucket's split image has the
    /// same local depth and either side is empty, fold the image into the
    /// surviving bucket, relink the merged equivalence class, and delete
    /// the empty page.
    fn merge_buckets(
        &self,
        directory_guard: &mut WritePageGuard,
        bucket_guard: &mut WritePageGuard,
        bucket_idx: usize,
    ) -> Result<()> {
        let bucket_page_id = bucket_guard.page_id();

        loop {
            let (depth, image_page_id) = {
                let directory = DirectoryPageRef::new(directory_guard.data());
                let depth = directory.local_depth(bucket_idx);
                if depth == 0 {
                    return Ok(());
                }
                let image_idx = bucket_idx ^ (1usize << (depth - 1));
                if directory.local_depth(image_idx) != depth {
                    return Ok(());
                }
                (depth, directory.bucket_page_id(image_idx))
            };

            let bucket_empty =
                BucketPageRef::new(bucket_guard.data(), self.key_size, self.value_size).is_empty();

            {
                let image_guard = self.bpm.fetch_page_read(image_page_id)?;
                let image =
                    BucketPageRef::new(image_guard.data(), self.key_size, self.value_size);
                if !bucket_empty && !image.is_empty() {
                    return Ok(());
                }

                if !image.is_empty() {
                    // Empty bucket absorbs the image's entries
                    let mut bucket =
                        BucketPage::new(bucket_guard.data_mut(), self.key_size, self.value_size);
                    for idx in 0..image.size() {
                        bucket.insert(image.key_at(idx), image.value_at(idx), &self.cmp);
                    }
                }
            }

            self.bpm.delete_page(image_page_id)?;

            // Relink the whole merged class (both halves) to the survivor
            // at the reduced depth
            let mut directory = DirectoryPage::new(directory_guard.data_mut());
            let step = 1usize << (depth - 1);
            let size = directory.size();
            let mut idx = bucket_idx & (step - 1);
            while idx < size {
                directory.set_local_depth(idx, depth - 1);
                directory.set_bucket_page_id(idx, bucket_page_id);
                idx += step;
            }

            debug!(
                bucket_page_id = bucket_page_id.as_u32(),
                image_page_id = image_page_id.as_u32(),
                local_depth = depth - 1,
                "buckets merged"
            );
        }
    }
}
