use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::common::{FrameId, PageId, QuarryError, Result, PAGE_SIZE};
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::page_guard::ReleaseCallback;
use super::{BasicPageGuard, FrameHeader, LruKReplacer, ReadPageGuard, WritePageGuard};

/// Page table and free list, guarded by the single pool mutex
struct PoolTables {
    /// Maps resident page IDs to frame IDs
    page_table: HashMap<PageId, FrameId>,
    /// Frames that are not currently bound to a page
    free_list: VecDeque<FrameId>,
}

/// State shared between the pool and the guard release callbacks
struct BufferPoolState {
    frames: Vec<Arc<FrameHeader>>,
    tables: Mutex<PoolTables>,
    replacer: LruKReplacer,
}

/// BufferPoolManager maps logical page ids onto a fixed set of in-memory
/// frames, fetching from and writing back to disk as needed. Frames are
/// chosen from a free list first and by LRU-K eviction after that.
///
/// Pinning is done exclusively through page guards: every fetch returns a
/// guard holding one pin, and dropping the guard gives it back, so the pin
/// count of any frame equals the number of live guards on it.
pub struct BufferPoolManager {
    /// Number of frames in the buffer pool
    pool_size: usize,
    state: Arc<BufferPoolState>,
    /// Disk scheduler for page I/O
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    /// Creates a new BufferPoolManager with the given pool size, k value for
    /// LRU-K, and disk manager.
    pub fn new(pool_size: usize, k: usize, disk_manager: Arc<DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(FrameHeader::new(frame_id)));
            free_list.push_back(frame_id);
        }

        let state = Arc::new(BufferPoolState {
            frames,
            tables: Mutex::new(PoolTables {
                page_table: HashMap::new(),
                free_list,
            }),
            replacer: LruKReplacer::new(k, pool_size),
        });

        Self {
            pool_size,
            state,
            disk_scheduler: DiskScheduler::new(disk_manager),
        }
    }

    /// Allocates a new page and installs it in the buffer pool.
    /// The page starts unpinned and evictable; fetch a guard to pin it.
    /// Fails with BufferPoolFull when no frame is free or evictable.
    pub fn new_page(&self) -> Result<PageId> {
        let frame_id = self.acquire_frame()?;

        let page_id = match self.disk_scheduler.disk_manager().allocate_page() {
            Ok(page_id) => page_id,
            Err(e) => {
                self.state.tables.lock().free_list.push_back(frame_id);
                return Err(e);
            }
        };

        let frame = &self.state.frames[frame_id.as_usize()];
        frame.set_page_id(page_id);

        let mut tables = self.state.tables.lock();
        tables.page_table.insert(page_id, frame_id);
        self.state.replacer.record_access(frame_id);
        self.state.replacer.set_evictable(frame_id, true)?;

        Ok(page_id)
    }

    /// Fetches a page without latching it. Useful as a staging handle to
    /// upgrade into a read or write guard.
    pub fn fetch_page_basic(&self, page_id: PageId) -> Result<BasicPageGuard> {
        let frame_id = self.fetch_frame(page_id)?;
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        Ok(BasicPageGuard::new(
            page_id,
            frame,
            self.release_callback(),
        ))
    }

    /// Fetches a page and acquires its read latch.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        let frame_id = self.fetch_frame(page_id)?;
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        Ok(ReadPageGuard::new(page_id, frame, self.release_callback()))
    }

    /// Fetches a page and acquires its write latch.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        let frame_id = self.fetch_frame(page_id)?;
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        Ok(WritePageGuard::new(page_id, frame, self.release_callback()))
    }

    /// Writes a page's bytes to disk regardless of its dirty flag, then
    /// clears the flag. Returns false if the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if !page_id.is_valid() {
            return Err(QuarryError::InvalidPageId(page_id));
        }

        let tables = self.state.tables.lock();

        if let Some(&frame_id) = tables.page_table.get(&page_id) {
            let frame = &self.state.frames[frame_id.as_usize()];

            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);

            self.disk_scheduler.schedule_write_sync(page_id, &data)?;
            frame.set_dirty(false);

            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Flushes every resident page to disk.
    pub fn flush_all_pages(&self) -> Result<()> {
        let tables = self.state.tables.lock();

        for (&page_id, &frame_id) in tables.page_table.iter() {
            let frame = &self.state.frames[frame_id.as_usize()];

            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);

            self.disk_scheduler.schedule_write_sync(page_id, &data)?;
            frame.set_dirty(false);
        }

        Ok(())
    }

    /// Deletes a page from the buffer pool and returns its id to the
    /// allocator. Deleting a non-resident page trivially succeeds; deleting
    /// a pinned page is an error.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut tables = self.state.tables.lock();

        let Some(&frame_id) = tables.page_table.get(&page_id) else {
            return Ok(true);
        };

        let frame = &self.state.frames[frame_id.as_usize()];
        if frame.pin_count() > 0 {
            return Err(QuarryError::PageStillPinned(page_id));
        }

        debug!(page_id = page_id.as_u32(), "deleting page");

        tables.page_table.remove(&page_id);
        frame.reset();
        self.state.replacer.remove(frame_id)?;
        tables.free_list.push_back(frame_id);

        self.disk_scheduler.disk_manager().deallocate_page(page_id)?;

        Ok(true)
    }

    /// Returns the pin count for a resident page.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let tables = self.state.tables.lock();

        tables
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.state.frames[frame_id.as_usize()].pin_count())
    }

    /// Returns the pool size.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Returns the number of free frames.
    pub fn free_frame_count(&self) -> usize {
        self.state.tables.lock().free_list.len()
    }

    /// Returns a reference to the underlying DiskManager.
    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        self.disk_scheduler.disk_manager()
    }

    /// Builds the callback through which a guard returns its pin.
    /// Runs under the pool mutex so the pin-count transition to zero and
    /// the evictable flip are atomic with respect to fetches.
    fn release_callback(&self) -> ReleaseCallback {
        let state = Arc::clone(&self.state);
        Box::new(move |page_id, is_dirty| {
            let tables = state.tables.lock();
            if let Some(&frame_id) = tables.page_table.get(&page_id) {
                let frame = &state.frames[frame_id.as_usize()];
                if is_dirty {
                    frame.set_dirty(true);
                }
                if let Some(0) = frame.unpin() {
                    state
                        .replacer
                        .set_evictable(frame_id, true)
                        .expect("resident frame is tracked by the replacer");
                }
            }
        })
    }

    /// Brings a page into the pool (if not already resident), pins it, and
    /// returns its frame id.
    fn fetch_frame(&self, page_id: PageId) -> Result<FrameId> {
        if !page_id.is_valid() {
            return Err(QuarryError::InvalidPageId(page_id));
        }

        {
            let tables = self.state.tables.lock();
            if let Some(&frame_id) = tables.page_table.get(&page_id) {
                let frame = &self.state.frames[frame_id.as_usize()];
                frame.pin();
                self.state.replacer.record_access(frame_id);
                self.state.replacer.set_evictable(frame_id, false)?;
                return Ok(frame_id);
            }
        }

        // Miss: take a frame, then read from disk without holding the pool
        // mutex (the frame is unreachable until installed below)
        let frame_id = self.acquire_frame()?;

        let mut data = [0u8; PAGE_SIZE];
        self.disk_scheduler.schedule_read_sync(page_id, &mut data)?;

        let mut tables = self.state.tables.lock();

        // Re-check residency: a racing fetch may have installed the page
        // while we were reading
        if let Some(&winner_id) = tables.page_table.get(&page_id) {
            let frame = &self.state.frames[frame_id.as_usize()];
            frame.reset();
            tables.free_list.push_back(frame_id);

            let winner = &self.state.frames[winner_id.as_usize()];
            winner.pin();
            self.state.replacer.record_access(winner_id);
            self.state.replacer.set_evictable(winner_id, false)?;
            return Ok(winner_id);
        }

        let frame = &self.state.frames[frame_id.as_usize()];
        frame.set_page_id(page_id);
        frame.copy_from(&data);
        frame.set_dirty(false);
        frame.pin();

        tables.page_table.insert(page_id, frame_id);
        self.state.replacer.record_access(frame_id);
        self.state.replacer.set_evictable(frame_id, false)?;

        Ok(frame_id)
    }

    /// Takes a clean, unmapped frame: from the free list if possible,
    /// otherwise by evicting an LRU-K victim. A dirty victim is written
    /// back after the pool mutex is released; the frame is already out of
    /// the page table, free list, and replacer, so nothing else can reach
    /// it during the I/O.
    fn acquire_frame(&self) -> Result<FrameId> {
        let (frame_id, victim_page_id) = {
            let mut tables = self.state.tables.lock();

            if let Some(frame_id) = tables.free_list.pop_front() {
                (frame_id, None)
            } else {
                let frame_id = self
                    .state
                    .replacer
                    .evict()
                    .ok_or(QuarryError::BufferPoolFull)?;
                let frame = &self.state.frames[frame_id.as_usize()];
                let old_page_id = frame.page_id();
                tables.page_table.remove(&old_page_id);
                (frame_id, Some(old_page_id))
            }
        };

        if let Some(old_page_id) = victim_page_id {
            let frame = &self.state.frames[frame_id.as_usize()];

            if frame.is_dirty() {
                debug!(
                    page_id = old_page_id.as_u32(),
                    frame_id = frame_id.as_u32(),
                    "writing back dirty victim"
                );
                let mut data = [0u8; PAGE_SIZE];
                frame.copy_to(&mut data);
                self.disk_scheduler
                    .schedule_write_sync(old_page_id, &data)?;
            }

            frame.reset();
        }

        Ok(frame_id)
    }
}
