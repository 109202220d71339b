use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};

use super::FrameHeader;

/// Callback type for releasing a page guard: receives the page id and
/// whether the guard observed a mutable access
pub(crate) type ReleaseCallback = Box<dyn FnOnce(PageId, bool) + Send + Sync>;

/// Shared state of every guard variant: the pin it owns and the release
/// callback that gives the pin back exactly once.
struct PageGuardBase {
    page_id: PageId,
    /// Kept alive for the guard's lifetime; latch guards below borrow it
    frame: Arc<FrameHeader>,
    release_callback: Option<ReleaseCallback>,
    is_dirty: bool,
}

impl PageGuardBase {
    fn new(page_id: PageId, frame: Arc<FrameHeader>, release_callback: ReleaseCallback) -> Self {
        Self {
            page_id,
            frame,
            release_callback: Some(release_callback),
            is_dirty: false,
        }
    }

    fn release(&mut self) {
        if let Some(callback) = self.release_callback.take() {
            callback(self.page_id, self.is_dirty);
        }
    }
}

fn read_latch(frame: &Arc<FrameHeader>) -> RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>> {
    let guard = frame.data.read();
    // Safety: the guard never outlives its PageGuardBase, whose Arc keeps
    // the frame (and its RwLock) alive
    unsafe { std::mem::transmute(guard) }
}

fn write_latch(frame: &Arc<FrameHeader>) -> RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>> {
    let guard = frame.data.write();
    // Safety: as above
    unsafe { std::mem::transmute(guard) }
}

/// RAII handle owning a pin on a page without holding its latch.
/// Upgrade to a read or write guard to access the page bytes; an unlatched
/// view of the data is deliberately not offered.
pub struct BasicPageGuard {
    base: Option<PageGuardBase>,
}

impl BasicPageGuard {
    pub(crate) fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        release_callback: ReleaseCallback,
    ) -> Self {
        Self {
            base: Some(PageGuardBase::new(page_id, frame, release_callback)),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.base.as_ref().unwrap().page_id
    }

    /// Acquires the read latch, consuming this guard. The pin carries over.
    pub fn upgrade_read(mut self) -> ReadPageGuard {
        let base = self.base.take().unwrap();
        let data_guard = read_latch(&base.frame);
        ReadPageGuard {
            base,
            data_guard: Some(data_guard),
        }
    }

    /// Acquires the write latch, consuming this guard. The pin carries over.
    pub fn upgrade_write(mut self) -> WritePageGuard {
        let base = self.base.take().unwrap();
        let data_guard = write_latch(&base.frame);
        WritePageGuard {
            base,
            data_guard: Some(data_guard),
        }
    }
}

impl Drop for BasicPageGuard {
    fn drop(&mut self) {
        if let Some(base) = self.base.as_mut() {
            base.release();
        }
    }
}

/// RAII guard for read-only access to a page.
/// Releases the read latch, then unpins, when dropped.
pub struct ReadPageGuard {
    base: PageGuardBase,
    data_guard: Option<RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl ReadPageGuard {
    pub(crate) fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        release_callback: ReleaseCallback,
    ) -> Self {
        let base = PageGuardBase::new(page_id, frame, release_callback);
        let data_guard = read_latch(&base.frame);
        Self {
            base,
            data_guard: Some(data_guard),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.base.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data_guard.as_ref().unwrap()[..]
    }

    /// Drops this guard, releasing the page.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        // Latch first, then pin
        self.data_guard.take();
        self.base.release();
    }
}

/// RAII guard for read-write access to a page.
/// Taking a mutable view marks the page dirty; the dirty bit is handed to
/// the pool when the guard drops.
pub struct WritePageGuard {
    base: PageGuardBase,
    data_guard: Option<RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl WritePageGuard {
    pub(crate) fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        release_callback: ReleaseCallback,
    ) -> Self {
        let base = PageGuardBase::new(page_id, frame, release_callback);
        let data_guard = write_latch(&base.frame);
        Self {
            base,
            data_guard: Some(data_guard),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.base.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data_guard.as_ref().unwrap()[..]
    }

    /// Returns a mutable view of the page data and marks the guard dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.base.is_dirty = true;
        &mut self.data_guard.as_mut().unwrap()[..]
    }

    /// Drops this guard, releasing the page.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        // Latch first, then pin
        self.data_guard.take();
        self.base.release();
    }
}
