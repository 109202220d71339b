use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::common::{PageId, QuarryError, Result, PAGE_SIZE};

use super::DiskManager;

/// A single-page disk I/O request. Buffers are owned by the request (writes)
/// or by the completion message (reads), so nothing is borrowed across the
/// worker thread. Every submitted request completes exactly once.
pub enum DiskRequest {
    Read {
        page_id: PageId,
        /// Receives the filled page buffer, or None on a failed read
        completion: mpsc::Sender<Option<Box<[u8; PAGE_SIZE]>>>,
    },
    Write {
        page_id: PageId,
        data: Box<[u8; PAGE_SIZE]>,
        /// Receives whether the write succeeded
        completion: mpsc::Sender<bool>,
    },
}

/// DiskScheduler manages a background worker thread that processes disk I/O
/// requests submitted through a bounded queue.
pub struct DiskScheduler {
    /// The disk manager for actual I/O operations
    disk_manager: Arc<DiskManager>,
    /// Channel sender for queuing requests
    request_sender: Sender<DiskRequest>,
    /// Flag to signal shutdown
    shutdown: Arc<AtomicBool>,
    /// Handle to the background worker thread
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Creates a new DiskScheduler and spawns its worker thread.
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(128);
        let shutdown = Arc::new(AtomicBool::new(false));

        let dm = Arc::clone(&disk_manager);
        let stop = Arc::clone(&shutdown);
        let worker_handle = thread::spawn(move || Self::run_worker(dm, receiver, stop));

        Self {
            disk_manager,
            request_sender: sender,
            shutdown,
            worker_handle: Some(worker_handle),
        }
    }

    /// Queues a request for the background worker.
    pub fn schedule(&self, request: DiskRequest) -> Result<()> {
        self.request_sender
            .send(request)
            .map_err(|e| QuarryError::DiskScheduler(format!("failed to schedule request: {e}")))
    }

    /// Schedules a read request and waits for completion.
    pub fn schedule_read_sync(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (tx, rx) = mpsc::channel();
        self.schedule(DiskRequest::Read {
            page_id,
            completion: tx,
        })?;

        let buf = rx
            .recv()
            .map_err(|e| QuarryError::DiskScheduler(format!("completion lost: {e}")))?
            .ok_or_else(|| QuarryError::DiskScheduler(format!("read of {page_id} failed")))?;
        data.copy_from_slice(&buf[..]);
        Ok(())
    }

    /// Schedules a write request and waits for completion.
    pub fn schedule_write_sync(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let mut buf = Box::new([0u8; PAGE_SIZE]);
        buf.copy_from_slice(data);

        let (tx, rx) = mpsc::channel();
        self.schedule(DiskRequest::Write {
            page_id,
            data: buf,
            completion: tx,
        })?;

        let ok = rx
            .recv()
            .map_err(|e| QuarryError::DiskScheduler(format!("completion lost: {e}")))?;
        if !ok {
            return Err(QuarryError::DiskScheduler(format!(
                "write of {page_id} failed"
            )));
        }
        Ok(())
    }

    /// Worker loop: processes requests until shutdown is signaled, then
    /// drains whatever is still queued.
    fn run_worker(
        disk_manager: Arc<DiskManager>,
        receiver: Receiver<DiskRequest>,
        shutdown: Arc<AtomicBool>,
    ) {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                while let Ok(request) = receiver.try_recv() {
                    Self::process_request(&disk_manager, request);
                }
                break;
            }

            match receiver.recv_timeout(std::time::Duration::from_millis(100)) {
                Ok(request) => Self::process_request(&disk_manager, request),
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                    // Re-check the shutdown flag
                }
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn process_request(disk_manager: &DiskManager, request: DiskRequest) {
        match request {
            DiskRequest::Read {
                page_id,
                completion,
            } => {
                let mut buf = Box::new([0u8; PAGE_SIZE]);
                let result = match disk_manager.read_page(page_id, &mut buf[..]) {
                    Ok(()) => Some(buf),
                    Err(_) => None,
                };
                let _ = completion.send(result);
            }
            DiskRequest::Write {
                page_id,
                data,
                completion,
            } => {
                let ok = disk_manager.write_page(page_id, &data[..]).is_ok();
                let _ = completion.send(ok);
            }
        }
    }

    /// Returns a reference to the underlying DiskManager.
    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);

        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}
