//! Integration tests for the disk manager and disk scheduler

use std::sync::Arc;
use std::thread;

use quarry::common::{PageId, PAGE_SIZE};
use quarry::storage::disk::{DiskManager, DiskScheduler};
use tempfile::NamedTempFile;

#[test]
fn test_disk_manager_page_roundtrip() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    let page_id = dm.allocate_page().unwrap();

    let mut data = [0u8; PAGE_SIZE];
    data[0] = 1;
    data[PAGE_SIZE - 1] = 2;
    dm.write_page(page_id, &data).unwrap();

    let mut read_back = [0u8; PAGE_SIZE];
    dm.read_page(page_id, &mut read_back).unwrap();
    assert_eq!(read_back[0], 1);
    assert_eq!(read_back[PAGE_SIZE - 1], 2);
}

#[test]
fn test_disk_manager_fresh_pages_read_as_zeroes() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    let page_id = dm.allocate_page().unwrap();

    let mut data = [0xAAu8; PAGE_SIZE];
    dm.read_page(page_id, &mut data).unwrap();
    assert!(data.iter().all(|&b| b == 0));
}

#[test]
fn test_disk_manager_counts_io() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    let page_id = dm.allocate_page().unwrap(); // one write (zeroing)
    let data = [0u8; PAGE_SIZE];
    dm.write_page(page_id, &data).unwrap();

    let mut buf = [0u8; PAGE_SIZE];
    dm.read_page(page_id, &mut buf).unwrap();

    assert_eq!(dm.get_num_writes(), 2);
    assert_eq!(dm.get_num_reads(), 1);
}

#[test]
fn test_disk_scheduler_interleaved_requests() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let scheduler = DiskScheduler::new(Arc::clone(&dm));

    let page_ids: Vec<PageId> = (0..8).map(|_| dm.allocate_page().unwrap()).collect();

    for (i, &pid) in page_ids.iter().enumerate() {
        let mut data = [0u8; PAGE_SIZE];
        data[0] = i as u8;
        scheduler.schedule_write_sync(pid, &data).unwrap();
    }

    for (i, &pid) in page_ids.iter().enumerate() {
        let mut data = [0u8; PAGE_SIZE];
        scheduler.schedule_read_sync(pid, &mut data).unwrap();
        assert_eq!(data[0], i as u8);
    }
}

#[test]
fn test_disk_scheduler_concurrent_submitters() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let scheduler = Arc::new(DiskScheduler::new(Arc::clone(&dm)));

    let page_ids: Vec<PageId> = (0..16).map(|_| dm.allocate_page().unwrap()).collect();

    let handles: Vec<_> = page_ids
        .chunks(4)
        .map(|chunk| {
            let scheduler = Arc::clone(&scheduler);
            let chunk = chunk.to_vec();
            thread::spawn(move || {
                for pid in chunk {
                    let mut data = [0u8; PAGE_SIZE];
                    data[..4].copy_from_slice(&pid.as_u32().to_le_bytes());
                    scheduler.schedule_write_sync(pid, &data).unwrap();

                    let mut read_back = [0u8; PAGE_SIZE];
                    scheduler.schedule_read_sync(pid, &mut read_back).unwrap();
                    assert_eq!(&read_back[..4], &pid.as_u32().to_le_bytes());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}
