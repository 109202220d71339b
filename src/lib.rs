//! Quarry - a disk-backed storage substrate
//!
//! This crate provides the storage core of a disk-oriented database: a page
//! buffer pool with LRU-K replacement, a disk-resident extendible hash
//! index built on top of it, and an in-memory copy-on-write trie store for
//! versioned key/value data.
//!
//! # Architecture
//!
//! - **Storage Layer** (`storage`): page-granular disk I/O and page layouts
//!   - `DiskManager`: reads and writes pages in a single database file
//!   - `DiskScheduler`: asynchronous single-page request queue
//!   - `HeaderPage`/`DirectoryPage`/`BucketPage`: extendible-hashing layouts
//!
//! - **Buffer Pool** (`buffer`): memory management for database pages
//!   - `BufferPoolManager`: maps page ids onto a fixed set of frames
//!   - `LruKReplacer`: LRU-K eviction policy
//!   - `FrameHeader`: per-frame metadata and data storage
//!   - `BasicPageGuard`/`ReadPageGuard`/`WritePageGuard`: RAII page handles
//!
//! - **Index** (`index`): `DiskExtendibleHashTable`, a concurrent
//!   disk-resident key/value index with two-level hash routing
//!
//! - **Trie** (`trie`): persistent trie plus `TrieStore`, a container
//!   giving readers lock-free snapshots against a serialized writer
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use quarry::buffer::BufferPoolManager;
//! use quarry::index::{Crc32Hasher, BytewiseComparator, DiskExtendibleHashTable};
//! use quarry::storage::disk::DiskManager;
//!
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(64, 2, disk_manager));
//!
//! // 8-byte keys, 8-byte values
//! let table = DiskExtendibleHashTable::new(
//!     bpm,
//!     BytewiseComparator,
//!     Crc32Hasher,
//!     2,   // header depth
//!     9,   // directory depth
//!     128, // bucket capacity
//!     8,
//!     8,
//! )
//! .unwrap();
//!
//! table.insert(b"key_0001", b"val_0001").unwrap();
//! assert_eq!(table.get(b"key_0001").unwrap(), Some(b"val_0001".to_vec()));
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;
pub mod trie;

// Re-export commonly used types at the crate root
pub use common::{PageId, QuarryError, Result};
