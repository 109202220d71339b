pub mod extendible_hash_table;
pub mod hasher;
pub mod key_comparator;

pub use extendible_hash_table::DiskExtendibleHashTable;
pub use hasher::{Crc32Hasher, IdentityHasher, KeyHasher};
pub use key_comparator::{BytewiseComparator, IntegerComparator, KeyComparator};
