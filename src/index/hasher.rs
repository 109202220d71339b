/// 32-bit hash over serialized keys. The high bits route the header's radix
/// table, the low bits route the directory.
pub trait KeyHasher: Send + Sync {
    fn hash_key(&self, key: &[u8]) -> u32;
}

/// CRC32-based hash, the stock choice for real keys
pub struct Crc32Hasher;

impl KeyHasher for Crc32Hasher {
    fn hash_key(&self, key: &[u8]) -> u32 {
        crc32fast::hash(key)
    }
}

/// Interprets the first four key bytes as a little-endian u32.
/// Gives tests full control over header and directory routing.
pub struct IdentityHasher;

impl KeyHasher for IdentityHasher {
    fn hash_key(&self, key: &[u8]) -> u32 {
        let mut bytes = [0u8; 4];
        let n = key.len().min(4);
        bytes[..n].copy_from_slice(&key[..n]);
        u32::from_le_bytes(bytes)
    }
}
