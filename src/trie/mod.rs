mod trie;
mod trie_store;

pub use trie::{Trie, TrieNode};
pub use trie_store::{TrieStore, ValueGuard};
