//! Shared helpers: structural hashing, bounded caches, host name lookups and
//! config parsing.

pub mod cache;
pub mod fqdn;
pub mod hash;
pub mod parse;

pub use cache::{BoundedCache, CacheEntry, SharedCache, MAX_API_CACHED};
pub use fqdn::{DnsResolver, HostResolver};
pub use hash::{config_hash, hash_value};
