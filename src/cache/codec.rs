//! Entry Codec Module
//!
//! Serialization strategies for persisted entries. The codec is the only
//! component that knows the byte format; path mapping and eviction never look
//! inside a file.

use std::fmt::Debug;

use crate::cache::entry::{CacheEntry, FORMAT_VERSION};
use crate::error::{CacheError, Result};

// == Entry Codec Trait ==
/// Turns a [`CacheEntry`] into bytes and back.
///
/// `decode` must reject records whose version differs from
/// [`FORMAT_VERSION`] so that old files are treated as corrupt.
pub trait EntryCodec: Send + Sync + Debug {
    /// Short format name, used in logs and stats
    fn name(&self) -> &'static str;

    fn encode(&self, entry: &CacheEntry) -> Result<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> Result<CacheEntry>;
}

fn check_version(entry: CacheEntry) -> Result<CacheEntry> {
    if entry.version != FORMAT_VERSION {
        return Err(CacheError::Codec(format!(
            "unsupported record version {} (expected {})",
            entry.version, FORMAT_VERSION
        )));
    }
    Ok(entry)
}

// == JSON ==
/// Human-readable JSON records. Default format.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl EntryCodec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, entry: &CacheEntry) -> Result<Vec<u8>> {
        serde_json::to_vec(entry)
            .map_err(|e| CacheError::Codec(format!("JSON encoding failed: {}", e)))
    }

    fn decode(&self, bytes: &[u8]) -> Result<CacheEntry> {
        let entry: CacheEntry = serde_json::from_slice(bytes)
            .map_err(|e| CacheError::Codec(format!("JSON decoding failed: {}", e)))?;
        check_version(entry)
    }
}

// == MessagePack ==
/// Compact binary records using MessagePack with named fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessagePackCodec;

impl EntryCodec for MessagePackCodec {
    fn name(&self) -> &'static str {
        "msgpack"
    }

    fn encode(&self, entry: &CacheEntry) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(entry)
            .map_err(|e| CacheError::Codec(format!("MessagePack encoding failed: {}", e)))
    }

    fn decode(&self, bytes: &[u8]) -> Result<CacheEntry> {
        let entry: CacheEntry = rmp_serde::from_slice(bytes)
            .map_err(|e| CacheError::Codec(format!("MessagePack decoding failed: {}", e)))?;
        check_version(entry)
    }
}

/// Looks up a codec by its configured name.
pub fn codec_by_name(name: &str) -> Option<Box<dyn EntryCodec>> {
    match name.to_ascii_lowercase().as_str() {
        "json" => Some(Box::new(JsonCodec)),
        "msgpack" | "messagepack" => Some(Box::new(MessagePackCodec)),
        _ => None,
    }
}
