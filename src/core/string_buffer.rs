//! Shared append-only string buffer
//!
//! Strings are bump-allocated at word-aligned offsets and referenced from
//! property cells by a surrogate `(offset << 16) | len`. A zero length is the
//! null surrogate, so empty strings read back as absent.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::error;

use crate::constants::{ARENA_RESERVED_BYTES, MAX_STRING_LEN, WORD_BYTES};
use crate::core::arena::{BlobStore, SharedArena};
use crate::error::{GraphError, Result};
use crate::types::BlobId;

/// Writer side of the string buffer
#[derive(Debug)]
pub struct StringBuffer {
  blob: BlobId,
  arena: Arc<SharedArena>,
  cursor: AtomicU64,
}

impl StringBuffer {
  pub fn new(store: &dyn BlobStore, capacity: u64) -> Result<Self> {
    let handle = store.allocate(capacity)?;
    Ok(Self {
      blob: handle.id,
      arena: handle.arena,
      cursor: AtomicU64::new(ARENA_RESERVED_BYTES),
    })
  }

  pub fn blob(&self) -> BlobId {
    self.blob
  }

  /// Bytes consumed so far
  pub fn used(&self) -> u64 {
    self.cursor.load(Ordering::Relaxed)
  }

  /// Append `value` and return its surrogate
  pub fn append(&self, value: &str) -> Result<u64> {
    let len = value.len();
    if len == 0 {
      return Ok(0);
    }
    if len > MAX_STRING_LEN {
      return Err(GraphError::malformed(format!(
        "string of {len} bytes exceeds {MAX_STRING_LEN}"
      )));
    }
    let reserved = (len as u64).div_ceil(WORD_BYTES) * WORD_BYTES;
    let offset = self.cursor.fetch_add(reserved, Ordering::Relaxed);
    if offset + reserved > self.arena.capacity() {
      error!(
        capacity = self.arena.capacity(),
        requested = reserved,
        "string buffer out of capacity"
      );
      return Err(GraphError::OutOfCapacity {
        what: "string buffer",
        requested: reserved,
        capacity: self.arena.capacity(),
      });
    }
    self.arena.write_bytes(offset, value.as_bytes());
    Ok((offset << 16) | len as u64)
  }

  pub fn view(&self) -> StringBufferView {
    StringBufferView {
      arena: Arc::clone(&self.arena),
    }
  }
}

/// Read side of the string buffer
#[derive(Debug, Clone)]
pub struct StringBufferView {
  arena: Arc<SharedArena>,
}

impl StringBufferView {
  pub fn attach(store: &dyn BlobStore, blob: BlobId) -> Result<Self> {
    let arena = store.attach(blob).ok_or(GraphError::BlobNotFound(blob))?;
    Ok(Self { arena })
  }

  /// Resolve a surrogate; `None` for the null surrogate
  pub fn get(&self, surrogate: u64) -> Option<String> {
    let len = (surrogate & 0xFFFF) as usize;
    if len == 0 {
      return None;
    }
    let offset = surrogate >> 16;
    let mut bytes = vec![0u8; len];
    self.arena.read_bytes(offset, &mut bytes);
    String::from_utf8(bytes).ok()
  }
}
