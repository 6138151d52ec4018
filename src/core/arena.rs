//! Shared word arenas and the blob store that hands them out
//!
//! Every shared structure lives in a `SharedArena`: a fixed-capacity array of
//! `AtomicU64` words addressed by byte offset. Memory is committed lazily in
//! power-of-two chunks as offsets are first touched, so a large capacity costs
//! nothing until it is used. Offsets stay valid for the arena's lifetime and
//! are the only thing stored inside shared structures.
//!
//! A `BlobStore` maps opaque `BlobId`s to arenas. Writers allocate, readers in
//! other threads (or behind a shared-memory backend, other processes) attach
//! by id and see the same words.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use hashbrown::HashMap;
use parking_lot::RwLock;
use tracing::trace;

use crate::constants::WORD_BYTES;
use crate::error::{GraphError, Result};
use crate::types::{ArenaOffset, BlobId};

// ============================================================================
// Shared arena
// ============================================================================

pub struct SharedArena {
  capacity: u64,
  chunk_shift: u32,
  chunk_words: usize,
  chunks: Box<[OnceLock<Box<[AtomicU64]>>]>,
  committed_chunks: AtomicUsize,
}

impl std::fmt::Debug for SharedArena {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SharedArena")
      .field("capacity", &self.capacity)
      .field("committed_bytes", &self.committed_bytes())
      .finish()
  }
}

impl SharedArena {
  /// Create an arena of `capacity` bytes committed in `chunk_bytes` steps.
  /// Both are rounded up to whole words and `chunk_bytes` to a power of two.
  pub fn new(capacity: u64, chunk_bytes: u64) -> Self {
    let capacity = capacity.div_ceil(WORD_BYTES) * WORD_BYTES;
    let chunk_bytes = chunk_bytes.max(WORD_BYTES).next_power_of_two();
    let chunk_shift = chunk_bytes.trailing_zeros();
    let num_chunks = capacity.div_ceil(chunk_bytes) as usize;
    let chunks = (0..num_chunks).map(|_| OnceLock::new()).collect();
    Self {
      capacity,
      chunk_shift,
      chunk_words: (chunk_bytes / WORD_BYTES) as usize,
      chunks,
      committed_chunks: AtomicUsize::new(0),
    }
  }

  pub fn capacity(&self) -> u64 {
    self.capacity
  }

  /// Bytes currently backed by memory
  pub fn committed_bytes(&self) -> u64 {
    (self.committed_chunks.load(Ordering::Relaxed) as u64) << self.chunk_shift
  }

  fn chunk(&self, index: usize) -> &[AtomicU64] {
    self.chunks[index].get_or_init(|| {
      let committed = self.committed_chunks.fetch_add(1, Ordering::Relaxed) + 1;
      trace!(chunk = index, committed, "arena chunk committed");
      (0..self.chunk_words).map(|_| AtomicU64::new(0)).collect()
    })
  }

  #[inline]
  fn word(&self, offset: ArenaOffset) -> &AtomicU64 {
    debug_assert_eq!(offset % WORD_BYTES, 0, "unaligned word offset {offset}");
    assert!(
      offset < self.capacity,
      "offset {offset} beyond arena capacity {}",
      self.capacity
    );
    let chunk = (offset >> self.chunk_shift) as usize;
    let index = ((offset & ((1u64 << self.chunk_shift) - 1)) / WORD_BYTES) as usize;
    &self.chunk(chunk)[index]
  }

  /// Commit every chunk overlapping `[0, end)`
  pub fn ensure(&self, end: u64) {
    let end = end.min(self.capacity);
    if end == 0 {
      return;
    }
    let last = ((end - 1) >> self.chunk_shift) as usize;
    for index in 0..=last {
      self.chunk(index);
    }
  }

  #[inline]
  pub fn load(&self, offset: ArenaOffset) -> u64 {
    self.word(offset).load(Ordering::Acquire)
  }

  #[inline]
  pub fn load_relaxed(&self, offset: ArenaOffset) -> u64 {
    self.word(offset).load(Ordering::Relaxed)
  }

  /// Release store: everything written before becomes visible to readers
  /// that observe this word with `load`
  #[inline]
  pub fn store(&self, offset: ArenaOffset, value: u64) {
    self.word(offset).store(value, Ordering::Release);
  }

  #[inline]
  pub fn store_relaxed(&self, offset: ArenaOffset, value: u64) {
    self.word(offset).store(value, Ordering::Relaxed);
  }

  #[inline]
  pub fn fetch_add(&self, offset: ArenaOffset, delta: u64) -> u64 {
    self.word(offset).fetch_add(delta, Ordering::AcqRel)
  }

  /// Copy `len` bytes starting at `offset` into `out`
  pub fn read_bytes(&self, offset: ArenaOffset, out: &mut [u8]) {
    let mut pos = 0usize;
    while pos < out.len() {
      let at = offset + pos as u64;
      let base = at - at % WORD_BYTES;
      let shift = (at - base) as usize;
      let bytes = self.load(base).to_le_bytes();
      let take = (WORD_BYTES as usize - shift).min(out.len() - pos);
      out[pos..pos + take].copy_from_slice(&bytes[shift..shift + take]);
      pos += take;
    }
  }

  /// Write `data` at `offset`. Partial words are merged atomically so
  /// neighbouring cells written by other threads are preserved.
  pub fn write_bytes(&self, offset: ArenaOffset, data: &[u8]) {
    let mut pos = 0usize;
    while pos < data.len() {
      let at = offset + pos as u64;
      let base = at - at % WORD_BYTES;
      let shift = (at - base) as usize;
      let take = (WORD_BYTES as usize - shift).min(data.len() - pos);
      let word = self.word(base);
      if take == WORD_BYTES as usize {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&data[pos..pos + 8]);
        word.store(u64::from_le_bytes(bytes), Ordering::Release);
      } else {
        let chunk = &data[pos..pos + take];
        let _ = word.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
          let mut bytes = current.to_le_bytes();
          bytes[shift..shift + take].copy_from_slice(chunk);
          Some(u64::from_le_bytes(bytes))
        });
      }
      pos += take;
    }
  }

  /// Copy `words` words from `src` to `dst`. Ranges must not overlap.
  pub fn copy_words(&self, src: ArenaOffset, dst: ArenaOffset, words: u64) {
    debug_assert!(src + words * WORD_BYTES <= dst || dst + words * WORD_BYTES <= src);
    for i in 0..words {
      let value = self.load_relaxed(src + i * WORD_BYTES);
      self.store_relaxed(dst + i * WORD_BYTES, value);
    }
  }

  /// Zero `words` words starting at `offset`
  pub fn zero_words(&self, offset: ArenaOffset, words: u64) {
    for i in 0..words {
      self.store_relaxed(offset + i * WORD_BYTES, 0);
    }
  }
}

// ============================================================================
// Word arrays
// ============================================================================

/// Fixed-length array of words in its own arena (external ids, ovl2g)
#[derive(Debug, Clone)]
pub struct WordArray {
  blob: BlobId,
  arena: Arc<SharedArena>,
  len: u64,
}

impl WordArray {
  pub fn allocate(store: &dyn BlobStore, len: u64) -> Result<Self> {
    let handle = store.allocate(len.max(1) * WORD_BYTES)?;
    Ok(Self {
      blob: handle.id,
      arena: handle.arena,
      len,
    })
  }

  pub fn attach(store: &dyn BlobStore, blob: BlobId, len: u64) -> Result<Self> {
    let arena = store.attach(blob).ok_or(GraphError::BlobNotFound(blob))?;
    Ok(Self { blob, arena, len })
  }

  pub fn blob(&self) -> BlobId {
    self.blob
  }

  pub fn len(&self) -> u64 {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  #[inline]
  pub fn get(&self, index: u64) -> u64 {
    assert!(index < self.len, "index {index} out of bounds {}", self.len);
    self.arena.load(index * WORD_BYTES)
  }

  #[inline]
  pub fn set(&self, index: u64, value: u64) {
    assert!(index < self.len, "index {index} out of bounds {}", self.len);
    self.arena.store(index * WORD_BYTES, value);
  }
}

// ============================================================================
// Blob store
// ============================================================================

/// Freshly allocated blob
#[derive(Debug, Clone)]
pub struct BlobHandle {
  pub id: BlobId,
  pub arena: Arc<SharedArena>,
}

/// Allocator of shared regions addressed by stable ids
pub trait BlobStore: Send + Sync {
  /// Allocate a zeroed region of `capacity` bytes
  fn allocate(&self, capacity: u64) -> Result<BlobHandle>;
  /// Resolve an id to the local view of its region
  fn attach(&self, id: BlobId) -> Option<Arc<SharedArena>>;
  /// Endpoint readers use to reach this store
  fn ipc_socket(&self) -> String;
}

/// In-process blob store; readers attach from other threads
#[derive(Debug)]
pub struct LocalBlobStore {
  socket: String,
  chunk_bytes: u64,
  next_id: AtomicU64,
  blobs: RwLock<HashMap<BlobId, Arc<SharedArena>>>,
}

impl LocalBlobStore {
  pub fn new(socket: impl Into<String>, chunk_bytes: u64) -> Self {
    Self {
      socket: socket.into(),
      chunk_bytes,
      next_id: AtomicU64::new(1),
      blobs: RwLock::new(HashMap::new()),
    }
  }

  /// Number of live blobs
  pub fn len(&self) -> usize {
    self.blobs.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.blobs.read().is_empty()
  }
}

impl BlobStore for LocalBlobStore {
  fn allocate(&self, capacity: u64) -> Result<BlobHandle> {
    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
    let arena = Arc::new(SharedArena::new(capacity, self.chunk_bytes));
    self.blobs.write().insert(id, Arc::clone(&arena));
    trace!(blob = id, capacity, "blob allocated");
    Ok(BlobHandle { id, arena })
  }

  fn attach(&self, id: BlobId) -> Option<Arc<SharedArena>> {
    self.blobs.read().get(&id).cloned()
  }

  fn ipc_socket(&self) -> String {
    self.socket.clone()
  }
}
