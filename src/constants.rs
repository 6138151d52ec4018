//! Layout constants and defaults

// ============================================================================
// Id layout
// ============================================================================

/// Maximum number of vertex labels the id codec reserves bits for
pub const MAX_VERTEX_LABELS: usize = 30;

/// Top bit of a 64-bit word. Marks tombstones in vertex tables and edge blocks.
pub const TOMBSTONE_BIT: u64 = 1 << 63;

/// Payload bits below the tombstone flag
pub const PAYLOAD_MASK: u64 = !TOMBSTONE_BIT;

// ============================================================================
// Arena layout
// ============================================================================

/// Arena word size in bytes
pub const WORD_BYTES: u64 = 8;

/// Bytes reserved at the start of every block-managed arena so offset 0 stays null
pub const ARENA_RESERVED_BYTES: u64 = 64;

/// Smallest block order the allocator hands out (one word)
pub const MIN_BLOCK_ORDER: u32 = 3;

/// Largest block order the allocator accepts
pub const MAX_BLOCK_ORDER: u32 = 40;

/// Epochs a retired block must age past the GC frontier before reuse
pub const LAG_EPOCH_NUMBER: u64 = 2;

// ============================================================================
// Defaults (see `StoreConfig`)
// ============================================================================

pub const DEFAULT_VERTEX_PER_SEG: u64 = 64;
pub const DEFAULT_MAX_VERTICES_PER_LABEL: u64 = 1 << 16;
pub const DEFAULT_EDGE_ARENA_CAPACITY: u64 = 1 << 28;
pub const DEFAULT_ARENA_CHUNK_BYTES: u64 = 1 << 20;
pub const DEFAULT_MIN_EDGE_BLOCK_ORDER: u32 = 7;
pub const DEFAULT_LARGE_BLOCK_ORDER: u32 = 20;
pub const DEFAULT_COMPACTION_RATIO: f64 = 0.2;
pub const DEFAULT_ROWS_PER_PAGE: u64 = 4096;
pub const DEFAULT_PROPERTY_ARENA_CAPACITY: u64 = 1 << 28;
pub const DEFAULT_STRING_BUFFER_CAPACITY: u64 = 1 << 26;
pub const DEFAULT_HASHMAP_CAPACITY: u64 = 1024;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
pub const DEFAULT_SPIN_LIMIT: u32 = 6;
pub const DEFAULT_YIELD_LIMIT: u32 = 10;

/// Longest string the `(offset << 16) | len` surrogate can describe
pub const MAX_STRING_LEN: usize = 0xFFFF;

// ============================================================================
// Metadata keys
// ============================================================================

pub const BLOB_KEY_PREFIX: &str = "gart_blob_m";
pub const LATEST_EPOCH_KEY_PREFIX: &str = "gart_latest_epoch_p";
pub const SCHEMA_KEY_PREFIX: &str = "gart_schema_p";

/// Latest-epoch value published before any epoch is finalized
pub const NO_EPOCH_PUBLISHED: u64 = u64::MAX;

/// Log op name of the bulk-load end sentinel
pub const BULKLOAD_END_OP: &str = "bulkload_end";
