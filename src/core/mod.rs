//! Shared-memory building blocks
//!
//! - `arena`: word arenas, blob store, word arrays
//! - `block_manager`: power-of-two block allocator
//! - `string_buffer`: append-only string storage
//! - `hashmap`: versioned open-addressed maps
//! - `vertex_table`: per-label inner/outer vertex slots

pub mod arena;
pub mod block_manager;
pub mod hashmap;
pub mod string_buffer;
pub mod vertex_table;
