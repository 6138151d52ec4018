//! epochgraph - streaming, epoch-versioned graph store
//!
//! Mutation logs are applied per partition into shared-memory structures
//! that readers open at any published epoch without coordinating with the
//! writer.
//!
//! # Architecture
//!
//! - **Segment graph**: per-label adjacency in segments of fixed vertex
//!   ranges, append-only edge blocks with per-vertex epoch tables
//! - **Paged properties**: column families of copy-on-write pages, one
//!   version chain per page
//! - **Epoch metadata**: a JSON document per finalized epoch naming every
//!   blob and frontier a reader needs
//! - **Fragments**: point-in-time readers with inner/outer vertex iteration,
//!   adjacency and id translation
//!
//! # Features
//!
//! - Readers never block the writer and never see a later epoch
//! - Cut edges are stored on mirror (outer) vertices of each partition
//! - Block recycling and page GC bounded by a reader frontier

#![deny(clippy::all)]

// Core modules
pub mod config;
pub mod constants;
pub mod error;
pub mod types;
pub mod util;

// Shared-memory storage
pub mod core;
pub mod property;
pub mod seggraph;

// Schema and published metadata
pub mod meta;
pub mod schema;

// Read side
pub mod check;
pub mod fragment;

// Write side
pub mod store;

pub use check::{check_fragment, CheckResult};
pub use config::{BackoffConfig, StoreConfig};
pub use core::arena::{BlobStore, LocalBlobStore};
pub use error::{GraphError, Result};
pub use fragment::{AdjIter, EdgeRef, Fragment, GraphView, VertexIter};
pub use meta::{DirMetaStore, EpochMetadata, MemoryMetaStore, MetaStore};
pub use schema::{GraphSchema, SchemaLayout};
pub use store::{GcStats, GraphStore, LogRunner, MutationRecord, RunnerPool, RunnerStats, StoreStats};
pub use types::{DataType, Direction, Epoch, FromPropValue, Gid, LabelId, PropValue, Vertex};
pub use util::id_parser::IdParser;
