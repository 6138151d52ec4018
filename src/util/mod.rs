//! Utility modules

pub mod backoff;
pub mod codec;
pub mod id_parser;
