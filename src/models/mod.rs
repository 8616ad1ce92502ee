//! Core data types for the chunk store.
//!
//! An object is addressed by an [`chunk::ObjectKey`] and holds byte chunks at
//! integer positions. Ranges of positions are written together by streaming
//! a request body.

pub mod chunk;
