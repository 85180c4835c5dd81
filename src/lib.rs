//! # Resume State
//!
//! Resumable state serialization engine. A server-rendered UI is resumed on
//! the client without replaying application logic: the exact in-memory object
//! graph that existed at render time (state, lazy callback references,
//! reactive cells, tree-position markers) is reconstructed from a compact
//! text payload embedded in the rendered document.
//!
//! The crate has two halves:
//!
//! - a generic serializer/deserializer for a heterogeneous, cyclic,
//!   reference-heavy object graph into a flat, deduplicated, addressable
//!   text form ([`serialize`], [`deserialize`]), and
//! - a tree-position addressing subsystem that produces stable, compact
//!   addresses for virtual (non-rendered) tree nodes ([`vnode`]).
//!
//! All engine state is pass-scoped: a [`SerializeContext`] or [`Container`]
//! is created for one pass and discarded afterwards. The only process-wide
//! state is the read-mostly tag registry and the growth-only memo table for
//! the alphanumeric encoding.
#![warn(missing_docs)]

/// Shared wire-format constants
pub mod constants;

/// Type definitions: value model, tag registry, errors
pub mod types;

/// Serialization context (graph walker)
pub mod serialize;

/// Deserialization engine (preprocess + lazy container)
pub mod deserialize;

/// Tree-position addressing subsystem
pub mod vnode;

/// Host-node adapter boundary
pub mod host;

// Re-export commonly used items
pub use deserialize::{Container, ContainerOptions};
pub use host::{NodeHost, NullHost};
pub use serialize::{SerializeContext, SerializedState, SyncFn};
pub use types::{Constant, Error, Result, TypeTag, Value, ValueGraph, ValueHandle};
pub use vnode::{VNodeData, VNodeFlags};

#[cfg(test)]
mod tests;
