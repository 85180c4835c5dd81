//! Tree-position addressing subsystem.
//!
//! The rendered markup only exposes "N real elements, then M characters of
//! text" per parent; virtual (non-rendered) boundaries and exact text
//! sizing live in a per-element side channel, the [`VNodeData`] record.
//! From a record alone, a stable compact address can be recomputed for any
//! node in that element's descendant tree, real or virtual - the address is
//! derived purely from position, never from identity.

/// Per-element token records and the side-channel codec
pub mod data;
/// Alphanumeric count encoding and tree-address computation
pub mod address;

pub use address::{decode_alphanumeric, encode_alphanumeric};
pub use data::{decode_block, encode_block, VNodeData, VNodeFlags, VNodeToken};
