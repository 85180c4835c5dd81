//! Serialization context - the graph walker.
//!
//! A [`SerializeContext`] is created for one pass over one [`ValueGraph`],
//! walks the registered roots depth-first, deduplicates every value by
//! identity, and drains into the flat state text. The walk is synchronous
//! and non-reentrant; a failure anywhere aborts the pass, because every
//! slot index in the output is load-bearing.

mod context;

pub use context::{SeenEntry, SerializeContext, SerializedState, SyncFn};

use crate::types::ValueGraph;

/// Serialize a set of roots in one shot.
///
/// Convenience wrapper over [`SerializeContext`] for callers that do not
/// need promotion, paths or sync functions mid-walk.
pub fn serialize(
    graph: &ValueGraph,
    roots: &[crate::types::ValueHandle],
) -> crate::types::Result<SerializedState> {
    let mut ctx = SerializeContext::new(graph);
    for &root in roots {
        ctx.add_root(root, None);
    }
    ctx.serialize()
}
