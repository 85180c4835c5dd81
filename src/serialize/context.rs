//! The serialization pass: identity tracking, root promotion, path
//! computation and wire emission.

use ahash::AHashMap;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::types::{
    CellKind, DeferredState, Error, Result, TypeTag, Value, ValueGraph, ValueHandle,
};

/// A deduplicated executable fragment registered during the walk.
///
/// Sync functions live in a side table separate from the main graph and are
/// referenced from state by small integer id; the wire never carries their
/// source inline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFn {
    /// Source text of the fragment
    pub source: String,
    /// Number of arguments the fragment takes
    pub arg_count: u32,
}

/// What the pass knows about one encountered value.
#[derive(Debug, Clone, Copy)]
pub struct SeenEntry {
    /// Parent under which the value was first encountered
    pub parent: Option<ValueHandle>,
    /// Child ordinal within that parent, per the shared child ordering
    pub index_in_parent: u32,
    /// Root index, if the value has been promoted
    pub root_index: Option<u32>,
}

/// The finished output of a serialization pass.
#[derive(Debug, Clone)]
pub struct SerializedState {
    /// Flat state payload, a JSON array literal `[tag0, payload0, ...]`
    pub text: String,
    /// Side table of registered sync functions, indexed by id
    pub sync_fns: Vec<SyncFn>,
}

/// One in-flight serialization pass over a value graph.
///
/// All tables are identity-keyed by arena handle and sized to the graph up
/// front; nothing is shared with other passes.
pub struct SerializeContext<'g> {
    graph: &'g ValueGraph,
    seen: Vec<Option<SeenEntry>>,
    written: Vec<bool>,
    paths: Vec<Option<String>>,
    roots: Vec<ValueHandle>,
    forward_refs: Vec<u32>,
    sync_fns: Vec<SyncFn>,
    sync_by_source: AHashMap<String, u32>,
}

impl<'g> SerializeContext<'g> {
    /// Start a pass over `graph`. The graph must not be mutated until the
    /// pass is dropped.
    pub fn new(graph: &'g ValueGraph) -> Self {
        Self {
            graph,
            seen: vec![None; graph.len()],
            written: vec![false; graph.len()],
            paths: vec![None; graph.len()],
            roots: Vec::new(),
            forward_refs: Vec::new(),
            sync_fns: Vec::new(),
            sync_by_source: AHashMap::new(),
        }
    }

    /// Roots registered so far, in discovery order.
    pub fn roots(&self) -> &[ValueHandle] {
        &self.roots
    }

    /// Identity lookup with no side effects.
    pub fn was_seen(&self, h: ValueHandle) -> Option<&SeenEntry> {
        self.seen.get(h.index()).and_then(|e| e.as_ref())
    }

    /// Register a value as an explicit entry point.
    ///
    /// Idempotent: a value that already holds a root index keeps it. A value
    /// seen earlier as a nested child is promoted in place - it gets the
    /// next root index and its path to the first inline occurrence is
    /// computed and cached, without re-walking.
    pub fn add_root(&mut self, h: ValueHandle, parent: Option<ValueHandle>) -> u32 {
        if let Some(entry) = self.seen[h.index()] {
            if let Some(r) = entry.root_index {
                return r;
            }
            // Promote. The path must anchor at an ancestor root, so it is
            // computed before this value becomes a root itself. A seen
            // entry's parent chain always terminates at a root; a break
            // here is a walk bookkeeping bug.
            if self.paths[h.index()].is_none() {
                let path = self.compute_path(h);
                debug_assert!(path.is_ok(), "seen entry with a broken parent chain");
                if let Ok(path) = path {
                    self.paths[h.index()] = Some(path);
                }
            }
        }
        let r = self.roots.len() as u32;
        match &mut self.seen[h.index()] {
            Some(entry) => entry.root_index = Some(r),
            slot @ None => {
                *slot = Some(SeenEntry {
                    parent,
                    index_in_parent: 0,
                    root_index: Some(r),
                });
            }
        }
        self.roots.push(h);
        r
    }

    /// Register a forward-declared placeholder and return its forward id.
    ///
    /// The value becomes a root; the id-to-slot mapping travels in a
    /// trailing forward-refs slot.
    pub fn add_forward_ref(&mut self, h: ValueHandle) -> u32 {
        let id = self.forward_refs.len() as u32;
        let root = self.add_root(h, None);
        self.forward_refs.push(root);
        id
    }

    /// Path from some root to `h`, as a space-separated index string.
    ///
    /// Cached after the first computation; a path, once computed, stays
    /// valid because the graph is not mutated during the pass. Fails with
    /// [`Error::MissingRootId`] for a value the walk never saw - that means
    /// a reference escaped the walked graph, which is a caller bug.
    pub fn add_root_path(&mut self, h: ValueHandle) -> Result<String> {
        if h.index() >= self.seen.len() || self.seen[h.index()].is_none() {
            return Err(Error::MissingRootId(h));
        }
        if let Some(path) = &self.paths[h.index()] {
            return Ok(path.clone());
        }
        let path = self.compute_path(h)?;
        self.paths[h.index()] = Some(path.clone());
        Ok(path)
    }

    fn compute_path(&self, h: ValueHandle) -> Result<String> {
        let mut segments: Vec<u32> = Vec::new();
        let mut cur = h;
        loop {
            let entry = self.seen[cur.index()].ok_or(Error::MissingRootId(cur))?;
            if let Some(r) = entry.root_index {
                let mut out = r.to_string();
                for seg in segments.iter().rev() {
                    out.push(' ');
                    out.push_str(&seg.to_string());
                }
                return Ok(out);
            }
            segments.push(entry.index_in_parent);
            cur = entry.parent.ok_or(Error::MissingRootId(cur))?;
        }
    }

    /// Deduplicate a small executable fragment by source text.
    pub fn add_sync_fn(&mut self, source: &str, arg_count: u32) -> u32 {
        if let Some(&id) = self.sync_by_source.get(source) {
            return id;
        }
        let id = self.sync_fns.len() as u32;
        self.sync_fns.push(SyncFn {
            source: source.to_string(),
            arg_count,
        });
        self.sync_by_source.insert(source.to_string(), id);
        id
    }

    /// Drain the walk into the flat state text.
    ///
    /// Roots are emitted in discovery order; the root list may grow while
    /// the walk runs (nested values promoted mid-walk get their slots at
    /// the tail). First-encounter-wins: the first path found to a shared
    /// value is its canonical address, every later occurrence is a
    /// back-reference.
    pub fn serialize(&mut self) -> Result<SerializedState> {
        let mut out: Vec<Json> = Vec::new();
        let mut i = 0;
        while i < self.roots.len() {
            let h = self.roots[i];
            let (tag, payload) = self.encode_root_slot(h)?;
            out.push(Json::from(tag));
            out.push(payload);
            i += 1;
        }
        if !self.forward_refs.is_empty() {
            out.push(Json::from(TypeTag::ForwardRefs.as_u8()));
            out.push(Json::Array(
                self.forward_refs.iter().map(|&r| Json::from(r)).collect(),
            ));
        }
        tracing::debug!(
            roots = self.roots.len(),
            sync_fns = self.sync_fns.len(),
            "serialization pass drained"
        );
        let text = serde_json::to_string(&Json::Array(out))?;
        Ok(SerializedState {
            text,
            sync_fns: std::mem::take(&mut self.sync_fns),
        })
    }

    fn encode_root_slot(&mut self, h: ValueHandle) -> Result<(u8, Json)> {
        let graph = self.graph;
        if let Some(c) = graph.constant_of(h) {
            return Ok((TypeTag::Constant.as_u8(), Json::from(c.as_u8())));
        }
        if self.written[h.index()] {
            // Promoted after being inlined elsewhere: the slot holds a
            // path back-reference to the first occurrence.
            let path = self.add_root_path(h)?;
            return Ok((TypeTag::RootRef.as_u8(), Json::String(path)));
        }
        self.written[h.index()] = true;
        self.encode_inline(h)
    }

    /// Encode a nested child: inline on first encounter, back-reference
    /// afterwards. A bare integer in nested position is a slot reference.
    fn encode_entry(&mut self, h: ValueHandle, parent: ValueHandle, k: u32) -> Result<Json> {
        let graph = self.graph;
        if let Some(c) = graph.constant_of(h) {
            return Ok(Json::Array(vec![
                Json::from(TypeTag::Constant.as_u8()),
                Json::from(c.as_u8()),
            ]));
        }
        let prior = self.seen[h.index()];
        match prior {
            None => {
                self.seen[h.index()] = Some(SeenEntry {
                    parent: Some(parent),
                    index_in_parent: k,
                    root_index: None,
                });
                self.written[h.index()] = true;
                let (tag, payload) = self.encode_inline(h)?;
                Ok(Json::Array(vec![Json::from(tag), payload]))
            }
            Some(entry) => {
                let r = match entry.root_index {
                    Some(r) => r,
                    // Second encounter of a shared value: promote so both
                    // sites resolve to the identical slot after resume.
                    None => self.add_root(h, None),
                };
                Ok(Json::from(r))
            }
        }
    }

    fn encode_inline(&mut self, h: ValueHandle) -> Result<(u8, Json)> {
        let graph = self.graph;
        let encoded = match graph.get(h) {
            Value::Number(n) => (TypeTag::Number, Json::from(*n)),
            Value::String(s) => (TypeTag::String, Json::String(s.clone())),
            Value::BigInt(s) => (TypeTag::BigInt, Json::String(s.clone())),
            Value::Date(ms) => (TypeTag::Date, Json::from(*ms)),
            Value::Url(s) => (TypeTag::Url, Json::String(s.clone())),
            Value::Regex { source, flags } => (
                TypeTag::Regex,
                Json::Array(vec![
                    Json::String(source.clone()),
                    Json::String(flags.clone()),
                ]),
            ),
            Value::NodeRef(address) => (TypeTag::NodeRef, Json::String(address.clone())),
            Value::SyncFnRef(id) => (TypeTag::SyncFnRef, Json::from(*id)),
            Value::Preload(s) => (TypeTag::Preload, Json::String(s.clone())),
            Value::Bytes(bytes) => (TypeTag::Bytes, Json::String(BASE64.encode(bytes))),
            Value::Array(items) => {
                let entries = self.encode_items(h, items)?;
                (TypeTag::Array, Json::Array(entries))
            }
            Value::Set(items) => {
                let entries = self.encode_items(h, items)?;
                (TypeTag::Set, Json::Array(entries))
            }
            Value::Object(entries) => {
                let mut out = Vec::with_capacity(entries.len() * 2);
                for (k, (key, child)) in entries.iter().enumerate() {
                    out.push(Json::String(key.clone()));
                    out.push(self.encode_entry(*child, h, k as u32)?);
                }
                (TypeTag::Object, Json::Array(out))
            }
            Value::Map(pairs) => {
                let mut out = Vec::with_capacity(pairs.len() * 2);
                for (i, (key, value)) in pairs.iter().enumerate() {
                    out.push(self.encode_entry(*key, h, (i * 2) as u32)?);
                    out.push(self.encode_entry(*value, h, (i * 2 + 1) as u32)?);
                }
                (TypeTag::Map, Json::Array(out))
            }
            Value::Error { message, entries } => {
                let mut out = Vec::with_capacity(entries.len() * 2 + 1);
                out.push(Json::String(message.clone()));
                for (k, (key, child)) in entries.iter().enumerate() {
                    out.push(Json::String(key.clone()));
                    out.push(self.encode_entry(*child, h, k as u32)?);
                }
                (TypeTag::Error, Json::Array(out))
            }
            Value::Deferred(state) => {
                let payload = match state {
                    DeferredState::Pending => {
                        tracing::warn!(value = h.index(), "deferred still pending at serialization");
                        Vec::new()
                    }
                    DeferredState::Resolved(inner) => {
                        vec![Json::from(1), self.encode_entry(*inner, h, 0)?]
                    }
                    DeferredState::Rejected(inner) => {
                        vec![Json::from(0), self.encode_entry(*inner, h, 0)?]
                    }
                };
                (TypeTag::Deferred, Json::Array(payload))
            }
            Value::LazyRef {
                chunk,
                symbol,
                captures,
            } => {
                // Captures always travel as roots so the lazy callback can
                // look them up by slot when it finally runs.
                let mut text = format!("{chunk}#{symbol}");
                if !captures.is_empty() {
                    text.push('[');
                    for (i, &capture) in captures.iter().enumerate() {
                        if i > 0 {
                            text.push(' ');
                        }
                        let slot = self.add_root(capture, Some(h));
                        text.push_str(&slot.to_string());
                    }
                    text.push(']');
                }
                (TypeTag::LazyRef, Json::String(text))
            }
            Value::Component { entry } => {
                let payload = vec![self.encode_entry(*entry, h, 0)?];
                (TypeTag::Component, Json::Array(payload))
            }
            Value::Cell {
                kind,
                compute,
                value,
            } => match kind {
                CellKind::Plain => {
                    let payload = vec![self.encode_entry(*value, h, 0)?];
                    (TypeTag::Cell, Json::Array(payload))
                }
                CellKind::Computed | CellKind::Async => {
                    let payload = vec![
                        self.encode_entry(*compute, h, 0)?,
                        self.encode_entry(*value, h, 1)?,
                    ];
                    let tag = if *kind == CellKind::Computed {
                        TypeTag::CellComputed
                    } else {
                        TypeTag::CellAsync
                    };
                    (tag, Json::Array(payload))
                }
            },
            Value::PropsProxy { varying, constant } => {
                let payload = vec![
                    self.encode_entry(*varying, h, 0)?,
                    self.encode_entry(*constant, h, 1)?,
                ];
                (TypeTag::PropsProxy, Json::Array(payload))
            }
            Value::EffectMeta { entries } => {
                let mut out = Vec::with_capacity(entries.len() * 2);
                for (k, (key, child)) in entries.iter().enumerate() {
                    out.push(Json::String(key.clone()));
                    out.push(self.encode_entry(*child, h, k as u32)?);
                }
                (TypeTag::EffectMeta, Json::Array(out))
            }
            // Constants are emitted before inline encoding ever runs; a
            // value kind reaching here has no inline form.
            Value::Undefined | Value::Null | Value::Bool(_) | Value::Marker(_) => {
                return Err(Error::UnsupportedValueKind(u64::from(
                    graph.tag_of(h).as_u8(),
                )))
            }
        };
        Ok((encoded.0.as_u8(), encoded.1))
    }

    fn encode_items(&mut self, parent: ValueHandle, items: &[ValueHandle]) -> Result<Vec<Json>> {
        items
            .iter()
            .enumerate()
            .map(|(k, &child)| self.encode_entry(child, parent, k as u32))
            .collect()
    }
}
