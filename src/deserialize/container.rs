//! Phase 2: lazy, per-slot materialization.
//!
//! Each slot is an explicit lazily-initialized cell. Inflatable kinds are
//! reconstructed in two steps: an empty placeholder is allocated and
//! installed at the slot *before* any child is resolved, so a cycle that
//! leads back to the slot finds the placeholder instead of recursing
//! forever. Resolving the same slot twice returns the identical handle.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::constants::NODE_ID_PROP;
use crate::deserialize::preprocess::{preprocess, RawSlot};
use crate::host::NodeHost;
use crate::serialize::SyncFn;
use crate::types::{
    CellKind, Constant, DeferredState, Error, Result, TypeTag, Value, ValueGraph, ValueHandle,
};

/// Deserialization behavior knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerOptions {
    /// Strict (development) mode propagates every resolution failure with
    /// full context. Non-strict (production) mode degrades a failed root to
    /// undefined, logs, and keeps sibling roots resolvable.
    pub strict: bool,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self { strict: true }
    }
}

/// Resolution state of one slot.
enum SlotState {
    /// Payload parked until first read
    Unresolved(Json),
    /// A one-step resolution is running; re-entry means the wire holds a
    /// reference cycle with no inflatable value on it
    InProgress,
    /// Placeholder installed, inflation running; re-entry gets the
    /// placeholder, which is what makes cycles safe
    Resolving(ValueHandle),
    /// Final, memoized
    Resolved(ValueHandle),
}

/// A deserialized state container.
///
/// Wraps the preprocessed slot list and materializes values on demand into
/// an owned [`ValueGraph`]; shared and cyclic structure in the original
/// graph comes back as shared handles.
pub struct Container {
    tags: Vec<TypeTag>,
    slots: Vec<SlotState>,
    graph: ValueGraph,
    forward_refs: Vec<u32>,
    preloads: Vec<String>,
    sync_fns: Vec<SyncFn>,
    host: Option<Box<dyn NodeHost>>,
    options: ContainerOptions,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("slots", &self.slots.len())
            .field("forward_refs", &self.forward_refs.len())
            .field("preloads", &self.preloads.len())
            .field("options", &self.options)
            .finish()
    }
}

impl Container {
    /// Parse and preprocess a state payload.
    pub fn new(text: &str, options: ContainerOptions) -> Result<Self> {
        let pre = preprocess(text)?;
        let mut tags = Vec::with_capacity(pre.slots.len());
        let mut slots = Vec::with_capacity(pre.slots.len());
        for RawSlot { tag, payload } in pre.slots {
            tags.push(tag);
            slots.push(SlotState::Unresolved(payload));
        }
        Ok(Self {
            tags,
            slots,
            graph: ValueGraph::new(),
            forward_refs: pre.forward_refs,
            preloads: pre.preloads,
            sync_fns: Vec::new(),
            host: None,
            options,
        })
    }

    /// Attach the sync function side table that traveled alongside the
    /// state text.
    pub fn with_sync_fns(mut self, sync_fns: Vec<SyncFn>) -> Self {
        self.sync_fns = sync_fns;
        self
    }

    /// Attach the host adapter used to re-locate tree nodes.
    pub fn with_host(mut self, host: Box<dyn NodeHost>) -> Self {
        self.host = Some(host);
        self
    }

    /// Number of slots in the payload.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the payload has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Lazy-symbol-reference strings the resuming runtime should warm even
    /// if never read.
    pub fn preloads(&self) -> &[String] {
        &self.preloads
    }

    /// Sync function by id, if the side table was attached.
    pub fn sync_fn(&self, id: u32) -> Option<&SyncFn> {
        self.sync_fns.get(id as usize)
    }

    /// The graph values are materialized into.
    pub fn graph(&self) -> &ValueGraph {
        &self.graph
    }

    /// Read a materialized value.
    pub fn value(&self, h: ValueHandle) -> &Value {
        self.graph.get(h)
    }

    /// Resolve a forward-declared placeholder by forward id.
    ///
    /// Fails with [`Error::UnresolvedForwardRef`] if the id never received
    /// a slot - but only when actually read, never eagerly.
    pub fn forward_ref(&mut self, id: u32) -> Result<ValueHandle> {
        let slot = *self
            .forward_refs
            .get(id as usize)
            .ok_or(Error::UnresolvedForwardRef(id))?;
        self.resolve_slot(slot as usize)
    }

    /// Materialize the value in slot `id`.
    ///
    /// In strict mode every failure propagates. Otherwise a failed root
    /// degrades to undefined so the rest of the resume can proceed; the
    /// failure is logged with its kind and slot for later diagnosis.
    pub fn get_object_by_id(&mut self, id: usize) -> Result<ValueHandle> {
        match self.resolve_slot(id) {
            Ok(h) => Ok(h),
            Err(e) if !self.options.strict => {
                tracing::error!(slot = id, error = %e, "state slot failed to resolve, degrading to undefined");
                Ok(self.graph.undefined())
            }
            Err(e) => Err(e),
        }
    }

    fn resolve_slot(&mut self, i: usize) -> Result<ValueHandle> {
        let len = self.slots.len();
        match self
            .slots
            .get(i)
            .ok_or(Error::OutOfRangeReference { index: i, len })?
        {
            SlotState::Resolved(h) | SlotState::Resolving(h) => return Ok(*h),
            SlotState::InProgress => {
                return Err(Error::malformed(
                    i,
                    "reference cycle with no inflatable value on it",
                ))
            }
            SlotState::Unresolved(_) => {}
        }
        let payload = match std::mem::replace(&mut self.slots[i], SlotState::InProgress) {
            SlotState::Unresolved(payload) => payload,
            other => {
                self.slots[i] = other;
                return Err(Error::malformed(i, "slot state changed underfoot"));
            }
        };
        let tag = self.tags[i];
        if tag.is_inflatable() {
            let placeholder = self.allocate(tag);
            self.slots[i] = SlotState::Resolving(placeholder);
            match self.inflate(placeholder, tag, &payload, i) {
                Ok(()) => {
                    self.slots[i] = SlotState::Resolved(placeholder);
                    Ok(placeholder)
                }
                Err(e) => {
                    // Park the payload again so a repeat read re-fails with
                    // the same context; the empty placeholder never escapes
                    // as a resolved value.
                    self.slots[i] = SlotState::Unresolved(payload);
                    Err(e)
                }
            }
        } else {
            match self.resolve_simple(tag, &payload, i) {
                Ok(h) => {
                    self.slots[i] = SlotState::Resolved(h);
                    Ok(h)
                }
                Err(e) => {
                    // Park the payload again so a later read re-fails with
                    // the same context instead of lying.
                    self.slots[i] = SlotState::Unresolved(payload);
                    Err(e)
                }
            }
        }
    }

    /// One-step resolution for kinds that need no placeholder.
    fn resolve_simple(&mut self, tag: TypeTag, payload: &Json, slot: usize) -> Result<ValueHandle> {
        match tag {
            TypeTag::RootRef => {
                if let Some(n) = payload.as_u64() {
                    self.resolve_slot(n as usize)
                } else {
                    Err(Error::malformed(slot, "uncollapsed path reference"))
                }
            }
            TypeTag::Constant => {
                let byte = payload
                    .as_u64()
                    .and_then(|b| u8::try_from(b).ok())
                    .and_then(Constant::from_u8)
                    .ok_or_else(|| Error::malformed(slot, "unknown constant"))?;
                Ok(self.graph.constant_handle(byte))
            }
            TypeTag::Number => {
                let n = payload
                    .as_f64()
                    .ok_or_else(|| Error::malformed(slot, "number payload is not a number"))?;
                Ok(self.graph.alloc(Value::Number(n)))
            }
            TypeTag::String => {
                let s = require_str(payload, slot)?;
                Ok(self.graph.alloc(Value::String(s.to_string())))
            }
            TypeTag::BigInt => {
                let s = require_str(payload, slot)?;
                Ok(self.graph.alloc(Value::BigInt(s.to_string())))
            }
            TypeTag::Date => {
                let ms = payload
                    .as_f64()
                    .ok_or_else(|| Error::malformed(slot, "date payload is not a number"))?;
                Ok(self.graph.alloc(Value::Date(ms)))
            }
            TypeTag::Url => {
                let s = require_str(payload, slot)?;
                Ok(self.graph.alloc(Value::Url(s.to_string())))
            }
            TypeTag::Regex => {
                let parts = payload
                    .as_array()
                    .filter(|a| a.len() == 2)
                    .ok_or_else(|| Error::malformed(slot, "regex payload is not a pair"))?;
                let source = require_str(&parts[0], slot)?.to_string();
                let flags = require_str(&parts[1], slot)?.to_string();
                Ok(self.graph.alloc(Value::Regex { source, flags }))
            }
            TypeTag::NodeRef => {
                let address = require_str(payload, slot)?;
                if let Some(host) = &self.host {
                    if host.get_prop(address, NODE_ID_PROP).is_none() {
                        tracing::warn!(address, "host cannot locate tree node");
                    }
                }
                Ok(self.graph.alloc(Value::NodeRef(address.to_string())))
            }
            TypeTag::SyncFnRef => {
                let id = payload
                    .as_u64()
                    .ok_or_else(|| Error::malformed(slot, "sync fn id is not an integer"))?
                    as u32;
                if !self.sync_fns.is_empty() && self.sync_fn(id).is_none() {
                    return Err(Error::malformed(slot, format!("unknown sync fn {id}")));
                }
                Ok(self.graph.alloc(Value::SyncFnRef(id)))
            }
            TypeTag::Preload => {
                let s = require_str(payload, slot)?;
                Ok(self.graph.alloc(Value::Preload(s.to_string())))
            }
            TypeTag::ForwardRefs => {
                // Metadata slot; reading it as a value yields undefined.
                tracing::debug!(slot, "forward-refs table read as a value");
                Ok(self.graph.undefined())
            }
            _ => Err(Error::malformed(
                slot,
                format!("kind {} is not one-step", tag.name()),
            )),
        }
    }

    /// Resolve a nested payload entry: a bare integer is a slot reference,
    /// a two-element array is an inline `(tag, payload)` pair.
    fn resolve_entry(&mut self, entry: &Json, slot: usize) -> Result<ValueHandle> {
        match entry {
            Json::Number(n) => {
                let j = n
                    .as_u64()
                    .ok_or_else(|| Error::malformed(slot, "negative slot reference"))?;
                self.resolve_slot(j as usize)
            }
            Json::Array(pair) if pair.len() == 2 => {
                let byte = pair[0]
                    .as_u64()
                    .ok_or_else(|| Error::malformed(slot, "inline tag is not an integer"))?;
                let tag = u8::try_from(byte)
                    .ok()
                    .and_then(TypeTag::from_u8)
                    .ok_or(Error::UnsupportedValueKind(byte))?;
                if tag.is_inflatable() {
                    // Inline composites appear exactly once (anything shared
                    // gets promoted to its own slot), so no placeholder
                    // cycle can pass through them.
                    let placeholder = self.allocate(tag);
                    self.inflate(placeholder, tag, &pair[1], slot)?;
                    Ok(placeholder)
                } else {
                    self.resolve_simple(tag, &pair[1], slot)
                }
            }
            _ => Err(Error::malformed(slot, "entry is neither ref nor pair")),
        }
    }

    /// Create the empty container a cyclic reference can safely land on.
    fn allocate(&mut self, tag: TypeTag) -> ValueHandle {
        let undefined = self.graph.undefined();
        let empty = match tag {
            TypeTag::Array => Value::Array(Vec::new()),
            TypeTag::Object => Value::Object(Vec::new()),
            TypeTag::Set => Value::Set(Vec::new()),
            TypeTag::Map => Value::Map(Vec::new()),
            TypeTag::Bytes => Value::Bytes(Vec::new()),
            TypeTag::Error => Value::Error {
                message: String::new(),
                entries: Vec::new(),
            },
            TypeTag::Deferred => Value::Deferred(DeferredState::Pending),
            TypeTag::LazyRef => Value::LazyRef {
                chunk: String::new(),
                symbol: String::new(),
                captures: Vec::new(),
            },
            TypeTag::Component => Value::Component { entry: undefined },
            TypeTag::Cell => Value::Cell {
                kind: CellKind::Plain,
                compute: undefined,
                value: undefined,
            },
            TypeTag::CellComputed => Value::Cell {
                kind: CellKind::Computed,
                compute: undefined,
                value: undefined,
            },
            TypeTag::CellAsync => Value::Cell {
                kind: CellKind::Async,
                compute: undefined,
                value: undefined,
            },
            TypeTag::PropsProxy => Value::PropsProxy {
                varying: undefined,
                constant: undefined,
            },
            TypeTag::EffectMeta => Value::EffectMeta {
                entries: Vec::new(),
            },
            // Non-inflatable kinds never allocate.
            _ => Value::Undefined,
        };
        self.graph.alloc(empty)
    }

    /// Fill a placeholder in. May recursively trigger resolution of other
    /// slots, including - safely - the one being inflated.
    fn inflate(&mut self, placeholder: ValueHandle, tag: TypeTag, payload: &Json, slot: usize) -> Result<()> {
        let value = match tag {
            TypeTag::Array | TypeTag::Set => {
                let entries = require_array(payload, slot)?;
                let mut items = Vec::with_capacity(entries.len());
                for entry in entries {
                    items.push(self.resolve_entry(entry, slot)?);
                }
                if tag == TypeTag::Array {
                    Value::Array(items)
                } else {
                    Value::Set(items)
                }
            }
            TypeTag::Object | TypeTag::EffectMeta => {
                let entries = self.inflate_keyed(require_array(payload, slot)?, slot)?;
                if tag == TypeTag::Object {
                    Value::Object(entries)
                } else {
                    Value::EffectMeta { entries }
                }
            }
            TypeTag::Map => {
                let entries = require_array(payload, slot)?;
                if entries.len() % 2 != 0 {
                    return Err(Error::malformed(slot, "odd map payload"));
                }
                let mut pairs = Vec::with_capacity(entries.len() / 2);
                for chunk in entries.chunks(2) {
                    let key = self.resolve_entry(&chunk[0], slot)?;
                    let value = self.resolve_entry(&chunk[1], slot)?;
                    pairs.push((key, value));
                }
                Value::Map(pairs)
            }
            TypeTag::Bytes => {
                let encoded = require_str(payload, slot)?;
                let bytes = BASE64
                    .decode(encoded)
                    .map_err(|e| Error::malformed(slot, format!("bad base64: {e}")))?;
                Value::Bytes(bytes)
            }
            TypeTag::Error => {
                let entries = require_array(payload, slot)?;
                let (message, rest) = entries
                    .split_first()
                    .ok_or_else(|| Error::malformed(slot, "empty error payload"))?;
                let message = require_str(message, slot)?.to_string();
                let entries = self.inflate_keyed(rest, slot)?;
                Value::Error { message, entries }
            }
            TypeTag::Deferred => {
                let entries = require_array(payload, slot)?;
                let state = match entries.len() {
                    0 => DeferredState::Pending,
                    2 => {
                        let resolved = entries[0].as_u64() == Some(1);
                        let inner = self.resolve_entry(&entries[1], slot)?;
                        if resolved {
                            DeferredState::Resolved(inner)
                        } else {
                            DeferredState::Rejected(inner)
                        }
                    }
                    _ => return Err(Error::malformed(slot, "bad deferred payload")),
                };
                Value::Deferred(state)
            }
            TypeTag::LazyRef => {
                let text = require_str(payload, slot)?.to_string();
                self.inflate_lazy_ref(&text, slot)?
            }
            TypeTag::Component => {
                let entries = require_array(payload, slot)?;
                let entry = entries
                    .first()
                    .ok_or_else(|| Error::malformed(slot, "empty component payload"))?;
                Value::Component {
                    entry: self.resolve_entry(entry, slot)?,
                }
            }
            TypeTag::Cell => {
                let entries = require_array(payload, slot)?;
                let value = entries
                    .first()
                    .ok_or_else(|| Error::malformed(slot, "empty cell payload"))?;
                Value::Cell {
                    kind: CellKind::Plain,
                    compute: self.graph.undefined(),
                    value: self.resolve_entry(value, slot)?,
                }
            }
            TypeTag::CellComputed | TypeTag::CellAsync => {
                let entries = require_array(payload, slot)?;
                if entries.len() != 2 {
                    return Err(Error::malformed(slot, "bad computed cell payload"));
                }
                Value::Cell {
                    kind: if tag == TypeTag::CellComputed {
                        CellKind::Computed
                    } else {
                        CellKind::Async
                    },
                    compute: self.resolve_entry(&entries[0], slot)?,
                    value: self.resolve_entry(&entries[1], slot)?,
                }
            }
            TypeTag::PropsProxy => {
                let entries = require_array(payload, slot)?;
                if entries.len() != 2 {
                    return Err(Error::malformed(slot, "bad props proxy payload"));
                }
                Value::PropsProxy {
                    varying: self.resolve_entry(&entries[0], slot)?,
                    constant: self.resolve_entry(&entries[1], slot)?,
                }
            }
            _ => {
                return Err(Error::malformed(
                    slot,
                    format!("kind {} does not inflate", tag.name()),
                ))
            }
        };
        *self.graph.get_mut(placeholder) = value;
        Ok(())
    }

    fn inflate_keyed(&mut self, entries: &[Json], slot: usize) -> Result<Vec<(String, ValueHandle)>> {
        if entries.len() % 2 != 0 {
            return Err(Error::malformed(slot, "odd keyed payload"));
        }
        let mut out = Vec::with_capacity(entries.len() / 2);
        for chunk in entries.chunks(2) {
            let key = require_str(&chunk[0], slot)?.to_string();
            let value = self.resolve_entry(&chunk[1], slot)?;
            out.push((key, value));
        }
        Ok(out)
    }

    /// Parse `chunk#symbol[cap cap ...]` and resolve the captured slots.
    fn inflate_lazy_ref(&mut self, text: &str, slot: usize) -> Result<Value> {
        let (chunk, rest) = text
            .split_once('#')
            .ok_or_else(|| Error::malformed(slot, "lazy ref missing symbol separator"))?;
        let (symbol, captures) = match rest.split_once('[') {
            Some((symbol, tail)) => {
                let inner = tail
                    .strip_suffix(']')
                    .ok_or_else(|| Error::malformed(slot, "unterminated capture list"))?;
                let mut captures = Vec::new();
                for part in inner.split(' ').filter(|p| !p.is_empty()) {
                    let j: usize = part
                        .parse()
                        .map_err(|_| Error::malformed(slot, format!("bad capture slot {part:?}")))?;
                    captures.push(self.resolve_slot(j)?);
                }
                (symbol, captures)
            }
            None => (rest, Vec::new()),
        };
        Ok(Value::LazyRef {
            chunk: chunk.to_string(),
            symbol: symbol.to_string(),
            captures,
        })
    }
}

fn require_str<'a>(json: &'a Json, slot: usize) -> Result<&'a str> {
    json.as_str()
        .ok_or_else(|| Error::malformed(slot, "expected a string payload"))
}

fn require_array<'a>(json: &'a Json, slot: usize) -> Result<&'a Vec<Json>> {
    json.as_array()
        .ok_or_else(|| Error::malformed(slot, "expected a list payload"))
}
