//! Arena-backed value model shared by both serialization directions.
//!
//! Every value lives in a [`ValueGraph`] arena and is identified by a
//! [`ValueHandle`], a stable integer assigned on allocation. Handle equality
//! is value identity: the serializer deduplicates by handle, and the
//! deserializer reconstructs shared values as shared handles. Using the
//! arena index as the identity key also resolves the value-equality versus
//! identity ambiguity for primitive-like composites - two equal empty
//! arrays with different handles stay distinct.

use crate::constants::MAX_SAFE_INTEGER;
use crate::types::tag::{Constant, TypeTag};

/// Identity handle into a [`ValueGraph`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueHandle(pub(crate) u32);

impl ValueHandle {
    /// Arena index of this handle.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Settlement state of a deferred result.
///
/// The engine never awaits: the collaborator that owns the async work
/// settles the deferred before (or while) registering roots, and a deferred
/// that is still pending at serialization time is recorded as pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredState {
    /// Not settled yet
    Pending,
    /// Settled successfully with a value
    Resolved(ValueHandle),
    /// Settled with a failure value
    Rejected(ValueHandle),
}

/// Which flavor of reactive cell a [`Value::Cell`] payload represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    /// Plain mutable box
    Plain,
    /// Derived from other cells by a lazy-referenced function
    Computed,
    /// Derived asynchronously
    Async,
}

/// Framework-reserved marker singletons.
///
/// These only ever travel as pre-interned constants; they have no tag of
/// their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// Computed-cell value that has not been computed yet
    NeedsComputation,
    /// Reserved slot marker
    Slot,
    /// Reserved unassigned marker
    Unassigned,
}

/// Any datum that can appear in the serialized graph.
///
/// Composite variants reference children by [`ValueHandle`]; the graph may
/// be cyclic through any inflatable kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The undefined value
    Undefined,
    /// The null value
    Null,
    /// Boolean
    Bool(bool),
    /// Double-precision number (including non-finite specials)
    Number(f64),
    /// Arbitrary-precision integer as a decimal string
    BigInt(String),
    /// UTF-8 string
    String(String),
    /// Ordered list
    Array(Vec<ValueHandle>),
    /// Plain keyed record with stable key order
    Object(Vec<(String, ValueHandle)>),
    /// Unique set with stable insertion order
    Set(Vec<ValueHandle>),
    /// Key-value map with stable insertion order
    Map(Vec<(ValueHandle, ValueHandle)>),
    /// Byte buffer
    Bytes(Vec<u8>),
    /// Error value
    Error {
        /// Error message
        message: String,
        /// Extra named entries attached to the error
        entries: Vec<(String, ValueHandle)>,
    },
    /// Deferred result (promise-like)
    Deferred(DeferredState),
    /// Pointer to code that must be fetched before it can run
    LazyRef {
        /// Chunk the symbol lives in
        chunk: String,
        /// Symbol name within the chunk
        symbol: String,
        /// Values the callback closes over
        captures: Vec<ValueHandle>,
    },
    /// Component descriptor
    Component {
        /// Lazy reference to the component entry point
        entry: ValueHandle,
    },
    /// Reactive cell (mutable box with dependents)
    Cell {
        /// Plain, computed or async-computed
        kind: CellKind,
        /// Lazy reference computing the value; undefined for plain cells
        compute: ValueHandle,
        /// Current value, or the needs-computation marker
        value: ValueHandle,
    },
    /// Reference to a tree node by tree address
    NodeRef(String),
    /// Props view splitting varying from constant entries
    PropsProxy {
        /// Props known to change
        varying: ValueHandle,
        /// Props known constant
        constant: ValueHandle,
    },
    /// Subscription/effect metadata
    EffectMeta {
        /// Named metadata entries
        entries: Vec<(String, ValueHandle)>,
    },
    /// Timestamp, milliseconds since epoch
    Date(f64),
    /// Absolute URL
    Url(String),
    /// Regular expression
    Regex {
        /// Pattern source
        source: String,
        /// Pattern flags
        flags: String,
    },
    /// Reference into the sync function side table
    SyncFnRef(u32),
    /// Lazy-symbol-reference string to warm proactively
    Preload(String),
    /// Framework-reserved marker singleton
    Marker(Marker),
}

/// Handles of the pre-interned constant singletons, allocated once per
/// graph in [`Constant`] declaration order.
#[derive(Debug, Clone)]
struct Interned([ValueHandle; Constant::COUNT as usize]);

/// Arena holding one object graph for the duration of a pass.
#[derive(Debug, Clone)]
pub struct ValueGraph {
    nodes: Vec<Value>,
    interned: Interned,
}

impl Default for ValueGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueGraph {
    /// Create an empty graph with the constant singletons pre-interned.
    pub fn new() -> Self {
        let mut graph = Self {
            nodes: Vec::new(),
            interned: Interned([ValueHandle(0); Constant::COUNT as usize]),
        };
        for byte in 0..Constant::COUNT {
            let c = match Constant::from_u8(byte) {
                Some(c) => c,
                None => continue,
            };
            let h = graph.alloc(Self::constant_value(c));
            graph.interned.0[byte as usize] = h;
        }
        graph
    }

    fn constant_value(c: Constant) -> Value {
        match c {
            Constant::Undefined => Value::Undefined,
            Constant::Null => Value::Null,
            Constant::True => Value::Bool(true),
            Constant::False => Value::Bool(false),
            Constant::EmptyString => Value::String(String::new()),
            Constant::EmptyArray => Value::Array(Vec::new()),
            Constant::EmptyObject => Value::Object(Vec::new()),
            Constant::NeedsComputation => Value::Marker(Marker::NeedsComputation),
            Constant::Nan => Value::Number(f64::NAN),
            Constant::PositiveInfinity => Value::Number(f64::INFINITY),
            Constant::NegativeInfinity => Value::Number(f64::NEG_INFINITY),
            Constant::NegativeZero => Value::Number(-0.0),
            Constant::MaxSafeInteger => Value::Number(MAX_SAFE_INTEGER),
            Constant::MinSafeInteger => Value::Number(-MAX_SAFE_INTEGER),
            Constant::SlotMarker => Value::Marker(Marker::Slot),
            Constant::UnassignedMarker => Value::Marker(Marker::Unassigned),
        }
    }

    /// Allocate a value and return its identity handle.
    pub fn alloc(&mut self, value: Value) -> ValueHandle {
        let h = ValueHandle(self.nodes.len() as u32);
        self.nodes.push(value);
        h
    }

    /// Number of values allocated in this graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph holds no values. Never true: the constants are
    /// interned at construction.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Read a value by handle.
    #[inline]
    pub fn get(&self, h: ValueHandle) -> &Value {
        &self.nodes[h.index()]
    }

    /// Mutate a value by handle. Used by the deserializer to fill
    /// placeholders; the serializer never mutates the graph mid-pass.
    #[inline]
    pub fn get_mut(&mut self, h: ValueHandle) -> &mut Value {
        &mut self.nodes[h.index()]
    }

    /// Handle of a pre-interned constant singleton.
    #[inline]
    pub fn constant_handle(&self, c: Constant) -> ValueHandle {
        self.interned.0[c.as_u8() as usize]
    }

    /// Handle of the interned undefined value.
    #[inline]
    pub fn undefined(&self) -> ValueHandle {
        self.constant_handle(Constant::Undefined)
    }

    /// Handle of the interned null value.
    #[inline]
    pub fn null(&self) -> ValueHandle {
        self.constant_handle(Constant::Null)
    }

    /// Handle of an interned boolean.
    #[inline]
    pub fn bool(&self, b: bool) -> ValueHandle {
        self.constant_handle(if b { Constant::True } else { Constant::False })
    }

    /// If this handle serializes as a pre-interned constant, which one.
    ///
    /// Primitives that only have one observable identity (undefined, null,
    /// booleans, markers, the special numbers) map to constants regardless
    /// of which handle carries them. The empty-list/record sentinels map
    /// only when the handle is the interned singleton, so distinct empty
    /// composites keep distinct identities.
    pub fn constant_of(&self, h: ValueHandle) -> Option<Constant> {
        match self.get(h) {
            Value::Undefined => Some(Constant::Undefined),
            Value::Null => Some(Constant::Null),
            Value::Bool(true) => Some(Constant::True),
            Value::Bool(false) => Some(Constant::False),
            Value::Marker(Marker::NeedsComputation) => Some(Constant::NeedsComputation),
            Value::Marker(Marker::Slot) => Some(Constant::SlotMarker),
            Value::Marker(Marker::Unassigned) => Some(Constant::UnassignedMarker),
            Value::Number(n) => Self::number_constant(*n),
            Value::String(s) if s.is_empty() => {
                (h == self.constant_handle(Constant::EmptyString)).then_some(Constant::EmptyString)
            }
            Value::Array(items) if items.is_empty() => {
                (h == self.constant_handle(Constant::EmptyArray)).then_some(Constant::EmptyArray)
            }
            Value::Object(entries) if entries.is_empty() => {
                (h == self.constant_handle(Constant::EmptyObject)).then_some(Constant::EmptyObject)
            }
            _ => None,
        }
    }

    fn number_constant(n: f64) -> Option<Constant> {
        if n.is_nan() {
            Some(Constant::Nan)
        } else if n == f64::INFINITY {
            Some(Constant::PositiveInfinity)
        } else if n == f64::NEG_INFINITY {
            Some(Constant::NegativeInfinity)
        } else if n == 0.0 && n.is_sign_negative() {
            Some(Constant::NegativeZero)
        } else if n == MAX_SAFE_INTEGER {
            Some(Constant::MaxSafeInteger)
        } else if n == -MAX_SAFE_INTEGER {
            Some(Constant::MinSafeInteger)
        } else {
            None
        }
    }

    /// Wire tag for a value. Kinds without a tag of their own (booleans,
    /// undefined, null, markers) travel as constants.
    pub fn tag_of(&self, h: ValueHandle) -> TypeTag {
        match self.get(h) {
            Value::Undefined | Value::Null | Value::Bool(_) | Value::Marker(_) => TypeTag::Constant,
            Value::Number(_) => TypeTag::Number,
            Value::BigInt(_) => TypeTag::BigInt,
            Value::String(_) => TypeTag::String,
            Value::Array(_) => TypeTag::Array,
            Value::Object(_) => TypeTag::Object,
            Value::Set(_) => TypeTag::Set,
            Value::Map(_) => TypeTag::Map,
            Value::Bytes(_) => TypeTag::Bytes,
            Value::Error { .. } => TypeTag::Error,
            Value::Deferred(_) => TypeTag::Deferred,
            Value::LazyRef { .. } => TypeTag::LazyRef,
            Value::Component { .. } => TypeTag::Component,
            Value::Cell { kind, .. } => match kind {
                CellKind::Plain => TypeTag::Cell,
                CellKind::Computed => TypeTag::CellComputed,
                CellKind::Async => TypeTag::CellAsync,
            },
            Value::NodeRef(_) => TypeTag::NodeRef,
            Value::PropsProxy { .. } => TypeTag::PropsProxy,
            Value::EffectMeta { .. } => TypeTag::EffectMeta,
            Value::Date(_) => TypeTag::Date,
            Value::Url(_) => TypeTag::Url,
            Value::Regex { .. } => TypeTag::Regex,
            Value::SyncFnRef(_) => TypeTag::SyncFnRef,
            Value::Preload(_) => TypeTag::Preload,
        }
    }

    /// Number of addressable children of a value.
    ///
    /// The ordering defined here is the "K-th child" ordering shared by the
    /// serializer's path computation and the deserializer's path drilling;
    /// the two must never disagree.
    pub fn child_count(&self, h: ValueHandle) -> usize {
        match self.get(h) {
            Value::Array(items) | Value::Set(items) => items.len(),
            Value::Object(entries) => entries.len(),
            Value::Map(pairs) => pairs.len() * 2,
            Value::Error { entries, .. } | Value::EffectMeta { entries } => entries.len(),
            Value::Deferred(DeferredState::Resolved(_) | DeferredState::Rejected(_)) => 1,
            Value::Component { .. } => 1,
            Value::Cell {
                kind: CellKind::Plain,
                ..
            } => 1,
            Value::Cell { .. } => 2,
            Value::PropsProxy { .. } => 2,
            Value::LazyRef { captures, .. } => captures.len(),
            _ => 0,
        }
    }

    /// K-th child of a value, per the shared child ordering.
    pub fn child_at(&self, h: ValueHandle, k: usize) -> Option<ValueHandle> {
        match self.get(h) {
            Value::Array(items) | Value::Set(items) => items.get(k).copied(),
            Value::Object(entries) => entries.get(k).map(|(_, v)| *v),
            Value::Map(pairs) => {
                let (key, value) = pairs.get(k / 2)?;
                Some(if k % 2 == 0 { *key } else { *value })
            }
            Value::Error { entries, .. } | Value::EffectMeta { entries } => {
                entries.get(k).map(|(_, v)| *v)
            }
            Value::Deferred(DeferredState::Resolved(v) | DeferredState::Rejected(v)) => {
                (k == 0).then_some(*v)
            }
            Value::Component { entry } => (k == 0).then_some(*entry),
            Value::Cell {
                kind: CellKind::Plain,
                value,
                ..
            } => (k == 0).then_some(*value),
            Value::Cell { compute, value, .. } => match k {
                0 => Some(*compute),
                1 => Some(*value),
                _ => None,
            },
            Value::PropsProxy { varying, constant } => match k {
                0 => Some(*varying),
                1 => Some(*constant),
                _ => None,
            },
            Value::LazyRef { captures, .. } => captures.get(k).copied(),
            _ => None,
        }
    }
}
