//! Wire-format type tags - one per serializable value kind.
//!
//! The registry is a closed enumeration: every kind the graph walker can
//! emit has exactly one tag, and the deserializer rejects any tag byte it
//! does not know. Tags are stable within one engine version only; no
//! cross-version compatibility is guaranteed.

/// Wire format type identifiers, one-to-one with serializable value kinds.
///
/// Kinds that resolve in a single step come first; kinds that need the
/// allocate-then-inflate two-step (to stay safe under cycles) are declared
/// contiguously at the end. Whether a tag is inflatable is decided by
/// [`TypeTag::is_inflatable`], an explicit per-kind flag - the contiguous
/// declaration is a convention pinned by a test, not something the decoder
/// relies on.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    /// Back-reference to an already-assigned slot (number or path string)
    RootRef = 0,
    /// Table of forward-declared placeholder slots
    ForwardRefs = 1,
    /// Pre-interned constant (see [`Constant`])
    Constant = 2,
    /// Finite double
    Number = 3,
    /// UTF-8 string
    String = 4,
    /// Arbitrary-precision integer, decimal string payload
    BigInt = 5,
    /// Timestamp, milliseconds since epoch
    Date = 6,
    /// Absolute URL string
    Url = 7,
    /// Regular expression source and flags
    Regex = 8,
    /// Tree-node reference, payload is a tree address
    NodeRef = 9,
    /// Reference into the pre-registered sync function side table
    SyncFnRef = 10,
    /// Lazy-symbol-reference string that should be proactively warmed
    Preload = 11,

    // Inflatable kinds from here on.
    /// Ordered list
    Array = 12,
    /// Plain keyed record
    Object = 13,
    /// Unique set
    Set = 14,
    /// Key-value map
    Map = 15,
    /// Byte buffer, base64 payload
    Bytes = 16,
    /// Error value with message and extra entries
    Error = 17,
    /// Deferred result (promise-like)
    Deferred = 18,
    /// Lazy-symbol-reference with captured values
    LazyRef = 19,
    /// Component descriptor
    Component = 20,
    /// Plain reactive cell
    Cell = 21,
    /// Computed reactive cell
    CellComputed = 22,
    /// Async-computed reactive cell
    CellAsync = 23,
    /// Key/value-pair proxy splitting varying from constant props
    PropsProxy = 24,
    /// Subscription/effect metadata
    EffectMeta = 25,
}

impl TypeTag {
    /// Number of registered tags.
    pub const COUNT: u8 = Self::EffectMeta as u8 + 1;

    /// Wire byte for this tag.
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Look a tag up by wire byte.
    pub const fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Self::RootRef,
            1 => Self::ForwardRefs,
            2 => Self::Constant,
            3 => Self::Number,
            4 => Self::String,
            5 => Self::BigInt,
            6 => Self::Date,
            7 => Self::Url,
            8 => Self::Regex,
            9 => Self::NodeRef,
            10 => Self::SyncFnRef,
            11 => Self::Preload,
            12 => Self::Array,
            13 => Self::Object,
            14 => Self::Set,
            15 => Self::Map,
            16 => Self::Bytes,
            17 => Self::Error,
            18 => Self::Deferred,
            19 => Self::LazyRef,
            20 => Self::Component,
            21 => Self::Cell,
            22 => Self::CellComputed,
            23 => Self::CellAsync,
            24 => Self::PropsProxy,
            25 => Self::EffectMeta,
            _ => return None,
        })
    }

    /// Whether reconstruction of this kind needs a placeholder-then-fill
    /// two-step. Getting this wrong either wastes a pass (false positive)
    /// or lets an under-resolved value escape (false negative), so it is an
    /// explicit flag per kind rather than a range check on the tag byte.
    pub const fn is_inflatable(self) -> bool {
        matches!(
            self,
            Self::Array
                | Self::Object
                | Self::Set
                | Self::Map
                | Self::Bytes
                | Self::Error
                | Self::Deferred
                | Self::LazyRef
                | Self::Component
                | Self::Cell
                | Self::CellComputed
                | Self::CellAsync
                | Self::PropsProxy
                | Self::EffectMeta
        )
    }

    /// Human-readable kind name for diagnostics.
    pub const fn name(self) -> &'static str {
        match self {
            Self::RootRef => "root-ref",
            Self::ForwardRefs => "forward-refs",
            Self::Constant => "constant",
            Self::Number => "number",
            Self::String => "string",
            Self::BigInt => "bigint",
            Self::Date => "date",
            Self::Url => "url",
            Self::Regex => "regex",
            Self::NodeRef => "node-ref",
            Self::SyncFnRef => "sync-fn-ref",
            Self::Preload => "preload",
            Self::Array => "array",
            Self::Object => "object",
            Self::Set => "set",
            Self::Map => "map",
            Self::Bytes => "bytes",
            Self::Error => "error",
            Self::Deferred => "deferred",
            Self::LazyRef => "lazy-ref",
            Self::Component => "component",
            Self::Cell => "cell",
            Self::CellComputed => "cell-computed",
            Self::CellAsync => "cell-async",
            Self::PropsProxy => "props-proxy",
            Self::EffectMeta => "effect-meta",
        }
    }
}

/// Pre-interned constants - shared singletons and sentinels that serialize
/// as a bare tag byte with no inline payload beyond the constant id.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constant {
    /// The undefined value
    Undefined = 0,
    /// The null value
    Null = 1,
    /// Boolean true
    True = 2,
    /// Boolean false
    False = 3,
    /// The shared empty string
    EmptyString = 4,
    /// The shared empty-list sentinel
    EmptyArray = 5,
    /// The shared empty-record sentinel
    EmptyObject = 6,
    /// Not-yet-computed sentinel for computed cells
    NeedsComputation = 7,
    /// IEEE NaN
    Nan = 8,
    /// Positive infinity
    PositiveInfinity = 9,
    /// Negative infinity
    NegativeInfinity = 10,
    /// Negative zero
    NegativeZero = 11,
    /// Largest exactly-representable integer
    MaxSafeInteger = 12,
    /// Smallest exactly-representable integer
    MinSafeInteger = 13,
    /// Framework-reserved slot marker object
    SlotMarker = 14,
    /// Framework-reserved unassigned marker object
    UnassignedMarker = 15,
}

impl Constant {
    /// Number of registered constants.
    pub const COUNT: u8 = Self::UnassignedMarker as u8 + 1;

    /// Wire byte for this constant.
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Look a constant up by wire byte.
    pub const fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Self::Undefined,
            1 => Self::Null,
            2 => Self::True,
            3 => Self::False,
            4 => Self::EmptyString,
            5 => Self::EmptyArray,
            6 => Self::EmptyObject,
            7 => Self::NeedsComputation,
            8 => Self::Nan,
            9 => Self::PositiveInfinity,
            10 => Self::NegativeInfinity,
            11 => Self::NegativeZero,
            12 => Self::MaxSafeInteger,
            13 => Self::MinSafeInteger,
            14 => Self::SlotMarker,
            15 => Self::UnassignedMarker,
            _ => return None,
        })
    }
}
