//! Wire-format constants shared across the serializer and the tree-position
//! addressing subsystem.
//!
//! The tree-position side channel uses a private alphabet: letters are
//! alphanumeric-encoded counts, digits are plain-element run lengths, and a
//! small set of reserved punctuation characters mark structure. The
//! constants below are the single source of truth for that alphabet.

/// Opens a virtual (unrendered) node in the tree-position side channel.
pub const VNODE_OPEN: char = '{';

/// Closes a virtual node in the tree-position side channel.
pub const VNODE_CLOSE: char = '}';

/// Marks a record whose element is referenced from serialized state.
pub const VNODE_REFERENCE: char = '~';

/// Separates an attribute name from its value inside a virtual-node marker.
pub const VNODE_ATTR_VALUE: char = '=';

/// Terminates one attribute inside a virtual-node marker.
pub const VNODE_ATTR_END: char = '|';

/// Advances the element cursor by one between records.
pub const VNODE_SKIP_ONE: char = '!';

/// Advances the element cursor by sixteen between records.
///
/// Skip markers exist at several magnitudes so long runs of un-annotated
/// elements stay cheap in the side channel.
pub const VNODE_SKIP_SIXTEEN: char = '#';

/// Advances the element cursor by 256 between records.
pub const VNODE_SKIP_BLOCK: char = '*';

/// Number of letters in the alphanumeric encoding alphabet.
///
/// Counts are base-26; every digit is a lowercase letter except the final
/// one, which is uppercase. The case switch is what makes concatenated
/// encodings splittable without a separator.
pub const ALPHA_BASE: u32 = 26;

/// Upper bound of the process-wide memo table for the alphanumeric encoding.
///
/// Small counts repeat heavily, so encodings below this bound are interned
/// once and reused; larger counts are encoded on the fly.
pub const ALPHA_MEMO_LIMIT: u32 = 1024;

/// Largest integer a double represents exactly.
///
/// Numbers at or beyond this magnitude are pre-interned constants on the
/// wire rather than inline literals.
pub const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Named property the host is asked for when a tree-node reference is
/// re-located during resumption.
pub const NODE_ID_PROP: &str = "id";
