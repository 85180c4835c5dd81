//! Per-element side-channel records.
//!
//! One record is built per rendered element that needs annotation. The
//! token list is append-only during encoding and is replayed from the start
//! whenever an address is computed. The rendering walker is the sole
//! producer: it pairs every `open_fragment` with a `close_fragment`, and
//! the replay raises [`Error::MalformedTreeAddress`] if it ever finds the
//! pairing broken.

use crate::constants::{
    VNODE_ATTR_END, VNODE_ATTR_VALUE, VNODE_CLOSE, VNODE_OPEN, VNODE_REFERENCE, VNODE_SKIP_BLOCK,
    VNODE_SKIP_ONE, VNODE_SKIP_SIXTEEN,
};
use crate::types::{Error, Result};
use crate::vnode::address::{decode_alphanumeric, push_alphanumeric};

/// Bit flags recording which side-channel features a record uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct VNodeFlags(pub u8);

impl VNodeFlags {
    /// No annotation needed
    pub const NONE: Self = Self(0);
    /// Record carries text sizing markup cannot represent natively
    /// (adjacent or zero-length text nodes)
    pub const TEXT_DATA: Self = Self(1 << 0);
    /// Record contains virtual node boundaries
    pub const VIRTUAL_NODE: Self = Self(1 << 1);
    /// Some node under this record is referenced from serialized state
    pub const REFERENCE: Self = Self(1 << 2);

    /// Whether all bits of `flag` are set.
    #[inline]
    pub const fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }

    /// Union of the two flag sets.
    #[inline]
    pub const fn with(self, flag: Self) -> Self {
        Self(self.0 | flag.0)
    }
}

/// One token in a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VNodeToken {
    /// Character count of a text node
    Text(u32),
    /// Run of plain (un-annotated) sibling elements
    Elements(u32),
    /// Start of a virtual node with its attribute list
    Open(Vec<(String, String)>),
    /// End of a virtual node
    Close,
}

/// Side-channel record for one rendered element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VNodeData {
    tokens: Vec<VNodeToken>,
    flags: u8,
}

impl VNodeData {
    /// Empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Flags accumulated so far.
    pub fn flags(&self) -> VNodeFlags {
        VNodeFlags(self.flags)
    }

    /// Tokens accumulated so far.
    pub fn tokens(&self) -> &[VNodeToken] {
        &self.tokens
    }

    fn set(&mut self, flag: VNodeFlags) {
        self.flags |= flag.0;
    }

    /// Record one more plain sibling element, extending the trailing run.
    pub fn increment_element_count(&mut self) {
        if let Some(VNodeToken::Elements(n)) = self.tokens.last_mut() {
            *n += 1;
        } else {
            self.tokens.push(VNodeToken::Elements(1));
        }
    }

    /// Record a text node of `length` characters.
    ///
    /// Adjacent text nodes and zero-length text nodes cannot be told apart
    /// in rendered markup, so either flags the record for replay from this
    /// side channel.
    pub fn add_text_size(&mut self, length: u32) {
        if length == 0 || matches!(self.tokens.last(), Some(VNodeToken::Text(_))) {
            self.set(VNodeFlags::TEXT_DATA);
        }
        self.tokens.push(VNodeToken::Text(length));
    }

    /// Open a virtual (unrendered) node carrying a small attribute list.
    pub fn open_fragment(&mut self, attrs: Vec<(String, String)>) {
        self.set(VNodeFlags::VIRTUAL_NODE);
        self.tokens.push(VNodeToken::Open(attrs));
    }

    /// Close the most recently opened virtual node.
    pub fn close_fragment(&mut self) {
        self.set(VNodeFlags::VIRTUAL_NODE);
        self.tokens.push(VNodeToken::Close);
    }

    /// Compute the tree address of the current position and mark the record
    /// as referenced.
    ///
    /// `element_index` is the element's depth-first index in the rendered
    /// subtree. When the record holds no virtual-node tokens the address is
    /// just that index - the common case, with no replay. Otherwise the
    /// tokens are replayed with a stack of per-depth child counts and the
    /// address is the index followed by one encoded count per open depth.
    pub fn create_reference(&mut self, element_index: u32) -> Result<String> {
        self.set(VNodeFlags::REFERENCE);
        if !self.flags().contains(VNodeFlags::VIRTUAL_NODE) {
            return Ok(element_index.to_string());
        }
        let mut stack: Vec<u32> = vec![0];
        for token in &self.tokens {
            match token {
                VNodeToken::Text(_) => *stack.last_mut().unwrap_or(&mut 0) += 1,
                VNodeToken::Elements(n) => *stack.last_mut().unwrap_or(&mut 0) += n,
                VNodeToken::Open(_) => stack.push(0),
                VNodeToken::Close => {
                    stack.pop();
                    match stack.last_mut() {
                        Some(count) => *count += 1,
                        None => {
                            return Err(Error::MalformedTreeAddress(format!(
                                "close without open in record for element {element_index}"
                            )))
                        }
                    }
                }
            }
        }
        let mut out = element_index.to_string();
        for &count in &stack {
            push_alphanumeric(&mut out, count);
        }
        Ok(out)
    }

    /// Encode this record's body as side-channel text.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        if self.flags().contains(VNodeFlags::REFERENCE) {
            out.push(VNODE_REFERENCE);
        }
        for token in &self.tokens {
            match token {
                VNodeToken::Text(n) => push_alphanumeric(&mut out, *n),
                VNodeToken::Elements(n) => out.push_str(&n.to_string()),
                VNodeToken::Open(attrs) => {
                    out.push(VNODE_OPEN);
                    for (name, value) in attrs {
                        out.push_str(name);
                        out.push(VNODE_ATTR_VALUE);
                        out.push_str(value);
                        out.push(VNODE_ATTR_END);
                    }
                }
                VNodeToken::Close => out.push(VNODE_CLOSE),
            }
        }
        out
    }

    /// Decode one record body. Flags are recomputed from the tokens.
    pub fn decode(text: &str) -> Result<Self> {
        let mut record = Self::new();
        let mut pos = 0;
        decode_body(text, &mut pos, &mut record)?;
        if pos != text.len() {
            return Err(Error::MalformedTreeAddress(format!(
                "trailing bytes at {pos} of record {text:?}"
            )));
        }
        Ok(record)
    }
}

fn is_skip(c: u8) -> bool {
    c == VNODE_SKIP_ONE as u8 || c == VNODE_SKIP_SIXTEEN as u8 || c == VNODE_SKIP_BLOCK as u8
}

/// Decode a record body starting at `pos`, stopping at a skip marker or
/// the end of input.
fn decode_body(text: &str, pos: &mut usize, record: &mut VNodeData) -> Result<()> {
    let bytes = text.as_bytes();
    if bytes.get(*pos) == Some(&(VNODE_REFERENCE as u8)) {
        record.set(VNodeFlags::REFERENCE);
        *pos += 1;
    }
    while let Some(&b) = bytes.get(*pos) {
        match b {
            b'0'..=b'9' => {
                let start = *pos;
                while matches!(bytes.get(*pos), Some(b'0'..=b'9')) {
                    *pos += 1;
                }
                let run: u32 = text[start..*pos].parse().map_err(|_| {
                    Error::MalformedTreeAddress(format!("bad element run in {text:?}"))
                })?;
                record.tokens.push(VNodeToken::Elements(run));
            }
            b'a'..=b'z' | b'A'..=b'Z' => {
                let n = decode_alphanumeric(text, pos)?;
                record.add_text_size(n);
            }
            _ if b == VNODE_OPEN as u8 => {
                *pos += 1;
                let attrs = decode_attrs(text, pos)?;
                record.open_fragment(attrs);
            }
            _ if b == VNODE_CLOSE as u8 => {
                *pos += 1;
                record.close_fragment();
            }
            _ if is_skip(b) => break,
            _ => {
                return Err(Error::MalformedTreeAddress(format!(
                    "unexpected byte {:?} at {} of record {:?}",
                    b as char, *pos, text
                )))
            }
        }
    }
    Ok(())
}

/// Attribute names and values may not contain the reserved punctuation
/// characters; the rendering walker only stores small framework-internal
/// keys here.
fn decode_attrs(text: &str, pos: &mut usize) -> Result<Vec<(String, String)>> {
    let bytes = text.as_bytes();
    let mut attrs = Vec::new();
    loop {
        // An attribute is present iff a '=' appears before any structural
        // character.
        let mut probe = *pos;
        let mut found_eq = false;
        while let Some(&b) = bytes.get(probe) {
            if b == VNODE_ATTR_VALUE as u8 {
                found_eq = true;
                break;
            }
            if b == VNODE_OPEN as u8
                || b == VNODE_CLOSE as u8
                || b == VNODE_ATTR_END as u8
                || b == VNODE_REFERENCE as u8
                || is_skip(b)
            {
                break;
            }
            probe += 1;
        }
        if !found_eq {
            return Ok(attrs);
        }
        let name = text[*pos..probe].to_string();
        *pos = probe + 1;
        let value_start = *pos;
        while let Some(&b) = bytes.get(*pos) {
            if b == VNODE_ATTR_END as u8 {
                break;
            }
            *pos += 1;
        }
        if bytes.get(*pos) != Some(&(VNODE_ATTR_END as u8)) {
            return Err(Error::MalformedTreeAddress(format!(
                "unterminated attribute in {text:?}"
            )));
        }
        attrs.push((name, text[value_start..*pos].to_string()));
        *pos += 1;
    }
}

/// Encode a set of records, ordered by depth-first element index, into one
/// side-channel string. Gaps between annotated elements are written as
/// skip markers at three magnitudes. Indices must be strictly increasing
/// (the first may be zero); anything else has no skip-marker spelling and
/// is rejected.
pub fn encode_block(records: &[(u32, VNodeData)]) -> Result<String> {
    let mut out = String::new();
    let mut cursor = 0u32;
    for (k, (index, record)) in records.iter().enumerate() {
        if *index < cursor || (k > 0 && *index == cursor) {
            return Err(Error::MalformedTreeAddress(format!(
                "record indices not strictly increasing at element {index}"
            )));
        }
        let mut gap = index - cursor;
        while gap >= 256 {
            out.push(VNODE_SKIP_BLOCK);
            gap -= 256;
        }
        while gap >= 16 {
            out.push(VNODE_SKIP_SIXTEEN);
            gap -= 16;
        }
        while gap >= 1 {
            out.push(VNODE_SKIP_ONE);
            gap -= 1;
        }
        out.push_str(&record.encode());
        cursor = *index;
    }
    Ok(out)
}

/// Decode a side-channel string back into per-element records.
pub fn decode_block(text: &str) -> Result<Vec<(u32, VNodeData)>> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut pos = 0;
    let mut cursor = 0u32;
    let mut first = true;
    while pos < text.len() {
        let mut gap = 0u32;
        while let Some(&b) = bytes.get(pos) {
            if b == VNODE_SKIP_BLOCK as u8 {
                gap += 256;
            } else if b == VNODE_SKIP_SIXTEEN as u8 {
                gap += 16;
            } else if b == VNODE_SKIP_ONE as u8 {
                gap += 1;
            } else {
                break;
            }
            pos += 1;
        }
        if !first && gap == 0 {
            return Err(Error::MalformedTreeAddress(format!(
                "records not separated at byte {pos} of {text:?}"
            )));
        }
        cursor += gap;
        let mut record = VNodeData::new();
        decode_body(text, &mut pos, &mut record)?;
        out.push((cursor, record));
        first = false;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_record_reference_is_just_the_element_index() {
        // Goal: a record with only plain-element runs must address by bare
        // index, with no alphanumeric suffix and no replay.
        let mut record = VNodeData::new();
        record.increment_element_count();
        record.increment_element_count();
        record.increment_element_count();
        assert_eq!(record.tokens(), &[VNodeToken::Elements(3)]);
        assert_eq!(record.create_reference(7).unwrap(), "7");
        assert!(record.flags().contains(VNodeFlags::REFERENCE));
    }

    #[test]
    fn reference_address_tracks_position() {
        // Goal: an address taken before a sibling is appended differs from
        // one taken after, and both replay purely from the record.
        let mut record = VNodeData::new();
        record.open_fragment(Vec::new());
        record.increment_element_count();
        let before = record.create_reference(2).unwrap();
        record.increment_element_count();
        let after = record.create_reference(2).unwrap();
        record.close_fragment();
        assert_eq!(before, "2AB");
        assert_eq!(after, "2AC");
        assert_ne!(before, after);
    }

    #[test]
    fn unbalanced_close_is_detected() {
        let mut record = VNodeData::new();
        record.open_fragment(Vec::new());
        record.close_fragment();
        record.close_fragment();
        assert!(matches!(
            record.create_reference(0),
            Err(crate::types::Error::MalformedTreeAddress(_))
        ));
    }

    #[test]
    fn text_flags_fire_on_zero_and_adjacent_text() {
        let mut record = VNodeData::new();
        record.add_text_size(5);
        assert!(!record.flags().contains(VNodeFlags::TEXT_DATA));
        record.add_text_size(3);
        assert!(record.flags().contains(VNodeFlags::TEXT_DATA));

        let mut zero = VNodeData::new();
        zero.add_text_size(0);
        assert!(zero.flags().contains(VNodeFlags::TEXT_DATA));
    }

    #[test]
    fn record_codec_roundtrip() {
        let mut record = VNodeData::new();
        record.increment_element_count();
        record.increment_element_count();
        record.add_text_size(12);
        record.open_fragment(vec![(":key".into(), "item-3".into())]);
        record.add_text_size(0);
        record.close_fragment();
        record.increment_element_count();

        let text = record.encode();
        let back = VNodeData::decode(&text).unwrap();
        assert_eq!(back.tokens(), record.tokens());
        assert_eq!(back.flags(), record.flags());
    }

    #[test]
    fn block_codec_roundtrip_with_gaps() {
        let mut a = VNodeData::new();
        a.add_text_size(4);
        let mut b = VNodeData::new();
        b.open_fragment(Vec::new());
        b.increment_element_count();
        b.close_fragment();
        let mut c = VNodeData::new();
        c.add_text_size(1);
        c.add_text_size(2);

        let records = vec![(0u32, a), (19u32, b), (300u32, c)];
        let text = encode_block(&records).unwrap();
        let back = decode_block(&text).unwrap();
        assert_eq!(back, records);
    }

    #[test]
    fn unordered_records_are_rejected() {
        // Goal: out-of-order or duplicate element indices have no
        // skip-marker spelling and must fail instead of underflowing.
        let backwards = vec![(5u32, VNodeData::new()), (2u32, VNodeData::new())];
        assert!(matches!(
            encode_block(&backwards),
            Err(Error::MalformedTreeAddress(_))
        ));

        let duplicate = vec![(3u32, VNodeData::new()), (3u32, VNodeData::new())];
        assert!(encode_block(&duplicate).is_err());
    }

    #[test]
    fn referenced_record_roundtrips_the_marker() {
        let mut record = VNodeData::new();
        record.increment_element_count();
        let _ = record.create_reference(0).unwrap();
        let text = record.encode();
        assert!(text.starts_with('~'));
        let back = VNodeData::decode(&text).unwrap();
        assert!(back.flags().contains(VNodeFlags::REFERENCE));
    }
}
