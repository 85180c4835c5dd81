//! Base-26 alphanumeric count encoding.
//!
//! A non-negative integer is written in base 26 with letters only: every
//! digit is lowercase except the final one, which is uppercase. The case
//! switch terminates each number, so arbitrarily many encodings can be
//! concatenated and split back without a separator - decoding scans until
//! an uppercase letter, consumes it, and continues.

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::constants::{ALPHA_BASE, ALPHA_MEMO_LIMIT};
use crate::types::{Error, Result};

/// Process-wide memo for small encodings. Growth-only and read-mostly, so
/// it is safe to share across concurrent passes.
static MEMO: Lazy<RwLock<Vec<String>>> = Lazy::new(|| RwLock::new(Vec::new()));

fn encode_uncached(mut n: u32) -> String {
    let mut digits = [0u8; 8];
    let mut len = 0;
    loop {
        digits[len] = (n % ALPHA_BASE) as u8;
        len += 1;
        n /= ALPHA_BASE;
        if n == 0 {
            break;
        }
    }
    // Most significant digit first; the last emitted digit is uppercase.
    let mut out = String::with_capacity(len);
    for i in (1..len).rev() {
        out.push((b'a' + digits[i]) as char);
    }
    out.push((b'A' + digits[0]) as char);
    out
}

/// Encode a count as letters, final letter uppercase.
///
/// Small counts repeat heavily, so encodings below the memo limit are
/// interned in a growth-only table and cloned out.
pub fn encode_alphanumeric(n: u32) -> String {
    if n >= ALPHA_MEMO_LIMIT {
        return encode_uncached(n);
    }
    {
        let memo = MEMO.read();
        if let Some(s) = memo.get(n as usize) {
            return s.clone();
        }
    }
    let mut memo = MEMO.write();
    while memo.len() <= n as usize {
        let next = memo.len() as u32;
        memo.push(encode_uncached(next));
    }
    memo[n as usize].clone()
}

/// Append an encoded count to an existing string without an intermediate
/// allocation for large values.
pub(crate) fn push_alphanumeric(out: &mut String, n: u32) {
    out.push_str(&encode_alphanumeric(n));
}

/// Decode one count starting at byte `pos`, advancing `pos` past the
/// uppercase terminator.
pub fn decode_alphanumeric(text: &str, pos: &mut usize) -> Result<u32> {
    let bytes = text.as_bytes();
    let mut value: u32 = 0;
    let start = *pos;
    loop {
        let b = *bytes
            .get(*pos)
            .ok_or_else(|| Error::MalformedTreeAddress(format!(
                "unterminated count at byte {start} of {text:?}"
            )))?;
        *pos += 1;
        let digit = match b {
            b'a'..=b'z' => u32::from(b - b'a'),
            b'A'..=b'Z' => u32::from(b - b'A'),
            _ => {
                return Err(Error::MalformedTreeAddress(format!(
                    "unexpected byte {:?} in count at byte {} of {:?}",
                    b as char, start, text
                )))
            }
        };
        value = value
            .checked_mul(ALPHA_BASE)
            .and_then(|v| v.checked_add(digit))
            .ok_or_else(|| {
                Error::MalformedTreeAddress(format!(
                    "count overflow at byte {start} of {text:?}"
                ))
            })?;
        if b.is_ascii_uppercase() {
            return Ok(value);
        }
    }
}
