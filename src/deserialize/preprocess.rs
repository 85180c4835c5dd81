//! Phase 1: single linear scan over the parsed slot list.
//!
//! Path-style back-references ("r k0 k1 ...") are collapsed so every
//! reference left in the list is exactly one hop deep, which is what lets
//! phase 2 resolve any reference with constant work. Collapse swaps the
//! referenced inline value into the referring slot and leaves a numeric
//! reference at the old nested position, so shared identity survives the
//! rewrite.
//!
//! The rewrite mutates the decoded list in place: the list is owned by the
//! pass and discarded with it, so no indirection table is kept.

use serde_json::Value as Json;

use crate::types::{Error, Result, TypeTag};

/// One parsed slot, pre-resolution.
#[derive(Debug)]
pub(crate) struct RawSlot {
    pub tag: TypeTag,
    pub payload: Json,
}

/// Output of the preprocess scan.
#[derive(Debug)]
pub(crate) struct Preprocessed {
    pub slots: Vec<RawSlot>,
    /// Forward id to slot index
    pub forward_refs: Vec<u32>,
    /// Lazy-symbol-reference strings to warm proactively
    pub preloads: Vec<String>,
}

/// Parse the state text and collapse it to one-hop references.
pub(crate) fn preprocess(text: &str) -> Result<Preprocessed> {
    let parsed: Json = serde_json::from_str(text)?;
    let items = match parsed {
        Json::Array(items) => items,
        _ => return Err(Error::malformed(0, "state payload is not an array")),
    };
    if items.len() % 2 != 0 {
        return Err(Error::malformed(
            items.len() / 2,
            "odd number of entries in state payload",
        ));
    }

    let mut slots = Vec::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(tag_json), Some(payload)) = (iter.next(), iter.next()) {
        let byte = tag_json
            .as_u64()
            .ok_or_else(|| Error::malformed(slots.len(), "tag is not an integer"))?;
        let tag = u8::try_from(byte)
            .ok()
            .and_then(TypeTag::from_u8)
            .ok_or(Error::UnsupportedValueKind(byte))?;
        slots.push(RawSlot { tag, payload });
    }

    for i in 0..slots.len() {
        if slots[i].tag == TypeTag::RootRef && slots[i].payload.is_string() {
            collapse_path(&mut slots, i)?;
        }
    }

    let mut forward_refs = Vec::new();
    let mut preloads = Vec::new();
    for slot in &slots {
        match slot.tag {
            TypeTag::ForwardRefs => {
                let entries = slot
                    .payload
                    .as_array()
                    .ok_or_else(|| Error::malformed(0, "forward-refs payload is not a list"))?;
                for entry in entries {
                    let target = entry
                        .as_u64()
                        .ok_or_else(|| Error::malformed(0, "forward-refs entry is not a slot"))?;
                    forward_refs.push(target as u32);
                }
            }
            TypeTag::Preload => {
                if let Some(s) = slot.payload.as_str() {
                    preloads.push(s.to_string());
                }
            }
            _ => {}
        }
    }

    tracing::debug!(
        slots = slots.len(),
        forward_refs = forward_refs.len(),
        preloads = preloads.len(),
        "state payload preprocessed"
    );
    Ok(Preprocessed {
        slots,
        forward_refs,
        preloads,
    })
}

/// Payload position of the K-th child for each composite kind. Mirrors the
/// child ordering the serializer records in its SeenMap; the two must never
/// disagree.
fn child_pos(tag: TypeTag, k: usize) -> Option<usize> {
    match tag {
        TypeTag::Array
        | TypeTag::Set
        | TypeTag::Map
        | TypeTag::CellComputed
        | TypeTag::CellAsync
        | TypeTag::PropsProxy => Some(k),
        TypeTag::Object | TypeTag::EffectMeta => Some(2 * k + 1),
        TypeTag::Error => Some(2 * k + 2),
        TypeTag::Deferred => (k == 0).then_some(1),
        TypeTag::Component | TypeTag::Cell => (k == 0).then_some(0),
        _ => None,
    }
}

/// Follow numeric back-reference chains to the slot that actually holds a
/// value. Chains are bounded by the slot count; anything longer is a cycle
/// of references with no value in it.
fn follow_slot(slots: &[RawSlot], mut j: usize) -> Result<usize> {
    let len = slots.len();
    for _ in 0..=len {
        let slot = slots
            .get(j)
            .ok_or(Error::OutOfRangeReference { index: j, len })?;
        if slot.tag == TypeTag::RootRef {
            if let Some(n) = slot.payload.as_u64() {
                j = n as usize;
                continue;
            }
        }
        return Ok(j);
    }
    Err(Error::malformed(j, "back-reference cycle with no value"))
}

fn index_json<'a>(mut cur: &'a Json, path: &[usize]) -> Option<&'a Json> {
    for &p in path {
        cur = cur.get(p)?;
    }
    Some(cur)
}

fn index_json_mut<'a>(mut cur: &'a mut Json, path: &[usize]) -> Option<&'a mut Json> {
    for &p in path {
        cur = cur.get_mut(p)?;
    }
    Some(cur)
}

fn parse_path(text: &str, slot: usize) -> Result<Vec<usize>> {
    text.split(' ')
        .map(|part| {
            part.parse::<usize>()
                .map_err(|_| Error::malformed(slot, format!("bad path segment {part:?}")))
        })
        .collect()
}

/// Collapse the path-style back-reference in slot `i`.
fn collapse_path(slots: &mut [RawSlot], i: usize) -> Result<()> {
    let text = slots[i]
        .payload
        .as_str()
        .unwrap_or_default()
        .to_string();
    let parts = parse_path(&text, i)?;
    let (&anchor, steps) = parts
        .split_first()
        .ok_or_else(|| Error::malformed(i, "empty path"))?;

    // Walk to the target: `slot` is the slot being drilled, `path` the json
    // index trail from that slot's payload down to the current node's
    // payload. An empty trail means the current node is the slot itself.
    let mut slot = follow_slot(slots, anchor)?;
    let mut path: Vec<usize> = Vec::new();
    let mut tag = slots[slot].tag;

    for &k in steps {
        let pos = child_pos(tag, k)
            .ok_or_else(|| Error::malformed(i, format!("kind {} has no children", tag.name())))?;
        let payload = index_json(&slots[slot].payload, &path)
            .ok_or_else(|| Error::malformed(i, "path leaves the payload"))?;
        let entry = payload
            .get(pos)
            .ok_or_else(|| Error::malformed(i, format!("no child {k} on the path")))?;
        match entry {
            Json::Number(n) => {
                // Nested slot reference: continue inside the target slot.
                let j = n
                    .as_u64()
                    .ok_or_else(|| Error::malformed(i, "negative slot reference"))?;
                slot = follow_slot(slots, j as usize)?;
                path.clear();
                tag = slots[slot].tag;
            }
            Json::Array(pair) if pair.len() == 2 => {
                let byte = pair[0]
                    .as_u64()
                    .ok_or_else(|| Error::malformed(i, "inline tag is not an integer"))?;
                tag = u8::try_from(byte)
                    .ok()
                    .and_then(TypeTag::from_u8)
                    .ok_or(Error::UnsupportedValueKind(byte))?;
                path.push(pos);
                path.push(1);
            }
            _ => return Err(Error::malformed(i, "path step lands on a non-reference")),
        }
    }

    if path.is_empty() {
        // Target already has a slot of its own.
        slots[i].payload = Json::from(slot as u64);
        return Ok(());
    }

    // Target is an inline value: move it into slot i and leave a numeric
    // reference behind, so both occurrences share one identity.
    let pair_path = &path[..path.len() - 1];
    let entry = index_json_mut(&mut slots[slot].payload, pair_path)
        .ok_or_else(|| Error::malformed(i, "path target vanished"))?;
    let pair = std::mem::replace(entry, Json::from(i as u64));
    let mut pair = match pair {
        Json::Array(pair) => pair,
        _ => return Err(Error::malformed(i, "path target is not an inline value")),
    };
    let payload = pair.pop().unwrap_or(Json::Null);
    slots[i] = RawSlot { tag, payload };
    Ok(())
}
