//
// value.rs -- value-record codec: scalar, null, and child-composite payloads
//
// Copyright (c) 2019-2024 Jeff Garzik
//
// This file is part of the dpdb-native software project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::bucket::IndexNode;
use crate::error::{Error, Result};
use crate::ser::{pack_uint, unpack_uint, Layout};
use crate::tag::{create_tag, load_tag, TagKind};

/// A fully materialized value record: the tag (kind + payload) plus the
/// plain-key trailer that follows it (§4.4 of the format).
#[derive(Clone, Debug)]
pub struct ValueRecord {
    pub kind: TagKind,
    pub offset: u64,
    pub content_offset: u64,
    pub payload: Vec<u8>,
    pub plain_key: Vec<u8>,
}

impl ValueRecord {
    /// Decodes a `Map`/`List` record's payload as its own root index node.
    pub fn as_index_node(&self, layout: &Layout) -> Result<IndexNode> {
        if !self.kind.is_composite() {
            return Err(Error::WrongKindForOp);
        }
        IndexNode::from_bytes(layout, &self.payload)
    }
}

/// The all-zero index-node payload written for a freshly created, unseeded
/// child composite.
pub fn empty_composite_payload(layout: &Layout) -> Vec<u8> {
    IndexNode::empty().to_bytes(layout)
}

/// Writes a value record at `offset`: `kind || pack_W(len(payload)) ||
/// payload`, immediately followed by `pack_W(len(plain_key)) || plain_key`.
///
/// `*end` is extended to cover the trailer whenever the write reaches past
/// the file's current logical end; an in-place scalar reuse that writes a
/// shorter payload than previously occupied that slot leaves `*end`
/// untouched; trailing old bytes become unreachable dead space (§4.3 rule 2,
/// reclaimed only by `optimize`).
pub fn write_value_record(
    file: &mut File,
    layout: &Layout,
    end: &mut u64,
    offset: u64,
    kind: TagKind,
    payload: &[u8],
    plain_key: &[u8],
) -> Result<ValueRecord> {
    let tag = create_tag(file, layout, end, offset, kind, payload)?;

    let trailer_offset = tag.content_offset + payload.len() as u64;
    file.seek(SeekFrom::Start(trailer_offset))?;
    file.write_all(&pack_uint(layout.offset_width, plain_key.len() as u64))?;
    file.write_all(plain_key)?;

    let w = layout.offset_width.bytes() as u64;
    let trailer_end = trailer_offset + w + plain_key.len() as u64;
    if trailer_end > *end {
        *end = trailer_end;
    }

    Ok(ValueRecord {
        kind,
        offset,
        content_offset: tag.content_offset,
        payload: payload.to_vec(),
        plain_key: plain_key.to_vec(),
    })
}

/// Reads the value record at `offset`, including its plain-key trailer.
pub fn read_value_record(file: &mut File, layout: &Layout, end: u64, offset: u64) -> Result<ValueRecord> {
    let tag = load_tag(file, layout, end, offset)?.ok_or(Error::IndexingFailed)?;

    let trailer_offset = tag.content_offset + tag.content.len() as u64;
    file.seek(SeekFrom::Start(trailer_offset))?;

    let w = layout.offset_width.bytes();
    let mut len_buf = vec![0u8; w];
    file.read_exact(&mut len_buf)?;
    let key_len = unpack_uint(layout.offset_width, &len_buf)?;

    let mut plain_key = vec![0u8; key_len as usize];
    file.read_exact(&mut plain_key)?;

    Ok(ValueRecord {
        kind: tag.kind,
        offset,
        content_offset: tag.content_offset,
        payload: tag.content,
        plain_key,
    })
}

/// Whether a new payload of `new_len` bytes can be written in place over an
/// existing value record whose tag declared `old_len` bytes (§4.3 rule 2):
/// scalars may shrink in place, composites must match exactly since their
/// size is fixed by `Layout`.
pub fn fits_in_place(kind: TagKind, new_len: usize, old_len: u64) -> bool {
    match kind {
        TagKind::Data => new_len as u64 <= old_len,
        TagKind::Null => true,
        TagKind::Map | TagKind::List => new_len as u64 <= old_len,
        TagKind::Index | TagKind::Bucket => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ser::OffsetWidth;

    fn layout() -> Layout {
        Layout {
            offset_width: OffsetWidth::Four,
            hash_size: 16,
        }
    }

    #[test]
    fn scalar_round_trip_with_key() {
        let layout = layout();
        let mut file = tempfile::tempfile().unwrap();
        let mut end = 0u64;

        let rec = write_value_record(&mut file, &layout, &mut end, 0, TagKind::Data, b"value-bytes", b"my-key")
            .unwrap();
        assert_eq!(rec.payload, b"value-bytes");

        let loaded = read_value_record(&mut file, &layout, end, 0).unwrap();
        assert_eq!(loaded.payload, b"value-bytes");
        assert_eq!(loaded.plain_key, b"my-key");
    }

    #[test]
    fn null_round_trip() {
        let layout = layout();
        let mut file = tempfile::tempfile().unwrap();
        let mut end = 0u64;

        write_value_record(&mut file, &layout, &mut end, 0, TagKind::Null, b"", b"k").unwrap();
        let loaded = read_value_record(&mut file, &layout, end, 0).unwrap();
        assert_eq!(loaded.kind, TagKind::Null);
        assert!(loaded.payload.is_empty());
    }

    #[test]
    fn composite_payload_is_zeroed_index_node() {
        let layout = layout();
        let mut file = tempfile::tempfile().unwrap();
        let mut end = 0u64;

        let payload = empty_composite_payload(&layout);
        let rec =
            write_value_record(&mut file, &layout, &mut end, 0, TagKind::Map, &payload, b"child").unwrap();
        let node = rec.as_index_node(&layout).unwrap();
        assert!(node.slots.iter().all(|&s| s == 0));
    }

    #[test]
    fn shrinking_scalar_reuse_leaves_end_untouched() {
        let layout = layout();
        let mut file = tempfile::tempfile().unwrap();
        let mut end = 0u64;

        write_value_record(&mut file, &layout, &mut end, 0, TagKind::Data, b"0123456789", b"k").unwrap();
        let end_after_first = end;

        write_value_record(&mut file, &layout, &mut end, 0, TagKind::Data, b"ab", b"k").unwrap();
        assert_eq!(end, end_after_first);

        let loaded = read_value_record(&mut file, &layout, end, 0).unwrap();
        assert_eq!(loaded.payload, b"ab");
    }
}
