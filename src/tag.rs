//
// tag.rs -- the universal tagged-record framing used by every on-disk structure
//
// Copyright (c) 2019-2024 Jeff Garzik
//
// This file is part of the dpdb-native software project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::ser::{pack_uint, unpack_uint, Layout};

/// The file signature written at offset 0 of every database.
pub const SIGNATURE: &[u8; 4] = b"DPDB";

/// Single-byte tag kinds (§3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagKind {
    Map,
    List,
    Index,
    Bucket,
    Data,
    Null,
}

impl TagKind {
    pub fn as_byte(self) -> u8 {
        match self {
            TagKind::Map => b'H',
            TagKind::List => b'A',
            TagKind::Index => b'I',
            TagKind::Bucket => b'B',
            TagKind::Data => b'D',
            TagKind::Null => b'N',
        }
    }

    pub fn from_byte(b: u8) -> io::Result<Self> {
        match b {
            b'H' => Ok(TagKind::Map),
            b'A' => Ok(TagKind::List),
            b'I' => Ok(TagKind::Index),
            b'B' => Ok(TagKind::Bucket),
            b'D' => Ok(TagKind::Data),
            b'N' => Ok(TagKind::Null),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown tag kind byte {other:#x}"),
            )),
        }
    }

    pub fn is_composite(self) -> bool {
        matches!(self, TagKind::Map | TagKind::List)
    }
}

/// A loaded or freshly-written tag: kind, declared payload length, the
/// absolute offset of the first payload byte, and the payload itself.
#[derive(Clone, Debug)]
pub struct Tag {
    pub kind: TagKind,
    pub offset: u64,
    pub size: u64,
    pub content_offset: u64,
    pub content: Vec<u8>,
}

/// Header size in bytes: one kind byte plus the offset-width length field.
pub fn header_len(layout: &Layout) -> u64 {
    1 + layout.offset_width.bytes() as u64
}

/// Writes `kind || pack_W(len(content)) || content` at `offset`.
///
/// If `offset == *end`, `*end` is advanced past the newly written record.
pub fn create_tag(
    file: &mut std::fs::File,
    layout: &Layout,
    end: &mut u64,
    offset: u64,
    kind: TagKind,
    content: &[u8],
) -> io::Result<Tag> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(&[kind.as_byte()])?;
    file.write_all(&pack_uint(layout.offset_width, content.len() as u64))?;
    file.write_all(content)?;

    let content_offset = offset + header_len(layout);
    if offset == *end {
        *end = content_offset + content.len() as u64;
    }

    Ok(Tag {
        kind,
        offset,
        size: content.len() as u64,
        content_offset,
        content: content.to_vec(),
    })
}

/// Reads the tag at `offset`. Returns `Ok(None)` if `offset` is at or past
/// the file's logical end (§4.1: no validation beyond a reachable read).
pub fn load_tag(file: &mut std::fs::File, layout: &Layout, end: u64, offset: u64) -> io::Result<Option<Tag>> {
    if offset >= end {
        return Ok(None);
    }

    file.seek(SeekFrom::Start(offset))?;

    let mut kind_byte = [0u8; 1];
    file.read_exact(&mut kind_byte)?;
    let kind = TagKind::from_byte(kind_byte[0])?;

    let width = layout.offset_width.bytes();
    let mut len_buf = vec![0u8; width];
    file.read_exact(&mut len_buf)?;
    let size = unpack_uint(layout.offset_width, &len_buf)?;

    let mut content = vec![0u8; size as usize];
    file.read_exact(&mut content)?;

    let content_offset = offset + header_len(layout);

    Ok(Some(Tag {
        kind,
        offset,
        size,
        content_offset,
        content,
    }))
}

/// Writes just the content bytes of an already-framed tag back to disk,
/// in place, without touching the kind byte or length field. Used by
/// in-place scalar replacement (§4.3 rule 2) where the new payload is no
/// larger than the old one.
pub fn overwrite_content(
    file: &mut std::fs::File,
    content_offset: u64,
    content: &[u8],
) -> io::Result<()> {
    file.seek(SeekFrom::Start(content_offset))?;
    file.write_all(content)?;
    Ok(())
}
