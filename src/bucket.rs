//
// bucket.rs -- fixed-capacity bucket lists and the split/re-index algorithm
//
// Copyright (c) 2019-2024 Jeff Garzik
//
// This file is part of the dpdb-native software project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT

use std::fs::File;

use crate::error::{Error, Result};
use crate::ser::{pack_uint, unpack_uint, Layout};
use crate::tag::{create_tag, load_tag, Tag, TagKind};

/// Maximum number of digest/offset pairs a single bucket-list record holds
/// before it must be split one digest byte deeper (§4.3).
pub const MAX_BUCKETS: usize = 16;

/// One occupied or empty slot in a bucket list. An empty slot is encoded
/// on disk as an all-zero digest with offset `0`; offset `0` can never be a
/// legitimate value-record offset because it is occupied by the file
/// signature, so it doubles safely as the "empty" sentinel.
#[derive(Clone, Debug)]
pub struct BucketSlot {
    pub digest: Vec<u8>,
    pub offset: u64,
}

impl BucketSlot {
    fn empty(hash_size: usize) -> Self {
        BucketSlot {
            digest: vec![0u8; hash_size],
            offset: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.offset == 0
    }
}

/// A fixed-capacity array of up to `MAX_BUCKETS` digest/offset pairs; the
/// leaf of a digest trie path.
#[derive(Clone, Debug)]
pub struct BucketList {
    pub slots: Vec<BucketSlot>,
}

impl BucketList {
    pub fn empty(layout: &Layout) -> Self {
        BucketList {
            slots: (0..MAX_BUCKETS).map(|_| BucketSlot::empty(layout.hash_size)).collect(),
        }
    }

    pub fn to_bytes(&self, layout: &Layout) -> Vec<u8> {
        let mut out = Vec::with_capacity(layout.bucket_list_size(MAX_BUCKETS));
        for slot in &self.slots {
            out.extend_from_slice(&slot.digest);
            out.extend_from_slice(&pack_uint(layout.offset_width, slot.offset));
        }
        out
    }

    pub fn from_bytes(layout: &Layout, bytes: &[u8]) -> Result<Self> {
        let elem_size = layout.bucket_elem_size();
        if bytes.len() != elem_size * MAX_BUCKETS {
            return Err(Error::IndexingFailed);
        }
        let mut slots = Vec::with_capacity(MAX_BUCKETS);
        for chunk in bytes.chunks_exact(elem_size) {
            let digest = chunk[..layout.hash_size].to_vec();
            let offset = unpack_uint(layout.offset_width, &chunk[layout.hash_size..])?;
            slots.push(BucketSlot { digest, offset });
        }
        Ok(BucketList { slots })
    }

    pub fn occupied(&self) -> impl Iterator<Item = &BucketSlot> {
        self.slots.iter().filter(|s| !s.is_empty())
    }

    pub fn len(&self) -> usize {
        self.occupied().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find(&self, digest: &[u8]) -> Option<usize> {
        self.slots.iter().position(|s| !s.is_empty() && s.digest == digest)
    }

    fn first_empty(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.is_empty())
    }

    pub fn is_full(&self) -> bool {
        self.first_empty().is_none()
    }

    /// Inserts `digest -> offset`, replacing an existing tied entry in
    /// place. Returns `Err(Error::IndexingFailed)` if the list is full and
    /// `digest` is not already present; the caller is expected to split
    /// before retrying.
    pub fn insert_or_replace(&mut self, digest: &[u8], offset: u64) -> Result<()> {
        if let Some(idx) = self.find(digest) {
            self.slots[idx].offset = offset;
            return Ok(());
        }
        let idx = self.first_empty().ok_or(Error::IndexingFailed)?;
        self.slots[idx] = BucketSlot {
            digest: digest.to_vec(),
            offset,
        };
        Ok(())
    }

    /// Removes the slot matching `digest`, if any, shifting every
    /// subsequent slot one position left and zeroing the tail so that
    /// filled slots keep preceding empty ones (§4.3 invariant 2). Returns
    /// whether a slot was removed.
    pub fn remove(&mut self, digest: &[u8]) -> bool {
        if let Some(idx) = self.find(digest) {
            let hash_size = self.slots[idx].digest.len();
            for i in idx..self.slots.len() - 1 {
                self.slots[i] = self.slots[i + 1].clone();
            }
            let last = self.slots.len() - 1;
            self.slots[last] = BucketSlot::empty(hash_size);
            true
        } else {
            false
        }
    }
}

/// Loads the bucket list stored as a `Bucket`-kind tag at `offset`.
pub fn load_bucket(file: &mut File, layout: &Layout, end: u64, offset: u64) -> Result<BucketList> {
    let tag = load_tag(file, layout, end, offset)?.ok_or(Error::IndexingFailed)?;
    if tag.kind != TagKind::Bucket {
        return Err(Error::WrongKindForOp);
    }
    BucketList::from_bytes(layout, &tag.content)
}

/// Writes `bucket` as a `Bucket`-kind tag at `offset` (or appended at `*end`
/// when `offset == *end`).
pub fn write_bucket(
    file: &mut File,
    layout: &Layout,
    end: &mut u64,
    offset: u64,
    bucket: &BucketList,
) -> Result<Tag> {
    let content = bucket.to_bytes(layout);
    Ok(create_tag(file, layout, end, offset, TagKind::Bucket, &content)?)
}

/// A 256-slot index node: each slot holds the offset of either a deeper
/// `Index` tag or a leaf `Bucket` tag, self-describing via the tag kind
/// found there. `0` marks an empty slot.
#[derive(Clone, Debug)]
pub struct IndexNode {
    pub slots: Vec<u64>,
}

impl IndexNode {
    pub fn empty() -> Self {
        IndexNode { slots: vec![0u64; 256] }
    }

    pub fn to_bytes(&self, layout: &Layout) -> Vec<u8> {
        let mut out = Vec::with_capacity(layout.index_node_size());
        for &offset in &self.slots {
            out.extend_from_slice(&pack_uint(layout.offset_width, offset));
        }
        out
    }

    pub fn from_bytes(layout: &Layout, bytes: &[u8]) -> Result<Self> {
        let width = layout.offset_width.bytes();
        if bytes.len() != width * 256 {
            return Err(Error::IndexingFailed);
        }
        let slots = bytes
            .chunks_exact(width)
            .map(|c| unpack_uint(layout.offset_width, c))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(IndexNode { slots })
    }
}

/// Loads the index node stored at `offset`, along with the absolute offset
/// of its first payload byte (needed by callers that patch a single slot in
/// place rather than rewriting the whole node).
pub fn load_index(file: &mut File, layout: &Layout, end: u64, offset: u64) -> Result<(u64, IndexNode)> {
    let tag = load_tag(file, layout, end, offset)?.ok_or(Error::IndexingFailed)?;
    if tag.kind != TagKind::Index && tag.kind != TagKind::Map && tag.kind != TagKind::List {
        return Err(Error::WrongKindForOp);
    }
    Ok((tag.content_offset, IndexNode::from_bytes(layout, &tag.content)?))
}

/// Writes `node` as an `Index`-kind tag, appended at `*end`.
pub fn write_index(file: &mut File, layout: &Layout, end: &mut u64, node: &IndexNode) -> Result<Tag> {
    let content = node.to_bytes(layout);
    Ok(create_tag(file, layout, end, *end, TagKind::Index, &content)?)
}

/// Patches a single slot of an already-written index node in place, given
/// the absolute offset of the node's first payload byte (as returned by
/// `load_index` or a value record's `content_offset`).
pub fn write_index_slot(
    file: &mut File,
    layout: &Layout,
    content_offset: u64,
    slot: usize,
    value: u64,
) -> Result<()> {
    let w = layout.offset_width.bytes();
    write_offset_at(file, layout, content_offset + (slot * w) as u64, value)
}

/// Writes a single packed offset value at an arbitrary absolute file
/// position. Used both for index-slot patches and for rewriting a bucket
/// path's remembered parent slot after a split.
pub fn write_offset_at(file: &mut File, layout: &Layout, at: u64, value: u64) -> Result<()> {
    use std::io::{Seek, SeekFrom, Write};
    file.seek(SeekFrom::Start(at))?;
    file.write_all(&pack_uint(layout.offset_width, value))?;
    Ok(())
}

/// Reads a single packed offset value at an arbitrary absolute file
/// position.
pub fn read_offset_at(file: &mut File, layout: &Layout, at: u64) -> Result<u64> {
    use std::io::{Read, Seek, SeekFrom};
    let w = layout.offset_width.bytes();
    file.seek(SeekFrom::Start(at))?;
    let mut buf = vec![0u8; w];
    file.read_exact(&mut buf)?;
    Ok(unpack_uint(layout.offset_width, &buf)?)
}

/// Splits a full bucket list one digest byte deeper than `depth`, the
/// number of digest bytes already consumed to reach `old`. Entries are
/// regrouped by `digest[depth]` into fresh single-level bucket lists, each
/// written out and linked from a new index node.
///
/// Returns `Error::IndexingFailed` if every entry in `old` shares the same
/// byte at `depth` and there is no further digest byte to split on -- an
/// exhausted digest, treated as corruption since two distinct keys should
/// never produce an identical digest of the configured width.
pub fn split_bucket(
    file: &mut File,
    layout: &Layout,
    end: &mut u64,
    old: &BucketList,
    depth: usize,
) -> Result<IndexNode> {
    if depth >= layout.hash_size {
        return Err(Error::IndexingFailed);
    }

    let mut groups: Vec<Vec<&BucketSlot>> = vec![Vec::new(); 256];
    for slot in old.occupied() {
        groups[slot.digest[depth] as usize].push(slot);
    }

    let mut node = IndexNode::empty();
    for (byte, group) in groups.into_iter().enumerate() {
        if group.is_empty() {
            continue;
        }
        let mut list = BucketList::empty(layout);
        for slot in group {
            list.insert_or_replace(&slot.digest, slot.offset)?;
        }
        let tag = write_bucket(file, layout, end, *end, &list)?;
        node.slots[byte] = tag.offset;
    }

    Ok(node)
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
    fn insert_find_remove() {
        let layout = layout();
        let mut list = BucketList::empty(&layout);
        let digest = vec![1u8; 16];
        list.insert_or_replace(&digest, 100).unwrap();
        assert_eq!(list.find(&digest), Some(0));
        assert!(list.remove(&digest));
        assert_eq!(list.find(&digest), None);
    }

    #[test]
    fn full_list_rejects_new_digest() {
        let layout = layout();
        let mut list = BucketList::empty(&layout);
        for i in 0..MAX_BUCKETS {
            let mut digest = vec![0u8; 16];
            digest[0] = i as u8;
            list.insert_or_replace(&digest, (i + 1) as u64).unwrap();
        }
        assert!(list.is_full());
        let mut overflow = vec![0u8; 16];
        overflow[0] = 200;
        assert!(matches!(
            list.insert_or_replace(&overflow, 999),
            Err(Error::IndexingFailed)
        ));
    }

    #[test]
    fn bucket_round_trips_through_bytes() {
        let layout = layout();
        let mut list = BucketList::empty(&layout);
        list.insert_or_replace(&vec![7u8; 16], 42).unwrap();
        let bytes = list.to_bytes(&layout);
        let back = BucketList::from_bytes(&layout, &bytes).unwrap();
        assert_eq!(back.find(&vec![7u8; 16]), Some(0));
    }

    #[test]
    fn split_regroups_by_next_byte() {
        let layout = layout();
        let mut file = tempfile::tempfile().unwrap();
        let mut end = 0u64;
        let mut list = BucketList::empty(&layout);
        let mut d1 = vec![0u8; 16];
        d1[1] = 5;
        let mut d2 = vec![0u8; 16];
        d2[1] = 9;
        list.insert_or_replace(&d1, 10).unwrap();
        list.insert_or_replace(&d2, 20).unwrap();

        let node = split_bucket(&mut file, &layout, &mut end, &list, 1).unwrap();
        assert_ne!(node.slots[5], 0);
        assert_ne!(node.slots[9], 0);
    }
}
