//
// trie.rs -- digest-trie walk: locating, creating, and enumerating buckets
//
// Copyright (c) 2019-2024 Jeff Garzik
//
// This file is part of the dpdb-native software project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT

use std::fs::File;

use log::{trace, warn};

use crate::bucket::{load_bucket, read_offset_at, split_bucket, write_bucket, write_index, write_offset_at, BucketList};
use crate::error::{Error, Result};
use crate::ser::Layout;
use crate::tag::{load_tag, TagKind};
use crate::value::{fits_in_place, read_value_record, write_value_record};

/// The bucket list reached by walking `digest` from a composite's root, plus
/// enough breadcrumb state (`parent_slot_offset`, `depth`) to patch the
/// parent on a later split (§4.2's "insert path build").
struct BucketPath {
    bucket_offset: u64,
    parent_slot_offset: u64,
    depth: usize,
}

/// Descends from `content_offset` (a composite's own root index, or an
/// interior `Index` node's payload) along `digest`, creating bucket lists
/// (and, transparently, descending into index nodes) as needed so the walk
/// always terminates at a `Bucket` tag.
fn find_or_create_bucket(
    file: &mut File,
    layout: &Layout,
    end: &mut u64,
    content_offset: u64,
    digest: &[u8],
) -> Result<BucketPath> {
    let w = layout.offset_width.bytes();
    let mut content_offset = content_offset;
    let mut depth = 0usize;

    loop {
        let byte = digest[depth] as usize;
        let slot_offset = content_offset + (byte * w) as u64;
        let child = read_offset_at(file, layout, slot_offset)?;

        if child == 0 {
            let bucket = BucketList::empty(layout);
            let tag = write_bucket(file, layout, end, *end, &bucket)?;
            write_offset_at(file, layout, slot_offset, tag.offset)?;
            return Ok(BucketPath {
                bucket_offset: tag.offset,
                parent_slot_offset: slot_offset,
                depth,
            });
        }

        let tag = load_tag(file, layout, *end, child)?.ok_or(Error::IndexingFailed)?;
        match tag.kind {
            TagKind::Bucket => {
                return Ok(BucketPath {
                    bucket_offset: child,
                    parent_slot_offset: slot_offset,
                    depth,
                });
            }
            TagKind::Index => {
                content_offset = tag.content_offset;
                depth += 1;
            }
            _ => return Err(Error::IndexingFailed),
        }
    }
}

/// Same descent as `find_or_create_bucket`, but read-only: returns `None` as
/// soon as a zero slot is hit rather than materializing anything.
fn find_bucket(
    file: &mut File,
    layout: &Layout,
    end: u64,
    content_offset: u64,
    digest: &[u8],
) -> Result<Option<u64>> {
    let w = layout.offset_width.bytes();
    let mut content_offset = content_offset;
    let mut depth = 0usize;

    loop {
        let byte = digest[depth] as usize;
        let slot_offset = content_offset + (byte * w) as u64;
        let child = read_offset_at(file, layout, slot_offset)?;
        if child == 0 {
            return Ok(None);
        }

        let tag = load_tag(file, layout, end, child)?.ok_or(Error::IndexingFailed)?;
        match tag.kind {
            TagKind::Bucket => return Ok(Some(child)),
            TagKind::Index => {
                content_offset = tag.content_offset;
                depth += 1;
            }
            _ => return Err(Error::IndexingFailed),
        }
    }
}

/// Outcome of `put`: whether the digest was previously absent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutOutcome {
    Inserted,
    Replaced,
}

/// Inserts or replaces `digest -> (kind, payload, plain_key)` under the
/// composite rooted at `content_offset`, splitting bucket lists as needed
/// (§4.3).
pub fn put(
    file: &mut File,
    layout: &Layout,
    end: &mut u64,
    content_offset: u64,
    digest: &[u8],
    kind: TagKind,
    payload: &[u8],
    plain_key: &[u8],
) -> Result<(PutOutcome, u64)> {
    loop {
        let path = find_or_create_bucket(file, layout, end, content_offset, digest)?;
        let mut bucket = load_bucket(file, layout, *end, path.bucket_offset)?;

        if let Some(idx) = bucket.find(digest) {
            let old_offset = bucket.slots[idx].offset;
            let old_tag = load_tag(file, layout, *end, old_offset)?.ok_or(Error::IndexingFailed)?;

            if old_tag.kind == kind && fits_in_place(kind, payload.len(), old_tag.size) {
                write_value_record(file, layout, end, old_offset, kind, payload, plain_key)?;
                trace!("trie: in-place replace at offset {old_offset}");
                return Ok((PutOutcome::Replaced, old_offset));
            }

            let new_offset = *end;
            write_value_record(file, layout, end, new_offset, kind, payload, plain_key)?;
            bucket.insert_or_replace(digest, new_offset)?;
            write_bucket(file, layout, end, path.bucket_offset, &bucket)?;
            trace!("trie: replace via new allocation at offset {new_offset}");
            return Ok((PutOutcome::Replaced, new_offset));
        }

        if !bucket.is_full() {
            let new_offset = *end;
            write_value_record(file, layout, end, new_offset, kind, payload, plain_key)?;
            bucket.insert_or_replace(digest, new_offset)?;
            write_bucket(file, layout, end, path.bucket_offset, &bucket)?;
            trace!("trie: insert at offset {new_offset}");
            return Ok((PutOutcome::Inserted, new_offset));
        }

        warn!("trie: bucket at offset {} full, splitting at depth {}", path.bucket_offset, path.depth);
        let node = split_bucket(file, layout, end, &bucket, path.depth + 1)?;
        let index_tag = write_index(file, layout, end, &node)?;
        write_offset_at(file, layout, path.parent_slot_offset, index_tag.offset)?;
    }
}

/// Points `digest` at an already-existing value record offset, without
/// writing a new tag. Used to reposition list elements (shift/unshift/
/// splice) by digest alone, so a relocated composite element keeps its
/// nested tree intact instead of being recreated empty (§9).
pub fn link(
    file: &mut File,
    layout: &Layout,
    end: &mut u64,
    content_offset: u64,
    digest: &[u8],
    value_offset: u64,
) -> Result<()> {
    loop {
        let path = find_or_create_bucket(file, layout, end, content_offset, digest)?;
        let mut bucket = load_bucket(file, layout, *end, path.bucket_offset)?;

        if bucket.find(digest).is_some() || !bucket.is_full() {
            bucket.insert_or_replace(digest, value_offset)?;
            write_bucket(file, layout, end, path.bucket_offset, &bucket)?;
            return Ok(());
        }

        warn!("trie: bucket at offset {} full, splitting at depth {} (link)", path.bucket_offset, path.depth);
        let node = split_bucket(file, layout, end, &bucket, path.depth + 1)?;
        let index_tag = write_index(file, layout, end, &node)?;
        write_offset_at(file, layout, path.parent_slot_offset, index_tag.offset)?;
    }
}

pub fn get(
    file: &mut File,
    layout: &Layout,
    end: u64,
    content_offset: u64,
    digest: &[u8],
) -> Result<Option<u64>> {
    match find_bucket(file, layout, end, content_offset, digest)? {
        None => Ok(None),
        Some(bucket_offset) => {
            let bucket = load_bucket(file, layout, end, bucket_offset)?;
            Ok(bucket.find(digest).map(|idx| bucket.slots[idx].offset))
        }
    }
}

pub fn exists(file: &mut File, layout: &Layout, end: u64, content_offset: u64, digest: &[u8]) -> Result<bool> {
    Ok(get(file, layout, end, content_offset, digest)?.is_some())
}

/// Deletes `digest` from the composite rooted at `content_offset`. Returns
/// the deleted value record's offset, for callers that still need to read
/// it (e.g. `pop`/`shift`, which read-before-delete themselves instead).
pub fn delete(
    file: &mut File,
    layout: &Layout,
    end: &mut u64,
    content_offset: u64,
    digest: &[u8],
) -> Result<Option<u64>> {
    match find_bucket(file, layout, *end, content_offset, digest)? {
        None => Ok(None),
        Some(bucket_offset) => {
            let mut bucket = load_bucket(file, layout, *end, bucket_offset)?;
            let value_offset = bucket.find(digest).map(|idx| bucket.slots[idx].offset);
            if value_offset.is_some() {
                bucket.remove(digest);
                write_bucket(file, layout, end, bucket_offset, &bucket)?;
            }
            Ok(value_offset)
        }
    }
}

/// Visits every `(digest, plain_key)` pair reachable from `content_offset`
/// in index-slot / bucket-slot order, stopping as soon as `visitor` returns
/// `true`.
fn visit(
    file: &mut File,
    layout: &Layout,
    end: u64,
    content_offset: u64,
    visitor: &mut dyn FnMut(&[u8], &[u8]) -> Result<bool>,
) -> Result<bool> {
    let w = layout.offset_width.bytes();
    for slot in 0..256 {
        let child = read_offset_at(file, layout, content_offset + (slot * w) as u64)?;
        if child == 0 {
            continue;
        }
        let tag = load_tag(file, layout, end, child)?.ok_or(Error::IndexingFailed)?;
        match tag.kind {
            TagKind::Index => {
                if visit(file, layout, end, tag.content_offset, visitor)? {
                    return Ok(true);
                }
            }
            TagKind::Bucket => {
                let bucket = BucketList::from_bytes(layout, &tag.content)?;
                for s in bucket.occupied() {
                    let rec = read_value_record(file, layout, end, s.offset)?;
                    if visitor(&s.digest, &rec.plain_key)? {
                        return Ok(true);
                    }
                }
            }
            _ => return Err(Error::IndexingFailed),
        }
    }
    Ok(false)
}

/// First key in digest-slot order, or `None` for an empty composite (§4.4).
pub fn first_key(file: &mut File, layout: &Layout, end: u64, content_offset: u64) -> Result<Option<Vec<u8>>> {
    let mut found = None;
    visit(file, layout, end, content_offset, &mut |_digest, key| {
        found = Some(key.to_vec());
        Ok(true)
    })?;
    Ok(found)
}

/// Key immediately following `prev_digest` in digest-slot order (§4.4).
pub fn next_key(
    file: &mut File,
    layout: &Layout,
    end: u64,
    content_offset: u64,
    prev_digest: &[u8],
) -> Result<Option<Vec<u8>>> {
    let mut seen_prev = false;
    let mut found = None;
    visit(file, layout, end, content_offset, &mut |digest, key| {
        if seen_prev {
            found = Some(key.to_vec());
            return Ok(true);
        }
        if digest == prev_digest {
            seen_prev = true;
        }
        Ok(false)
    })?;
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ser::OffsetWidth;
    use crate::tag::create_tag;
    use std::collections::HashSet;

    fn layout() -> Layout {
        Layout {
            offset_width: OffsetWidth::Four,
            hash_size: 16,
        }
    }

    fn new_root(file: &mut File, layout: &Layout, end: &mut u64) -> u64 {
        let payload = vec![0u8; layout.index_node_size()];
        let tag = create_tag(file, layout, end, 0, TagKind::Map, &payload).unwrap();
        tag.content_offset
    }

    fn digest(byte0: u8, byte1: u8) -> Vec<u8> {
        let mut d = vec![0u8; 16];
        d[0] = byte0;
        d[1] = byte1;
        d
    }

    #[test]
    fn put_then_get_scalar() {
        let layout = layout();
        let mut file = tempfile::tempfile().unwrap();
        let mut end = 0u64;
        let root = new_root(&mut file, &layout, &mut end);

        let d = digest(1, 0);
        let (outcome, offset) =
            put(&mut file, &layout, &mut end, root, &d, TagKind::Data, b"hello", b"k1").unwrap();
        assert_eq!(outcome, PutOutcome::Inserted);

        let found = get(&mut file, &layout, end, root, &d).unwrap();
        assert_eq!(found, Some(offset));

        let rec = read_value_record(&mut file, &layout, end, offset).unwrap();
        assert_eq!(rec.payload, b"hello");
        assert_eq!(rec.plain_key, b"k1");
    }

    #[test]
    fn replace_shrinking_then_growing() {
        let layout = layout();
        let mut file = tempfile::tempfile().unwrap();
        let mut end = 0u64;
        let root = new_root(&mut file, &layout, &mut end);
        let d = digest(2, 0);

        let (_, off1) = put(&mut file, &layout, &mut end, root, &d, TagKind::Data, b"0123456789", b"k").unwrap();
        let (outcome, off2) = put(&mut file, &layout, &mut end, root, &d, TagKind::Data, b"ab", b"k").unwrap();
        assert_eq!(outcome, PutOutcome::Replaced);
        assert_eq!(off1, off2, "shrinking replace should reuse the same offset");

        let (_, off3) =
            put(&mut file, &layout, &mut end, root, &d, TagKind::Data, b"a much longer value now", b"k").unwrap();
        assert_ne!(off2, off3, "growing replace should allocate a new offset");

        let rec = read_value_record(&mut file, &layout, end, off3).unwrap();
        assert_eq!(rec.payload, b"a much longer value now");
    }

    #[test]
    fn delete_then_reinsert() {
        let layout = layout();
        let mut file = tempfile::tempfile().unwrap();
        let mut end = 0u64;
        let root = new_root(&mut file, &layout, &mut end);
        let d = digest(3, 0);

        put(&mut file, &layout, &mut end, root, &d, TagKind::Data, b"v1", b"k").unwrap();
        assert!(exists(&mut file, &layout, end, root, &d).unwrap());

        let deleted = delete(&mut file, &layout, &mut end, root, &d).unwrap();
        assert!(deleted.is_some());
        assert!(!exists(&mut file, &layout, end, root, &d).unwrap());

        let (outcome, _) = put(&mut file, &layout, &mut end, root, &d, TagKind::Data, b"v2", b"k").unwrap();
        assert_eq!(outcome, PutOutcome::Inserted);
        let offset = get(&mut file, &layout, end, root, &d).unwrap().unwrap();
        let rec = read_value_record(&mut file, &layout, end, offset).unwrap();
        assert_eq!(rec.payload, b"v2");
    }

    #[test]
    fn overflow_triggers_split_and_all_entries_remain_reachable() {
        let layout = layout();
        let mut file = tempfile::tempfile().unwrap();
        let mut end = 0u64;
        let root = new_root(&mut file, &layout, &mut end);

        let mut digests = Vec::new();
        for i in 0..40u8 {
            let d = digest(7, i);
            digests.push(d.clone());
            let key = format!("key{i}");
            put(&mut file, &layout, &mut end, root, &d, TagKind::Data, key.as_bytes(), key.as_bytes()).unwrap();
        }

        for (i, d) in digests.iter().enumerate() {
            let offset = get(&mut file, &layout, end, root, d).unwrap().unwrap_or_else(|| {
                panic!("digest for key{i} missing after split")
            });
            let rec = read_value_record(&mut file, &layout, end, offset).unwrap();
            assert_eq!(rec.plain_key, format!("key{i}").as_bytes());
        }
    }

    #[test]
    fn link_points_new_digest_at_existing_offset_and_old_digest_is_gone() {
        let layout = layout();
        let mut file = tempfile::tempfile().unwrap();
        let mut end = 0u64;
        let root = new_root(&mut file, &layout, &mut end);
        let from = digest(9, 0);
        let to = digest(9, 1);

        let (_, offset) = put(&mut file, &layout, &mut end, root, &from, TagKind::Data, b"v", b"k").unwrap();
        link(&mut file, &layout, &mut end, root, &to, offset).unwrap();
        delete(&mut file, &layout, &mut end, root, &from).unwrap();

        assert!(!exists(&mut file, &layout, end, root, &from).unwrap());
        let found = get(&mut file, &layout, end, root, &to).unwrap();
        assert_eq!(found, Some(offset));
        let rec = read_value_record(&mut file, &layout, end, offset).unwrap();
        assert_eq!(rec.payload, b"v");
    }

    #[test]
    fn enumeration_visits_every_key_exactly_once() {
        let layout = layout();
        let mut file = tempfile::tempfile().unwrap();
        let mut end = 0u64;
        let root = new_root(&mut file, &layout, &mut end);

        let mut expected = HashSet::new();
        let mut digest_by_key = std::collections::HashMap::new();
        for i in 0..20u8 {
            let d = digest(i, i.wrapping_mul(3));
            let key = format!("k{i}");
            put(&mut file, &layout, &mut end, root, &d, TagKind::Data, key.as_bytes(), key.as_bytes()).unwrap();
            expected.insert(key.clone());
            digest_by_key.insert(key, d);
        }

        let mut seen = HashSet::new();
        let mut cursor = first_key(&mut file, &layout, end, root).unwrap();
        while let Some(key_bytes) = cursor {
            let key = String::from_utf8(key_bytes).unwrap();
            assert!(seen.insert(key.clone()), "key {key} visited twice");
            let d = digest_by_key.get(&key).expect("enumerated key was inserted");
            cursor = next_key(&mut file, &layout, end, root, d).unwrap();
        }

        assert_eq!(seen, expected);
    }
}
