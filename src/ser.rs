//
// ser.rs -- on-disk integer packing and file layout parameters
//
// Copyright (c) 2019-2024 Jeff Garzik
//
// This file is part of the dpdb-native software project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT

use std::io;

/// Width, in bytes, used to pack every on-disk offset and length field.
///
/// Fixed for the lifetime of a file (§4.1 of the format spec). `Four` caps a
/// database at 4 GiB; `Eight` removes that cap at the cost of 4 extra bytes
/// per tag header, bucket slot, and index slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OffsetWidth {
    Four,
    Eight,
}

impl OffsetWidth {
    pub fn bytes(self) -> usize {
        match self {
            OffsetWidth::Four => 4,
            OffsetWidth::Eight => 8,
        }
    }
}

/// Per-open file parameters: fixed at file creation, read back out of the
/// header on every subsequent open rather than trusted from the caller.
#[derive(Clone, Copy, Debug)]
pub struct Layout {
    pub offset_width: OffsetWidth,
    pub hash_size: usize,
}

impl Layout {
    pub fn index_node_size(&self) -> usize {
        256 * self.offset_width.bytes()
    }

    pub fn bucket_elem_size(&self) -> usize {
        self.hash_size + self.offset_width.bytes()
    }

    pub fn bucket_list_size(&self, max_buckets: usize) -> usize {
        max_buckets * self.bucket_elem_size()
    }
}

/// Packs `val` as a big-endian unsigned integer of `width` bytes.
pub fn pack_uint(width: OffsetWidth, val: u64) -> Vec<u8> {
    match width {
        OffsetWidth::Four => {
            let v: u32 = val.try_into().expect("offset exceeds 32-bit width");
            v.to_be_bytes().to_vec()
        }
        OffsetWidth::Eight => val.to_be_bytes().to_vec(),
    }
}

/// Unpacks a big-endian unsigned integer of `width` bytes from the front of `buf`.
pub fn unpack_uint(width: OffsetWidth, buf: &[u8]) -> io::Result<u64> {
    match width {
        OffsetWidth::Four => {
            let arr: [u8; 4] = buf
                .get(..4)
                .ok_or_else(too_short)?
                .try_into()
                .map_err(|_| too_short())?;
            Ok(u32::from_be_bytes(arr) as u64)
        }
        OffsetWidth::Eight => {
            let arr: [u8; 8] = buf
                .get(..8)
                .ok_or_else(too_short)?
                .try_into()
                .map_err(|_| too_short())?;
            Ok(u64::from_be_bytes(arr))
        }
    }
}

fn too_short() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "buffer too short for offset width")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_four() {
        let packed = pack_uint(OffsetWidth::Four, 0xdead_beef);
        assert_eq!(packed.len(), 4);
        assert_eq!(unpack_uint(OffsetWidth::Four, &packed).unwrap(), 0xdead_beef);
    }

    #[test]
    fn round_trip_eight() {
        let packed = pack_uint(OffsetWidth::Eight, 0x1122_3344_5566_7788);
        assert_eq!(packed.len(), 8);
        assert_eq!(
            unpack_uint(OffsetWidth::Eight, &packed).unwrap(),
            0x1122_3344_5566_7788
        );
    }

    #[test]
    fn layout_sizes() {
        let layout = Layout {
            offset_width: OffsetWidth::Four,
            hash_size: 16,
        };
        assert_eq!(layout.index_node_size(), 1024);
        assert_eq!(layout.bucket_elem_size(), 20);
        assert_eq!(layout.bucket_list_size(16), 320);
    }
}
