//
// digest.rs -- key digests
//
// Copyright (c) 2019-2024 Jeff Garzik
//
// This file is part of the dpdb-native software project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT

use digest::Digest;
use md5::Md5;

/// Default digest width in bytes (MD5).
pub const DEFAULT_HASH_SIZE: usize = 16;

/// Digest algorithm selectable at file-creation time (§9: not a process-wide
/// singleton, carried per-open in `Layout`/`Root`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Md5,
}

impl DigestAlgorithm {
    pub fn size(self) -> usize {
        match self {
            DigestAlgorithm::Md5 => DEFAULT_HASH_SIZE,
        }
    }

    /// Digests `key`, returning a vector of `self.size()` bytes.
    ///
    /// Per §6, list index keys are the raw `W`-byte packed integer, not a
    /// decimal string rendering of the index — callers are responsible for
    /// passing the packed bytes, not a display form.
    pub fn digest(self, key: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Md5 => {
                let mut hasher = Md5::new();
                hasher.update(key);
                hasher.finalize().to_vec()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_is_stable_and_sized() {
        let d1 = DigestAlgorithm::Md5.digest(b"hello");
        let d2 = DigestAlgorithm::Md5.digest(b"hello");
        assert_eq!(d1, d2);
        assert_eq!(d1.len(), DEFAULT_HASH_SIZE);
    }

    #[test]
    fn empty_key_digest_is_stable() {
        let d1 = DigestAlgorithm::Md5.digest(b"");
        let d2 = DigestAlgorithm::Md5.digest(b"");
        assert_eq!(d1, d2);
    }

    #[test]
    fn different_keys_differ() {
        let d1 = DigestAlgorithm::Md5.digest(b"key1");
        let d2 = DigestAlgorithm::Md5.digest(b"key2");
        assert_ne!(d1, d2);
    }
}
