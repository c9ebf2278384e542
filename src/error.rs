//
// error.rs -- dpdb-native error taxonomy
//
// Copyright (c) 2019-2024 Jeff Garzik
//
// This file is part of the dpdb-native software project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT

use std::{fmt::Display, fmt::Formatter, io};

#[derive(Debug)]
pub enum Error {
    /// The file does not begin with the `DPDB` signature.
    SignatureMismatch,
    /// The file could not be opened with the requested mode/options.
    CannotOpen(String),
    /// A bucket-list split produced a sub-bucket with more than `MAX_BUCKETS`
    /// entries sharing the next digest byte. Treated as corruption.
    IndexingFailed,
    /// A list-only (or map-only) operation was attempted on the wrong root kind.
    WrongKindForOp,
    /// A negative list index resolved to a value below zero on a write.
    NonCreatableSubscript,
    /// `try_insert`-style store rejected because the key is already bound.
    StoreRejectedTiedValue,
    /// Stored value was neither a scalar, null, map, nor list.
    StoreRejectedUnsupportedType,
    /// `optimize()` was called while more than one handle is open on the Root.
    OptimizeBusy,
    /// The compacted temp file could not be renamed over the original.
    OptimizeRenameFailed,
    /// Underlying filesystem I/O error.
    Io(io::Error),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> Result<(), std::fmt::Error> {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
