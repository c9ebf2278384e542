//
// lib.rs -- dpdb-native crate root
//
// Copyright (c) 2019-2024 Jeff Garzik
//
// This file is part of the dpdb-native software project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT

//! Rust-native implementation of a single-file, embedded key-value database
//! with native nested map/list composite values.
//!
//! A value stored in the database is either a scalar byte string, null, or
//! itself a nested map or list -- composite values are addressed through
//! their own [`Handle`], so arbitrarily deep trees are just more handles
//! sharing the same open file.
//!
//! # Examples
//! ```
//! use dpdb_native::{NewValue, OpenOptions, Value};
//!
//! # fn main() -> Result<(), String> {
//! let db = OpenOptions::new()
//!     .write()
//!     .create()
//!     .tempfile()
//!     .map_err(|e| e.to_string())?;
//!
//! db.put(b"name", NewValue::Scalar(b"ferris")).map_err(|e| e.to_string())?;
//!
//! match db.get(b"name").map_err(|e| e.to_string())? {
//!     Some(Value::Scalar(v)) => assert_eq!(v, b"ferris"),
//!     _ => panic!("expected a scalar"),
//! }
//! # Ok(())
//! # }
//! ```

mod bucket;
mod digest;
mod error;
mod filters;
mod import;
mod list;
mod locking;
mod options;
mod root;
mod ser;
mod tag;
mod trie;
mod value;

pub use digest::DigestAlgorithm;
pub use error::{Error, Result};
pub use filters::FilterFn;
pub use locking::LockMode;
pub use options::{Create, NotCreate, NotWrite, OpenOptions, RootKind, Write};
pub use root::{Handle, NewValue, Value};
pub use ser::OffsetWidth;
pub use trie::PutOutcome;
