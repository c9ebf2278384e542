//
// tests/open.rs -- opening, creating, and recognizing database files
//
// Copyright (c) 2019-2024 Jeff Garzik
//
// This file is part of the dpdb-native software project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT

extern crate dpdb_native;

use dpdb_native::{DigestAlgorithm, Error, NewValue, OffsetWidth, OpenOptions, RootKind, Value};

#[test]
fn create_then_reopen_preserves_contents() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let path = tmp.path().to_path_buf();

    {
        let db = OpenOptions::new()
            .write()
            .create()
            .open(&path)
            .expect("create");
        db.put(b"hello", NewValue::Scalar(b"world")).unwrap();
    }

    let db = OpenOptions::new().open(&path).expect("reopen read-only");
    match db.get(b"hello").unwrap() {
        Some(Value::Scalar(v)) => assert_eq!(v, b"world"),
        _ => panic!("expected a scalar value"),
    }
}

#[test]
fn create_new_list_root_opens_as_list() {
    let db = OpenOptions::new()
        .write()
        .create()
        .root_kind(RootKind::List)
        .tempfile()
        .unwrap();
    assert_eq!(db.type_of(), RootKind::List);
    assert_eq!(db.length().unwrap(), 0);
}

#[test]
fn create_new_with_eight_byte_offsets_round_trips_through_reopen() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let path = tmp.path().to_path_buf();

    {
        let db = OpenOptions::new()
            .write()
            .create()
            .offset_width(OffsetWidth::Eight)
            .digest(DigestAlgorithm::Md5)
            .open(&path)
            .unwrap();
        db.put(b"k", NewValue::Scalar(b"v")).unwrap();
    }

    let db = OpenOptions::new().write().open(&path).unwrap();
    match db.get(b"k").unwrap() {
        Some(Value::Scalar(v)) => assert_eq!(v, b"v"),
        _ => panic!("expected a scalar value"),
    }
}

#[test]
fn opening_empty_file_read_only_fails() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let err = OpenOptions::new().open(tmp.path()).unwrap_err();
    assert!(matches!(err, Error::CannotOpen(_)));
}

#[test]
fn opening_file_with_bad_signature_fails() {
    use std::io::Write as _;
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(b"NOTA DATABASE CONTENTS").unwrap();
    tmp.flush().unwrap();

    let err = OpenOptions::new().write().open(tmp.path()).unwrap_err();
    assert!(matches!(err, Error::SignatureMismatch));
}
