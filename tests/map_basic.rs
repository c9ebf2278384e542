//
// tests/map_basic.rs -- map put/get/exists/delete/clear and key iteration
//
// Copyright (c) 2019-2024 Jeff Garzik
//
// This file is part of the dpdb-native software project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT

extern crate dpdb_native;

use std::collections::HashSet;

use dpdb_native::{Error, NewValue, OpenOptions, PutOutcome, Value};

fn new_map() -> dpdb_native::Handle {
    OpenOptions::new().write().create().tempfile().unwrap()
}

#[test]
fn put_then_get_scalar() {
    let db = new_map();
    db.put(b"name", NewValue::Scalar(b"ferris")).unwrap();
    match db.get(b"name").unwrap() {
        Some(Value::Scalar(v)) => assert_eq!(v, b"ferris"),
        _ => panic!("expected a scalar"),
    }
}

#[test]
fn put_reports_insert_vs_replace() {
    let db = new_map();
    let first = db.put(b"k", NewValue::Scalar(b"1")).unwrap();
    assert_eq!(first, PutOutcome::Inserted);
    let second = db.put(b"k", NewValue::Scalar(b"2")).unwrap();
    assert_eq!(second, PutOutcome::Replaced);
    match db.get(b"k").unwrap() {
        Some(Value::Scalar(v)) => assert_eq!(v, b"2"),
        _ => panic!("expected a scalar"),
    }
}

#[test]
fn get_missing_key_is_none() {
    let db = new_map();
    assert!(db.get(b"missing").unwrap().is_none());
}

#[test]
fn exists_tracks_put_and_delete() {
    let db = new_map();
    assert!(!db.exists(b"k").unwrap());
    db.put(b"k", NewValue::Scalar(b"v")).unwrap();
    assert!(db.exists(b"k").unwrap());
    assert!(db.delete(b"k").unwrap());
    assert!(!db.exists(b"k").unwrap());
}

#[test]
fn delete_missing_key_returns_false() {
    let db = new_map();
    assert!(!db.delete(b"nope").unwrap());
}

#[test]
fn null_value_round_trips() {
    let db = new_map();
    db.put(b"empty", NewValue::Null).unwrap();
    match db.get(b"empty").unwrap() {
        Some(Value::Null) => {}
        _ => panic!("expected null"),
    }
}

#[test]
fn clear_empties_a_map_in_place() {
    let db = new_map();
    for i in 0..50 {
        db.put(format!("key-{i}").as_bytes(), NewValue::Scalar(b"x")).unwrap();
    }
    db.clear().unwrap();
    assert!(!db.exists(b"key-0").unwrap());
    assert!(db.first_key().unwrap().is_none());
}

#[test]
fn first_key_and_next_key_visit_every_key_once() {
    let db = new_map();
    let mut expected = HashSet::new();
    for i in 0..200 {
        let key = format!("key-{i}").into_bytes();
        db.put(&key, NewValue::Scalar(b"x")).unwrap();
        expected.insert(key);
    }

    let mut seen = HashSet::new();
    let mut cursor = db.first_key().unwrap();
    while let Some(key) = cursor {
        assert!(seen.insert(key.clone()), "key visited twice: {key:?}");
        cursor = db.next_key(&key).unwrap();
    }
    assert_eq!(seen, expected);
}

#[test]
fn list_only_operation_on_map_root_fails() {
    let db = new_map();
    assert!(matches!(db.length(), Err(Error::WrongKindForOp)));
}
