//
// tests/locking.rs -- Handle::lock/unlock and the locking-disabled escape hatch
//
// Copyright (c) 2019-2024 Jeff Garzik
//
// This file is part of the dpdb-native software project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT

extern crate dpdb_native;

use dpdb_native::{LockMode, NewValue, OpenOptions, Value};

#[test]
fn explicit_lock_unlock_does_not_block_later_operations() {
    let db = OpenOptions::new().write().create().tempfile().unwrap();

    db.lock(LockMode::Exclusive).unwrap();
    db.put(b"k", NewValue::Scalar(b"v")).unwrap();
    db.unlock().unwrap();

    match db.get(b"k").unwrap() {
        Some(Value::Scalar(v)) => assert_eq!(v, b"v"),
        _ => panic!("expected a scalar"),
    }
}

#[test]
fn nested_nested_handle_operations_share_one_lock() {
    // A list push on a freshly created element touches the parent trie and
    // then the child's own empty index node in the same exclusive section;
    // this only works if the reentrant lock doesn't deadlock on itself.
    let db = OpenOptions::new()
        .write()
        .create()
        .root_kind(dpdb_native::RootKind::List)
        .tempfile()
        .unwrap();

    db.push(vec![NewValue::MapSeeded(&{
        let mut m = serde_json::Map::new();
        m.insert("a".into(), serde_json::json!(1));
        m
    })])
    .unwrap();

    assert_eq!(db.length().unwrap(), 1);
}

#[test]
fn locking_disabled_still_allows_normal_operation() {
    let db = OpenOptions::new()
        .write()
        .create()
        .locking(false)
        .tempfile()
        .unwrap();

    db.put(b"k", NewValue::Scalar(b"v")).unwrap();
    match db.get(b"k").unwrap() {
        Some(Value::Scalar(v)) => assert_eq!(v, b"v"),
        _ => panic!("expected a scalar"),
    }
}

#[test]
fn explicit_unlock_without_lock_is_a_harmless_noop() {
    let db = OpenOptions::new().write().create().tempfile().unwrap();
    db.unlock().unwrap();
    db.put(b"k", NewValue::Scalar(b"v")).unwrap();
}
