//
// import.rs -- serde_json bulk import/export (§4.7)
//
// Copyright (c) 2019-2024 Jeff Garzik
//
// This file is part of the dpdb-native software project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT

use serde_json::{Map, Value as Json};

use crate::error::{Error, Result};
use crate::options::RootKind;
use crate::root::{Handle, NewValue, Value};

/// Where a queued JSON value gets installed once it's popped off the
/// worklist: a named key of a map, or the next append slot of a list.
enum Target {
    MapKey(Handle, String),
    ListAppend(Handle),
}

struct WorkItem {
    target: Target,
    value: Json,
}

impl Handle {
    /// Merges a JSON object or array's children directly into this handle
    /// (a map merges keys, a list appends elements), rejecting any shape
    /// that isn't an object, array, string, number, bool, or null
    /// (`Error::StoreRejectedUnsupportedType`). Nested objects/arrays are
    /// installed via an explicit worklist stack rather than native
    /// recursion, so import depth isn't bounded by the Rust call stack.
    pub fn import(&self, value: &Json) -> Result<()> {
        let mut stack = Vec::new();
        match (self.type_of(), value) {
            (RootKind::Map, Json::Object(obj)) => {
                for (k, v) in obj {
                    stack.push(WorkItem { target: Target::MapKey(self.clone(), k.clone()), value: v.clone() });
                }
            }
            (RootKind::List, Json::Array(items)) => {
                for v in items.iter().rev() {
                    stack.push(WorkItem { target: Target::ListAppend(self.clone()), value: v.clone() });
                }
            }
            _ => return Err(Error::StoreRejectedUnsupportedType),
        }
        drain_worklist(&mut stack)
    }

    /// Walks this handle's full tree and renders it as a `serde_json::Value`.
    pub fn export(&self) -> Result<Json> {
        value_to_json(self)
    }
}

/// Populates an already-created, empty map from a JSON object (used by
/// `NewValue::MapSeeded`, whose caller already holds the parent `put()`
/// call's stack frame -- a single level of native recursion through
/// `Handle::put`, bounded by the depth of one caller-constructed value).
pub(crate) fn seed_map(map: &Handle, obj: &Map<String, Json>) -> Result<()> {
    let mut stack: Vec<WorkItem> = obj
        .iter()
        .map(|(k, v)| WorkItem { target: Target::MapKey(map.clone(), k.clone()), value: v.clone() })
        .collect();
    drain_worklist(&mut stack)
}

/// Populates an already-created, empty list from a JSON array.
pub(crate) fn seed_list(list: &Handle, items: &[Json]) -> Result<()> {
    let mut stack: Vec<WorkItem> = items
        .iter()
        .rev()
        .map(|v| WorkItem { target: Target::ListAppend(list.clone()), value: v.clone() })
        .collect();
    drain_worklist(&mut stack)
}

/// Drains `stack`, installing each queued value. Popping an object/array
/// creates its (empty) composite and pushes its own children back onto the
/// same stack rather than recursing, so total call depth stays flat no
/// matter how deeply the source JSON nests.
fn drain_worklist(stack: &mut Vec<WorkItem>) -> Result<()> {
    while let Some(item) = stack.pop() {
        match item.value {
            Json::Object(obj) => {
                let child = create_child(&item.target, NewValue::Map)?;
                for (k, v) in obj {
                    stack.push(WorkItem { target: Target::MapKey(child.clone(), k), value: v });
                }
            }
            Json::Array(items) => {
                let child = create_child(&item.target, NewValue::List)?;
                for v in items.into_iter().rev() {
                    stack.push(WorkItem { target: Target::ListAppend(child.clone()), value: v });
                }
            }
            Json::String(s) => install(&item.target, NewValue::Scalar(s.as_bytes()))?,
            Json::Number(n) => install(&item.target, NewValue::Scalar(n.to_string().as_bytes()))?,
            Json::Bool(b) => install(&item.target, NewValue::Scalar(if b { b"true" } else { b"false" }))?,
            Json::Null => install(&item.target, NewValue::Null)?,
        }
    }
    Ok(())
}

fn install(target: &Target, value: NewValue) -> Result<()> {
    match target {
        Target::MapKey(h, key) => {
            h.put(key.as_bytes(), value)?;
        }
        Target::ListAppend(h) => {
            h.push(vec![value])?;
        }
    }
    Ok(())
}

/// Creates an empty child composite at `target` and returns a handle onto
/// it, for the caller to seed afterward via the worklist.
fn create_child(target: &Target, value: NewValue) -> Result<Handle> {
    match target {
        Target::MapKey(h, key) => {
            h.put(key.as_bytes(), value)?;
            match h.get(key.as_bytes())? {
                Some(Value::Child(child)) => Ok(child),
                _ => Err(Error::IndexingFailed),
            }
        }
        Target::ListAppend(h) => {
            let len = h.push(vec![value])?;
            match h.get_index(len as i64 - 1)? {
                Some(Value::Child(child)) => Ok(child),
                _ => Err(Error::IndexingFailed),
            }
        }
    }
}

fn value_to_json(handle: &Handle) -> Result<Json> {
    match handle.type_of() {
        RootKind::Map => export_map(handle),
        RootKind::List => export_list(handle),
    }
}

fn export_map(map: &Handle) -> Result<Json> {
    let mut out = Map::new();
    let mut cursor = map.first_key()?;
    while let Some(key) = cursor {
        if let Some(value) = map.get(&key)? {
            let key_str = String::from_utf8_lossy(&key).into_owned();
            out.insert(key_str, scalar_or_child_to_json(value)?);
        }
        cursor = map.next_key(&key)?;
    }
    Ok(Json::Object(out))
}

fn export_list(list: &Handle) -> Result<Json> {
    let len = list.length()?;
    let mut out = Vec::with_capacity(len as usize);
    for i in 0..len {
        if let Some(value) = list.get_index(i as i64)? {
            out.push(scalar_or_child_to_json(value)?);
        } else {
            out.push(Json::Null);
        }
    }
    Ok(Json::Array(out))
}

fn scalar_or_child_to_json(value: Value) -> Result<Json> {
    match value {
        Value::Scalar(bytes) => Ok(Json::String(String::from_utf8_lossy(&bytes).into_owned())),
        Value::Null => Ok(Json::Null),
        Value::Child(child) => value_to_json(&child),
    }
}
