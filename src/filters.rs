//
// filters.rs -- the four optional store/fetch transform callbacks
//
// Copyright (c) 2019-2024 Jeff Garzik
//
// This file is part of the dpdb-native software project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT

/// A single-argument, single-return user transform.
pub type FilterFn = Box<dyn Fn(&[u8]) -> Vec<u8>>;

/// The four process-local filter slots (§4.6). None are persisted; a file
/// reopened in a fresh process starts with no filters installed.
#[derive(Default)]
pub struct FilterSet {
    pub store_key: Option<FilterFn>,
    pub store_value: Option<FilterFn>,
    pub fetch_key: Option<FilterFn>,
    pub fetch_value: Option<FilterFn>,
}

impl FilterSet {
    pub fn new() -> Self {
        FilterSet::default()
    }

    /// Applies `store_key` if set, otherwise passes `key` through unchanged.
    pub fn apply_store_key(&self, key: &[u8]) -> Vec<u8> {
        match &self.store_key {
            Some(f) => f(key),
            None => key.to_vec(),
        }
    }

    pub fn apply_store_value(&self, value: &[u8]) -> Vec<u8> {
        match &self.store_value {
            Some(f) => f(value),
            None => value.to_vec(),
        }
    }

    pub fn apply_fetch_key(&self, key: &[u8]) -> Vec<u8> {
        match &self.fetch_key {
            Some(f) => f(key),
            None => key.to_vec(),
        }
    }

    pub fn apply_fetch_value(&self, value: &[u8]) -> Vec<u8> {
        match &self.fetch_value {
            Some(f) => f(value),
            None => value.to_vec(),
        }
    }
}

impl std::fmt::Debug for FilterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterSet")
            .field("store_key", &self.store_key.is_some())
            .field("store_value", &self.store_value.is_some())
            .field("fetch_key", &self.fetch_key.is_some())
            .field("fetch_value", &self.fetch_value.is_some())
            .finish()
    }
}
