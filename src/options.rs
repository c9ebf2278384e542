//
// options.rs -- typestate open-options builder
//
// Copyright (c) 2019-2024 Jeff Garzik
//
// This file is part of the dpdb-native software project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT

use std::path::Path;

use crate::digest::DigestAlgorithm;
use crate::filters::{FilterFn, FilterSet};
use crate::root::{Handle, Root};
use crate::ser::OffsetWidth;
use crate::Result;

/// Whether a freshly created file roots a map or a list (§6: "type", takes
/// effect only on new files).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RootKind {
    Map,
    List,
}

/// Create-time parameters that only matter when a new file is actually
/// written (existing files read their own `Layout` back out of the header,
/// per §9).
#[derive(Default)]
pub struct Create {
    pub offset_width: Option<OffsetWidth>,
    pub digest: Option<DigestAlgorithm>,
}

#[derive(Default)]
pub struct NotCreate;

#[derive(Default)]
pub struct NotWrite;

#[derive(Default)]
pub struct Write<C> {
    pub create: C,
}

/// Typestate builder: `OpenOptions::new().write().create()` walks
/// `NotWrite -> Write<NotCreate> -> Write<Create>`, widening which methods
/// and which `open()` overload are available, mirroring the teacher's own
/// `OpenOptions<W>` chain.
pub struct OpenOptions<W> {
    pub root_kind: RootKind,
    pub locking: bool,
    pub autoflush: bool,
    pub volatile: bool,
    pub debug: bool,
    pub filters: FilterSet,
    pub write: W,
}

impl OpenOptions<NotWrite> {
    pub fn new() -> Self {
        OpenOptions {
            root_kind: RootKind::Map,
            locking: true,
            autoflush: true,
            volatile: false,
            debug: false,
            filters: FilterSet::new(),
            write: NotWrite,
        }
    }
}

impl Default for OpenOptions<NotWrite> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W> OpenOptions<W> {
    pub fn root_kind(mut self, kind: RootKind) -> Self {
        self.root_kind = kind;
        self
    }

    pub fn locking(mut self, on: bool) -> Self {
        self.locking = on;
        self
    }

    pub fn autoflush(mut self, on: bool) -> Self {
        self.autoflush = on;
        self
    }

    pub fn volatile(mut self, on: bool) -> Self {
        self.volatile = on;
        self
    }

    pub fn debug(mut self, on: bool) -> Self {
        self.debug = on;
        self
    }

    pub fn store_key_filter(mut self, f: FilterFn) -> Self {
        self.filters.store_key = Some(f);
        self
    }

    pub fn store_value_filter(mut self, f: FilterFn) -> Self {
        self.filters.store_value = Some(f);
        self
    }

    pub fn fetch_key_filter(mut self, f: FilterFn) -> Self {
        self.filters.fetch_key = Some(f);
        self
    }

    pub fn fetch_value_filter(mut self, f: FilterFn) -> Self {
        self.filters.fetch_value = Some(f);
        self
    }
}

impl OpenOptions<NotWrite> {
    pub fn write(self) -> OpenOptions<Write<NotCreate>> {
        OpenOptions {
            root_kind: self.root_kind,
            locking: self.locking,
            autoflush: self.autoflush,
            volatile: self.volatile,
            debug: self.debug,
            filters: self.filters,
            write: Write { create: NotCreate },
        }
    }

    pub fn open<P: AsRef<Path>>(self, path: P) -> Result<Handle> {
        let file = std::fs::OpenOptions::new().read(true).open(path.as_ref())?;
        Root::open_existing(
            file,
            Some(path.as_ref().to_path_buf()),
            self.root_kind,
            false,
            self.locking,
            self.autoflush,
            self.volatile,
            self.debug,
            self.filters,
        )
    }
}

impl OpenOptions<Write<NotCreate>> {
    pub fn create(self) -> OpenOptions<Write<Create>> {
        OpenOptions {
            root_kind: self.root_kind,
            locking: self.locking,
            autoflush: self.autoflush,
            volatile: self.volatile,
            debug: self.debug,
            filters: self.filters,
            write: Write {
                create: Create::default(),
            },
        }
    }

    pub fn open<P: AsRef<Path>>(self, path: P) -> Result<Handle> {
        let file = std::fs::OpenOptions::new().read(true).write(true).open(path.as_ref())?;
        Root::open_existing(
            file,
            Some(path.as_ref().to_path_buf()),
            self.root_kind,
            true,
            self.locking,
            self.autoflush,
            self.volatile,
            self.debug,
            self.filters,
        )
    }
}

impl OpenOptions<Write<Create>> {
    pub fn offset_width(mut self, width: OffsetWidth) -> Self {
        self.write.create.offset_width = Some(width);
        self
    }

    pub fn digest(mut self, digest: DigestAlgorithm) -> Self {
        self.write.create.digest = Some(digest);
        self
    }

    pub fn open<P: AsRef<Path>>(self, path: P) -> Result<Handle> {
        match std::fs::OpenOptions::new().read(true).write(true).open(path.as_ref()) {
            Ok(file) => Root::open_existing(
                file,
                Some(path.as_ref().to_path_buf()),
                self.root_kind,
                true,
                self.locking,
                self.autoflush,
                self.volatile,
                self.debug,
                self.filters,
            ),
            Err(_) => {
                let file = std::fs::OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create_new(true)
                    .open(path.as_ref())?;
                Root::create_new(
                    file,
                    Some(path.as_ref().to_path_buf()),
                    self.root_kind,
                    self.write.create.offset_width.unwrap_or(OffsetWidth::Four),
                    self.write.create.digest.unwrap_or(DigestAlgorithm::Md5),
                    self.locking,
                    self.autoflush,
                    self.volatile,
                    self.debug,
                    self.filters,
                )
            }
        }
    }

    /// Opens a database backed by an anonymous `tempfile::tempfile`, never
    /// visible in the filesystem and removed when the last handle drops.
    /// `optimize()` is unavailable on such a handle since there is no path
    /// to atomically rename a compacted replacement into.
    pub fn tempfile(self) -> Result<Handle> {
        let file = tempfile::tempfile()?;
        Root::create_new(
            file,
            None,
            self.root_kind,
            self.write.create.offset_width.unwrap_or(OffsetWidth::Four),
            self.write.create.digest.unwrap_or(DigestAlgorithm::Md5),
            self.locking,
            self.autoflush,
            self.volatile,
            self.debug,
            self.filters,
        )
    }
}
