//
// root.rs -- per-file session state (`Root`) and the public handle (`Handle`)
//
// Copyright (c) 2019-2024 Jeff Garzik
//
// This file is part of the dpdb-native software project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT

use std::cell::RefCell;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::rc::Rc;

use log::error as log_error;

use crate::digest::DigestAlgorithm;
use crate::error::{Error, Result};
use crate::filters::FilterSet;
use crate::list::{self, ListBacking, RawValue};
use crate::locking::{LockMode, LockState};
use crate::options::RootKind;
use crate::ser::{pack_uint, Layout, OffsetWidth};
use crate::tag::{create_tag, load_tag, TagKind, SIGNATURE};
use crate::trie;
use crate::value::{empty_composite_payload, read_value_record, ValueRecord};

/// Shared, process-local state for one open database file (§4.6). Never
/// cloned directly -- every `Handle` holds an `Rc<RefCell<Root>>` onto the
/// same instance, so the last handle to drop is the last reference to the
/// open file.
pub struct Root {
    file: File,
    layout: Layout,
    digest: DigestAlgorithm,
    end: u64,
    lock: LockState,
    filters: FilterSet,
    locking: bool,
    autoflush: bool,
    volatile: bool,
    debug: bool,
    path: Option<PathBuf>,
    root_content_offset: u64,
    last_error: Option<String>,
}

impl Root {
    fn lock_raw(&mut self, mode: LockMode) -> Result<()> {
        let Root { file, lock, .. } = self;
        lock.lock(file, mode)
    }

    fn unlock_raw(&mut self) -> Result<()> {
        let Root { file, lock, .. } = self;
        lock.unlock(file)
    }

    /// Writes the signature and an empty root composite into a known-empty
    /// file (§4.1).
    fn bootstrap(file: &mut File, layout: &Layout, root_kind: RootKind) -> Result<(TagKind, u64, u64)> {
        file.seek(SeekFrom::Start(0))?;
        file.write_all(SIGNATURE)?;
        let mut end = SIGNATURE.len() as u64;
        let root_offset = end;
        let kind = match root_kind {
            RootKind::Map => TagKind::Map,
            RootKind::List => TagKind::List,
        };
        let payload = empty_composite_payload(layout);
        let tag = create_tag(file, layout, &mut end, root_offset, kind, &payload)?;
        Ok((kind, end, tag.content_offset))
    }

    /// Verifies the signature of a non-empty file and recovers its `Layout`
    /// and root tag. `Layout` is not itself recorded in the header (the root
    /// tag sits at a fixed offset per §3's invariant), so it is recovered by
    /// trying each supported `OffsetWidth` and keeping the one whose root
    /// tag decodes to a full-size index node; a mis-guessed width yields
    /// either a corrupt kind byte or a content length that doesn't match
    /// `layout.index_node_size()`.
    fn detect_existing(file: &mut File, len: u64) -> Result<(Layout, TagKind, u64)> {
        file.seek(SeekFrom::Start(0))?;
        let mut sig = [0u8; 4];
        file.read_exact(&mut sig)?;
        if sig != *SIGNATURE {
            return Err(Error::SignatureMismatch);
        }

        let sig_len = SIGNATURE.len() as u64;
        for width in [OffsetWidth::Four, OffsetWidth::Eight] {
            let layout = Layout { offset_width: width, hash_size: DigestAlgorithm::Md5.size() };
            if let Ok(Some(tag)) = load_tag(file, &layout, len, sig_len) {
                if tag.kind.is_composite() && tag.content.len() == layout.index_node_size() {
                    return Ok((layout, tag.kind, tag.content_offset));
                }
            }
        }
        Err(Error::SignatureMismatch)
    }

    /// Opens a path that may already hold a database. Bootstraps an empty
    /// (but existing) file when `writable`, mirroring the teacher's
    /// open-or-initialize behavior for a freshly `touch`ed file.
    #[allow(clippy::too_many_arguments)]
    pub fn open_existing(
        mut file: File,
        path: Option<PathBuf>,
        root_kind: RootKind,
        writable: bool,
        locking: bool,
        autoflush: bool,
        volatile: bool,
        debug: bool,
        filters: FilterSet,
    ) -> Result<Handle> {
        let len = file.metadata()?.len();

        let (layout, root_tag_kind, end, content_offset) = if len == 0 {
            if !writable {
                return Err(Error::CannotOpen("cannot initialize an empty database read-only".into()));
            }
            let layout = Layout { offset_width: OffsetWidth::Four, hash_size: DigestAlgorithm::Md5.size() };
            let (kind, end, content_offset) = Self::bootstrap(&mut file, &layout, root_kind)?;
            (layout, kind, end, content_offset)
        } else {
            let (layout, kind, content_offset) = Self::detect_existing(&mut file, len)?;
            (layout, kind, len, content_offset)
        };

        let root = Root {
            file,
            layout,
            digest: DigestAlgorithm::Md5,
            end,
            lock: LockState::new(),
            filters,
            locking,
            autoflush,
            volatile,
            debug,
            path,
            root_content_offset: content_offset,
            last_error: None,
        };

        Ok(Handle { root: Rc::new(RefCell::new(root)), content_offset, kind: root_tag_kind })
    }

    /// Initializes a brand-new, known-empty file with explicit create-time
    /// parameters.
    #[allow(clippy::too_many_arguments)]
    pub fn create_new(
        mut file: File,
        path: Option<PathBuf>,
        root_kind: RootKind,
        offset_width: OffsetWidth,
        digest: DigestAlgorithm,
        locking: bool,
        autoflush: bool,
        volatile: bool,
        debug: bool,
        filters: FilterSet,
    ) -> Result<Handle> {
        let layout = Layout { offset_width, hash_size: digest.size() };
        let (kind, end, content_offset) = Self::bootstrap(&mut file, &layout, root_kind)?;

        let root = Root {
            file,
            layout,
            digest,
            end,
            lock: LockState::new(),
            filters,
            locking,
            autoflush,
            volatile,
            debug,
            path,
            root_content_offset: content_offset,
            last_error: None,
        };

        Ok(Handle { root: Rc::new(RefCell::new(root)), content_offset, kind })
    }
}

/// What a caller stores via `Handle::put`/`push`/`set_index` (§9's
/// `NewValue`). `MapSeeded`/`ListSeeded` build and populate a child composite
/// in one call, used by `import()` to seed a foreign tree without native
/// recursion (the seeding itself still walks an explicit worklist -- see
/// `import.rs`).
pub enum NewValue<'a> {
    Scalar(&'a [u8]),
    Null,
    Map,
    MapSeeded(&'a serde_json::Map<String, serde_json::Value>),
    List,
    ListSeeded(&'a [serde_json::Value]),
}

/// What a caller gets back from `Handle::get`/`get_index`/`pop`/`shift`.
#[derive(Clone)]
pub enum Value {
    Scalar(Vec<u8>),
    Null,
    Child(Handle),
}

/// A reference to one composite value (a map or a list) inside an open
/// database. Cheap to clone -- every clone shares the same `Rc<RefCell<Root>>`
/// and differs only in which composite it addresses (`content_offset`).
///
/// Unlike the teacher's typestate `ReadOnly`/`ReadWrite` split, a single
/// `Handle` type serves both map and list roots (and every nested composite
/// reachable from them); list-only and map-only operations check `self.kind`
/// at call time and fail with `Error::WrongKindForOp` on a mismatch, per §6.
#[derive(Clone)]
pub struct Handle {
    pub(crate) root: Rc<RefCell<Root>>,
    pub(crate) content_offset: u64,
    pub(crate) kind: TagKind,
}

impl Handle {
    /// Runs `f` under the configured lock discipline: acquires `mode` if
    /// locking is enabled (reentrant -- nested calls on the same `Handle`
    /// family just bump the depth counter), re-stats the file first when
    /// locking or volatile mode is on (another writer may have grown it
    /// since our last read of `end`), and fsyncs after a successful
    /// exclusive section when autoflush is on.
    fn with_lock<T>(&self, mode: LockMode, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let locking = self.root.borrow().locking;
        if locking {
            self.root.borrow_mut().lock_raw(mode)?;
        }

        let volatile = self.root.borrow().volatile;
        if locking || volatile {
            let on_disk_len = self.root.borrow().file.metadata()?.len();
            let mut root = self.root.borrow_mut();
            if on_disk_len > root.end {
                root.end = on_disk_len;
            }
        }

        let result = f();

        if mode == LockMode::Exclusive {
            let autoflush = self.root.borrow().autoflush;
            if autoflush && result.is_ok() {
                self.root.borrow_mut().file.sync_data()?;
            }
        }

        if locking {
            self.root.borrow_mut().unlock_raw()?;
        }

        if let Err(ref e) = result {
            let debug = self.root.borrow().debug;
            if debug {
                log_error!("dpdb: operation failed: {e}");
            }
            self.root.borrow_mut().last_error = Some(e.to_string());
        }

        result
    }

    pub(crate) fn child_handle_at(&self, content_offset: u64, kind: TagKind) -> Handle {
        Handle { root: Rc::clone(&self.root), content_offset, kind }
    }

    fn read_record_at(&self, offset: u64) -> Result<ValueRecord> {
        let mut root = self.root.borrow_mut();
        let Root { file, layout, end, .. } = &mut *root;
        read_value_record(file, layout, *end, offset)
    }

    fn record_to_value(&self, rec: ValueRecord) -> Value {
        match rec.kind {
            TagKind::Data => {
                let filtered = self.root.borrow().filters.apply_fetch_value(&rec.payload);
                Value::Scalar(filtered)
            }
            TagKind::Null => Value::Null,
            TagKind::Map => Value::Child(self.child_handle_at(rec.content_offset, TagKind::Map)),
            TagKind::List => Value::Child(self.child_handle_at(rec.content_offset, TagKind::List)),
            TagKind::Index | TagKind::Bucket => Value::Null,
        }
    }

    /// Looks up a raw (already store_key-filtered, if applicable) key and
    /// decodes the record found, if any.
    fn fetch_raw(&self, key: &[u8]) -> Result<Option<Value>> {
        let digest = self.root.borrow().digest.digest(key);
        let found = {
            let mut root = self.root.borrow_mut();
            let Root { file, layout, end, .. } = &mut *root;
            trie::get(file, layout, *end, self.content_offset, &digest)?
        };
        match found {
            None => Ok(None),
            Some(offset) => Ok(Some(self.record_to_value(self.read_record_at(offset)?))),
        }
    }

    /// Encodes `value`'s shape (not its seeded children) and writes it at
    /// `key`, returning the outcome and the value record's offset so the
    /// caller can seed composite children afterward.
    fn store_raw(&self, key: &[u8], value: &NewValue) -> Result<(trie::PutOutcome, u64)> {
        let layout = self.root.borrow().layout;
        let (kind, payload): (TagKind, Vec<u8>) = match value {
            NewValue::Scalar(bytes) => {
                let filtered = self.root.borrow().filters.apply_store_value(bytes);
                (TagKind::Data, filtered)
            }
            NewValue::Null => (TagKind::Null, Vec::new()),
            NewValue::Map | NewValue::MapSeeded(_) => (TagKind::Map, empty_composite_payload(&layout)),
            NewValue::List | NewValue::ListSeeded(_) => (TagKind::List, empty_composite_payload(&layout)),
        };

        let digest = self.root.borrow().digest.digest(key);
        let mut root = self.root.borrow_mut();
        let Root { file, layout, end, .. } = &mut *root;
        trie::put(file, layout, end, self.content_offset, &digest, kind, &payload, key)
    }

    /// Populates a just-written `MapSeeded`/`ListSeeded` child via the same
    /// explicit-worklist machinery `import()` uses (§9).
    fn apply_seed(&self, offset: u64, value: &NewValue) -> Result<()> {
        match value {
            NewValue::MapSeeded(map) => {
                let rec = self.read_record_at(offset)?;
                let child = self.child_handle_at(rec.content_offset, TagKind::Map);
                crate::import::seed_map(&child, map)
            }
            NewValue::ListSeeded(items) => {
                let rec = self.read_record_at(offset)?;
                let child = self.child_handle_at(rec.content_offset, TagKind::List);
                crate::import::seed_list(&child, items)
            }
            _ => Ok(()),
        }
    }

    fn bump_length(&self, n: u64) -> Result<()> {
        let layout = self.root.borrow().layout;
        let mut h = self.clone();
        ListBacking::raw_put(&mut h, list::LENGTH_KEY, RawValue::Scalar(pack_uint(layout.offset_width, n)))?;
        Ok(())
    }

    // -- common operations (§6) --------------------------------------

    pub fn put(&self, key: &[u8], value: NewValue) -> Result<trie::PutOutcome> {
        if self.kind != TagKind::Map {
            return Err(Error::WrongKindForOp);
        }
        self.with_lock(LockMode::Exclusive, || {
            let stored_key = self.root.borrow().filters.apply_store_key(key);
            let (outcome, offset) = self.store_raw(&stored_key, &value)?;
            self.apply_seed(offset, &value)?;
            Ok(outcome)
        })
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Value>> {
        if self.kind != TagKind::Map {
            return Err(Error::WrongKindForOp);
        }
        self.with_lock(LockMode::Shared, || {
            let stored_key = self.root.borrow().filters.apply_store_key(key);
            self.fetch_raw(&stored_key)
        })
    }

    pub fn exists(&self, key: &[u8]) -> Result<bool> {
        if self.kind != TagKind::Map {
            return Err(Error::WrongKindForOp);
        }
        self.with_lock(LockMode::Shared, || {
            let stored_key = self.root.borrow().filters.apply_store_key(key);
            let digest = self.root.borrow().digest.digest(&stored_key);
            let mut root = self.root.borrow_mut();
            let Root { file, layout, end, .. } = &mut *root;
            trie::exists(file, layout, *end, self.content_offset, &digest)
        })
    }

    pub fn delete(&self, key: &[u8]) -> Result<bool> {
        if self.kind != TagKind::Map {
            return Err(Error::WrongKindForOp);
        }
        self.with_lock(LockMode::Exclusive, || {
            let stored_key = self.root.borrow().filters.apply_store_key(key);
            let digest = self.root.borrow().digest.digest(&stored_key);
            let mut root = self.root.borrow_mut();
            let Root { file, layout, end, .. } = &mut *root;
            Ok(trie::delete(file, layout, end, self.content_offset, &digest)?.is_some())
        })
    }

    /// Resets this composite (root or nested) back to an empty index node,
    /// in place -- the index node is fixed-size, so this never reallocates.
    pub fn clear(&self) -> Result<()> {
        self.with_lock(LockMode::Exclusive, || {
            let layout = self.root.borrow().layout;
            let zeros = vec![0u8; layout.index_node_size()];
            let mut root = self.root.borrow_mut();
            crate::tag::overwrite_content(&mut root.file, self.content_offset, &zeros)?;
            Ok(())
        })
    }

    pub fn error(&self) -> Option<String> {
        self.root.borrow().last_error.clone()
    }

    pub fn clear_error(&self) {
        self.root.borrow_mut().last_error = None;
    }

    pub fn type_of(&self) -> RootKind {
        match self.kind {
            TagKind::Map => RootKind::Map,
            TagKind::List => RootKind::List,
            _ => unreachable!("a Handle only ever addresses a Map or List composite"),
        }
    }

    pub fn lock(&self, mode: LockMode) -> Result<()> {
        self.root.borrow_mut().lock_raw(mode)
    }

    pub fn unlock(&self) -> Result<()> {
        self.root.borrow_mut().unlock_raw()
    }

    /// Returns the underlying file descriptor, for callers embedding this
    /// database alongside other fd-based I/O (mirrors the teacher's fd
    /// access point for `select`/`poll`-style integration).
    #[cfg(unix)]
    pub fn handle_to_file(&self) -> std::os::unix::io::RawFd {
        use std::os::unix::io::AsRawFd;
        self.root.borrow().file.as_raw_fd()
    }

    // -- map-only operations (§6) --------------------------------------

    pub fn first_key(&self) -> Result<Option<Vec<u8>>> {
        if self.kind != TagKind::Map {
            return Err(Error::WrongKindForOp);
        }
        self.with_lock(LockMode::Shared, || {
            let found = {
                let mut root = self.root.borrow_mut();
                let Root { file, layout, end, .. } = &mut *root;
                trie::first_key(file, layout, *end, self.content_offset)?
            };
            Ok(found.map(|k| self.root.borrow().filters.apply_fetch_key(&k)))
        })
    }

    pub fn next_key(&self, prev: &[u8]) -> Result<Option<Vec<u8>>> {
        if self.kind != TagKind::Map {
            return Err(Error::WrongKindForOp);
        }
        self.with_lock(LockMode::Shared, || {
            let stored_prev = self.root.borrow().filters.apply_store_key(prev);
            let digest = self.root.borrow().digest.digest(&stored_prev);
            let found = {
                let mut root = self.root.borrow_mut();
                let Root { file, layout, end, .. } = &mut *root;
                trie::next_key(file, layout, *end, self.content_offset, &digest)?
            };
            Ok(found.map(|k| self.root.borrow().filters.apply_fetch_key(&k)))
        })
    }

    // -- list-only operations (§6) --------------------------------------

    pub fn length(&self) -> Result<u64> {
        if self.kind != TagKind::List {
            return Err(Error::WrongKindForOp);
        }
        self.with_lock(LockMode::Shared, || {
            let layout = self.root.borrow().layout;
            let mut h = self.clone();
            list::length(&mut h, &layout)
        })
    }

    pub fn get_index(&self, i: i64) -> Result<Option<Value>> {
        if self.kind != TagKind::List {
            return Err(Error::WrongKindForOp);
        }
        self.with_lock(LockMode::Shared, || {
            let layout = self.root.borrow().layout;
            let len = { let mut h = self.clone(); list::length(&mut h, &layout)? };
            match list::resolve_index(i, len) {
                None => Ok(None),
                Some(idx) => self.fetch_raw(&list::pack_index(&layout, idx)),
            }
        })
    }

    pub fn set_index(&self, i: i64, value: NewValue) -> Result<()> {
        if self.kind != TagKind::List {
            return Err(Error::WrongKindForOp);
        }
        self.with_lock(LockMode::Exclusive, || {
            let layout = self.root.borrow().layout;
            let len = { let mut h = self.clone(); list::length(&mut h, &layout)? };
            let idx = list::resolve_index(i, len).ok_or(Error::NonCreatableSubscript)?;
            let key = list::pack_index(&layout, idx);
            let (outcome, offset) = self.store_raw(&key, &value)?;
            self.apply_seed(offset, &value)?;
            if outcome == trie::PutOutcome::Inserted && idx >= len {
                self.bump_length(idx + 1)?;
            }
            Ok(())
        })
    }

    pub fn push(&self, values: Vec<NewValue>) -> Result<u64> {
        if self.kind != TagKind::List {
            return Err(Error::WrongKindForOp);
        }
        self.with_lock(LockMode::Exclusive, || {
            let layout = self.root.borrow().layout;
            let mut len = { let mut h = self.clone(); list::length(&mut h, &layout)? };
            for value in &values {
                let key = list::pack_index(&layout, len);
                let (_, offset) = self.store_raw(&key, value)?;
                self.apply_seed(offset, value)?;
                len += 1;
            }
            self.bump_length(len)?;
            Ok(len)
        })
    }

    pub fn pop(&self) -> Result<Option<Value>> {
        if self.kind != TagKind::List {
            return Err(Error::WrongKindForOp);
        }
        self.with_lock(LockMode::Exclusive, || {
            let layout = self.root.borrow().layout;
            let mut h = self.clone();
            Ok(list::pop(&mut h, &layout)?.map(|raw| self.raw_to_value(raw)))
        })
    }

    pub fn shift(&self) -> Result<Option<Value>> {
        if self.kind != TagKind::List {
            return Err(Error::WrongKindForOp);
        }
        self.with_lock(LockMode::Exclusive, || {
            let layout = self.root.borrow().layout;
            let mut h = self.clone();
            Ok(list::shift(&mut h, &layout)?.map(|raw| self.raw_to_value(raw)))
        })
    }

    /// Prepends `values`. Only scalar and unseeded composite elements are
    /// accepted here -- seeded composites need `push`/`set_index` (whose
    /// offset is known immediately after creation) followed by operating on
    /// the returned child `Handle`.
    pub fn unshift(&self, values: Vec<NewValue>) -> Result<u64> {
        if self.kind != TagKind::List {
            return Err(Error::WrongKindForOp);
        }
        self.with_lock(LockMode::Exclusive, || {
            let layout = self.root.borrow().layout;
            let raw_values = values
                .iter()
                .map(|v| self.new_value_to_plain_raw(v))
                .collect::<Result<Vec<_>>>()?;
            let mut h = self.clone();
            list::unshift(&mut h, &layout, raw_values)
        })
    }

    pub fn splice(&self, offset: i64, removed: u64, new_values: Vec<NewValue>) -> Result<Vec<Value>> {
        if self.kind != TagKind::List {
            return Err(Error::WrongKindForOp);
        }
        self.with_lock(LockMode::Exclusive, || {
            let layout = self.root.borrow().layout;
            let raw_new = new_values
                .iter()
                .map(|v| self.new_value_to_plain_raw(v))
                .collect::<Result<Vec<_>>>()?;
            let mut h = self.clone();
            let taken = list::splice(&mut h, &layout, offset, removed, raw_new)?;
            Ok(taken.into_iter().map(|raw| self.raw_to_value(raw)).collect())
        })
    }

    fn raw_to_value(&self, raw: RawValue) -> Value {
        match raw {
            RawValue::Scalar(bytes) => Value::Scalar(self.root.borrow().filters.apply_fetch_value(&bytes)),
            RawValue::Null => Value::Null,
            RawValue::Composite { content_offset, is_list } => {
                let kind = if is_list { TagKind::List } else { TagKind::Map };
                Value::Child(self.child_handle_at(content_offset, kind))
            }
        }
    }

    fn new_value_to_plain_raw(&self, value: &NewValue) -> Result<RawValue> {
        match value {
            NewValue::Scalar(bytes) => Ok(RawValue::Scalar(self.root.borrow().filters.apply_store_value(bytes))),
            NewValue::Null => Ok(RawValue::Null),
            NewValue::Map => Ok(RawValue::Composite { content_offset: 0, is_list: false }),
            NewValue::List => Ok(RawValue::Composite { content_offset: 0, is_list: true }),
            NewValue::MapSeeded(_) | NewValue::ListSeeded(_) => Err(Error::StoreRejectedUnsupportedType),
        }
    }

    // -- optimize (§4.6) --------------------------------------

    /// Compacts the file: requires this to be the root handle and the only
    /// handle open on it (`Rc::strong_count == 1`). Rebuilds the whole tree
    /// into a sibling `<path>.tmp` via the ordinary public insert path
    /// (`export` + `import`), then atomically renames it over the original.
    pub fn optimize(&self) -> Result<()> {
        if self.content_offset != self.root.borrow().root_content_offset {
            return Err(Error::WrongKindForOp);
        }
        if Rc::strong_count(&self.root) != 1 {
            return Err(Error::OptimizeBusy);
        }
        let path = self.root.borrow().path.clone().ok_or(Error::OptimizeRenameFailed)?;
        self.with_lock(LockMode::Exclusive, || self.optimize_inner(&path))
    }

    fn optimize_inner(&self, path: &std::path::Path) -> Result<()> {
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let (root_kind, offset_width, digest, locking, autoflush, volatile, debug) = {
            let root = self.root.borrow();
            (self.type_of(), root.layout.offset_width, root.digest, root.locking, root.autoflush, root.volatile, root.debug)
        };

        let tmp_file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&tmp_path)?;
        let tmp_handle = Root::create_new(
            tmp_file,
            Some(tmp_path.clone()),
            root_kind,
            offset_width,
            digest,
            false,
            autoflush,
            volatile,
            debug,
            FilterSet::new(),
        )?;

        let exported = self.export()?;
        tmp_handle.import(&exported)?;
        {
            let mut tmp_root = tmp_handle.root.borrow_mut();
            tmp_root.file.sync_data()?;
        }
        drop(tmp_handle);

        std::fs::rename(&tmp_path, path).map_err(|_| Error::OptimizeRenameFailed)?;

        let reopened = std::fs::OpenOptions::new().read(true).write(true).open(path)?;
        let len = reopened.metadata()?.len();
        let mut file = reopened;
        let (new_layout, new_kind, new_content_offset) = Root::detect_existing(&mut file, len)?;

        let mut root = self.root.borrow_mut();
        root.file = file;
        root.layout = new_layout;
        root.end = len;
        root.root_content_offset = new_content_offset;
        debug_assert_eq!(new_kind, match root_kind { RootKind::Map => TagKind::Map, RootKind::List => TagKind::List });
        Ok(())
    }
}

impl ListBacking for Handle {
    fn raw_get(&mut self, key: &[u8]) -> Result<Option<RawValue>> {
        let digest = self.root.borrow().digest.digest(key);
        let found = {
            let mut root = self.root.borrow_mut();
            let Root { file, layout, end, .. } = &mut *root;
            trie::get(file, layout, *end, self.content_offset, &digest)?
        };
        match found {
            None => Ok(None),
            Some(offset) => {
                let rec = self.read_record_at(offset)?;
                Ok(Some(match rec.kind {
                    TagKind::Data => RawValue::Scalar(rec.payload),
                    TagKind::Null => RawValue::Null,
                    TagKind::Map => RawValue::Composite { content_offset: rec.content_offset, is_list: false },
                    TagKind::List => RawValue::Composite { content_offset: rec.content_offset, is_list: true },
                    TagKind::Index | TagKind::Bucket => return Err(Error::IndexingFailed),
                }))
            }
        }
    }

    fn raw_put(&mut self, key: &[u8], value: RawValue) -> Result<bool> {
        let layout = self.root.borrow().layout;
        let (kind, payload): (TagKind, Vec<u8>) = match value {
            RawValue::Scalar(bytes) => (TagKind::Data, bytes),
            RawValue::Null => (TagKind::Null, Vec::new()),
            RawValue::Composite { is_list: false, .. } => (TagKind::Map, empty_composite_payload(&layout)),
            RawValue::Composite { is_list: true, .. } => (TagKind::List, empty_composite_payload(&layout)),
        };
        let digest = self.root.borrow().digest.digest(key);
        let outcome = {
            let mut root = self.root.borrow_mut();
            let Root { file, layout, end, .. } = &mut *root;
            trie::put(file, layout, end, self.content_offset, &digest, kind, &payload, key)?.0
        };
        Ok(outcome == trie::PutOutcome::Inserted)
    }

    fn raw_move(&mut self, from: &[u8], to: &[u8]) -> Result<bool> {
        let from_digest = self.root.borrow().digest.digest(from);
        let to_digest = self.root.borrow().digest.digest(to);
        let offset = {
            let mut root = self.root.borrow_mut();
            let Root { file, layout, end, .. } = &mut *root;
            trie::get(file, layout, *end, self.content_offset, &from_digest)?
        };
        match offset {
            None => Ok(false),
            Some(offset) => {
                let mut root = self.root.borrow_mut();
                let Root { file, layout, end, .. } = &mut *root;
                trie::link(file, layout, end, self.content_offset, &to_digest, offset)?;
                trie::delete(file, layout, end, self.content_offset, &from_digest)?;
                Ok(true)
            }
        }
    }

    fn raw_delete(&mut self, key: &[u8]) -> Result<bool> {
        let digest = self.root.borrow().digest.digest(key);
        let deleted = {
            let mut root = self.root.borrow_mut();
            let Root { file, layout, end, .. } = &mut *root;
            trie::delete(file, layout, end, self.content_offset, &digest)?
        };
        Ok(deleted.is_some())
    }
}
