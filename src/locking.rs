//
// locking.rs -- reentrant advisory file locking
//
// Copyright (c) 2019-2024 Jeff Garzik
//
// This file is part of the dpdb-native software project covered under
// the MIT License.  For the full license text, please see the LICENSE
// file in the root directory of this project.
// SPDX-License-Identifier: MIT

use std::fs::File;

use fs4::FileExt;
use log::trace;

use crate::error::Result;

/// The two advisory lock modes a `Root` can hold (§4.6/§5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Reentrant advisory lock state for one open file. `lock()` only issues
/// the OS-level call on the 0→1 transition; `unlock()` only releases on the
/// 1→0 transition, matching the depth-counted discipline in §5.
#[derive(Debug, Default)]
pub struct LockState {
    depth: u32,
    mode: Option<LockMode>,
}

impl LockState {
    pub fn new() -> Self {
        LockState { depth: 0, mode: None }
    }

    pub fn is_held(&self) -> bool {
        self.depth > 0
    }

    pub fn mode(&self) -> Option<LockMode> {
        self.mode
    }

    /// Acquires `mode` on `file`, or increments the depth counter if this
    /// lock is already held in a compatible mode. Upgrading from shared to
    /// exclusive while reentered is not supported and returns the OS error
    /// that `fs4` would raise trying to take an exclusive lock while a
    /// shared one is outstanding elsewhere.
    pub fn lock(&mut self, file: &File, mode: LockMode) -> Result<()> {
        if self.depth == 0 {
            match mode {
                LockMode::Shared => file.lock_shared()?,
                LockMode::Exclusive => file.lock_exclusive()?,
            }
            trace!("locking: acquired {mode:?} lock");
            self.mode = Some(mode);
        }
        self.depth += 1;
        Ok(())
    }

    /// Decrements the depth counter, releasing the OS lock on the 1→0
    /// transition. A no-op if the lock is not currently held.
    pub fn unlock(&mut self, file: &File) -> Result<()> {
        if self.depth == 0 {
            return Ok(());
        }
        self.depth -= 1;
        if self.depth == 0 {
            FileExt::unlock(file)?;
            trace!("locking: released lock");
            self.mode = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reentrant_lock_depth() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"x").unwrap();
        let mut state = LockState::new();

        state.lock(&file, LockMode::Exclusive).unwrap();
        state.lock(&file, LockMode::Exclusive).unwrap();
        assert!(state.is_held());

        state.unlock(&file).unwrap();
        assert!(state.is_held());

        state.unlock(&file).unwrap();
        assert!(!state.is_held());
    }

    #[test]
    fn unlock_without_lock_is_noop() {
        let file = tempfile::tempfile().unwrap();
        let mut state = LockState::new();
        state.unlock(&file).unwrap();
        assert!(!state.is_held());
    }
}
