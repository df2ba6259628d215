//! Frontier tracker: the two most recent self-authored vertex hashes.
//!
//! The pair supplies default parents for the node's next vertex. Before
//! anything has been authored both entries are zero, the genesis condition.

use parking_lot::RwLock;

use crate::crypto::Hash32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct FrontierState {
    last: Hash32,
    one_before_last: Hash32,
}

/// Reader/writer-locked frontier pair. A reader never observes a
/// half-updated pair.
#[derive(Debug, Default)]
pub struct Frontier {
    state: RwLock<FrontierState>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a previously persisted pair.
    pub fn restore(last: Hash32, one_before_last: Hash32) -> Self {
        Self {
            state: RwLock::new(FrontierState {
                last,
                one_before_last,
            }),
        }
    }

    /// Shifts `last` into `one_before_last` and records `hash` as `last`.
    /// Returns the new pair.
    pub fn remember(&self, hash: Hash32) -> (Hash32, Hash32) {
        let mut state = self.state.write();
        state.one_before_last = state.last;
        state.last = hash;
        (state.last, state.one_before_last)
    }

    /// `(last, one_before_last)`.
    pub fn recall(&self) -> (Hash32, Hash32) {
        let state = self.state.read();
        (state.last, state.one_before_last)
    }
}
