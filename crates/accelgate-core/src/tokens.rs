//! Wrapped-token registry.
//!
//! Every enumerable resource an application can see is a [`Token`]: an
//! owned reference into this registry. The entry behind it holds the
//! backend-native token, the adapter bound to it at allocation (never
//! changed afterwards), a cached identity header, and a reference count.
//! An entry lives exactly as long as its count is non-zero; the last
//! release detaches it and invokes the adapter's destroy-token operation
//! exactly once.
//!
//! One process-wide mutex guards reference counts, membership, and the
//! parent scan. Critical sections are short and make no backend calls —
//! headers are cached at allocation, and destroy-token runs after the
//! entry has been detached and the lock released.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::adapter::{BackendAdapter, NativeToken};
use crate::error::{AccelError, Result};
use crate::types::TokenHeader;

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

/// An owned reference to a registered resource token.
///
/// Not clonable: additional references come from
/// [`TokenRegistry::acquire`], and independent copies of the underlying
/// resource from the clone-token operation. Dropping a `Token` releases
/// its reference; [`TokenRegistry::destroy`] is the explicit variant that
/// reports the backend destroy result.
pub struct Token {
    registry: Weak<RegistryShared>,
    id: u64,
}

impl Token {
    /// Registry-unique id, stable for the lifetime of the entry.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Token").field(&self.id).finish()
    }
}

impl Drop for Token {
    fn drop(&mut self) {
        if let Some(shared) = self.registry.upgrade() {
            if let Err(err) = shared.release(self.id) {
                tracing::warn!(token = self.id, %err, "token release reported an error");
            }
        }
    }
}

struct TokenEntry {
    native: NativeToken,
    adapter: Arc<dyn BackendAdapter>,
    header: TokenHeader,
    refs: u32,
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<u64, TokenEntry>,
    /// Ids in activation order, most recently activated first.
    active: VecDeque<u64>,
}

struct RegistryShared {
    state: Mutex<RegistryState>,
}

impl RegistryShared {
    /// Drop one reference; on the last one, detach the entry and invoke
    /// the backend destroy outside the lock. Destroy failure is reported
    /// but never blocks deallocation.
    fn release(&self, id: u64) -> Result<()> {
        let detached = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let entry = state.entries.get_mut(&id).ok_or(AccelError::InvalidParam)?;
            entry.refs -= 1;
            if entry.refs == 0 {
                tracing::debug!(token = id, "token ref count end");
                state.active.retain(|a| *a != id);
                let entry = state.entries.remove(&id);
                if state.entries.is_empty() {
                    tracing::debug!("token registry clean");
                }
                entry
            } else {
                tracing::trace!(token = id, refs = entry.refs, "token ref count down");
                None
            }
        };

        match detached {
            Some(entry) => entry.adapter.destroy_token(&entry.native),
            None => Ok(()),
        }
    }
}

/// The process-wide registry of live wrapped tokens.
pub struct TokenRegistry {
    shared: Arc<RegistryShared>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(RegistryShared {
                state: Mutex::new(RegistryState::default()),
            }),
        }
    }

    fn owns(&self, token: &Token) -> bool {
        token
            .registry
            .upgrade()
            .map(|shared| Arc::ptr_eq(&shared, &self.shared))
            .unwrap_or(false)
    }

    fn make_token(&self, id: u64) -> Token {
        Token {
            registry: Arc::downgrade(&self.shared),
            id,
        }
    }

    /// Wrap a freshly produced native token with a single owner.
    pub fn allocate(&self, native: NativeToken, adapter: Arc<dyn BackendAdapter>) -> Token {
        let header = adapter.token_header(&native);
        let id = NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed);

        let mut state = self.shared.state.lock();
        state.entries.insert(
            id,
            TokenEntry {
                native,
                adapter,
                header,
                refs: 1,
            },
        );
        state.active.push_front(id);
        tracing::debug!(token = id, "token ref count begin");

        drop(state);
        self.make_token(id)
    }

    /// Take an additional reference on a live token.
    pub fn acquire(&self, token: &Token) -> Result<Token> {
        if !self.owns(token) {
            return Err(AccelError::InvalidParam);
        }
        let mut state = self.shared.state.lock();
        let entry = state
            .entries
            .get_mut(&token.id)
            .ok_or(AccelError::InvalidParam)?;
        entry.refs += 1;
        tracing::trace!(token = token.id, refs = entry.refs, "token ref count up");
        drop(state);
        Ok(self.make_token(token.id))
    }

    /// Explicitly release a reference, reporting the backend destroy
    /// result when this was the last one.
    pub fn destroy(&self, token: Token) -> Result<()> {
        if !self.owns(&token) {
            // Dropping a foreign token releases it against its own
            // registry; this one rejects it.
            return Err(AccelError::InvalidParam);
        }
        let id = token.id;
        std::mem::forget(token);
        self.shared.release(id)
    }

    /// Cached identity header of a live token.
    pub fn header(&self, token: &Token) -> Result<TokenHeader> {
        if !self.owns(token) {
            return Err(AccelError::InvalidParam);
        }
        let state = self.shared.state.lock();
        state
            .entries
            .get(&token.id)
            .map(|e| e.header.clone())
            .ok_or(AccelError::InvalidParam)
    }

    /// The native token and its bound adapter, for forwarding a call.
    pub fn resolve(&self, token: &Token) -> Result<(NativeToken, Arc<dyn BackendAdapter>)> {
        if !self.owns(token) {
            return Err(AccelError::InvalidParam);
        }
        let state = self.shared.state.lock();
        state
            .entries
            .get(&token.id)
            .map(|e| (e.native.clone(), e.adapter.clone()))
            .ok_or(AccelError::InvalidParam)
    }

    /// Scan for the token whose header is the parent of `child`, in
    /// activation order, acquiring a reference for the caller.
    pub fn find_parent(&self, child: &TokenHeader) -> Option<Token> {
        let mut state = self.shared.state.lock();
        let found = state
            .active
            .iter()
            .copied()
            .find(|id| {
                state
                    .entries
                    .get(id)
                    .map(|e| e.header.is_parent_of(child))
                    .unwrap_or(false)
            })?;
        if let Some(entry) = state.entries.get_mut(&found) {
            entry.refs += 1;
            tracing::trace!(token = found, refs = entry.refs, "token ref count up");
        }
        drop(state);
        Some(self.make_token(found))
    }

    /// Number of live tokens; useful for leak accounting.
    pub fn live(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live() == 0
    }
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::new()
    }
}
