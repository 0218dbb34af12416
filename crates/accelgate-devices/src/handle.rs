//! Resource table entries behind the opaque public ids.
//!
//! Handles, event handles, and attribute objects hand applications a
//! table id; the entry behind it carries the backend-native resource and
//! the adapter bound to it. A stale or foreign id simply misses the table
//! and surfaces as `InvalidParam` at the dispatch boundary.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use accelgate_core::adapter::{BackendAdapter, NativeEvent, NativeHandle, NativeObject};
use accelgate_core::tokens::Token;
use accelgate_core::types::TokenHeader;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique id for a table entry.
pub(crate) fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// An open session on a token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle(pub(crate) u64);

impl Handle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// A registration point for asynchronous device events, lazily bound to a
/// backend on first registration.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct EventHandle(pub(crate) u64);

impl EventHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// A hierarchical attribute object. Single-owner; destroyed explicitly.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct SysObject(pub(crate) u64);

impl SysObject {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Table entry for an open handle.
///
/// Holds one owned token reference for the session's lifetime. `children`
/// is the ordered set of child-port handles of a composite accelerator;
/// a child has `parent` set and no children of its own. `pins` maps a
/// parent buffer region to the child regions pinned alongside it.
pub(crate) struct HandleEntry {
    pub native: NativeHandle,
    pub adapter: Arc<dyn BackendAdapter>,
    #[allow(dead_code)] // held for the release-on-drop side effect
    pub token: Token,
    pub header: TokenHeader,
    pub parent: Option<u64>,
    pub children: Mutex<Vec<u64>>,
    pub pins: Mutex<HashMap<u64, Vec<(u64, u64)>>>,
}

/// Bind state of an event handle.
pub(crate) enum EventState {
    Unbound,
    Bound {
        native: NativeEvent,
        adapter: Arc<dyn BackendAdapter>,
    },
}

/// Table entry for an event handle. The per-entry mutex serializes the
/// check-then-bind sequence and every subsequent operation.
pub(crate) struct EventEntry {
    pub state: Mutex<EventState>,
}

/// Table entry for an attribute object.
pub(crate) struct ObjectEntry {
    pub native: NativeObject,
    pub adapter: Arc<dyn BackendAdapter>,
}
