//! Event handle operations.
//!
//! An event handle is created empty: no backend association, no native
//! handle. The first successful registration creates the native handle
//! with the registering handle's adapter and fixes that binding for the
//! rest of the handle's life. The per-handle mutex makes the
//! check-then-bind sequence atomic — two threads racing to register on a
//! still-unbound handle produce exactly one native handle.

use std::sync::Arc;

use accelgate_core::error::{AccelError, Result};
use accelgate_core::types::EventKind;

use crate::handle::{next_id, EventEntry, EventHandle, EventState, Handle};
use crate::service::AccelService;

impl AccelService {
    fn event_entry(&self, event: &EventHandle) -> Result<Arc<EventEntry>> {
        self.events
            .get(&event.0)
            .map(|e| e.value().clone())
            .ok_or(AccelError::InvalidParam)
    }

    /// Create an unbound event handle. No backend is involved yet.
    pub fn create_event_handle(&self) -> EventHandle {
        let id = next_id();
        self.events.insert(
            id,
            Arc::new(EventEntry {
                state: parking_lot::Mutex::new(EventState::Unbound),
            }),
        );
        EventHandle(id)
    }

    /// Destroy an event handle, tearing down the native handle only if it
    /// was ever bound.
    pub fn destroy_event_handle(&self, event: EventHandle) -> Result<()> {
        let (_, entry) = self
            .events
            .remove(&event.0)
            .ok_or(AccelError::InvalidParam)?;

        let state = entry.state.lock();
        match &*state {
            EventState::Bound { native, adapter } => adapter.destroy_event_handle(native),
            EventState::Unbound => Ok(()),
        }
    }

    /// Register `event` for notifications of `kind` on `handle`. The
    /// first successful call binds the event handle to the handle's
    /// backend; later calls reuse the existing native handle.
    pub fn register_event(
        &self,
        handle: &Handle,
        kind: EventKind,
        event: &EventHandle,
        flags: u32,
    ) -> Result<()> {
        let handle_entry = self.handle_entry(handle)?;
        let event_entry = self.event_entry(event)?;

        let mut state = event_entry.state.lock();

        if matches!(&*state, EventState::Unbound) {
            let native = handle_entry.adapter.create_event_handle()?;
            *state = EventState::Bound {
                native,
                adapter: handle_entry.adapter.clone(),
            };
            tracing::debug!(event = event.0, "event handle bound");
        }

        match &*state {
            EventState::Bound { native, adapter } => {
                adapter.register_event(&handle_entry.native, kind, native, flags)
            }
            EventState::Unbound => Err(AccelError::InvalidParam),
        }
    }

    /// Unregister `event` from `handle`. Requires a bound event handle.
    pub fn unregister_event(
        &self,
        handle: &Handle,
        kind: EventKind,
        event: &EventHandle,
    ) -> Result<()> {
        let handle_entry = self.handle_entry(handle)?;
        let event_entry = self.event_entry(event)?;

        let state = event_entry.state.lock();
        match &*state {
            EventState::Bound { native, adapter } => {
                adapter.unregister_event(&handle_entry.native, kind, native)
            }
            EventState::Unbound => {
                tracing::error!("unregister attempted before any registration");
                Err(AccelError::InvalidParam)
            }
        }
    }

    /// The OS-level descriptor to wait on. Requires a bound event handle.
    pub fn event_descriptor(&self, event: &EventHandle) -> Result<i32> {
        let entry = self.event_entry(event)?;

        let state = entry.state.lock();
        match &*state {
            EventState::Bound { native, adapter } => adapter.event_descriptor(native),
            EventState::Unbound => {
                tracing::error!("wait descriptor queried before any registration");
                Err(AccelError::InvalidParam)
            }
        }
    }
}
