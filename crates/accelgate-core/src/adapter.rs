//! Backend adapter interface.
//!
//! One implementation per device class/driver. The dispatch layer forwards
//! every public operation to the adapter bound to the resource; an
//! operation a backend does not implement keeps the default body and
//! reports [`AccelError::NotSupported`], which callers must treat as an
//! ordinary outcome.
//!
//! Backend-native resources cross this boundary type-erased: an adapter
//! creates them and is the only party that downcasts them back. The one
//! obligation every native token carries is a [`TokenHeader`] — the
//! comparable identity the dispatch layer uses for enumeration filters and
//! parent/child relationships.

use std::any::Any;
use std::sync::Arc;

use crate::error::{AccelError, Result};
use crate::props::Properties;
use crate::types::{
    BufferFlags, ErrorInfo, EventKind, MetricInfo, MetricSample, MetricThreshold, OpenFlags,
    ReconfFlags, SharedBuffer, SysObjectFlags, SysObjectKind, TokenHeader,
};

/// A type-erased backend-native resource.
pub type NativeResource = Arc<dyn Any + Send + Sync>;

/// Backend-native token for an enumerable resource.
pub type NativeToken = NativeResource;
/// Backend-native handle for an open session.
pub type NativeHandle = NativeResource;
/// Backend-native event registration point.
pub type NativeEvent = NativeResource;
/// Backend-native attribute object.
pub type NativeObject = NativeResource;

/// Result of one backend's enumeration pass.
pub struct Enumerated {
    /// Total matches found, independent of how many tokens were returned
    pub matches: usize,
    /// Native tokens for the matches that fit the caller's remaining space
    pub tokens: Vec<NativeToken>,
}

/// Capability interface implemented by each backend.
///
/// `name` and `token_header` are required; everything else defaults to
/// not-supported.
#[allow(unused_variables)]
pub trait BackendAdapter: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &str;

    /// The identity header of a native token produced by this backend.
    fn token_header(&self, token: &NativeToken) -> TokenHeader;

    /// Backend startup hook, called once from global initialization.
    fn initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Backend shutdown hook, called once from global finalization.
    fn finalize(&self) -> Result<()> {
        Ok(())
    }

    // --- discovery ---

    /// Find resources matching `filters`, returning at most `max` tokens
    /// while still counting every match.
    fn enumerate(&self, filters: &[&Properties], max: usize) -> Result<Enumerated> {
        Err(AccelError::NotSupported)
    }

    /// Duplicate a native token with an independent lifetime.
    fn clone_token(&self, token: &NativeToken) -> Result<NativeToken> {
        Err(AccelError::NotSupported)
    }

    /// Release backend state behind a token. The wrapper storage is freed
    /// by the caller regardless of the outcome.
    fn destroy_token(&self, token: &NativeToken) -> Result<()> {
        Err(AccelError::NotSupported)
    }

    // --- sessions ---

    fn open(&self, token: &NativeToken, flags: OpenFlags) -> Result<NativeHandle> {
        Err(AccelError::NotSupported)
    }

    fn close(&self, handle: &NativeHandle) -> Result<()> {
        Err(AccelError::NotSupported)
    }

    fn reset(&self, handle: &NativeHandle) -> Result<()> {
        Err(AccelError::NotSupported)
    }

    // --- register access ---

    fn read_mmio32(&self, handle: &NativeHandle, region: u32, offset: u64) -> Result<u32> {
        Err(AccelError::NotSupported)
    }

    fn write_mmio32(&self, handle: &NativeHandle, region: u32, offset: u64, value: u32) -> Result<()> {
        Err(AccelError::NotSupported)
    }

    fn read_mmio64(&self, handle: &NativeHandle, region: u32, offset: u64) -> Result<u64> {
        Err(AccelError::NotSupported)
    }

    fn write_mmio64(&self, handle: &NativeHandle, region: u32, offset: u64, value: u64) -> Result<()> {
        Err(AccelError::NotSupported)
    }

    /// 512-bit store for backends with wide-register support.
    fn write_mmio512(
        &self,
        handle: &NativeHandle,
        region: u32,
        offset: u64,
        value: &[u8; 64],
    ) -> Result<()> {
        Err(AccelError::NotSupported)
    }

    /// Map a register region, returning its base address.
    fn map_mmio(&self, handle: &NativeHandle, region: u32) -> Result<u64> {
        Err(AccelError::NotSupported)
    }

    fn unmap_mmio(&self, handle: &NativeHandle, region: u32) -> Result<()> {
        Err(AccelError::NotSupported)
    }

    // --- shared buffers ---

    /// Prepare a buffer for device access. With `preallocated` set and
    /// `len == 0` and no address this is a support probe and must answer
    /// `Ok` only if pre-allocated buffers are accepted.
    fn prepare_buffer(
        &self,
        handle: &NativeHandle,
        len: u64,
        addr: Option<u64>,
        flags: BufferFlags,
    ) -> Result<SharedBuffer> {
        Err(AccelError::NotSupported)
    }

    fn release_buffer(&self, handle: &NativeHandle, region: u64) -> Result<()> {
        Err(AccelError::NotSupported)
    }

    fn io_address(&self, handle: &NativeHandle, region: u64) -> Result<u64> {
        Err(AccelError::NotSupported)
    }

    /// Bind the handle to a shared virtual address space. `pasid` is the
    /// address-space id to join, or `None` to allocate one; the bound id
    /// is returned.
    fn bind_sva(&self, handle: &NativeHandle, pasid: Option<u32>) -> Result<u32> {
        Err(AccelError::NotSupported)
    }

    // --- properties ---

    fn properties(&self, token: &NativeToken) -> Result<Properties> {
        Err(AccelError::NotSupported)
    }

    fn properties_from_handle(&self, handle: &NativeHandle) -> Result<Properties> {
        Err(AccelError::NotSupported)
    }

    /// Refresh `props` in place from current device state.
    fn update_properties(&self, token: &NativeToken, props: &Properties) -> Result<()> {
        Err(AccelError::NotSupported)
    }

    // --- error registers ---

    fn read_error(&self, token: &NativeToken, index: u32) -> Result<u64> {
        Err(AccelError::NotSupported)
    }

    fn clear_error(&self, token: &NativeToken, index: u32) -> Result<()> {
        Err(AccelError::NotSupported)
    }

    fn clear_all_errors(&self, token: &NativeToken) -> Result<()> {
        Err(AccelError::NotSupported)
    }

    fn error_info(&self, token: &NativeToken, index: u32) -> Result<ErrorInfo> {
        Err(AccelError::NotSupported)
    }

    // --- events ---

    fn create_event_handle(&self) -> Result<NativeEvent> {
        Err(AccelError::NotSupported)
    }

    fn destroy_event_handle(&self, event: &NativeEvent) -> Result<()> {
        Err(AccelError::NotSupported)
    }

    /// The OS-level descriptor an application can wait on.
    fn event_descriptor(&self, event: &NativeEvent) -> Result<i32> {
        Err(AccelError::NotSupported)
    }

    fn register_event(
        &self,
        handle: &NativeHandle,
        kind: EventKind,
        event: &NativeEvent,
        flags: u32,
    ) -> Result<()> {
        Err(AccelError::NotSupported)
    }

    fn unregister_event(
        &self,
        handle: &NativeHandle,
        kind: EventKind,
        event: &NativeEvent,
    ) -> Result<()> {
        Err(AccelError::NotSupported)
    }

    // --- attribute objects ---

    fn token_object(
        &self,
        token: &NativeToken,
        name: &str,
        flags: SysObjectFlags,
    ) -> Result<NativeObject> {
        Err(AccelError::NotSupported)
    }

    fn handle_object(
        &self,
        handle: &NativeHandle,
        name: &str,
        flags: SysObjectFlags,
    ) -> Result<NativeObject> {
        Err(AccelError::NotSupported)
    }

    fn object_object(
        &self,
        parent: &NativeObject,
        name: &str,
        flags: SysObjectFlags,
    ) -> Result<NativeObject> {
        Err(AccelError::NotSupported)
    }

    fn object_at(&self, parent: &NativeObject, index: usize) -> Result<NativeObject> {
        Err(AccelError::NotSupported)
    }

    fn destroy_object(&self, object: &NativeObject) -> Result<()> {
        Err(AccelError::NotSupported)
    }

    fn object_read(&self, object: &NativeObject, offset: usize, len: usize) -> Result<Vec<u8>> {
        Err(AccelError::NotSupported)
    }

    fn object_read64(&self, object: &NativeObject) -> Result<u64> {
        Err(AccelError::NotSupported)
    }

    fn object_write64(&self, object: &NativeObject, value: u64) -> Result<()> {
        Err(AccelError::NotSupported)
    }

    fn object_size(&self, object: &NativeObject) -> Result<u64> {
        Err(AccelError::NotSupported)
    }

    fn object_type(&self, object: &NativeObject) -> Result<SysObjectKind> {
        Err(AccelError::NotSupported)
    }

    // --- metrics ---

    fn num_metrics(&self, handle: &NativeHandle) -> Result<u64> {
        Err(AccelError::NotSupported)
    }

    fn metrics_info(&self, handle: &NativeHandle) -> Result<Vec<MetricInfo>> {
        Err(AccelError::NotSupported)
    }

    fn metrics_by_index(&self, handle: &NativeHandle, indexes: &[u64]) -> Result<Vec<MetricSample>> {
        Err(AccelError::NotSupported)
    }

    fn metrics_by_name(&self, handle: &NativeHandle, names: &[String]) -> Result<Vec<MetricSample>> {
        Err(AccelError::NotSupported)
    }

    fn metrics_thresholds(&self, handle: &NativeHandle) -> Result<Vec<MetricThreshold>> {
        Err(AccelError::NotSupported)
    }

    // --- clocks, reconfiguration, interfaces ---

    /// Current user clock frequencies, `(high, low)` in Hz.
    fn user_clock(&self, handle: &NativeHandle) -> Result<(u64, u64)> {
        Err(AccelError::NotSupported)
    }

    fn set_user_clock(&self, handle: &NativeHandle, high: u64, low: u64) -> Result<()> {
        Err(AccelError::NotSupported)
    }

    fn reconfigure_slot(
        &self,
        handle: &NativeHandle,
        slot: u32,
        bitstream: &[u8],
        flags: ReconfFlags,
    ) -> Result<()> {
        Err(AccelError::NotSupported)
    }

    fn assign_port_to_interface(
        &self,
        handle: &NativeHandle,
        interface: u32,
        slot: u32,
    ) -> Result<()> {
        Err(AccelError::NotSupported)
    }

    fn assign_to_interface(
        &self,
        handle: &NativeHandle,
        accelerator: &NativeToken,
        host_interface: u32,
    ) -> Result<()> {
        Err(AccelError::NotSupported)
    }

    fn release_from_interface(&self, handle: &NativeHandle, accelerator: &NativeToken) -> Result<()> {
        Err(AccelError::NotSupported)
    }
}
