//! The dispatch service.
//!
//! `AccelService` is the single entry point applications use. Every
//! operation follows the same contract: validate the opaque inputs,
//! forward to the adapter bound to the resource, and wrap any native
//! resource the backend produced before returning it. Backends that lack
//! an operation report `NotSupported` through the trait default — an
//! ordinary outcome, not an error path worth logging.

use std::sync::Arc;

use dashmap::DashMap;

use accelgate_core::adapter::BackendAdapter;
use accelgate_core::error::{AccelError, Result};
use accelgate_core::props::{ParentRef, Properties};
use accelgate_core::registry::PluginRegistry;
use accelgate_core::tokens::{Token, TokenRegistry};
use accelgate_core::types::{
    BufferFlags, ErrorInfo, MetricInfo, MetricSample, MetricThreshold, ObjectClass, OpenFlags,
    ReconfFlags, SharedBuffer, TokenHeader,
};

use crate::composite;
use crate::handle::{next_id, EventEntry, Handle, HandleEntry, ObjectEntry};

pub struct AccelService {
    pub(crate) plugins: Arc<PluginRegistry>,
    pub(crate) tokens: TokenRegistry,
    pub(crate) handles: DashMap<u64, Arc<HandleEntry>>,
    pub(crate) events: DashMap<u64, Arc<EventEntry>>,
    pub(crate) objects: DashMap<u64, Arc<ObjectEntry>>,
}

impl AccelService {
    /// Create a service over an existing plugin registry.
    pub fn new(plugins: Arc<PluginRegistry>) -> Self {
        Self {
            plugins,
            tokens: TokenRegistry::new(),
            handles: DashMap::new(),
            events: DashMap::new(),
            objects: DashMap::new(),
        }
    }

    /// Convenience constructor: register the given backends and build the
    /// service around them.
    pub fn with_backends<I>(backends: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn BackendAdapter>>,
    {
        let plugins = Arc::new(PluginRegistry::new());
        for backend in backends {
            plugins.register(backend);
        }
        Self::new(plugins)
    }

    pub fn plugins(&self) -> &Arc<PluginRegistry> {
        &self.plugins
    }

    /// Run every backend's startup hook.
    pub fn initialize(&self) -> Result<()> {
        self.plugins.initialize()
    }

    /// Run every backend's shutdown hook.
    pub fn finalize(&self) -> Result<()> {
        self.plugins.finalize()
    }

    pub(crate) fn handle_entry(&self, handle: &Handle) -> Result<Arc<HandleEntry>> {
        self.handles
            .get(&handle.0)
            .map(|e| e.value().clone())
            .ok_or(AccelError::InvalidParam)
    }

    // --- tokens ---

    /// Identity header of a live token.
    pub fn token_header(&self, token: &Token) -> Result<TokenHeader> {
        self.tokens.header(token)
    }

    /// Duplicate a token with an independent lifetime.
    pub fn clone_token(&self, src: &Token) -> Result<Token> {
        let (native, adapter) = self.tokens.resolve(src)?;
        let cloned = adapter.clone_token(&native)?;
        Ok(self.tokens.allocate(cloned, adapter))
    }

    /// Release a token reference, reporting the backend destroy result
    /// when it was the last one.
    pub fn destroy_token(&self, token: Token) -> Result<()> {
        self.tokens.destroy(token)
    }

    // --- sessions ---

    /// Open a session on a token. An accelerator token additionally opens
    /// every associated child port; if any child fails, everything opened
    /// so far is closed and the whole operation fails.
    pub fn open(&self, token: &Token, flags: OpenFlags) -> Result<Handle> {
        let (native, adapter) = self.tokens.resolve(token)?;
        let header = self.tokens.header(token)?;

        let opened = adapter.open(&native, flags)?;

        let token_ref = match self.tokens.acquire(token) {
            Ok(t) => t,
            Err(err) => {
                let _ = adapter.close(&opened);
                return Err(err);
            }
        };

        let id = next_id();
        let entry = Arc::new(HandleEntry {
            native: opened,
            adapter,
            token: token_ref,
            header: header.clone(),
            parent: None,
            children: parking_lot::Mutex::new(Vec::new()),
            pins: parking_lot::Mutex::new(std::collections::HashMap::new()),
        });
        self.handles.insert(id, entry.clone());

        if header.object_class == ObjectClass::Accelerator {
            if let Err(err) = composite::open_children(self, id, &entry) {
                composite::close_children(self, &entry);
                if let Err(close_err) = entry.adapter.close(&entry.native) {
                    tracing::warn!(%close_err, "closing parent after child-open failure failed");
                }
                self.handles.remove(&id);
                return Err(err);
            }
        }

        Ok(Handle(id))
    }

    /// Close a handle. Children are closed and destroyed first; their
    /// close errors are logged but do not mask the parent result.
    pub fn close(&self, handle: Handle) -> Result<()> {
        let (_, entry) = self
            .handles
            .remove(&handle.0)
            .ok_or(AccelError::InvalidParam)?;

        if let Some(parent_id) = entry.parent {
            if let Some(parent) = self.handles.get(&parent_id) {
                parent.children.lock().retain(|c| *c != handle.0);
            }
        }

        composite::close_children(self, &entry);
        entry.adapter.close(&entry.native)
    }

    pub fn reset(&self, handle: &Handle) -> Result<()> {
        let entry = self.handle_entry(handle)?;
        entry.adapter.reset(&entry.native)
    }

    /// Report a handle's open children. A child handle has none. The true
    /// count is always returned; at most `max` ids are appended to `out`.
    pub fn children(&self, handle: &Handle, max: u32, out: Option<&mut Vec<Handle>>) -> Result<u32> {
        let entry = self.handle_entry(handle)?;

        if max > 0 && out.is_none() {
            tracing::error!("children requested with max > 0 and no output buffer");
            return Err(AccelError::InvalidParam);
        }

        if entry.parent.is_some() {
            return Ok(0);
        }

        let kids = entry.children.lock();
        if let Some(out) = out {
            for id in kids.iter().take(max as usize) {
                out.push(Handle(*id));
            }
        }
        Ok(kids.len() as u32)
    }

    // --- register access ---

    pub fn read_mmio32(&self, handle: &Handle, region: u32, offset: u64) -> Result<u32> {
        let entry = self.handle_entry(handle)?;
        entry.adapter.read_mmio32(&entry.native, region, offset)
    }

    pub fn write_mmio32(&self, handle: &Handle, region: u32, offset: u64, value: u32) -> Result<()> {
        let entry = self.handle_entry(handle)?;
        entry.adapter.write_mmio32(&entry.native, region, offset, value)
    }

    pub fn read_mmio64(&self, handle: &Handle, region: u32, offset: u64) -> Result<u64> {
        let entry = self.handle_entry(handle)?;
        entry.adapter.read_mmio64(&entry.native, region, offset)
    }

    pub fn write_mmio64(&self, handle: &Handle, region: u32, offset: u64, value: u64) -> Result<()> {
        let entry = self.handle_entry(handle)?;
        entry.adapter.write_mmio64(&entry.native, region, offset, value)
    }

    pub fn write_mmio512(
        &self,
        handle: &Handle,
        region: u32,
        offset: u64,
        value: &[u8; 64],
    ) -> Result<()> {
        let entry = self.handle_entry(handle)?;
        entry.adapter.write_mmio512(&entry.native, region, offset, value)
    }

    pub fn map_mmio(&self, handle: &Handle, region: u32) -> Result<u64> {
        let entry = self.handle_entry(handle)?;
        entry.adapter.map_mmio(&entry.native, region)
    }

    pub fn unmap_mmio(&self, handle: &Handle, region: u32) -> Result<()> {
        let entry = self.handle_entry(handle)?;
        entry.adapter.unmap_mmio(&entry.native, region)
    }

    // --- shared buffers ---

    /// Prepare a shared buffer on a top-level handle and pin it into every
    /// child port. A preallocated request with zero length and no address
    /// probes backend support and skips pinning.
    pub fn prepare_buffer(
        &self,
        handle: &Handle,
        len: u64,
        addr: Option<u64>,
        flags: BufferFlags,
    ) -> Result<SharedBuffer> {
        let entry = self.handle_entry(handle)?;

        let probe = flags.preallocated && len == 0 && addr.is_none();
        if flags.preallocated && !probe && addr.is_none() {
            return Err(AccelError::InvalidParam);
        }

        if entry.parent.is_some() {
            tracing::error!("prepare_buffer must be called on the parent handle");
            return Err(AccelError::NotSupported);
        }

        let buf = entry.adapter.prepare_buffer(&entry.native, len, addr, flags)?;
        if probe {
            return Ok(buf);
        }

        if let Err(err) = composite::pin_children(self, &entry, buf, len) {
            // Undo the parent preparation after a child failure.
            if let Err(release_err) = entry.adapter.release_buffer(&entry.native, buf.region) {
                tracing::warn!(%release_err, "buffer release after pin failure failed");
            }
            return Err(err);
        }

        Ok(buf)
    }

    /// Release a shared buffer, unpinning it from the children first. The
    /// first unpin failure wins over the parent release result.
    pub fn release_buffer(&self, handle: &Handle, region: u64) -> Result<()> {
        let entry = self.handle_entry(handle)?;
        let unpinned = composite::unpin_children(self, &entry, region);
        let released = entry.adapter.release_buffer(&entry.native, region);
        unpinned.and(released)
    }

    pub fn io_address(&self, handle: &Handle, region: u64) -> Result<u64> {
        let entry = self.handle_entry(handle)?;
        entry.adapter.io_address(&entry.native, region)
    }

    /// Bind the handle (and its children, in list order) to a shared
    /// virtual address space. Propagation stops at the first child that
    /// fails or lacks support; bindings made so far are not rolled back.
    pub fn bind_sva(&self, handle: &Handle, pasid: Option<u32>) -> Result<u32> {
        let entry = self.handle_entry(handle)?;
        let bound = entry.adapter.bind_sva(&entry.native, pasid)?;
        composite::bind_children(self, &entry, bound)?;
        Ok(bound)
    }

    // --- properties ---

    /// Properties of a token, or an empty container when no token is
    /// given. The result carries a wrapped reference to the owning parent
    /// token when one is live in the registry.
    pub fn properties(&self, token: Option<&Token>) -> Result<Properties> {
        let Some(token) = token else {
            return Ok(Properties::new());
        };

        let (native, adapter) = self.tokens.resolve(token)?;
        let props = adapter.properties(&native)?;

        let header = self.tokens.header(token)?;
        self.stamp_parent(&props, &header);
        Ok(props)
    }

    /// Properties of an open handle, with the same parent stamping.
    pub fn properties_from_handle(&self, handle: &Handle) -> Result<Properties> {
        let entry = self.handle_entry(handle)?;
        let props = entry.adapter.properties_from_handle(&entry.native)?;
        self.stamp_parent(&props, &entry.header);
        Ok(props)
    }

    fn stamp_parent(&self, props: &Properties, child: &TokenHeader) {
        if let Some(parent) = self.tokens.find_parent(child) {
            props.lock().set_parent_token(parent);
        }
    }

    /// Refresh `props` from current device state. Any caller-supplied
    /// wrapped parent is detached for the backend call (backends never see
    /// wrapped ids) and restored on failure; on success the field is
    /// re-stamped from the registry.
    pub fn update_properties(&self, token: &Token, props: &Properties) -> Result<()> {
        let (native, adapter) = self.tokens.resolve(token)?;

        let saved = props.lock().take_parent();

        if let Err(err) = adapter.update_properties(&native, props) {
            if let Some(parent) = saved {
                let mut data = props.lock();
                match parent {
                    ParentRef::Wrapped(t) => data.set_parent_token(t),
                    ParentRef::Header(h) => data.set_parent_header(h),
                }
            }
            return Err(err);
        }

        drop(saved);

        let header = self.tokens.header(token)?;
        self.stamp_parent(props, &header);
        Ok(())
    }

    // --- error registers ---

    pub fn read_error(&self, token: &Token, index: u32) -> Result<u64> {
        let (native, adapter) = self.tokens.resolve(token)?;
        adapter.read_error(&native, index)
    }

    pub fn clear_error(&self, token: &Token, index: u32) -> Result<()> {
        let (native, adapter) = self.tokens.resolve(token)?;
        adapter.clear_error(&native, index)
    }

    pub fn clear_all_errors(&self, token: &Token) -> Result<()> {
        let (native, adapter) = self.tokens.resolve(token)?;
        adapter.clear_all_errors(&native)
    }

    pub fn error_info(&self, token: &Token, index: u32) -> Result<ErrorInfo> {
        let (native, adapter) = self.tokens.resolve(token)?;
        adapter.error_info(&native, index)
    }

    // --- metrics ---

    pub fn num_metrics(&self, handle: &Handle) -> Result<u64> {
        let entry = self.handle_entry(handle)?;
        entry.adapter.num_metrics(&entry.native)
    }

    pub fn metrics_info(&self, handle: &Handle) -> Result<Vec<MetricInfo>> {
        let entry = self.handle_entry(handle)?;
        entry.adapter.metrics_info(&entry.native)
    }

    pub fn metrics_by_index(&self, handle: &Handle, indexes: &[u64]) -> Result<Vec<MetricSample>> {
        let entry = self.handle_entry(handle)?;
        entry.adapter.metrics_by_index(&entry.native, indexes)
    }

    pub fn metrics_by_name(&self, handle: &Handle, names: &[String]) -> Result<Vec<MetricSample>> {
        let entry = self.handle_entry(handle)?;
        entry.adapter.metrics_by_name(&entry.native, names)
    }

    pub fn metrics_thresholds(&self, handle: &Handle) -> Result<Vec<MetricThreshold>> {
        let entry = self.handle_entry(handle)?;
        entry.adapter.metrics_thresholds(&entry.native)
    }

    // --- clocks, reconfiguration, interfaces ---

    pub fn user_clock(&self, handle: &Handle) -> Result<(u64, u64)> {
        let entry = self.handle_entry(handle)?;
        entry.adapter.user_clock(&entry.native)
    }

    pub fn set_user_clock(&self, handle: &Handle, high: u64, low: u64) -> Result<()> {
        let entry = self.handle_entry(handle)?;
        entry.adapter.set_user_clock(&entry.native, high, low)
    }

    pub fn reconfigure_slot(
        &self,
        handle: &Handle,
        slot: u32,
        bitstream: &[u8],
        flags: ReconfFlags,
    ) -> Result<()> {
        let entry = self.handle_entry(handle)?;
        if bitstream.is_empty() {
            return Err(AccelError::InvalidParam);
        }
        entry
            .adapter
            .reconfigure_slot(&entry.native, slot, bitstream, flags)
    }

    pub fn assign_port_to_interface(
        &self,
        handle: &Handle,
        interface: u32,
        slot: u32,
    ) -> Result<()> {
        let entry = self.handle_entry(handle)?;
        entry
            .adapter
            .assign_port_to_interface(&entry.native, interface, slot)
    }

    pub fn assign_to_interface(
        &self,
        handle: &Handle,
        accelerator: &Token,
        host_interface: u32,
    ) -> Result<()> {
        let entry = self.handle_entry(handle)?;
        let (native_token, _) = self.tokens.resolve(accelerator)?;
        entry
            .adapter
            .assign_to_interface(&entry.native, &native_token, host_interface)
    }

    pub fn release_from_interface(&self, handle: &Handle, accelerator: &Token) -> Result<()> {
        let entry = self.handle_entry(handle)?;
        let (native_token, _) = self.tokens.resolve(accelerator)?;
        entry
            .adapter
            .release_from_interface(&entry.native, &native_token)
    }

    // --- accounting ---

    /// Number of live wrapped tokens; useful for leak checks.
    pub fn live_tokens(&self) -> usize {
        self.tokens.live()
    }

    /// Number of open handles, children included.
    pub fn live_handles(&self) -> usize {
        self.handles.len()
    }
}
