//! Composite (multi-port) accelerator support.
//!
//! A primary-interface accelerator may span additional port interfaces of
//! the same device. Opening it opens every such port as a child handle;
//! shared buffers prepared on the parent are pinned into each child so
//! all ports can reach them; closing the parent closes the children
//! first. Port discovery goes through the ordinary enumeration engine
//! with a device-parent filter, so backends answer the "which ports
//! belong to this parent" question with their existing enumerate
//! capability.

use std::sync::Arc;

use accelgate_core::error::{AccelError, Result};
use accelgate_core::props::Properties;
use accelgate_core::types::{BufferFlags, ObjectClass, OpenFlags, SharedBuffer, TokenHeader};

use crate::handle::{next_id, HandleEntry};
use crate::service::AccelService;

/// Discover and open the child ports of a freshly opened accelerator
/// handle, linking each as a child. Any failure leaves the children list
/// populated with whatever opened so far; the caller unwinds via
/// [`close_children`].
pub(crate) fn open_children(
    service: &AccelService,
    parent_id: u64,
    parent: &Arc<HandleEntry>,
) -> Result<()> {
    // Secondary interfaces never expand on their own.
    if parent.header.interface != 0 {
        return Ok(());
    }

    let device_header = TokenHeader {
        object_class: ObjectClass::Device,
        interface: 0,
        ..parent.header.clone()
    };
    let filters = [Properties::new()
        .with_class(ObjectClass::Accelerator)
        .with_parent_header(device_header)];

    let total = service.enumerate(&filters, 0, None)?;
    if total == 0 {
        return Ok(());
    }

    let mut ports = Vec::with_capacity(total as usize);
    service.enumerate(&filters, total, Some(&mut ports))?;

    for token in ports {
        let header = service.tokens.header(&token)?;
        if header.object_id == parent.header.object_id {
            // The port being opened; surplus reference released on drop.
            continue;
        }

        let (native, adapter) = service.tokens.resolve(&token)?;
        let child_native = adapter.open(&native, OpenFlags::default())?;

        let child_id = next_id();
        let child = Arc::new(HandleEntry {
            native: child_native,
            adapter,
            token,
            header,
            parent: Some(parent_id),
            children: parking_lot::Mutex::new(Vec::new()),
            pins: parking_lot::Mutex::new(std::collections::HashMap::new()),
        });
        service.handles.insert(child_id, child);
        parent.children.lock().push(child_id);
        tracing::debug!(parent = parent_id, child = child_id, "child port opened");
    }

    Ok(())
}

/// Close and destroy every child of `parent`, ignoring per-child close
/// errors beyond a log line.
pub(crate) fn close_children(service: &AccelService, parent: &HandleEntry) {
    let children: Vec<u64> = parent.children.lock().drain(..).collect();
    for child_id in children {
        if let Some((_, child)) = service.handles.remove(&child_id) {
            if let Err(err) = child.adapter.close(&child.native) {
                tracing::warn!(child = child_id, %err, "child close failed");
            }
        }
    }
}

/// Pin a buffer prepared on the parent into every child port. Children
/// without pre-allocated buffer support are skipped; any other failure
/// unpins whatever was pinned and reports the error, leaving the caller
/// to release the parent buffer.
pub(crate) fn pin_children(
    service: &AccelService,
    parent: &HandleEntry,
    buf: SharedBuffer,
    len: u64,
) -> Result<()> {
    let children: Vec<u64> = parent.children.lock().clone();
    let mut pinned: Vec<(u64, u64)> = Vec::new();

    for child_id in &children {
        let Some(child) = service.handles.get(child_id).map(|e| e.value().clone()) else {
            continue;
        };
        match child.adapter.prepare_buffer(
            &child.native,
            len,
            Some(buf.addr),
            BufferFlags { preallocated: true },
        ) {
            Ok(child_buf) => pinned.push((*child_id, child_buf.region)),
            Err(AccelError::NotSupported) => continue,
            Err(err) => {
                for (pinned_id, pinned_region) in pinned.drain(..) {
                    if let Some(p) = service.handles.get(&pinned_id).map(|e| e.value().clone()) {
                        if let Err(unpin_err) = p.adapter.release_buffer(&p.native, pinned_region) {
                            tracing::warn!(child = pinned_id, %unpin_err, "unpin after failure failed");
                        }
                    }
                }
                return Err(err);
            }
        }
    }

    if !pinned.is_empty() {
        parent.pins.lock().insert(buf.region, pinned);
    }
    Ok(())
}

/// Unpin a buffer from every child it was pinned into. The first failure
/// is reported after all children have been attempted.
pub(crate) fn unpin_children(service: &AccelService, parent: &HandleEntry, region: u64) -> Result<()> {
    let pinned = parent.pins.lock().remove(&region).unwrap_or_default();
    let mut first_err = Ok(());

    for (child_id, child_region) in pinned {
        let Some(child) = service.handles.get(&child_id).map(|e| e.value().clone()) else {
            continue;
        };
        if let Err(err) = child.adapter.release_buffer(&child.native, child_region) {
            tracing::warn!(child = child_id, %err, "child buffer release failed");
            if first_err.is_ok() {
                first_err = Err(err);
            }
        }
    }

    first_err
}

/// Propagate an address-space binding to every child in list order,
/// stopping at the first child that fails or lacks support.
pub(crate) fn bind_children(service: &AccelService, parent: &HandleEntry, pasid: u32) -> Result<()> {
    let children: Vec<u64> = parent.children.lock().clone();
    for child_id in children {
        let Some(child) = service.handles.get(&child_id).map(|e| e.value().clone()) else {
            continue;
        };
        child.adapter.bind_sva(&child.native, Some(pasid))?;
    }
    Ok(())
}
