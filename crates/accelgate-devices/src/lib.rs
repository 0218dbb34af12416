//! Accelerator dispatch layer.
//!
//! This crate provides [`AccelService`], the handle-based access API over
//! the backends registered in an `accelgate_core::PluginRegistry`:
//!
//! - **AccelService**: validates opaque handles and forwards every
//!   operation to the backend bound to the resource
//! - **Enumeration**: fans out across all backends, merging matches into
//!   reference-counted tokens
//! - **Composite accelerators**: a primary-interface accelerator opens
//!   its sibling ports as child handles, with all-or-nothing semantics
//! - **Event handles**: created unbound, bound to a backend on first
//!   registration
//! - **Attribute objects**: hierarchical introspection of device state
//!
//! Backend plugins implement `accelgate_core::BackendAdapter`; anything a
//! backend does not implement surfaces as `NotSupported`.

mod composite;
mod enumerate;
mod events;
mod handle;
mod objects;
mod service;

pub use handle::{EventHandle, Handle, SysObject};
pub use service::AccelService;

// Re-export the core surface so applications need one dependency.
pub use accelgate_core::{
    AccelError, AcceleratorState, BackendAdapter, BufferFlags, Enumerated, ErrorInfo, EventKind,
    MetricDataType, MetricInfo, MetricSample, MetricThreshold, MetricValue, NativeEvent,
    NativeHandle, NativeObject, NativeToken, ObjectClass, OpenFlags, ParentRef, PciAddress,
    PluginRegistry, Properties, PropertyData, PropertyField, ReconfFlags, Result, SharedBuffer,
    SysObjectFlags, SysObjectKind, Token, TokenHeader, TokenRegistry,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build information
pub const BUILD_PROFILE: &str = accelgate_core::BUILD_PROFILE;

/// Parsed library version.
pub fn version() -> &'static semver::Version {
    accelgate_core::version()
}
