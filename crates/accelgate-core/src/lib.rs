//! Core types for the accelgate access layer.
//!
//! This crate defines everything shared between the dispatch layer and
//! backend plugins:
//!
//! - **AccelError**: the closed status taxonomy every operation returns
//! - **BackendAdapter**: the capability interface one backend implements
//!   per device class, with not-supported defaults for absent operations
//! - **PluginRegistry**: registration-ordered backend set with global
//!   initialize/finalize and the for-each iteration primitive
//! - **TokenRegistry / Token**: the reference-counted registry of live
//!   wrapped resource tokens
//! - **Properties**: the lockable, validity-masked property container
//!   used for queries and enumeration filters
//!
//! The dispatch layer itself lives in `accelgate-devices`.

pub mod adapter;
pub mod error;
pub mod props;
pub mod registry;
pub mod tokens;
pub mod types;

pub use adapter::{
    BackendAdapter, Enumerated, NativeEvent, NativeHandle, NativeObject, NativeResource,
    NativeToken,
};
pub use error::{AccelError, Result};
pub use props::{ParentRef, Properties, PropertyData, PropertyField};
pub use registry::PluginRegistry;
pub use tokens::{Token, TokenRegistry};
pub use types::{
    AcceleratorState, BufferFlags, ErrorInfo, EventKind, MetricDataType, MetricInfo, MetricSample,
    MetricThreshold, MetricValue, ObjectClass, OpenFlags, PciAddress, ReconfFlags, SharedBuffer,
    SysObjectFlags, SysObjectKind, TokenHeader,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build information
pub const BUILD_PROFILE: &str = if cfg!(debug_assertions) {
    "debug"
} else {
    "release"
};

/// Parsed library version.
pub fn version() -> &'static semver::Version {
    static PARSED: once_cell::sync::Lazy<semver::Version> = once_cell::sync::Lazy::new(|| {
        semver::Version::parse(VERSION).unwrap_or_else(|_| semver::Version::new(0, 0, 0))
    });
    &PARSED
}
