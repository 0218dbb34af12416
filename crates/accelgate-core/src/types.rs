//! Shared value types for the accelerator access layer.
//!
//! These are the plain-data types that cross the boundary between the
//! dispatch layer and backend plugins: resource identities (headers,
//! locations), operation flags, and the metric/error description structs
//! returned by introspection calls.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Resource class of an enumerable token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectClass {
    /// A whole management device (owns slots, reconfiguration, ports)
    Device,
    /// An accelerator function exposed by a device (openable for work)
    Accelerator,
}

impl std::fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Device => write!(f, "device"),
            Self::Accelerator => write!(f, "accelerator"),
        }
    }
}

/// Physical location of a device on the host bus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PciAddress {
    pub segment: u16,
    pub bus: u8,
    pub device: u8,
    pub function: u8,
}

impl PciAddress {
    pub fn new(segment: u16, bus: u8, device: u8, function: u8) -> Self {
        Self {
            segment,
            bus,
            device,
            function,
        }
    }

    /// True when both addresses refer to the same physical device,
    /// ignoring the function number.
    pub fn same_device(&self, other: &PciAddress) -> bool {
        self.segment == other.segment && self.bus == other.bus && self.device == other.device
    }
}

impl std::fmt::Display for PciAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.segment, self.bus, self.device, self.function
        )
    }
}

/// Identity header every backend-native token must expose.
///
/// This is the comparable identity of a resource: backends compare headers
/// when matching enumeration filters, and the dispatch layer derives
/// parent/child relationships from them. The wrapped-token registry caches
/// the header at allocation so relationship scans never call back into a
/// backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHeader {
    /// Resource class
    pub object_class: ObjectClass,
    /// Backend-unique object id
    pub object_id: u64,
    /// Accelerator function GUID (nil for management devices)
    pub guid: Uuid,
    /// Bus location
    pub address: PciAddress,
    /// PCI vendor id
    pub vendor_id: u16,
    /// PCI device id
    pub device_id: u16,
    /// Port interface number; 0 is the primary interface
    pub interface: u32,
}

impl TokenHeader {
    /// True when `self` is the parent device of `child`: a management
    /// device and an accelerator at the same bus location.
    pub fn is_parent_of(&self, child: &TokenHeader) -> bool {
        self.object_class == ObjectClass::Device
            && child.object_class == ObjectClass::Accelerator
            && self.address.same_device(&child.address)
    }
}

/// Assignment state of an accelerator function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcceleratorState {
    /// Owned by a host process
    Assigned,
    /// Free for opening
    Unassigned,
}

/// Flags for opening a token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
    /// Open for shared (non-exclusive) access
    pub shared: bool,
}

/// Flags for preparing a shared buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferFlags {
    /// The caller supplies pre-allocated memory instead of asking the
    /// backend to allocate
    pub preallocated: bool,
}

/// Flags for slot reconfiguration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconfFlags {
    /// Reconfigure even if the slot is in use
    pub force: bool,
}

/// A shared buffer prepared for device access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedBuffer {
    /// Host virtual address of the buffer
    pub addr: u64,
    /// Backend region id used for release and address translation
    pub region: u64,
}

/// Kind of asynchronous device event a handle can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// User interrupt raised by the accelerator
    Interrupt,
    /// Device error condition
    Error,
    /// Power or thermal threshold crossing
    PowerThermal,
}

/// Kind of a hierarchical attribute object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SysObjectKind {
    /// Holds child objects
    Container,
    /// Leaf attribute with readable/writable content
    Attribute,
}

/// Flags for attribute-object lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SysObjectFlags {
    /// Treat the name as a glob pattern
    pub glob: bool,
    /// Re-read backing state on every access
    pub sync: bool,
}

/// Data type of a metric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricDataType {
    Int,
    Float,
    Double,
    Bool,
}

/// Value read from a device metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetricValue {
    Integer(i64),
    Double(f64),
    Boolean(bool),
}

impl MetricValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }
}

/// Description of one metric a device exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricInfo {
    /// Stable index used by by-index queries
    pub index: u64,
    /// Metric name (e.g. "power_consumed")
    pub name: String,
    /// Group the metric belongs to (e.g. "thermal")
    pub group: String,
    /// Unit string (e.g. "Watts")
    pub units: String,
    /// Value data type
    pub datatype: MetricDataType,
}

/// One sampled metric value. `value` is `None` when the backend could not
/// produce a valid reading for the requested metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub index: u64,
    pub value: Option<MetricValue>,
}

/// Warning/fatal thresholds configured for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricThreshold {
    pub name: String,
    pub upper_warn: Option<f64>,
    pub upper_fatal: Option<f64>,
    pub lower_warn: Option<f64>,
    pub lower_fatal: Option<f64>,
}

/// Description of one error register a token exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Register name (e.g. "pcie0_errors")
    pub name: String,
    /// Whether the register can be cleared by the caller
    pub can_clear: bool,
}
