//! Resource property container used for queries and enumeration filters.
//!
//! A `Properties` value is shared between the application, the dispatch
//! layer, and backends, so its data sits behind a lock: `lock()` is the
//! only accessor and returns a mutable view. Field validity is tracked in
//! a bitmask — a field's value is meaningful only while its bit is set.
//!
//! The parent field is special: the dispatch layer stores a wrapped
//! [`Token`] there so applications can navigate to the owning device, but
//! backends must only ever observe the raw [`TokenHeader`] form. The
//! enumeration engine performs that unwrap/rewrap around backend calls.

use parking_lot::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::tokens::Token;
use crate::types::{AcceleratorState, ObjectClass, PciAddress, TokenHeader};

/// Named property fields, one bit each in the validity mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PropertyField {
    Parent,
    ObjectClass,
    Address,
    ObjectId,
    Guid,
    VendorId,
    DeviceId,
    NumErrors,
    Interface,
    NumMmio,
    NumInterrupts,
    AcceleratorState,
    NumSlots,
    BbsId,
    BbsVersion,
}

impl PropertyField {
    const fn bit(self) -> u64 {
        1u64 << (self as u32)
    }
}

/// The parent field of a properties object.
///
/// `Wrapped` carries an owned registry reference and is the form
/// applications see; `Header` is the backend-native identity and the only
/// form forwarded into plugin calls.
#[derive(Debug)]
pub enum ParentRef {
    Wrapped(Token),
    Header(TokenHeader),
}

impl ParentRef {
    /// The raw header, when this reference is already in native form.
    pub fn header(&self) -> Option<&TokenHeader> {
        match self {
            Self::Header(h) => Some(h),
            Self::Wrapped(_) => None,
        }
    }
}

/// Mutable view of a properties object, obtained via [`Properties::lock`].
#[derive(Debug)]
pub struct PropertyData {
    valid: u64,
    pub parent: Option<ParentRef>,
    pub object_class: ObjectClass,
    pub address: PciAddress,
    pub object_id: u64,
    pub guid: Uuid,
    pub vendor_id: u16,
    pub device_id: u16,
    pub num_errors: u32,
    pub interface: u32,
    pub num_mmio: u32,
    pub num_interrupts: u32,
    pub accelerator_state: AcceleratorState,
    pub num_slots: u32,
    pub bbs_id: u64,
    pub bbs_version: (u8, u8, u16),
}

impl Default for PropertyData {
    fn default() -> Self {
        Self {
            valid: 0,
            parent: None,
            object_class: ObjectClass::Device,
            address: PciAddress::default(),
            object_id: 0,
            guid: Uuid::nil(),
            vendor_id: 0,
            device_id: 0,
            num_errors: 0,
            interface: 0,
            num_mmio: 0,
            num_interrupts: 0,
            accelerator_state: AcceleratorState::Unassigned,
            num_slots: 0,
            bbs_id: 0,
            bbs_version: (0, 0, 0),
        }
    }
}

impl PropertyData {
    /// Test a field's validity bit.
    pub fn is_set(&self, field: PropertyField) -> bool {
        self.valid & field.bit() != 0
    }

    /// Set a field's validity bit.
    pub fn mark_valid(&mut self, field: PropertyField) {
        self.valid |= field.bit();
    }

    /// Clear a field's validity bit.
    pub fn clear_valid(&mut self, field: PropertyField) {
        self.valid &= !field.bit();
    }

    /// Store a wrapped parent token and mark the field valid.
    pub fn set_parent_token(&mut self, token: Token) {
        self.parent = Some(ParentRef::Wrapped(token));
        self.mark_valid(PropertyField::Parent);
    }

    /// Store a native parent header and mark the field valid.
    pub fn set_parent_header(&mut self, header: TokenHeader) {
        self.parent = Some(ParentRef::Header(header));
        self.mark_valid(PropertyField::Parent);
    }

    /// Take the parent field, clearing its validity bit.
    pub fn take_parent(&mut self) -> Option<ParentRef> {
        self.clear_valid(PropertyField::Parent);
        self.parent.take()
    }

    /// Store the object class and mark the field valid.
    pub fn set_object_class(&mut self, class: ObjectClass) {
        self.object_class = class;
        self.mark_valid(PropertyField::ObjectClass);
    }

    /// Store the function GUID and mark the field valid.
    pub fn set_guid(&mut self, guid: Uuid) {
        self.guid = guid;
        self.mark_valid(PropertyField::Guid);
    }
}

/// Lockable property container.
pub struct Properties {
    data: Mutex<PropertyData>,
}

impl Properties {
    /// Create an empty properties object with no valid fields.
    pub fn new() -> Self {
        Self {
            data: Mutex::new(PropertyData::default()),
        }
    }

    /// Locking accessor; the returned guard is the mutable view.
    pub fn lock(&self) -> MutexGuard<'_, PropertyData> {
        self.data.lock()
    }

    /// Builder: constrain the object class.
    pub fn with_class(self, class: ObjectClass) -> Self {
        self.lock().set_object_class(class);
        self
    }

    /// Builder: constrain the parent to a native header.
    pub fn with_parent_header(self, header: TokenHeader) -> Self {
        self.lock().set_parent_header(header);
        self
    }
}

impl Default for Properties {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Properties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.data.try_lock() {
            Some(data) => f.debug_struct("Properties").field("data", &*data).finish(),
            None => f.debug_struct("Properties").field("data", &"<locked>").finish(),
        }
    }
}
