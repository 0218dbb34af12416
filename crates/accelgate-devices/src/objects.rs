//! Attribute object navigation and access.
//!
//! Attribute objects expose a hierarchical, sysfs-like view of device
//! state. They are single-owner wrappers: no reference counting, explicit
//! destroy. Each lookup wraps the backend-native object together with the
//! adapter that produced it.

use std::sync::Arc;

use accelgate_core::adapter::{BackendAdapter, NativeObject};
use accelgate_core::error::{AccelError, Result};
use accelgate_core::tokens::Token;
use accelgate_core::types::{SysObjectFlags, SysObjectKind};

use crate::handle::{next_id, Handle, ObjectEntry, SysObject};
use crate::service::AccelService;

impl AccelService {
    fn object_entry(&self, object: &SysObject) -> Result<Arc<ObjectEntry>> {
        self.objects
            .get(&object.0)
            .map(|e| e.value().clone())
            .ok_or(AccelError::InvalidParam)
    }

    fn wrap_object(&self, native: NativeObject, adapter: Arc<dyn BackendAdapter>) -> SysObject {
        let id = next_id();
        self.objects.insert(id, Arc::new(ObjectEntry { native, adapter }));
        SysObject(id)
    }

    /// Look up a named attribute object under a token.
    pub fn token_object(&self, token: &Token, name: &str, flags: SysObjectFlags) -> Result<SysObject> {
        if name.is_empty() {
            return Err(AccelError::InvalidParam);
        }
        let (native, adapter) = self.tokens.resolve(token)?;
        let object = adapter.token_object(&native, name, flags)?;
        Ok(self.wrap_object(object, adapter))
    }

    /// Look up a named attribute object under an open handle.
    pub fn handle_object(
        &self,
        handle: &Handle,
        name: &str,
        flags: SysObjectFlags,
    ) -> Result<SysObject> {
        if name.is_empty() {
            return Err(AccelError::InvalidParam);
        }
        let entry = self.handle_entry(handle)?;
        let object = entry.adapter.handle_object(&entry.native, name, flags)?;
        Ok(self.wrap_object(object, entry.adapter.clone()))
    }

    /// Look up a named child of a container object.
    pub fn object_object(
        &self,
        parent: &SysObject,
        name: &str,
        flags: SysObjectFlags,
    ) -> Result<SysObject> {
        if name.is_empty() {
            return Err(AccelError::InvalidParam);
        }
        let entry = self.object_entry(parent)?;
        let object = entry.adapter.object_object(&entry.native, name, flags)?;
        Ok(self.wrap_object(object, entry.adapter.clone()))
    }

    /// Look up a child of a container object by position.
    pub fn object_at(&self, parent: &SysObject, index: usize) -> Result<SysObject> {
        let entry = self.object_entry(parent)?;
        let object = entry.adapter.object_at(&entry.native, index)?;
        Ok(self.wrap_object(object, entry.adapter.clone()))
    }

    /// Destroy an attribute object.
    pub fn destroy_object(&self, object: SysObject) -> Result<()> {
        let (_, entry) = self
            .objects
            .remove(&object.0)
            .ok_or(AccelError::InvalidParam)?;
        entry.adapter.destroy_object(&entry.native)
    }

    /// Read raw bytes from an attribute.
    pub fn object_read(&self, object: &SysObject, offset: usize, len: usize) -> Result<Vec<u8>> {
        let entry = self.object_entry(object)?;
        entry.adapter.object_read(&entry.native, offset, len)
    }

    /// Read an attribute as a 64-bit value.
    pub fn object_read64(&self, object: &SysObject) -> Result<u64> {
        let entry = self.object_entry(object)?;
        entry.adapter.object_read64(&entry.native)
    }

    /// Write a 64-bit value to an attribute.
    pub fn object_write64(&self, object: &SysObject, value: u64) -> Result<()> {
        let entry = self.object_entry(object)?;
        entry.adapter.object_write64(&entry.native, value)
    }

    /// Size of an attribute's content in bytes.
    pub fn object_size(&self, object: &SysObject) -> Result<u64> {
        let entry = self.object_entry(object)?;
        entry.adapter.object_size(&entry.native)
    }

    /// Whether the object is a container or a leaf attribute.
    pub fn object_type(&self, object: &SysObject) -> Result<SysObjectKind> {
        let entry = self.object_entry(object)?;
        entry.adapter.object_type(&entry.native)
    }
}
