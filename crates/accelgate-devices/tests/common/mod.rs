//! Scriptable mock backend used by the integration tests.
//!
//! The mock models a small topology of devices and accelerator ports,
//! records every backend call it receives, and can be told to fail
//! specific operations so tests can drive the error paths.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use accelgate_devices::{
    AccelError, BackendAdapter, BufferFlags, Enumerated, ErrorInfo, EventKind, MetricDataType,
    MetricInfo, MetricSample, MetricThreshold, MetricValue, NativeEvent, NativeHandle,
    NativeObject, NativeToken, ObjectClass, OpenFlags, ParentRef, PciAddress, Properties,
    PropertyField, Result, SharedBuffer, SysObjectFlags, SysObjectKind, TokenHeader,
};

pub fn device_header(bus: u8, object_id: u64) -> TokenHeader {
    TokenHeader {
        object_class: ObjectClass::Device,
        object_id,
        guid: Uuid::nil(),
        address: PciAddress::new(0, bus, 0, 0),
        vendor_id: 0x1af4,
        device_id: 0x0b30,
        interface: 0,
    }
}

pub fn accel_header(bus: u8, object_id: u64, interface: u32) -> TokenHeader {
    TokenHeader {
        object_class: ObjectClass::Accelerator,
        object_id,
        guid: Uuid::from_u128(object_id as u128),
        address: PciAddress::new(0, bus, 0, 1),
        vendor_id: 0x1af4,
        device_id: 0x0b30,
        interface,
    }
}

pub struct MockToken {
    pub header: TokenHeader,
}

pub struct MockHandle {
    pub header: TokenHeader,
}

pub struct MockEvent {
    pub fd: i32,
}

pub struct MockObject {
    pub path: String,
}

#[derive(Default)]
pub struct CallLog {
    pub enumerate_calls: AtomicUsize,
    pub destroyed_tokens: Mutex<Vec<u64>>,
    pub opened: Mutex<Vec<u64>>,
    pub closed: Mutex<Vec<u64>>,
    pub event_creates: AtomicUsize,
    pub event_destroys: AtomicUsize,
    pub registrations: Mutex<Vec<(u64, EventKind)>>,
    pub unregistrations: Mutex<Vec<(u64, EventKind)>>,
    pub pinned: Mutex<Vec<(u64, u64)>>,
    pub released: Mutex<Vec<(u64, u64)>>,
    pub bound: Mutex<Vec<(u64, u32)>>,
    pub reconfigured: Mutex<Vec<(u32, usize)>>,
    pub object_destroys: AtomicUsize,
    pub saw_wrapped_parent: AtomicBool,
}

pub struct MockBackend {
    name: String,
    headers: Vec<TokenHeader>,
    pub log: CallLog,

    pub enumerate_error: Mutex<Option<AccelError>>,
    pub fail_open: Mutex<HashSet<u64>>,
    pub fail_bind: Mutex<HashSet<u64>>,
    pub fail_update: AtomicBool,
    pub support_preallocated: bool,

    registers: Mutex<HashMap<(u64, u64), u64>>,
    error_regs: Mutex<HashMap<u32, u64>>,
    attrs: Mutex<HashMap<String, u64>>,
    clocks: Mutex<(u64, u64)>,
    next_region: AtomicU64,
}

impl MockBackend {
    pub fn new(name: &str) -> Self {
        let mut error_regs = HashMap::new();
        error_regs.insert(0, 0);
        error_regs.insert(1, 0xbeef);

        let mut attrs = HashMap::new();
        attrs.insert("errors".to_string(), 0);
        attrs.insert("errors/first_error".to_string(), 0x11);
        attrs.insert("errors/next_error".to_string(), 0x22);
        attrs.insert("afu_id".to_string(), 0xa0);

        Self {
            name: name.to_string(),
            headers: Vec::new(),
            log: CallLog::default(),
            enumerate_error: Mutex::new(None),
            fail_open: Mutex::new(HashSet::new()),
            fail_bind: Mutex::new(HashSet::new()),
            fail_update: AtomicBool::new(false),
            support_preallocated: true,
            registers: Mutex::new(HashMap::new()),
            error_regs: Mutex::new(error_regs),
            attrs: Mutex::new(attrs),
            clocks: Mutex::new((600_000_000, 300_000_000)),
            next_region: AtomicU64::new(1),
        }
    }

    /// Add one device with `ports` accelerator interfaces on `bus`.
    /// Object ids start at `base_id` (device) and continue per port.
    pub fn with_device(mut self, bus: u8, base_id: u64, ports: u32) -> Self {
        self.headers.push(device_header(bus, base_id));
        for port in 0..ports {
            self.headers
                .push(accel_header(bus, base_id + 1 + port as u64, port));
        }
        self
    }

    pub fn without_preallocated(mut self) -> Self {
        self.support_preallocated = false;
        self
    }

    fn filter_matches(&self, filter: &Properties, header: &TokenHeader) -> bool {
        let data = filter.lock();
        if data.is_set(PropertyField::ObjectClass) && data.object_class != header.object_class {
            return false;
        }
        if data.is_set(PropertyField::Guid) && data.guid != header.guid {
            return false;
        }
        if data.is_set(PropertyField::ObjectId) && data.object_id != header.object_id {
            return false;
        }
        if data.is_set(PropertyField::Parent) {
            match &data.parent {
                Some(ParentRef::Header(parent)) => {
                    if !parent.is_parent_of(header) {
                        return false;
                    }
                }
                Some(ParentRef::Wrapped(_)) => {
                    // The dispatch layer must never let this reach a backend.
                    self.log.saw_wrapped_parent.store(true, Ordering::SeqCst);
                    return false;
                }
                None => return false,
            }
        }
        true
    }

    fn header_of_token(token: &NativeToken) -> &TokenHeader {
        &token
            .downcast_ref::<MockToken>()
            .expect("native token from another backend")
            .header
    }

    fn header_of_handle(handle: &NativeHandle) -> &TokenHeader {
        &handle
            .downcast_ref::<MockHandle>()
            .expect("native handle from another backend")
            .header
    }

    fn fill_properties(props: &Properties, header: &TokenHeader) {
        let mut data = props.lock();
        data.set_object_class(header.object_class);
        data.set_guid(header.guid);
        data.address = header.address;
        data.mark_valid(PropertyField::Address);
        data.object_id = header.object_id;
        data.mark_valid(PropertyField::ObjectId);
        data.interface = header.interface;
        data.mark_valid(PropertyField::Interface);
    }
}

impl BackendAdapter for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn token_header(&self, token: &NativeToken) -> TokenHeader {
        Self::header_of_token(token).clone()
    }

    fn enumerate(&self, filters: &[&Properties], max: usize) -> Result<Enumerated> {
        self.log.enumerate_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(err) = *self.enumerate_error.lock() {
            return Err(err);
        }

        let matched: Vec<&TokenHeader> = self
            .headers
            .iter()
            .filter(|h| filters.is_empty() || filters.iter().any(|f| self.filter_matches(f, h)))
            .collect();

        let tokens = matched
            .iter()
            .take(max)
            .map(|h| {
                Arc::new(MockToken {
                    header: (*h).clone(),
                }) as NativeToken
            })
            .collect();

        Ok(Enumerated {
            matches: matched.len(),
            tokens,
        })
    }

    fn clone_token(&self, token: &NativeToken) -> Result<NativeToken> {
        Ok(Arc::new(MockToken {
            header: Self::header_of_token(token).clone(),
        }))
    }

    fn destroy_token(&self, token: &NativeToken) -> Result<()> {
        self.log
            .destroyed_tokens
            .lock()
            .push(Self::header_of_token(token).object_id);
        Ok(())
    }

    fn open(&self, token: &NativeToken, _flags: OpenFlags) -> Result<NativeHandle> {
        let header = Self::header_of_token(token);
        if self.fail_open.lock().contains(&header.object_id) {
            return Err(AccelError::NoAccess);
        }
        self.log.opened.lock().push(header.object_id);
        Ok(Arc::new(MockHandle {
            header: header.clone(),
        }))
    }

    fn close(&self, handle: &NativeHandle) -> Result<()> {
        self.log
            .closed
            .lock()
            .push(Self::header_of_handle(handle).object_id);
        Ok(())
    }

    fn reset(&self, _handle: &NativeHandle) -> Result<()> {
        Ok(())
    }

    fn read_mmio32(&self, handle: &NativeHandle, _region: u32, offset: u64) -> Result<u32> {
        let id = Self::header_of_handle(handle).object_id;
        Ok(*self.registers.lock().get(&(id, offset)).unwrap_or(&0) as u32)
    }

    fn write_mmio32(&self, handle: &NativeHandle, _region: u32, offset: u64, value: u32) -> Result<()> {
        let id = Self::header_of_handle(handle).object_id;
        self.registers.lock().insert((id, offset), value as u64);
        Ok(())
    }

    fn read_mmio64(&self, handle: &NativeHandle, _region: u32, offset: u64) -> Result<u64> {
        let id = Self::header_of_handle(handle).object_id;
        Ok(*self.registers.lock().get(&(id, offset)).unwrap_or(&0))
    }

    fn write_mmio64(&self, handle: &NativeHandle, _region: u32, offset: u64, value: u64) -> Result<()> {
        let id = Self::header_of_handle(handle).object_id;
        self.registers.lock().insert((id, offset), value);
        Ok(())
    }

    fn write_mmio512(
        &self,
        handle: &NativeHandle,
        region: u32,
        offset: u64,
        value: &[u8; 64],
    ) -> Result<()> {
        let first = u64::from_le_bytes(value[..8].try_into().expect("slice of 8"));
        self.write_mmio64(handle, region, offset, first)
    }

    fn map_mmio(&self, _handle: &NativeHandle, region: u32) -> Result<u64> {
        Ok(0x4000_0000 + region as u64 * 0x1000)
    }

    fn unmap_mmio(&self, _handle: &NativeHandle, _region: u32) -> Result<()> {
        Ok(())
    }

    fn prepare_buffer(
        &self,
        handle: &NativeHandle,
        len: u64,
        addr: Option<u64>,
        flags: BufferFlags,
    ) -> Result<SharedBuffer> {
        if flags.preallocated && !self.support_preallocated {
            return Err(AccelError::NotSupported);
        }
        if flags.preallocated && len == 0 && addr.is_none() {
            // Support probe.
            return Ok(SharedBuffer { addr: 0, region: 0 });
        }
        let region = self.next_region.fetch_add(1, Ordering::SeqCst);
        let addr = addr.unwrap_or(0x1000_0000 + region * 0x1000);
        let id = Self::header_of_handle(handle).object_id;
        self.log.pinned.lock().push((id, region));
        Ok(SharedBuffer { addr, region })
    }

    fn release_buffer(&self, handle: &NativeHandle, region: u64) -> Result<()> {
        let id = Self::header_of_handle(handle).object_id;
        self.log.released.lock().push((id, region));
        Ok(())
    }

    fn io_address(&self, _handle: &NativeHandle, region: u64) -> Result<u64> {
        Ok(0xd000_0000 + region)
    }

    fn bind_sva(&self, handle: &NativeHandle, pasid: Option<u32>) -> Result<u32> {
        let id = Self::header_of_handle(handle).object_id;
        if self.fail_bind.lock().contains(&id) {
            return Err(AccelError::Busy);
        }
        let pasid = pasid.unwrap_or(42);
        self.log.bound.lock().push((id, pasid));
        Ok(pasid)
    }

    fn properties(&self, token: &NativeToken) -> Result<Properties> {
        let props = Properties::new();
        Self::fill_properties(&props, Self::header_of_token(token));
        Ok(props)
    }

    fn properties_from_handle(&self, handle: &NativeHandle) -> Result<Properties> {
        let props = Properties::new();
        Self::fill_properties(&props, Self::header_of_handle(handle));
        Ok(props)
    }

    fn update_properties(&self, token: &NativeToken, props: &Properties) -> Result<()> {
        if matches!(
            props.lock().parent,
            Some(ParentRef::Wrapped(_))
        ) {
            self.log.saw_wrapped_parent.store(true, Ordering::SeqCst);
        }
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(AccelError::Exception);
        }
        Self::fill_properties(props, Self::header_of_token(token));
        Ok(())
    }

    fn read_error(&self, _token: &NativeToken, index: u32) -> Result<u64> {
        self.error_regs
            .lock()
            .get(&index)
            .copied()
            .ok_or(AccelError::NotFound)
    }

    fn clear_error(&self, _token: &NativeToken, index: u32) -> Result<()> {
        match self.error_regs.lock().get_mut(&index) {
            Some(value) => {
                *value = 0;
                Ok(())
            }
            None => Err(AccelError::NotFound),
        }
    }

    fn clear_all_errors(&self, _token: &NativeToken) -> Result<()> {
        for value in self.error_regs.lock().values_mut() {
            *value = 0;
        }
        Ok(())
    }

    fn error_info(&self, _token: &NativeToken, index: u32) -> Result<ErrorInfo> {
        if !self.error_regs.lock().contains_key(&index) {
            return Err(AccelError::NotFound);
        }
        Ok(ErrorInfo {
            name: format!("error{index}"),
            can_clear: true,
        })
    }

    fn create_event_handle(&self) -> Result<NativeEvent> {
        let n = self.log.event_creates.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockEvent { fd: 100 + n as i32 }))
    }

    fn destroy_event_handle(&self, _event: &NativeEvent) -> Result<()> {
        self.log.event_destroys.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn event_descriptor(&self, event: &NativeEvent) -> Result<i32> {
        Ok(event
            .downcast_ref::<MockEvent>()
            .ok_or(AccelError::InvalidParam)?
            .fd)
    }

    fn register_event(
        &self,
        handle: &NativeHandle,
        kind: EventKind,
        _event: &NativeEvent,
        _flags: u32,
    ) -> Result<()> {
        let id = Self::header_of_handle(handle).object_id;
        self.log.registrations.lock().push((id, kind));
        Ok(())
    }

    fn unregister_event(
        &self,
        handle: &NativeHandle,
        kind: EventKind,
        _event: &NativeEvent,
    ) -> Result<()> {
        let id = Self::header_of_handle(handle).object_id;
        self.log.unregistrations.lock().push((id, kind));
        Ok(())
    }

    fn token_object(
        &self,
        _token: &NativeToken,
        name: &str,
        _flags: SysObjectFlags,
    ) -> Result<NativeObject> {
        if !self.attrs.lock().contains_key(name) {
            return Err(AccelError::NotFound);
        }
        Ok(Arc::new(MockObject {
            path: name.to_string(),
        }))
    }

    fn handle_object(
        &self,
        handle: &NativeHandle,
        name: &str,
        flags: SysObjectFlags,
    ) -> Result<NativeObject> {
        self.token_object(handle, name, flags)
    }

    fn object_object(
        &self,
        parent: &NativeObject,
        name: &str,
        _flags: SysObjectFlags,
    ) -> Result<NativeObject> {
        let base = &parent
            .downcast_ref::<MockObject>()
            .ok_or(AccelError::InvalidParam)?
            .path;
        let path = format!("{base}/{name}");
        if !self.attrs.lock().contains_key(&path) {
            return Err(AccelError::NotFound);
        }
        Ok(Arc::new(MockObject { path }))
    }

    fn object_at(&self, parent: &NativeObject, index: usize) -> Result<NativeObject> {
        let base = &parent
            .downcast_ref::<MockObject>()
            .ok_or(AccelError::InvalidParam)?
            .path;
        let prefix = format!("{base}/");
        let mut children: Vec<String> = self
            .attrs
            .lock()
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect();
        children.sort();
        children
            .into_iter()
            .nth(index)
            .map(|path| Arc::new(MockObject { path }) as NativeObject)
            .ok_or(AccelError::NotFound)
    }

    fn destroy_object(&self, _object: &NativeObject) -> Result<()> {
        self.log.object_destroys.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn object_read(&self, object: &NativeObject, offset: usize, len: usize) -> Result<Vec<u8>> {
        let value = self.object_read64(object)?;
        let bytes = value.to_le_bytes();
        if offset >= bytes.len() {
            return Err(AccelError::InvalidParam);
        }
        Ok(bytes[offset..bytes.len().min(offset + len)].to_vec())
    }

    fn object_read64(&self, object: &NativeObject) -> Result<u64> {
        let path = &object
            .downcast_ref::<MockObject>()
            .ok_or(AccelError::InvalidParam)?
            .path;
        self.attrs
            .lock()
            .get(path)
            .copied()
            .ok_or(AccelError::NotFound)
    }

    fn object_write64(&self, object: &NativeObject, value: u64) -> Result<()> {
        let path = object
            .downcast_ref::<MockObject>()
            .ok_or(AccelError::InvalidParam)?
            .path
            .clone();
        self.attrs.lock().insert(path, value);
        Ok(())
    }

    fn object_size(&self, _object: &NativeObject) -> Result<u64> {
        Ok(8)
    }

    fn object_type(&self, object: &NativeObject) -> Result<SysObjectKind> {
        let path = &object
            .downcast_ref::<MockObject>()
            .ok_or(AccelError::InvalidParam)?
            .path;
        let prefix = format!("{path}/");
        let is_container = self.attrs.lock().keys().any(|k| k.starts_with(&prefix));
        Ok(if is_container {
            SysObjectKind::Container
        } else {
            SysObjectKind::Attribute
        })
    }

    fn num_metrics(&self, _handle: &NativeHandle) -> Result<u64> {
        Ok(3)
    }

    fn metrics_info(&self, _handle: &NativeHandle) -> Result<Vec<MetricInfo>> {
        Ok(vec![
            MetricInfo {
                index: 0,
                name: "power_consumed".to_string(),
                group: "power".to_string(),
                units: "Watts".to_string(),
                datatype: MetricDataType::Double,
            },
            MetricInfo {
                index: 1,
                name: "temperature".to_string(),
                group: "thermal".to_string(),
                units: "Celsius".to_string(),
                datatype: MetricDataType::Double,
            },
            MetricInfo {
                index: 2,
                name: "clock_frequency".to_string(),
                group: "performance".to_string(),
                units: "Hz".to_string(),
                datatype: MetricDataType::Int,
            },
        ])
    }

    fn metrics_by_index(&self, _handle: &NativeHandle, indexes: &[u64]) -> Result<Vec<MetricSample>> {
        Ok(indexes
            .iter()
            .map(|&index| MetricSample {
                index,
                value: match index {
                    0 => Some(MetricValue::Double(45.5)),
                    1 => Some(MetricValue::Double(62.0)),
                    2 => Some(MetricValue::Integer(600_000_000)),
                    _ => None,
                },
            })
            .collect())
    }

    fn metrics_by_name(&self, handle: &NativeHandle, names: &[String]) -> Result<Vec<MetricSample>> {
        let infos = self.metrics_info(handle)?;
        let indexes: Vec<u64> = names
            .iter()
            .map(|name| {
                infos
                    .iter()
                    .find(|i| &i.name == name)
                    .map(|i| i.index)
                    .unwrap_or(u64::MAX)
            })
            .collect();
        self.metrics_by_index(handle, &indexes)
    }

    fn metrics_thresholds(&self, _handle: &NativeHandle) -> Result<Vec<MetricThreshold>> {
        Ok(vec![MetricThreshold {
            name: "temperature".to_string(),
            upper_warn: Some(85.0),
            upper_fatal: Some(95.0),
            lower_warn: None,
            lower_fatal: None,
        }])
    }

    fn user_clock(&self, _handle: &NativeHandle) -> Result<(u64, u64)> {
        Ok(*self.clocks.lock())
    }

    fn set_user_clock(&self, _handle: &NativeHandle, high: u64, low: u64) -> Result<()> {
        *self.clocks.lock() = (high, low);
        Ok(())
    }

    fn reconfigure_slot(
        &self,
        _handle: &NativeHandle,
        slot: u32,
        bitstream: &[u8],
        _flags: accelgate_devices::ReconfFlags,
    ) -> Result<()> {
        self.log.reconfigured.lock().push((slot, bitstream.len()));
        Ok(())
    }

    fn assign_port_to_interface(
        &self,
        _handle: &NativeHandle,
        _interface: u32,
        _slot: u32,
    ) -> Result<()> {
        Ok(())
    }

    fn assign_to_interface(
        &self,
        _handle: &NativeHandle,
        _accelerator: &NativeToken,
        _host_interface: u32,
    ) -> Result<()> {
        Ok(())
    }

    fn release_from_interface(
        &self,
        _handle: &NativeHandle,
        _accelerator: &NativeToken,
    ) -> Result<()> {
        Ok(())
    }
}

/// A backend that implements nothing beyond the required surface; every
/// optional operation keeps the not-supported default.
pub struct NullBackend;

impl BackendAdapter for NullBackend {
    fn name(&self) -> &str {
        "null"
    }

    fn token_header(&self, _token: &NativeToken) -> TokenHeader {
        device_header(0xff, 0)
    }
}

/// A backend that can enumerate and open but implements nothing else, so
/// every other operation reports not-supported through the trait default.
pub struct MinimalBackend {
    header: TokenHeader,
}

impl MinimalBackend {
    pub fn new(bus: u8, object_id: u64) -> Self {
        Self {
            header: accel_header(bus, object_id, 0),
        }
    }
}

impl BackendAdapter for MinimalBackend {
    fn name(&self) -> &str {
        "minimal"
    }

    fn token_header(&self, _token: &NativeToken) -> TokenHeader {
        self.header.clone()
    }

    fn enumerate(&self, _filters: &[&Properties], max: usize) -> Result<Enumerated> {
        let tokens = if max > 0 {
            vec![Arc::new(MockToken {
                header: self.header.clone(),
            }) as NativeToken]
        } else {
            Vec::new()
        };
        Ok(Enumerated { matches: 1, tokens })
    }

    fn destroy_token(&self, _token: &NativeToken) -> Result<()> {
        Ok(())
    }

    fn open(&self, _token: &NativeToken, _flags: OpenFlags) -> Result<NativeHandle> {
        Ok(Arc::new(MockHandle {
            header: self.header.clone(),
        }))
    }

    fn close(&self, _handle: &NativeHandle) -> Result<()> {
        Ok(())
    }
}

/// Install a test subscriber once so `RUST_LOG=debug` shows layer
/// activity during test runs.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Build a service over the given backends.
pub fn service_with(
    backends: Vec<Arc<dyn BackendAdapter>>,
) -> accelgate_devices::AccelService {
    init_logging();
    accelgate_devices::AccelService::with_backends(backends)
}

/// Enumerate every accelerator the service can see, two-call style.
pub fn all_accelerators(
    service: &accelgate_devices::AccelService,
) -> Vec<accelgate_devices::Token> {
    let filters = [Properties::new().with_class(ObjectClass::Accelerator)];
    let count = service.enumerate(&filters, 0, None).expect("count");
    let mut tokens = Vec::new();
    if count > 0 {
        service
            .enumerate(&filters, count, Some(&mut tokens))
            .expect("fetch");
    }
    tokens
}
