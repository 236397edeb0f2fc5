//! Model of one logical-address peer on the bus.

use {
    crate::{
        adapter::Cec,
        backend::{CecBackend, CecConn},
        cache::TtlCache,
        types::{phys_addr_text, vendor_name, CecNetworkDeviceType, CecPowerState},
    },
    std::time::Duration,
};

/// Power status can flip under us, so it is only briefly memoized.
const POWER_STATE_TTL: Duration = Duration::from_secs(2);
/// OSD names change rarely but are allowed to.
const OSD_NAME_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Field {
    PhysicalAddress,
    VendorId,
    OsdName,
    PowerStatus,
}

#[derive(Clone)]
enum Value {
    Addr(u16),
    Vendor(u32),
    Name(String),
    Power(CecPowerState),
}

#[derive(thiserror::Error, Debug)]
pub enum DeviceError {
    #[error("active source not set to addr {0:#06x}")]
    ActiveSourceRejected(u16),
}

/// A peer, addressed by its network-position slot. May be created
/// speculatively: nothing needs to answer on the address yet.
///
/// Bus properties with independent lifetimes are memoized per field:
/// physical address and vendor id are stable for the life of the handle,
/// OSD name and power status expire quickly.
pub struct CecNetworkDevice<'a, B: CecBackend> {
    cec: &'a Cec<B>,
    slot: CecNetworkDeviceType,
    /// Physical address of the local adapter, the source this model
    /// reports on behalf of.
    source_phys_addr: u16,
    cache: TtlCache<Field, Value>,
}

impl<'a, B: CecBackend> CecNetworkDevice<'a, B> {
    pub(crate) fn new(cec: &'a Cec<B>, slot: CecNetworkDeviceType) -> Self {
        Self {
            cec,
            slot,
            source_phys_addr: cec.physical_address().unwrap_or(0xffff),
            cache: TtlCache::new(),
        }
    }

    pub fn slot(&self) -> CecNetworkDeviceType {
        self.slot
    }

    pub fn logical_address(&self) -> u8 {
        self.slot.logical_address()
    }

    pub fn source_physical_address(&self) -> u16 {
        self.source_phys_addr
    }

    /// Bus-level liveness probe.
    pub fn is_active(&self) -> bool {
        self.cec
            .conn()
            .is_some_and(|conn| conn.ping(self.logical_address()))
    }

    pub fn physical_address(&mut self) -> Option<u16> {
        let addr = self.logical_address();
        let conn = self.cec.conn()?;
        match self
            .cache
            .try_get_or_set_with(Field::PhysicalAddress, None, || {
                conn.physical_address_of(addr).map(Value::Addr)
            })? {
            Value::Addr(phys) => Some(phys),
            _ => None,
        }
    }

    pub fn vendor_id(&mut self) -> Option<u32> {
        let addr = self.logical_address();
        let conn = self.cec.conn()?;
        match self.cache.try_get_or_set_with(Field::VendorId, None, || {
            conn.vendor_id_of(addr).map(Value::Vendor)
        })? {
            Value::Vendor(id) => Some(id),
            _ => None,
        }
    }

    /// Vendor display name; empty for unknown or unanswered ids.
    pub fn vendor(&mut self) -> &'static str {
        match self.vendor_id() {
            Some(id) => vendor_name(id),
            None => "",
        }
    }

    pub fn osd_name(&mut self) -> Option<String> {
        let addr = self.logical_address();
        let conn = self.cec.conn()?;
        match self
            .cache
            .try_get_or_set_with(Field::OsdName, Some(OSD_NAME_TTL), || {
                conn.osd_name_of(addr).map(Value::Name)
            })? {
            Value::Name(name) => Some(name),
            _ => None,
        }
    }

    /// Unanswered or malformed reports decode as Unknown, never an error.
    pub fn power_state(&mut self) -> CecPowerState {
        let addr = self.logical_address();
        let Some(conn) = self.cec.conn() else {
            return CecPowerState::Unknown;
        };
        match self
            .cache
            .get_or_set_with(Field::PowerStatus, Some(POWER_STATE_TTL), || {
                Value::Power(conn.power_status_of(addr))
            }) {
            Value::Power(state) => state,
            _ => CecPowerState::Unknown,
        }
    }

    pub fn is_power_on(&mut self) -> bool {
        self.power_state() == CecPowerState::On
    }

    /// Physical address the peer reports as the current active source.
    /// Queried off the wire, never from a cached snapshot.
    pub fn active_source(&self) -> Option<u16> {
        self.cec.conn().and_then(|conn| conn.active_source_of())
    }

    /// True iff the bus already routes to the local device, in which case
    /// the handshake can be skipped.
    pub fn is_active_source_current_device(&self) -> bool {
        self.active_source() == Some(self.source_phys_addr)
    }

    /// Broadcast that the local device is the active source.
    pub fn report_active_source(&self) -> bool {
        self.cec
            .conn()
            .is_some_and(|conn| conn.broadcast_active_source(self.source_phys_addr))
    }

    /// Answer a power-status query on behalf of the local device.
    pub fn report_power_on(&self) -> bool {
        self.cec
            .conn()
            .is_some_and(|conn| conn.report_power_status(self.logical_address()))
    }

    pub fn request_active_source(&self) -> bool {
        self.cec
            .conn()
            .is_some_and(|conn| conn.request_active_source())
    }

    pub fn set_stream_path(&self, phys_addr: u16) -> bool {
        self.cec
            .conn()
            .is_some_and(|conn| conn.set_stream_path(phys_addr))
    }

    /// Convenience setter; the only operation in the core that surfaces a
    /// transmit rejection as an error. Callers that want the soft failure
    /// mode use [CecNetworkDevice::report_active_source] instead.
    pub fn set_active_source(&self, phys_addr: u16) -> Result<(), DeviceError> {
        let sent = self
            .cec
            .conn()
            .is_some_and(|conn| conn.broadcast_active_source(phys_addr));
        if sent {
            Ok(())
        } else {
            Err(DeviceError::ActiveSourceRejected(phys_addr))
        }
    }

    /// One-line description for topology listings.
    pub fn report(&mut self) -> String {
        let addr = self.logical_address();
        let name = self.osd_name().unwrap_or_default();
        let vendor = self.vendor();
        let phys = self
            .physical_address()
            .map(|phys| phys_addr_text(phys))
            .unwrap_or_else(|| "?".into());
        format!("Device {addr}: {name} [{vendor}] at {phys}")
    }
}
