//! Boundary to the native CEC driver layer.
//!
//! Everything the core needs from the kernel-facing side is expressed by
//! [CecBackend] (adapter discovery) and [CecConn] (one open adapter).
//! Failures cross this boundary as `bool`/`Option`, never as errors: callers
//! branch on the result and the next poll cycle retries naturally.

pub mod linux;

use {
    crate::{
        message::CecBusMsg,
        types::{phys_addr_text, AdapterCaps, CecDeviceType, CecPowerState},
    },
    std::path::{Path, PathBuf},
};

/// Discovers CEC-capable device nodes and opens connections to them.
pub trait CecBackend: Clone {
    type Conn: CecConn;

    /// Device paths of all CEC-capable adapters. Never opens them.
    fn enumerate(&self) -> Vec<PathBuf>;

    /// Open a connection; `None` when the node cannot be established.
    fn open(&self, path: &Path) -> Option<Self::Conn>;
}

/// One open connection to a CEC adapter.
///
/// Per-peer operations take the peer's logical address; the implementation
/// transmits from whatever logical address the adapter has claimed.
pub trait CecConn {
    /// Fresh snapshot of the adapter's addressing state and capabilities.
    fn info(&self) -> Option<AdapterInfo>;

    fn can_transmit(&self) -> bool;
    fn can_set_logical_address(&self) -> bool;

    /// Claim a logical address for the given role. False on rejection.
    fn set_logical_address(&self, device_type: CecDeviceType) -> bool;

    /// Logical addresses of peers answering a bus ping (0..=14).
    fn detect_devices(&self) -> Vec<u8>;

    /// Liveness probe: does the peer ack a directed message?
    fn ping(&self, addr: u8) -> bool;

    fn physical_address_of(&self, addr: u8) -> Option<u16>;
    fn vendor_id_of(&self, addr: u8) -> Option<u32>;
    fn osd_name_of(&self, addr: u8) -> Option<String>;
    fn power_status_of(&self, addr: u8) -> CecPowerState;

    /// Physical address the bus currently reports as the active source.
    fn active_source_of(&self) -> Option<u16>;

    /// Broadcast ActiveSource for the given physical address.
    fn broadcast_active_source(&self, phys_addr: u16) -> bool;

    /// Broadcast RequestActiveSource.
    fn request_active_source(&self) -> bool;

    /// Report our own power status as On to the given peer.
    fn report_power_status(&self, to: u8) -> bool;

    /// Broadcast SetStreamPath for the given physical address.
    fn set_stream_path(&self, phys_addr: u16) -> bool;

    /// Non-blocking poll; the zeroed default means nothing was pending.
    /// This is the primitive every controller wait loop spins on.
    fn poll_message(&self) -> CecBusMsg;
}

/// Snapshot of an adapter's identity and addressing state.
#[derive(Debug, Default, Clone)]
pub struct AdapterInfo {
    /// Driver/device description reported by the kernel.
    pub adapter: String,
    /// OSD name the adapter announces for itself.
    pub osd_name: String,
    pub caps: AdapterCaps,
    pub available_logical_addresses: u32,
    pub physical_address: u16,
    pub logical_address: u8,
    pub logical_address_count: u8,
    pub logical_address_mask: u16,
}

impl AdapterInfo {
    pub fn physical_address_text(&self) -> String {
        phys_addr_text(self.physical_address)
    }
}
