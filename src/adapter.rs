//! Handle on one CEC adapter: lifecycle, registration and message polling.

use {
    crate::{
        backend::{AdapterInfo, CecBackend, CecConn},
        device::CecNetworkDevice,
        message::CecBusMsg,
        types::{CecDeviceType, CecNetworkDeviceType},
    },
    log::debug,
    std::{
        fmt,
        path::{Path, PathBuf},
    },
};

/// One CEC-capable device node, open or not.
///
/// All bus operations require the handle to be open; `open` fails silently
/// (callers check [Cec::opened]) and `close` is idempotent and clears the
/// cached info snapshot so a stale handle cannot pass for a live one.
/// Dropping the handle closes it, which releases the connection on every
/// exit path including cancellation.
pub struct Cec<B: CecBackend> {
    path: PathBuf,
    backend: B,
    conn: Option<B::Conn>,
    info: Option<AdapterInfo>,
}

impl<B: CecBackend> Cec<B> {
    /// Discover all CEC-capable device paths. Never opens them.
    pub fn enumerate(backend: &B) -> Vec<Self> {
        backend
            .enumerate()
            .into_iter()
            .map(|path| Self {
                path,
                backend: backend.clone(),
                conn: None,
                info: None,
            })
            .collect()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn opened(&self) -> bool {
        self.conn.is_some()
    }

    /// True when the adapter advertises any CEC capability.
    pub fn is_active_cec(&self) -> bool {
        self.info.as_ref().is_some_and(|info| !info.caps.is_empty())
    }

    /// Canonical registration predicate: at least one logical address
    /// claimed.
    pub fn is_registered(&self) -> bool {
        self.info
            .as_ref()
            .is_some_and(|info| info.logical_address_count > 0)
    }

    pub fn physical_address(&self) -> Option<u16> {
        self.info.as_ref().map(|info| info.physical_address)
    }

    pub fn info(&self) -> Option<&AdapterInfo> {
        self.info.as_ref()
    }

    /// Open the underlying connection. No-op when already open; a failed
    /// open leaves the handle closed rather than failing loudly.
    pub fn open(&mut self) {
        if self.opened() {
            return;
        }
        self.conn = self.backend.open(&self.path);
        self.info = self.conn.as_ref().and_then(|conn| conn.info());
    }

    /// Release the connection and the info snapshot. No-op when closed.
    pub fn close(&mut self) {
        if self.conn.take().is_some() {
            debug!("closed {}", self.path.display());
        }
        self.info = None;
    }

    /// Claim a logical address for the given role. False on any unmet
    /// precondition or native rejection; on success the info snapshot is
    /// refreshed before returning, so `is_registered` is immediately
    /// consistent.
    pub fn set_type(&mut self, device_type: CecDeviceType) -> bool {
        let Some(conn) = self.conn.as_ref() else {
            return false;
        };
        if !conn.can_set_logical_address() {
            return false;
        }
        if !conn.set_logical_address(device_type) {
            return false;
        }
        self.info = conn.info();
        true
    }

    /// Peers currently answering on the bus. `None` while unregistered.
    pub fn devices(&self) -> Option<Vec<CecNetworkDevice<'_, B>>> {
        if !self.is_registered() {
            return None;
        }
        let conn = self.conn.as_ref()?;
        Some(
            conn.detect_devices()
                .into_iter()
                .filter_map(|addr| CecNetworkDeviceType::try_from(addr).ok())
                .map(|slot| CecNetworkDevice::new(self, slot))
                .collect(),
        )
    }

    /// Model for the peer in the given slot, whether or not anything
    /// currently answers there.
    pub fn create_device(&self, slot: CecNetworkDeviceType) -> Option<CecNetworkDevice<'_, B>> {
        if !self.is_registered() {
            return None;
        }
        Some(CecNetworkDevice::new(self, slot))
    }

    /// Non-blocking poll. The zeroed default event means nothing pending
    /// (also returned while the handle is closed).
    pub fn poll_message(&self) -> CecBusMsg {
        match self.conn.as_ref() {
            Some(conn) => conn.poll_message(),
            None => CecBusMsg::default(),
        }
    }

    pub(crate) fn conn(&self) -> Option<&B::Conn> {
        self.conn.as_ref()
    }
}

impl<B: CecBackend> fmt::Display for Cec<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.path.display())?;
        let Some(info) = self.info.as_ref() else {
            return Ok(());
        };
        writeln!(f, "    Adapter: {}", info.adapter)?;
        writeln!(f, "    Name: {}", info.osd_name)?;
        writeln!(f, "    Physical Address: {}", info.physical_address_text())?;
        writeln!(f, "    Capabilities:")?;
        if info.caps.contains(crate::types::AdapterCaps::TRANSMIT) {
            writeln!(f, "        Transmit")?;
        }
        if info.caps.contains(crate::types::AdapterCaps::LOG_ADDRS) {
            writeln!(f, "        Logical Address")?;
        }
        writeln!(
            f,
            "    Available Logical Addresses: {}",
            info.available_logical_addresses
        )?;
        writeln!(
            f,
            "    Logical Address Count: {}",
            info.logical_address_count
        )?;
        write!(f, "    Logical Address: {}", info.logical_address)
    }
}

impl<B: CecBackend> Drop for Cec<B> {
    fn drop(&mut self) {
        self.close();
    }
}
