//! Production backend over the Linux kernel CEC uAPI, via the `cec_linux`
//! crate. This is the only module that talks to the driver; everything above
//! it sees the [CecBackend]/[CecConn] traits.

use {
    super::{AdapterInfo, CecBackend, CecConn},
    crate::{
        message::CecBusMsg,
        types::{AdapterCaps, CecDeviceType, CecPowerState},
    },
    cec_linux::{
        CecDevice, CecEvent, CecLogAddrType, CecLogAddrs, CecLogicalAddress, CecModeFollower,
        CecModeInitiator, CecMsg, CecOpcode, CecPrimDevType, PollFlags, PollTimeout, VendorID,
        Version,
    },
    log::{debug, warn},
    std::{
        cell::Cell,
        path::{Path, PathBuf},
        time::{Duration, Instant},
    },
};

/// Raw os error for a device that dropped off the bus mid-receive.
const ENODEV: i32 = 19;

/// How long a directed request may wait for its reply, in ms.
const REPLY_TIMEOUT_MS: u32 = 1000;

#[derive(Clone)]
pub struct LinuxBackend {
    osd_name: String,
}

impl LinuxBackend {
    pub fn new(osd_name: impl Into<String>) -> Self {
        Self {
            osd_name: osd_name.into(),
        }
    }
}

impl CecBackend for LinuxBackend {
    type Conn = LinuxConn;

    fn enumerate(&self) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir("/dev") else {
            return Vec::new();
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with("cec"))
            })
            .collect();
        paths.sort();
        paths
    }

    fn open(&self, path: &Path) -> Option<LinuxConn> {
        let dev = match CecDevice::open(path) {
            Ok(dev) => dev,
            Err(err) => {
                debug!("open {} failed: {err}", path.display());
                return None;
            }
        };
        // Follower mode so directed requests from peers reach our queue.
        if let Err(err) = dev.set_mode(CecModeInitiator::Send, CecModeFollower::All) {
            warn!("set mode on {} failed: {err}", path.display());
            return None;
        }
        Some(LinuxConn {
            dev,
            osd_name: self.osd_name.clone(),
            first_state_change: Cell::new(true),
        })
    }
}

pub struct LinuxConn {
    dev: CecDevice,
    osd_name: String,
    // The kernel queues one state-change event at open reflecting the
    // initial state; `cec_linux` does not expose the event flag, so the
    // first one seen on this handle is treated as it.
    first_state_change: Cell<bool>,
}

impl LinuxConn {
    /// Logical address the adapter has claimed, as transmit source.
    fn source(&self) -> Option<CecLogicalAddress> {
        self.dev.get_log().ok()?.addresses().first().copied()
    }

    fn destination(addr: u8) -> Option<CecLogicalAddress> {
        CecLogicalAddress::try_from(addr).ok()
    }

    /// Directed request, returning the reply payload.
    fn request(&self, addr: u8, opcode: CecOpcode, reply: CecOpcode) -> Option<Vec<u8>> {
        let from = self.source()?;
        let to = Self::destination(addr)?;
        self.dev.request_data(from, to, opcode, b"", reply).ok()
    }

    /// Raw opcode byte, total: unknown opcodes pass through as-is and poll
    /// frames (no opcode) map to zero.
    fn raw_opcode(msg: &CecMsg) -> u8 {
        match msg.opcode() {
            Some(Ok(opcode)) => opcode.into(),
            Some(Err(err)) => err.number,
            None => 0,
        }
    }
}

impl CecConn for LinuxConn {
    fn info(&self) -> Option<AdapterInfo> {
        let caps = self.dev.get_capas().ok()?;
        let log = self.dev.get_log().ok()?;
        let physical_address = self
            .dev
            .get_phys()
            .map(|phys| phys.to_num())
            .unwrap_or(0xffff);
        let claimed = log.addresses();
        Some(AdapterInfo {
            adapter: format!("{} ({})", caps.name(), caps.driver()),
            osd_name: log.osd_name.to_string(),
            caps: AdapterCaps::from_bits_truncate(caps.capabilities().bits()),
            available_logical_addresses: caps.available_log_addrs(),
            physical_address,
            logical_address: claimed.first().map(|addr| (*addr).into()).unwrap_or(0xff),
            logical_address_count: claimed.len() as u8,
            logical_address_mask: log.mask().bits(),
        })
    }

    fn can_transmit(&self) -> bool {
        self.info()
            .is_some_and(|info| info.caps.contains(AdapterCaps::TRANSMIT))
    }

    fn can_set_logical_address(&self) -> bool {
        self.info()
            .is_some_and(|info| info.caps.contains(AdapterCaps::LOG_ADDRS))
    }

    fn set_logical_address(&self, device_type: CecDeviceType) -> bool {
        // Clear any previously claimed addresses first; S_LOG_ADDRS is
        // rejected while addresses are defined.
        if self.dev.set_log(CecLogAddrs::default()).is_err() {
            return false;
        }
        let (primary, log_type) = match device_type {
            CecDeviceType::Unregistered => return true,
            CecDeviceType::Tv => (CecPrimDevType::TV, CecLogAddrType::TV),
            CecDeviceType::Record => (CecPrimDevType::RECORD, CecLogAddrType::RECORD),
            CecDeviceType::Playback => (CecPrimDevType::PLAYBACK, CecLogAddrType::PLAYBACK),
            CecDeviceType::Tuner => (CecPrimDevType::TUNER, CecLogAddrType::TUNER),
            CecDeviceType::Audio => (CecPrimDevType::AUDIOSYSTEM, CecLogAddrType::AUDIOSYSTEM),
            CecDeviceType::Processor => (CecPrimDevType::PROCESSOR, CecLogAddrType::SPECIFIC),
        };
        let log = CecLogAddrs::new(
            VendorID::NONE,
            Version::V1_4,
            self.osd_name.clone().try_into().unwrap_or_default(),
            &[primary],
            &[log_type],
        );
        match self.dev.set_log(log) {
            Ok(()) => true,
            Err(err) => {
                warn!("claiming logical address failed: {err}");
                false
            }
        }
    }

    fn detect_devices(&self) -> Vec<u8> {
        // 15 is broadcast, never a peer.
        (0u8..15).filter(|addr| self.ping(*addr)).collect()
    }

    fn ping(&self, addr: u8) -> bool {
        let Some(from) = self.source() else {
            return false;
        };
        let Some(to) = Self::destination(addr) else {
            return false;
        };
        // Ack of a 1-byte poll frame proves the peer is on the bus.
        self.dev.transmit_poll(from, to).is_ok()
    }

    fn physical_address_of(&self, addr: u8) -> Option<u16> {
        let data = self.request(addr, CecOpcode::GivePhysicalAddr, CecOpcode::ReportPhysicalAddr)?;
        if data.len() < 2 {
            return None;
        }
        Some(u16::from_be_bytes([data[0], data[1]]))
    }

    fn vendor_id_of(&self, addr: u8) -> Option<u32> {
        let data = self.request(addr, CecOpcode::GiveDeviceVendorId, CecOpcode::DeviceVendorId)?;
        if data.len() < 3 {
            return None;
        }
        Some(u32::from_be_bytes([0, data[0], data[1], data[2]]))
    }

    fn osd_name_of(&self, addr: u8) -> Option<String> {
        let data = self.request(addr, CecOpcode::GiveOsdName, CecOpcode::SetOsdName)?;
        Some(String::from_utf8_lossy(&data).into_owned())
    }

    fn power_status_of(&self, addr: u8) -> CecPowerState {
        match self.request(
            addr,
            CecOpcode::GiveDevicePowerStatus,
            CecOpcode::ReportPowerStatus,
        ) {
            Some(data) if !data.is_empty() => CecPowerState::from(data[0]),
            _ => CecPowerState::Unknown,
        }
    }

    fn active_source_of(&self) -> Option<u16> {
        // RequestActiveSource is a broadcast, so the reply cannot be matched
        // by the kernel; drain the receive queue for it instead.
        if !self.request_active_source() {
            return None;
        }
        let deadline = Instant::now() + Duration::from_millis(u64::from(REPLY_TIMEOUT_MS));
        while Instant::now() < deadline {
            let Ok(msg) = self.dev.rec_for(100) else {
                continue;
            };
            if msg.sequence == 0 && matches!(msg.opcode(), Some(Ok(CecOpcode::ActiveSource))) {
                let params = msg.parameters();
                if params.len() >= 2 {
                    return Some(u16::from_be_bytes([params[0], params[1]]));
                }
            }
        }
        None
    }

    fn broadcast_active_source(&self, phys_addr: u16) -> bool {
        let Some(from) = self.source() else {
            return false;
        };
        self.dev
            .transmit_data(
                from,
                CecLogicalAddress::UnregisteredBroadcast,
                CecOpcode::ActiveSource,
                &phys_addr.to_be_bytes(),
            )
            .is_ok()
    }

    fn request_active_source(&self) -> bool {
        let Some(from) = self.source() else {
            return false;
        };
        self.dev
            .transmit(
                from,
                CecLogicalAddress::UnregisteredBroadcast,
                CecOpcode::RequestActiveSource,
            )
            .is_ok()
    }

    fn report_power_status(&self, to: u8) -> bool {
        let Some(from) = self.source() else {
            return false;
        };
        let Some(to) = Self::destination(to) else {
            return false;
        };
        // 0x00 is "On".
        self.dev
            .transmit_data(from, to, CecOpcode::ReportPowerStatus, &[0x00])
            .is_ok()
    }

    fn set_stream_path(&self, phys_addr: u16) -> bool {
        let Some(from) = self.source() else {
            return false;
        };
        self.dev
            .transmit_data(
                from,
                CecLogicalAddress::UnregisteredBroadcast,
                CecOpcode::SetStreamPath,
                &phys_addr.to_be_bytes(),
            )
            .is_ok()
    }

    fn poll_message(&self) -> CecBusMsg {
        let mut out = CecBusMsg::default();
        let flags = match self.dev.poll(
            PollFlags::POLLIN | PollFlags::POLLRDNORM | PollFlags::POLLPRI,
            PollTimeout::ZERO,
        ) {
            Ok(flags) => flags,
            Err(_) => return out,
        };

        if flags.intersects(PollFlags::POLLPRI) {
            if let Ok(event) = self.dev.get_event() {
                out.has_event = true;
                match event {
                    CecEvent::StateChange(change) => {
                        out.state_change = true;
                        out.state_change_phys_addr = change.phys_addr.to_num();
                        out.initial_state = self.first_state_change.replace(false);
                    }
                    CecEvent::LostMsgs(lost) => {
                        out.lost_events = lost.lost_msgs;
                        warn!("lost {} bus messages", lost.lost_msgs);
                    }
                }
            }
            return out;
        }

        if flags.intersects(PollFlags::POLLIN | PollFlags::POLLRDNORM) {
            match self.dev.rec() {
                Ok(msg) => {
                    out.has_event = true;
                    out.has_message = true;
                    out.from = u8::from(msg.initiator());
                    out.to = u8::from(msg.destination());
                    out.opcode = Self::raw_opcode(&msg);
                    // Messages with a sequence are results of our own
                    // transmits surfacing back through the queue.
                    out.transmitted = msg.sequence != 0;
                    out.status = if out.transmitted {
                        msg.tx_status.bits()
                    } else {
                        msg.rx_status.bits()
                    };
                    let params = msg.parameters();
                    match out.opcode {
                        op if op == u8::from(CecOpcode::SetStreamPath)
                            || op == u8::from(CecOpcode::ActiveSource) =>
                        {
                            if params.len() >= 2 {
                                out.address = u16::from_be_bytes([params[0], params[1]]);
                            }
                        }
                        op if op == u8::from(CecOpcode::UserControlPressed)
                            || op == u8::from(CecOpcode::UserControlReleased) =>
                        {
                            if !params.is_empty() {
                                out.command = params[0];
                            }
                        }
                        _ => {}
                    }
                }
                Err(err) if err.raw_os_error() == Some(ENODEV) => {
                    out.has_event = true;
                    out.disconnected = true;
                }
                Err(_) => {}
            }
        }
        out
    }
}
