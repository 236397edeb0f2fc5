//! Vocabulary shared by the adapter boundary, the device model and the bus
//! controller. Raw wire bytes convert into these enums totally: anything the
//! bus can throw at us decodes, unknown codes land in an explicit fallback.

use {
    bitflags::bitflags,
    num_enum::{FromPrimitive, IntoPrimitive, TryFromPrimitive},
};

/// Device role requested when claiming a logical address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CecDeviceType {
    Unregistered,
    Tv,
    Record,
    Playback,
    Tuner,
    Audio,
    Processor,
}

/// Network-position slot of a peer; the value is its logical address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum CecNetworkDeviceType {
    Tv = 0,
    RecordingDevice1 = 1,
    RecordingDevice2 = 2,
    Tuner1 = 3,
    PlaybackDevice1 = 4,
    AudioSystem = 5,
    Tuner2 = 6,
    Tuner3 = 7,
    PlaybackDevice2 = 8,
    RecordingDevice3 = 9,
    Tuner4 = 10,
    PlaybackDevice3 = 11,
    Backup1 = 12,
    Backup2 = 13,
    Specific = 14,
    Unregistered = 15,
}

impl CecNetworkDeviceType {
    pub fn logical_address(self) -> u8 {
        self.into()
    }
}

/// Power status a peer reports for itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum CecPowerState {
    On = 0,
    StandBy = 1,
    ToOn = 2,
    ToStandBy = 3,
    #[num_enum(default)]
    Unknown = 15,
}

/// Message opcodes the controller classifies. The catch-all keeps
/// classification total; nothing off the wire can fail to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum CecMessageType {
    FeatureAbort = 0x00,
    GiveTunerDeviceStatus = 0x08,
    GiveDeckStatus = 0x1a,
    ImageViewOn = 0x04,
    Standby = 0x36,
    UserControlPressed = 0x44,
    UserControlReleased = 0x45,
    GiveOsdName = 0x46,
    SetOsdName = 0x47,
    GiveAudioStatus = 0x71,
    GiveSystemAudioModeStatus = 0x7d,
    ActiveSource = 0x82,
    GivePhysicalAddress = 0x83,
    ReportPhysicalAddress = 0x84,
    RequestActiveSource = 0x85,
    SetStreamPath = 0x86,
    DeviceVendorId = 0x87,
    GiveDeviceVendorId = 0x8c,
    GiveDevicePowerStatus = 0x8f,
    ReportPowerStatus = 0x90,
    GetMenuLanguage = 0x91,
    GiveFeatures = 0xa5,
    #[num_enum(catch_all)]
    Unknown(u8),
}

/// Remote-control key codes carried by UserControlPressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum CecUserControlKey {
    Select = 0x00,
    Up = 0x01,
    Down = 0x02,
    Left = 0x03,
    Right = 0x04,
    RightUp = 0x05,
    RightDown = 0x06,
    LeftUp = 0x07,
    LeftDown = 0x08,
    ContentsMenu = 0x0b,
    Back = 0x0d,
    Num0 = 0x20,
    Num1 = 0x21,
    Num2 = 0x22,
    Num3 = 0x23,
    Num4 = 0x24,
    Num5 = 0x25,
    Num6 = 0x26,
    Num7 = 0x27,
    Num8 = 0x28,
    Num9 = 0x29,
    Enter = 0x2b,
    Clear = 0x2c,
    ChannelUp = 0x30,
    ChannelDown = 0x31,
    PreviousChannel = 0x32,
    SoundSelect = 0x33,
    InputSelect = 0x34,
    DisplayInformation = 0x35,
    Help = 0x36,
    Power = 0x40,
    VolumeUp = 0x41,
    VolumeDown = 0x42,
    Mute = 0x43,
    Play = 0x44,
    Stop = 0x45,
    Pause = 0x46,
    #[num_enum(catch_all)]
    Unknown(u8),
}

bitflags! {
    /// Receive status bits of a message we received. Decoding retains
    /// unrecognized bits rather than failing.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct CecRxStatus: u8 {
        const OK = 0x01;
        /// The reply to an earlier transmit timed out.
        const TIMEOUT = 0x02;
        const FEATURE_ABORT = 0x04;
    }

    /// Transmit status bits of a message we sent.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct CecTxStatus: u8 {
        const OK = 0x01;
        /// Line arbitration was lost.
        const ARB_LOST = 0x02;
        const NACK = 0x04;
        /// A follower saw an error on the bus and asks for retransmission.
        const LOW_DRIVE = 0x08;
        const ERROR = 0x10;
        /// Gave up after retries; mutually exclusive with OK.
        const MAX_RETRIES = 0x20;
    }
}

impl CecRxStatus {
    pub fn is_failure(self) -> bool {
        !self.is_empty() && !self.contains(Self::OK)
    }
}

impl CecTxStatus {
    pub fn is_failure(self) -> bool {
        !self.is_empty() && !self.contains(Self::OK)
    }
}

bitflags! {
    /// Adapter capability bits surfaced by the driver boundary.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct AdapterCaps: u32 {
        /// Userspace configures the physical address.
        const PHYS_ADDR = 0x01;
        /// Userspace can claim logical addresses.
        const LOG_ADDRS = 0x02;
        /// Userspace can transmit messages.
        const TRANSMIT = 0x04;
    }
}

/// Render a 16-bit physical address as the usual four-nibble dotted form.
pub fn phys_addr_text(addr: u16) -> String {
    format!(
        "{:x}.{:x}.{:x}.{:x}",
        addr >> 12,
        (addr >> 8) & 0xf,
        (addr >> 4) & 0xf,
        addr & 0xf
    )
}

/// Map a 24-bit vendor OUI to a display name. Unknown ids are not an error,
/// they render as an empty string.
pub fn vendor_name(id: u32) -> &'static str {
    match id {
        0x000039 | 0x000CE7 => "Toshiba",
        0x0000F0 => "Samsung",
        0x0005CD => "Denon",
        0x000678 => "Marantz",
        0x000982 => "Loewe",
        0x0009B0 => "Onkyo",
        0x000C03 => "HDMI",
        0x001582 => "Pulse-Eight",
        0x001950 | 0x9C645E => "Harman Kardon",
        0x001A11 => "Google",
        0x0020C7 => "Akai",
        0x002467 => "AOC",
        0x005060 => "Cisco",
        0x008045 => "Panasonic",
        0x00903E => "Philips",
        0x009053 => "Daewoo",
        0x00A0DE => "Yamaha",
        0x00D0D5 => "Grundig",
        0x00D38D => "Hospitality Profile",
        0x00E036 => "Pioneer",
        0x00E091 => "LG",
        0x08001F | 0x534850 => "Sharp",
        0x080046 => "Sony",
        0x18C086 => "Broadcom",
        0x6B746D => "Vizio",
        0x8065E9 => "Benq",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_codes_fall_back() {
        assert_eq!(CecPowerState::from(0xee), CecPowerState::Unknown);
        assert_eq!(CecMessageType::from(0xfe), CecMessageType::Unknown(0xfe));
        assert_eq!(CecUserControlKey::from(0x7f), CecUserControlKey::Unknown(0x7f));
    }

    #[test]
    fn status_bits_decode_totally() {
        let tx = CecTxStatus::from_bits_retain(0x24);
        assert!(tx.contains(CecTxStatus::NACK));
        assert!(tx.contains(CecTxStatus::MAX_RETRIES));
        assert!(tx.is_failure());
        assert!(!CecTxStatus::OK.is_failure());
        // empty means the driver reported nothing, not a failure
        assert!(!CecTxStatus::empty().is_failure());

        // unrecognized bits are retained, never an error
        let rx = CecRxStatus::from_bits_retain(0x81);
        assert!(rx.contains(CecRxStatus::OK));
        assert!(!rx.is_failure());
        assert!(CecRxStatus::TIMEOUT.is_failure());
    }

    #[test]
    fn known_codes_decode() {
        assert_eq!(CecPowerState::from(0), CecPowerState::On);
        assert_eq!(CecMessageType::from(0x86), CecMessageType::SetStreamPath);
        assert_eq!(CecUserControlKey::from(0x01), CecUserControlKey::Up);
    }

    #[test]
    fn slot_is_logical_address() {
        assert_eq!(CecNetworkDeviceType::Tv.logical_address(), 0);
        assert_eq!(CecNetworkDeviceType::PlaybackDevice1.logical_address(), 4);
        assert_eq!(CecNetworkDeviceType::try_from(5u8), Ok(CecNetworkDeviceType::AudioSystem));
    }

    #[test]
    fn vendor_lookup() {
        assert_eq!(vendor_name(0x080046), "Sony");
        assert_eq!(vendor_name(0xdeadbe), "");
    }

    #[test]
    fn phys_addr_rendering() {
        assert_eq!(phys_addr_text(0x3300), "3.3.0.0");
        assert_eq!(phys_addr_text(0x0000), "0.0.0.0");
    }
}
