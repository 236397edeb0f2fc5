//! End-to-end controller scenarios over a scripted in-memory backend.

use {
    cec_control::{
        adapter::Cec,
        backend::{AdapterInfo, CecBackend, CecConn},
        cancel::CancelToken,
        controller::{CecController, KeySink},
        daemon::{self, next_step, Step},
        message::CecBusMsg,
        types::{
            AdapterCaps, CecDeviceType, CecMessageType, CecNetworkDeviceType, CecPowerState,
            CecUserControlKey,
        },
        wait::Wait,
    },
    std::{
        collections::VecDeque,
        path::{Path, PathBuf},
        sync::{Arc, Mutex},
        time::Duration,
    },
};

const LOCAL_PHYS_ADDR: u16 = 0x3300;

struct Shared {
    registration_succeeds: bool,
    registered: bool,
    power: CecPowerState,
    active_source: Option<u16>,
    report_power_ok: bool,
    events: VecDeque<CecBusMsg>,
    transmits: Vec<&'static str>,
}

impl Default for Shared {
    fn default() -> Self {
        Self {
            registration_succeeds: true,
            registered: false,
            power: CecPowerState::On,
            active_source: None,
            report_power_ok: true,
            events: VecDeque::new(),
            transmits: Vec::new(),
        }
    }
}

#[derive(Clone, Default)]
struct MockBackend {
    shared: Arc<Mutex<Shared>>,
}

impl MockBackend {
    fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut Shared) -> R) -> R {
        f(&mut self.shared.lock().unwrap())
    }

    fn push_event(&self, msg: CecBusMsg) {
        self.with(|shared| shared.events.push_back(msg));
    }

    fn transmits(&self) -> Vec<&'static str> {
        self.with(|shared| shared.transmits.clone())
    }
}

struct MockConn {
    shared: Arc<Mutex<Shared>>,
}

impl MockConn {
    fn with<R>(&self, f: impl FnOnce(&mut Shared) -> R) -> R {
        f(&mut self.shared.lock().unwrap())
    }
}

impl CecBackend for MockBackend {
    type Conn = MockConn;

    fn enumerate(&self) -> Vec<PathBuf> {
        vec![PathBuf::from("/dev/cec-mock")]
    }

    fn open(&self, _path: &Path) -> Option<MockConn> {
        Some(MockConn {
            shared: self.shared.clone(),
        })
    }
}

impl CecConn for MockConn {
    fn info(&self) -> Option<AdapterInfo> {
        self.with(|shared| {
            Some(AdapterInfo {
                adapter: "mock".into(),
                osd_name: "mock".into(),
                caps: AdapterCaps::LOG_ADDRS | AdapterCaps::TRANSMIT,
                available_logical_addresses: 4,
                physical_address: LOCAL_PHYS_ADDR,
                logical_address: if shared.registered { 4 } else { 0xff },
                logical_address_count: u8::from(shared.registered),
                logical_address_mask: if shared.registered { 0x10 } else { 0 },
            })
        })
    }

    fn can_transmit(&self) -> bool {
        true
    }

    fn can_set_logical_address(&self) -> bool {
        true
    }

    fn set_logical_address(&self, _device_type: CecDeviceType) -> bool {
        self.with(|shared| {
            shared.registered = shared.registration_succeeds;
            shared.registered
        })
    }

    fn detect_devices(&self) -> Vec<u8> {
        vec![0]
    }

    fn ping(&self, addr: u8) -> bool {
        addr == 0
    }

    fn physical_address_of(&self, _addr: u8) -> Option<u16> {
        Some(0x0000)
    }

    fn vendor_id_of(&self, _addr: u8) -> Option<u32> {
        Some(0x080046)
    }

    fn osd_name_of(&self, _addr: u8) -> Option<String> {
        Some("TV".into())
    }

    fn power_status_of(&self, _addr: u8) -> CecPowerState {
        self.with(|shared| shared.power)
    }

    fn active_source_of(&self) -> Option<u16> {
        self.with(|shared| shared.active_source)
    }

    fn broadcast_active_source(&self, _phys_addr: u16) -> bool {
        self.with(|shared| shared.transmits.push("active_source"));
        true
    }

    fn request_active_source(&self) -> bool {
        self.with(|shared| shared.transmits.push("request_active_source"));
        true
    }

    fn report_power_status(&self, _to: u8) -> bool {
        self.with(|shared| {
            shared.transmits.push("report_power");
            shared.report_power_ok
        })
    }

    fn set_stream_path(&self, _phys_addr: u16) -> bool {
        self.with(|shared| shared.transmits.push("set_stream_path"));
        true
    }

    fn poll_message(&self) -> CecBusMsg {
        self.with(|shared| shared.events.pop_front().unwrap_or_default())
    }
}

fn received(opcode: CecMessageType) -> CecBusMsg {
    CecBusMsg {
        has_event: true,
        has_message: true,
        opcode: u8::from(opcode),
        ..Default::default()
    }
}

fn open_registered(backend: &MockBackend) -> Cec<MockBackend> {
    let mut cec = Cec::enumerate(backend).into_iter().next().unwrap();
    cec.open();
    assert!(cec.set_type(CecDeviceType::Playback));
    assert!(cec.is_registered());
    cec
}

struct RecordingSink(Vec<CecUserControlKey>);

impl KeySink for RecordingSink {
    fn emit_key(&mut self, key: CecUserControlKey) {
        self.0.push(key);
    }
}

#[test]
fn failed_registration_is_skipped() {
    let backend = MockBackend::new();
    backend.with(|shared| shared.registration_succeeds = false);

    let mut cec = Cec::enumerate(&backend).into_iter().next().unwrap();
    cec.open();
    assert!(cec.opened());
    assert!(!cec.set_type(CecDeviceType::Playback));
    assert!(!cec.is_registered());
    assert!(cec.create_device(CecNetworkDeviceType::Tv).is_none());

    let err = daemon::register(&backend, CecDeviceType::Playback, CecNetworkDeviceType::Tv);
    assert!(matches!(err, Err(daemon::Error::NoAdapter)));
}

#[test]
fn register_claims_adapter_with_live_peer() {
    let backend = MockBackend::new();
    let cec = daemon::register(&backend, CecDeviceType::Playback, CecNetworkDeviceType::Tv)
        .expect("adapter with live TV");
    assert!(cec.is_registered());
    assert_eq!(cec.physical_address(), Some(LOCAL_PHYS_ADDR));
}

#[test]
fn already_active_source_skips_handshake() {
    let backend = MockBackend::new();
    backend.with(|shared| {
        shared.power = CecPowerState::On;
        shared.active_source = Some(LOCAL_PHYS_ADDR);
    });

    let cec = open_registered(&backend);
    let mut tv = cec.create_device(CecNetworkDeviceType::Tv).unwrap();
    assert!(tv.is_active_source_current_device());
    assert_eq!(
        next_step(tv.power_state(), tv.is_active_source_current_device()),
        Step::ForwardKeys,
    );
}

#[test]
fn powered_off_peer_waits_before_handshake() {
    let backend = MockBackend::new();
    backend.with(|shared| shared.power = CecPowerState::StandBy);

    let cec = open_registered(&backend);
    let mut tv = cec.create_device(CecNetworkDeviceType::Tv).unwrap();
    assert_eq!(
        next_step(tv.power_state(), tv.is_active_source_current_device()),
        Step::WaitForPower,
    );
}

#[test]
fn handshake_answers_queries_until_stream_path() {
    let backend = MockBackend::new();
    backend.push_event(CecBusMsg::default());
    backend.push_event(received(CecMessageType::GiveDevicePowerStatus));
    let mut stream_path = received(CecMessageType::SetStreamPath);
    stream_path.address = LOCAL_PHYS_ADDR;
    backend.push_event(stream_path);

    let cec = open_registered(&backend);
    let tv = cec.create_device(CecNetworkDeviceType::Tv).unwrap();
    let controller = CecController::new(&cec, CancelToken::new());

    let hit = controller.cycle_msg_until(5, &tv, CecMessageType::SetStreamPath);
    let hit = hit.expect("stream path routed to us");
    assert_eq!(hit.address, LOCAL_PHYS_ADDR);
    assert_eq!(backend.transmits(), vec!["report_power", "active_source"]);
}

#[test]
fn handshake_ignores_stream_path_to_other_device() {
    let backend = MockBackend::new();
    let mut elsewhere = received(CecMessageType::SetStreamPath);
    elsewhere.address = 0x1200;
    backend.push_event(elsewhere);

    let cec = open_registered(&backend);
    let tv = cec.create_device(CecNetworkDeviceType::Tv).unwrap();
    let controller = CecController::new(&cec, CancelToken::new());

    let hit = controller.cycle_msg_until(1, &tv, CecMessageType::SetStreamPath);
    assert!(hit.is_none());
    assert!(backend.transmits().is_empty());
}

#[test]
fn rejected_power_report_does_not_abort_handshake() {
    let backend = MockBackend::new();
    backend.with(|shared| shared.report_power_ok = false);
    backend.push_event(received(CecMessageType::GiveDevicePowerStatus));
    let mut stream_path = received(CecMessageType::SetStreamPath);
    stream_path.address = LOCAL_PHYS_ADDR;
    backend.push_event(stream_path);

    let cec = open_registered(&backend);
    let tv = cec.create_device(CecNetworkDeviceType::Tv).unwrap();
    let controller = CecController::new(&cec, CancelToken::new());

    assert!(controller
        .cycle_msg_until(5, &tv, CecMessageType::SetStreamPath)
        .is_some());
    // The failed answer was still attempted and the wait carried on.
    assert_eq!(backend.transmits(), vec!["report_power", "active_source"]);
}

#[test]
fn remote_keys_reach_the_sink() {
    let backend = MockBackend::new();
    let mut up = received(CecMessageType::UserControlPressed);
    up.command = 0x01;
    backend.push_event(up);
    let mut unmapped = received(CecMessageType::UserControlPressed);
    unmapped.command = 0x7f;
    backend.push_event(unmapped);
    backend.push_event(received(CecMessageType::UserControlReleased));

    let cec = open_registered(&backend);
    let controller = CecController::new(&cec, CancelToken::new());

    let mut sink = RecordingSink(Vec::new());
    let emitted = controller.handle_remote_pressed(1, &mut sink);
    assert_eq!(emitted, 1);
    assert_eq!(sink.0, vec![CecUserControlKey::Up]);
}

#[test]
fn cancelled_token_stops_waits_immediately() {
    let backend = MockBackend::new();
    backend.push_event(received(CecMessageType::SetStreamPath));

    let cec = open_registered(&backend);
    let token = CancelToken::new();
    token.cancel();
    let controller = CecController::new(&cec, token);

    assert!(!controller.wait_for_message(CecMessageType::SetStreamPath, 60));
    // Never even polled the queue.
    assert!(backend.with(|shared| shared.events.len()) == 1);
}

#[test]
fn active_source_discovery_reads_state_change() {
    let backend = MockBackend::new();
    backend.push_event(CecBusMsg {
        has_event: true,
        state_change: true,
        initial_state: true,
        state_change_phys_addr: 0x1000,
        ..Default::default()
    });

    let cec = open_registered(&backend);
    let tv = cec.create_device(CecNetworkDeviceType::Tv).unwrap();
    let controller = CecController::new(&cec, CancelToken::new());

    assert_eq!(controller.get_active_source(&tv), Some(0x1000));
    assert_eq!(backend.transmits(), vec!["request_active_source"]);
}

#[test]
fn wait_for_message_matches_exact_opcode() {
    let backend = MockBackend::new();
    backend.push_event(received(CecMessageType::GiveOsdName));
    backend.push_event(received(CecMessageType::ActiveSource));

    let cec = open_registered(&backend);
    let controller = CecController::new(&cec, CancelToken::new());
    assert!(controller.wait_for_message(CecMessageType::ActiveSource, 5));
}

#[test]
fn transmit_echoes_are_filtered() {
    let backend = MockBackend::new();
    let mut echo = received(CecMessageType::ActiveSource);
    echo.transmitted = true;
    backend.push_event(echo);

    let cec = open_registered(&backend);
    let controller = CecController::new(&cec, CancelToken::new());
    assert!(!controller.wait_for_message(CecMessageType::ActiveSource, 1));
}

#[test]
fn device_listing_reports_peers() {
    let backend = MockBackend::new();
    let cec = open_registered(&backend);
    let devices = cec.devices().expect("registered adapter lists devices");
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].slot(), CecNetworkDeviceType::Tv);
}

#[test]
fn power_state_is_briefly_memoized() {
    let backend = MockBackend::new();
    let cec = open_registered(&backend);
    let mut tv = cec.create_device(CecNetworkDeviceType::Tv).unwrap();

    assert!(tv.is_power_on());
    backend.with(|shared| shared.power = CecPowerState::StandBy);
    // Within the TTL the cached answer holds.
    assert!(tv.is_power_on());
}

#[test]
fn closed_adapter_answers_nothing() {
    let backend = MockBackend::new();
    let mut cec = open_registered(&backend);
    cec.close();
    assert!(!cec.opened());
    assert!(!cec.is_registered());
    assert!(!cec.poll_message().is_interesting(true));
}

#[test]
fn source_setters_transmit_broadcasts() {
    let backend = MockBackend::new();
    let cec = open_registered(&backend);
    let tv = cec.create_device(CecNetworkDeviceType::Tv).unwrap();

    assert!(tv.set_stream_path(0x1000));
    assert!(tv.set_active_source(LOCAL_PHYS_ADDR).is_ok());
    assert_eq!(backend.transmits(), vec!["set_stream_path", "active_source"]);
}

#[test]
fn wait_budget_bounds_event_bursts() {
    let backend = MockBackend::new();
    for _ in 0..10 {
        backend.push_event(received(CecMessageType::GiveOsdName));
    }

    let cec = open_registered(&backend);
    let controller = CecController::new(&cec, CancelToken::new());
    let wait = Wait::new(Duration::from_secs(60)).max_count(3);
    let hit = controller.wait_for_cec_message(wait, false, false, |_, _| false);
    assert!(hit.is_none());
    // Three events consumed, the rest left in the queue.
    assert_eq!(backend.with(|shared| shared.events.len()), 7);
}
