//! The receive/classify/react loop at the heart of the daemon.
//!
//! The controller owns no persistent state machine; each public entry point
//! runs its own bounded poll loop over the adapter's non-blocking
//! [poll_message](crate::adapter::Cec::poll_message), terminated by the
//! cancellation token and a deadline/event-count budget. Absence of a
//! matching message is an ordinary outcome, not an error.

use {
    crate::{
        adapter::Cec,
        backend::CecBackend,
        cancel::CancelToken,
        device::CecNetworkDevice,
        message::CecBusMsg,
        types::{CecMessageType, CecUserControlKey},
        wait::Wait,
    },
    log::{debug, info, warn},
    std::time::Duration,
};

/// Sleep between empty polls; bounds both CPU use and cancellation latency.
const IDLE_POLL_SLEEP: Duration = Duration::from_millis(10);

/// How long the read side of active-source discovery listens for an answer.
const ACTIVE_SOURCE_WAIT: Duration = Duration::from_millis(1500);

/// Downstream consumer of decoded remote-control presses. Called inline,
/// once per key; a slow sink delays the poll loop accordingly.
pub trait KeySink {
    fn emit_key(&mut self, key: CecUserControlKey);
}

pub struct CecController<'a, B: CecBackend> {
    cec: &'a Cec<B>,
    token: CancelToken,
}

impl<'a, B: CecBackend> CecController<'a, B> {
    pub fn new(cec: &'a Cec<B>, token: CancelToken) -> Self {
        Self { cec, token }
    }

    /// Generic bounded wait: polls the adapter, hands every interesting
    /// event to `handler` and returns the first one the handler accepts.
    /// `None` means the budget ran out or the token fired first.
    ///
    /// Events count against the wait's tick budget; idle polls only burn
    /// wall-clock time. Each interesting event is logged, at info level
    /// when `log_info` is set and at debug otherwise.
    pub fn wait_for_cec_message(
        &self,
        mut wait: Wait,
        include_echo: bool,
        log_info: bool,
        mut handler: impl FnMut(&CecBusMsg, CecMessageType) -> bool,
    ) -> Option<CecBusMsg> {
        while self.token.is_running() && wait.waiting() {
            let msg = self.cec.poll_message();
            if !msg.is_interesting(include_echo) {
                std::thread::sleep(IDLE_POLL_SLEEP);
                continue;
            }
            if log_info {
                info!("cec: {msg}");
            } else {
                debug!("cec: {msg}");
            }
            let message_type = msg.message_type();
            if handler(&msg, message_type) {
                return Some(msg);
            }
            wait.tick();
        }
        debug!("wait over after {:?}", wait.elapsed());
        None
    }

    /// True iff a message of exactly this opcode is received (not echoed)
    /// within the window.
    pub fn wait_for_message(&self, message_type: CecMessageType, secs: u64) -> bool {
        self.wait_for_cec_message(Wait::secs(secs), false, false, |_, observed| {
            observed == message_type
        })
        .is_some()
    }

    /// Read side of active-source discovery: ask the bus, then wait briefly
    /// for the adapter's initial-state answer. `None` when the transmit was
    /// rejected or nobody answered in time.
    pub fn get_active_source(&self, device: &CecNetworkDevice<'_, B>) -> Option<u16> {
        if !device.request_active_source() {
            return None;
        }
        self.wait_for_cec_message(Wait::new(ACTIVE_SOURCE_WAIT), false, false, |msg, _| {
            msg.initial_state
        })
        .map(|msg| msg.state_change_phys_addr)
    }

    /// Wait for `target` while answering power-status and stream-path
    /// queries on behalf of `device` along the way. Transmit failures are
    /// logged and the wait keeps going; the peer re-asks on its own
    /// schedule.
    pub fn cycle_msg_until(
        &self,
        secs: u64,
        device: &CecNetworkDevice<'_, B>,
        target: CecMessageType,
    ) -> Option<CecBusMsg> {
        let ours = device.source_physical_address();
        self.wait_for_cec_message(Wait::secs(secs), false, false, |msg, message_type| {
            match message_type {
                CecMessageType::GiveDevicePowerStatus => {
                    if !device.report_power_on() {
                        warn!("report power on rejected, waiting for the peer to re-ask");
                    }
                }
                CecMessageType::SetStreamPath if msg.address == ours => {
                    if !device.report_active_source() {
                        warn!("report active source rejected");
                    }
                }
                _ => {}
            }
            message_type == target
                && (target != CecMessageType::SetStreamPath || msg.address == ours)
        })
    }

    /// Drain UserControlPressed events for the whole window, forwarding
    /// every decodable key to the sink. Returns how many keys were emitted.
    pub fn handle_remote_pressed(&self, secs: u64, sink: &mut dyn KeySink) -> usize {
        let mut emitted = 0;
        self.wait_for_cec_message(Wait::secs(secs), false, false, |msg, message_type| {
            if message_type == CecMessageType::UserControlPressed {
                match CecUserControlKey::from(msg.command) {
                    CecUserControlKey::Unknown(code) => {
                        debug!("no key mapping for code {code:#04x}")
                    }
                    key => {
                        sink.emit_key(key);
                        emitted += 1;
                    }
                }
            }
            // Drain until the window closes; never an early exit.
            false
        });
        emitted
    }

    /// Diagnostic sink: log every interesting event, match nothing.
    pub fn trace(&self, secs: u64) {
        self.wait_for_cec_message(Wait::secs(secs), true, true, |_, _| false);
    }
}
