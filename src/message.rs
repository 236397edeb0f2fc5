//! The event record handed out by one non-blocking poll of the adapter.
//!
//! The native layer surfaces connection-state changes, received messages and
//! echoes of our own transmissions through the same queue; classification
//! here is what keeps the controller from double-counting its own traffic.

use {
    crate::types::{CecMessageType, CecRxStatus, CecTxStatus},
    std::fmt,
};

/// One polled bus event. All-false/zeroed (`Default`) means nothing was
/// pending. A single event carries at most one of {state change, message};
/// `disconnected` may co-occur with a transmitted message when the peer
/// dropped off while we were waiting for its ack.
#[derive(Debug, Default, Clone)]
pub struct CecBusMsg {
    pub has_event: bool,
    pub initial_state: bool,
    pub state_change: bool,
    pub state_change_phys_addr: u16,
    pub lost_events: u32,
    pub has_message: bool,
    pub from: u8,
    pub to: u8,
    pub status: u8,
    pub opcode: u8,
    /// Operand reused as a physical address (SetStreamPath, ActiveSource).
    pub address: u16,
    /// Operand reused as a key code (UserControlPressed/Released).
    pub command: u8,
    pub transmitted: bool,
    pub disconnected: bool,
}

impl CecBusMsg {
    /// Total decode of the opcode; unknown codes classify as
    /// [CecMessageType::Unknown], never as a failure.
    pub fn message_type(&self) -> CecMessageType {
        CecMessageType::from(self.opcode)
    }

    /// An event is worth handling iff it is a genuine event and either
    /// reports a connection state change or carries a message that we
    /// received (or any message, when echoes were opted into).
    pub fn is_interesting(&self, include_echo: bool) -> bool {
        self.has_event
            && (self.state_change
                || self.disconnected
                || (self.has_message && (!self.transmitted || include_echo)))
    }

    /// Status of a received message; only meaningful when `!transmitted`.
    pub fn rx_status(&self) -> CecRxStatus {
        CecRxStatus::from_bits_retain(self.status)
    }

    /// Status of a transmitted message; only meaningful when `transmitted`.
    pub fn tx_status(&self) -> CecTxStatus {
        CecTxStatus::from_bits_retain(self.status)
    }

    /// Direction-aware failure check on the status bits.
    pub fn is_failed(&self) -> bool {
        if !self.has_message {
            return false;
        }
        if self.transmitted {
            self.tx_status().is_failure()
        } else {
            self.rx_status().is_failure()
        }
    }
}

impl fmt::Display for CecBusMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.has_event {
            return write!(f, "idle");
        }
        if self.state_change {
            return write!(
                f,
                "state change{}: phys addr {}",
                if self.initial_state { " (initial)" } else { "" },
                crate::types::phys_addr_text(self.state_change_phys_addr)
            );
        }
        if self.has_message {
            write!(
                f,
                "{} {} to {}: {:?}",
                if self.transmitted {
                    "transmitted by"
                } else {
                    "received from"
                },
                self.from,
                self.to,
                self.message_type(),
            )?;
            if self.is_failed() {
                if self.transmitted {
                    write!(f, " [{:?}]", self.tx_status())?;
                } else {
                    write!(f, " [{:?}]", self.rx_status())?;
                }
            }
            if self.disconnected {
                write!(f, " (disconnected)")?;
            }
            return Ok(());
        }
        if self.disconnected {
            return write!(f, "disconnected");
        }
        write!(f, "event")
    }
}
