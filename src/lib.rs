//! Host-side HDMI-CEC bus control: adapter enumeration and registration,
//! peer device modeling, and the event loop that keeps the host the active
//! source and forwards TV remote keys.
//!
//! Kernel access goes through [backend::CecBackend]; everything above that
//! trait is hardware independent and drives equally well against the mock
//! connections used in the integration tests.

pub mod adapter;
pub mod backend;
pub mod cache;
pub mod cancel;
pub mod controller;
pub mod daemon;
pub mod device;
pub mod message;
pub mod types;
pub mod wait;

pub use {
    adapter::Cec,
    cancel::CancelToken,
    controller::{CecController, KeySink},
    daemon::Error,
    device::CecNetworkDevice,
    message::CecBusMsg,
    wait::Wait,
};
