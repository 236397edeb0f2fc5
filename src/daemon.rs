//! One-time setup and the top-level control loop: pick an adapter, claim a
//! logical address, find the peer we serve, then hand the bus to the
//! controller until cancelled.

use {
    crate::{
        adapter::Cec,
        backend::CecBackend,
        cancel::CancelToken,
        controller::{CecController, KeySink},
        device::CecNetworkDevice,
        types::{CecDeviceType, CecMessageType, CecNetworkDeviceType, CecPowerState},
        wait::Wait,
    },
    log::{debug, info, warn},
    std::time::Duration,
};

/// Ceiling on one power-state wait before the outer loop condition is
/// re-checked.
const POWER_POLL_WINDOW: Duration = Duration::from_secs(600);
/// Interval between power-state queries while the peer is off.
const POWER_POLL_SLEEP: Duration = Duration::from_secs(5);
/// How long one handshake round waits for the peer's stream-path request.
const HANDSHAKE_WINDOW_SECS: u64 = 30;
/// How long keys are forwarded before the loop re-validates the topology.
const KEY_FORWARD_WINDOW_SECS: u64 = 3600;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("no usable CEC adapter found")]
    NoAdapter,
    #[error("no active peer at slot {0:?}")]
    NoTargetDevice(CecNetworkDeviceType),
}

/// What the control loop should do next, decided purely from observed bus
/// state so the transition logic is testable without wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Peer is off (or unknown): poll its power state.
    WaitForPower,
    /// Peer is on but routes elsewhere: wait to be made the active source.
    Handshake,
    /// We are the active source: forward remote keys.
    ForwardKeys,
}

pub fn next_step(power: CecPowerState, active_source_is_us: bool) -> Step {
    if power != CecPowerState::On {
        Step::WaitForPower
    } else if active_source_is_us {
        Step::ForwardKeys
    } else {
        Step::Handshake
    }
}

/// Registration roles to try, starting with the requested one.
fn candidates(primary: CecDeviceType) -> Vec<CecDeviceType> {
    let mut out = vec![primary];
    for fallback in [
        CecDeviceType::Playback,
        CecDeviceType::Record,
        CecDeviceType::Tuner,
    ] {
        if fallback != primary {
            out.push(fallback);
        }
    }
    out
}

/// One-shot adapter and topology report.
pub fn list<B: CecBackend>(backend: &B) -> String {
    let mut out = String::new();
    for mut cec in Cec::enumerate(backend) {
        cec.open();
        out.push('\n');
        out.push_str(&cec.to_string());
        out.push('\n');
        if let Some(devices) = cec.devices() {
            out.push_str("    Network Devices:\n");
            for mut device in devices {
                out.push_str("        ");
                out.push_str(&device.report());
                out.push('\n');
            }
        }
    }
    out
}

/// Enumerate adapters and return the first one that opens, registers under
/// one of the candidate roles and has a live peer in the target slot.
pub fn register<B: CecBackend>(
    backend: &B,
    primary: CecDeviceType,
    target: CecNetworkDeviceType,
) -> Result<Cec<B>, Error> {
    let roles = candidates(primary);
    for mut cec in Cec::enumerate(backend) {
        cec.open();
        if !cec.opened() || !cec.is_active_cec() {
            debug!("skipping {}: not a usable CEC adapter", cec.path().display());
            continue;
        }
        if !cec.is_registered() && !roles.iter().any(|role| cec.set_type(*role)) {
            warn!("failed to register on {}", cec.path().display());
            continue;
        }
        if !cec.is_registered() {
            warn!("no logical address claimed on {}", cec.path().display());
            continue;
        }
        info!(
            "registered on {} as logical address {}",
            cec.path().display(),
            cec.info().map(|info| info.logical_address).unwrap_or(0xff),
        );
        let peer_alive = cec
            .create_device(target)
            .is_some_and(|device| device.is_active());
        if peer_alive {
            return Ok(cec);
        }
        warn!("no active peer at slot {target:?} via {}", cec.path().display());
    }
    Err(Error::NoAdapter)
}

/// The top-level loop: wait for the peer to power on, become the active
/// source, then forward remote keys; repeat until the token fires. Every
/// wait inside is bounded and observes the token.
pub fn monitor<B: CecBackend>(
    cec: &Cec<B>,
    target: CecNetworkDeviceType,
    token: &CancelToken,
    sink: &mut dyn KeySink,
) -> Result<(), Error> {
    let mut peer: CecNetworkDevice<'_, B> = cec
        .create_device(target)
        .ok_or(Error::NoTargetDevice(target))?;
    if !peer.is_active() {
        return Err(Error::NoTargetDevice(target));
    }

    let controller = CecController::new(cec, token.clone());
    while token.is_running() {
        match next_step(peer.power_state(), peer.is_active_source_current_device()) {
            Step::WaitForPower => {
                debug!("peer is off, polling power state");
                Wait::for_fn(POWER_POLL_WINDOW, token, POWER_POLL_SLEEP, None, || {
                    peer.is_power_on()
                });
            }
            Step::Handshake => {
                debug!("peer is on, waiting to become the active source");
                controller.cycle_msg_until(
                    HANDSHAKE_WINDOW_SECS,
                    &peer,
                    CecMessageType::SetStreamPath,
                );
            }
            Step::ForwardKeys => {
                debug!("active source established, forwarding remote keys");
                let emitted = controller.handle_remote_pressed(KEY_FORWARD_WINDOW_SECS, sink);
                debug!("forwarded {emitted} keys");
            }
        }
    }
    info!("monitor loop exited");
    Ok(())
}

/// Register, locate the TV and run the monitor loop until cancelled.
pub fn serve<B: CecBackend>(
    backend: &B,
    primary: CecDeviceType,
    token: &CancelToken,
    sink: &mut dyn KeySink,
) -> Result<(), Error> {
    let cec = register(backend, primary, CecNetworkDeviceType::Tv)?;
    if let Some(info) = cec.info() {
        info!(
            "source {} at {} with address {}",
            info.osd_name,
            cec.path().display(),
            info.physical_address_text(),
        );
    }
    monitor(&cec, CecNetworkDeviceType::Tv, token, sink)
}

/// Open the first usable adapter and log everything on the bus.
pub fn trace<B: CecBackend>(backend: &B, token: &CancelToken, secs: u64) -> Result<(), Error> {
    for mut cec in Cec::enumerate(backend) {
        cec.open();
        if cec.opened() && cec.is_active_cec() {
            CecController::new(&cec, token.clone()).trace(secs);
            return Ok(());
        }
        cec.close();
    }
    Err(Error::NoAdapter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_decision_matrix() {
        assert_eq!(next_step(CecPowerState::StandBy, false), Step::WaitForPower);
        assert_eq!(next_step(CecPowerState::Unknown, true), Step::WaitForPower);
        assert_eq!(next_step(CecPowerState::On, false), Step::Handshake);
        // on and already routed to us: straight to key forwarding
        assert_eq!(next_step(CecPowerState::On, true), Step::ForwardKeys);
    }

    #[test]
    fn candidate_roles_start_with_primary() {
        let roles = candidates(CecDeviceType::Playback);
        assert_eq!(roles[0], CecDeviceType::Playback);
        assert_eq!(roles.len(), 3);

        let roles = candidates(CecDeviceType::Audio);
        assert_eq!(roles[0], CecDeviceType::Audio);
        assert_eq!(roles.len(), 4);
    }
}
