//! SIGINT / SIGTERM handling.
//!
//! The handler only flips a [`CancellationToken`], every loop of the relay
//! polls it and winds down on its own.

use std::sync::OnceLock;

use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use walkie_utils::CancellationToken;

use crate::RelayError;

static SIGNAL_TOKEN: OnceLock<CancellationToken> = OnceLock::new();

extern "C" fn on_signal(_signal: nix::libc::c_int) {
    // an atomic load and an atomic store, nothing else
    if let Some(token) = SIGNAL_TOKEN.get() {
        token.cancel();
    }
}

/// Cancels `token` on SIGINT or SIGTERM. Can only be installed once per process.
pub fn install(token: &CancellationToken) -> Result<(), RelayError> {
    SIGNAL_TOKEN
        .set(token.clone())
        .map_err(|_| RelayError::Signal(nix::errno::Errno::EBUSY))?;

    let action = SigAction::new(
        SigHandler::Handler(on_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );

    for signal in [Signal::SIGINT, Signal::SIGTERM] {
        // SAFETY: the handler is async-signal-safe, see `on_signal`.
        unsafe { sigaction(signal, &action) }.map_err(RelayError::Signal)?;
    }

    Ok(())
}
