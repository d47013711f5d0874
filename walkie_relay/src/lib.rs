//! Push-to-talk audio relay between embedded boards.
//!
//! Each board captures microphone audio through its DMA engine, compresses it,
//! and sends it over UDP while its push-to-talk button is held. Meanwhile it
//! receives, decompresses and plays the bursts other boards send.
//!
//! ## Threads
//!
//! A running [`Relay`] uses three threads:
//!
//! - the **transmit** thread ([`TransmitPath`]) samples the button, sends START
//!   on press and END on release, and relays one captured frame per frame period
//!   while the button is held.
//! - the **receive** thread ([`ReceivePath`]) waits for packets, tracks which
//!   board is talking, and plays its audio frames.
//! - the calling thread reports statistics and waits for shutdown.
//!
//! The loops share a [`Session`], and never touch each other's DMA buffer.
//!
//! ## Half duplex
//!
//! While the local button is held, received audio is discarded, so a board
//! never plays back while it is talking. Packets carrying the board's own id are
//! dropped when self mute is enabled, which is the default for multicast where
//! boards hear their own traffic.
//!
//! Every failure inside the loops costs at most one frame: it is logged,
//! counted, and the loop carries on.

pub mod codec;
pub mod config;
mod error;
pub mod identity;
pub mod logging;
pub mod ptt;
mod receive;
mod relay;
mod session;
pub mod shutdown;
mod transmit;

pub use config::{RelayConfig, Timing};
pub use error::{ConfigError, RelayError};
pub use ptt::{Indicator, PttControl};
pub use receive::{Disposition, ReceivePath};
pub use relay::{Relay, RelaySettings};
pub use session::{Session, Stats};
pub use transmit::TransmitPath;
