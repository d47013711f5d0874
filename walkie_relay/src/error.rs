//! Error types of the relay.

use std::{io, path::PathBuf};

use walkie_dma::DmaError;
use walkie_net::TransportError;

use crate::{codec::CodecError, ptt::GpioError};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Everything that can stop the relay, or make it drop a frame.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("DMA: {0}")]
    Dma(#[from] DmaError),
    #[error("network: {0}")]
    Transport(#[from] TransportError),
    #[error("codec: {0}")]
    Codec(#[from] CodecError),
    #[error("GPIO: {0}")]
    Gpio(#[from] GpioError),
    #[error("decoded {actual} samples, expected {expected}")]
    DecodeMismatch { expected: usize, actual: usize },
    #[error("failed to install signal handlers: {0}")]
    Signal(#[source] nix::errno::Errno),
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("{0} thread panicked")]
    WorkerPanicked(&'static str),
}
