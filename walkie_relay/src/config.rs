//! TOML configuration of the relay.
//!
//! Every key is optional, a missing file section or key falls back to the
//! defaults of the reference hardware:
//!
//! ```toml
//! [network]
//! mode = "multicast"          # or "unicast", which requires `peer`
//! group = "239.0.0.1"
//! peer = "192.168.1.11"
//! port = 5000
//! self_mute = true            # defaults to true for multicast, false for unicast
//!
//! [audio]
//! codec = "opus"              # or "pcm"
//! sample_rate = 48000
//! samples_per_frame = 960
//! bitrate = 24000
//!
//! [gpio]
//! sysfs_root = "/sys/class/gpio"
//! ptt_pin = 78
//! tx_led_pin = 79
//! rx_led_pin = 80
//!
//! [dma]
//! device = "/dev/mem"
//! register_base = 0xA0000000
//! capture_base = 0x70000000
//! playback_base = 0x70010000
//!
//! [timing]
//! dma_timeout_ms = 100
//! recv_timeout_ms = 50
//! stats_interval_secs = 30
//! ```

use core::{
    net::{Ipv4Addr, SocketAddrV4},
    time::Duration,
};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use walkie_dma::DmaLayout;
use walkie_net::Destination;

use crate::{
    codec::{CodecKind, CodecParams, MAX_ENCODED_LEN},
    error::ConfigError,
};

/// The longest Opus frame, 120 ms at 48 kHz.
const MAX_SAMPLES_PER_FRAME: usize = 5760;

#[derive(Debug, Default, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub audio: AudioSection,
    #[serde(default)]
    pub gpio: GpioSection,
    #[serde(default)]
    pub dma: DmaSection,
    #[serde(default)]
    pub timing: TimingSection,
}

impl RelayConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Checks what deserialization alone can't.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| Err(ConfigError::Invalid(reason));

        self.network.destination()?;

        let audio = &self.audio;
        if audio.sample_rate == 0 || audio.samples_per_frame == 0 {
            return invalid("sample rate and frame size must be non-zero".into());
        }

        if audio.samples_per_frame > MAX_SAMPLES_PER_FRAME {
            return invalid(format!(
                "{} samples per frame is more than the maximum of {MAX_SAMPLES_PER_FRAME}",
                audio.samples_per_frame
            ));
        }

        if audio.codec == CodecKind::Pcm && audio.samples_per_frame * 2 > MAX_ENCODED_LEN {
            return invalid(format!(
                "{} samples per frame don't fit in a packet uncompressed",
                audio.samples_per_frame
            ));
        }

        if self.timing.stats_interval_secs == 0 {
            return invalid("stats interval must be non-zero".into());
        }

        Ok(())
    }

    /// The DMA layout for this configuration's frame size.
    pub fn dma_layout(&self) -> DmaLayout {
        DmaLayout {
            register_base: self.dma.register_base,
            register_span: self.dma.register_span,
            capture_base: self.dma.capture_base,
            playback_base: self.dma.playback_base,
            samples_per_frame: self.audio.samples_per_frame,
        }
    }

    pub fn codec_params(&self) -> CodecParams {
        CodecParams {
            sample_rate: self.audio.sample_rate,
            samples_per_frame: self.audio.samples_per_frame,
            bitrate: self.audio.bitrate,
        }
    }

    pub fn timing(&self) -> Timing {
        let t = &self.timing;
        let frame_micros = (self.audio.samples_per_frame as u64).strict_mul(1_000_000)
            / u64::from(self.audio.sample_rate.max(1));

        Timing {
            frame_period: Duration::from_micros(frame_micros),
            frame_slack: Duration::from_millis(t.frame_slack_ms),
            idle_poll: Duration::from_millis(t.idle_poll_ms),
            retry: Duration::from_millis(t.retry_ms),
            dma_timeout: Duration::from_millis(t.dma_timeout_ms),
            recv_timeout: Duration::from_millis(t.recv_timeout_ms),
            stats_interval: Duration::from_secs(t.stats_interval_secs),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    #[default]
    Multicast,
    Unicast,
}

/// The `[network]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    pub mode: NetworkMode,
    pub group: Ipv4Addr,
    pub peer: Option<Ipv4Addr>,
    pub port: u16,
    pub self_mute: Option<bool>,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            mode: NetworkMode::Multicast,
            group: walkie_net::DEFAULT_GROUP,
            peer: None,
            port: walkie_net::DEFAULT_PORT,
            self_mute: None,
        }
    }
}

impl NetworkSection {
    pub fn destination(&self) -> Result<Destination, ConfigError> {
        match self.mode {
            NetworkMode::Multicast if !self.group.is_multicast() => Err(ConfigError::Invalid(
                format!("{} is not a multicast group", self.group),
            )),
            NetworkMode::Multicast => Ok(Destination::Multicast(SocketAddrV4::new(self.group, self.port))),
            NetworkMode::Unicast => self
                .peer
                .map(|peer| Destination::Unicast(SocketAddrV4::new(peer, self.port)))
                .ok_or_else(|| ConfigError::Invalid("unicast mode needs a peer address".into())),
        }
    }

    /// Whether packets carrying our own board id are discarded.
    pub fn self_mute(&self) -> bool {
        self.self_mute
            .unwrap_or(self.mode == NetworkMode::Multicast)
    }
}

/// The `[audio]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioSection {
    pub codec: CodecKind,
    pub sample_rate: u32,
    pub samples_per_frame: usize,
    pub bitrate: u32,
}

impl Default for AudioSection {
    fn default() -> Self {
        Self {
            codec: CodecKind::default(),
            sample_rate: 48_000,
            samples_per_frame: 960,
            bitrate: 24_000,
        }
    }
}

/// The `[gpio]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GpioSection {
    pub sysfs_root: PathBuf,
    pub ptt_pin: u32,
    pub tx_led_pin: u32,
    pub rx_led_pin: u32,
    pub export_settle_ms: u64,
}

impl Default for GpioSection {
    fn default() -> Self {
        Self {
            sysfs_root: "/sys/class/gpio".into(),
            ptt_pin: 78,
            tx_led_pin: 79,
            rx_led_pin: 80,
            export_settle_ms: 100,
        }
    }
}

/// The `[dma]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DmaSection {
    pub device: PathBuf,
    pub register_base: u64,
    pub register_span: usize,
    pub capture_base: u64,
    pub playback_base: u64,
}

impl Default for DmaSection {
    fn default() -> Self {
        let layout = DmaLayout::default();
        Self {
            device: "/dev/mem".into(),
            register_base: layout.register_base,
            register_span: layout.register_span,
            capture_base: layout.capture_base,
            playback_base: layout.playback_base,
        }
    }
}

/// The `[timing]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingSection {
    pub frame_slack_ms: u64,
    pub idle_poll_ms: u64,
    pub retry_ms: u64,
    pub dma_timeout_ms: u64,
    pub recv_timeout_ms: u64,
    pub stats_interval_secs: u64,
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            frame_slack_ms: 2,
            idle_poll_ms: 10,
            retry_ms: 10,
            dma_timeout_ms: 100,
            recv_timeout_ms: 50,
            stats_interval_secs: 30,
        }
    }
}

/// Pacing and timeouts of the relay loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Audio duration of one frame.
    pub frame_period: Duration,
    /// Taken off every frame's pause, to absorb processing jitter.
    pub frame_slack: Duration,
    /// Button polling period while not transmitting.
    pub idle_poll: Duration,
    /// Pause after a failed frame or receive.
    pub retry: Duration,
    pub dma_timeout: Duration,
    pub recv_timeout: Duration,
    pub stats_interval: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        RelayConfig::default().timing()
    }
}

impl Timing {
    /// How long to sleep after a frame that took `spent` to relay.
    #[inline]
    pub fn frame_pause(&self, spent: Duration) -> Duration {
        self.frame_period
            .saturating_sub(self.frame_slack)
            .saturating_sub(spent)
    }
}
