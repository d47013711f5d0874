//! Driver for the audio codec's DMA controller.
//!
//! The controller moves one fixed-size frame of 32-bit samples at a time, in two
//! independent directions:
//!
//! - **capture** (stream to memory), filling the capture buffer with microphone audio.
//! - **playback** (memory to stream), draining the playback buffer to the speaker.
//!
//! There are no interrupts: completion is observed by polling each direction's
//! status register, and every wait is bounded by a timeout.
//!
//! [`DmaEngine`] owns the register window and both frame buffers. Once
//! initialized, [`DmaEngine::channels`] splits it into a [`CaptureChannel`] and a
//! [`PlaybackChannel`] that may be driven from two different threads, each
//! channel exclusively owning its buffer.
//!
//! Where the registers and buffers come from is abstracted by [`DmaBackend`]:
//! [`DevMemBackend`] maps them out of `/dev/mem`, while the `sim` feature
//! provides an in-memory device for tests.

use core::{fmt, time::Duration};

mod channel;
mod engine;
pub mod mapping;
pub mod regs;
#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use channel::{CaptureChannel, PlaybackChannel};
pub use engine::DmaEngine;
pub use mapping::{DevMemBackend, MappedRegion};
pub use regs::{Direction, RegisterIo, Registers, Status};

/// Bytes per sample word moved by the controller.
pub const BYTES_PER_SAMPLE: usize = size_of::<i32>();

/// How often completion is polled for.
pub const POLL_INTERVAL: Duration = Duration::from_micros(100);

/// Number of 1µs polls a reset is allowed before giving up.
pub const RESET_POLL_ITERATIONS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Reset,
    Transfer(Direction),
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reset => f.write_str("reset"),
            Self::Transfer(direction) => write!(f, "{direction} transfer"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DmaError {
    #[error("DMA hardware unavailable: {0}")]
    HardwareUnavailable(String),
    #[error("DMA engine is not initialized")]
    NotInitialized,
    #[error("{0} channel is still busy")]
    Busy(Direction),
    #[error("transfer of {len} bytes at offset {offset} does not fit the {expected} byte frame")]
    InvalidLength {
        offset: usize,
        len: usize,
        expected: usize,
    },
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: Operation,
        timeout: Duration,
    },
}

/// Where the controller and its buffers live in physical memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmaLayout {
    pub register_base: u64,
    pub register_span: usize,
    pub capture_base: u64,
    pub playback_base: u64,
    pub samples_per_frame: usize,
}

impl Default for DmaLayout {
    fn default() -> Self {
        Self {
            register_base: 0xA000_0000,
            register_span: regs::REGISTER_SPAN,
            capture_base: 0x7000_0000,
            playback_base: 0x7001_0000,
            samples_per_frame: 960,
        }
    }
}

impl DmaLayout {
    /// Fixed byte length of both frame buffers, and of every transfer.
    #[inline(always)]
    pub fn frame_bytes(&self) -> usize {
        self.samples_per_frame.strict_mul(BYTES_PER_SAMPLE)
    }

    /// Checks that the layout describes two disjoint, 32-bit addressable frame buffers.
    pub fn validate(&self) -> Result<(), DmaError> {
        let invalid = |reason: String| Err(DmaError::HardwareUnavailable(reason));

        let frame_bytes = self.frame_bytes();

        if frame_bytes == 0 {
            return invalid("frames must hold at least one sample".into());
        }

        if self.register_span < regs::offset::S2MM_LENGTH + size_of::<u32>() {
            return invalid(format!(
                "register window of {:#x} bytes misses registers",
                self.register_span
            ));
        }

        let frame_bytes = frame_bytes as u64;

        for base in [self.capture_base, self.playback_base] {
            if base.checked_add(frame_bytes).is_none_or(|end| end > 1 << 32) {
                return invalid(format!("buffer at {base:#x} is not 32-bit addressable"));
            }
        }

        let (low, high) = if self.capture_base <= self.playback_base {
            (self.capture_base, self.playback_base)
        } else {
            (self.playback_base, self.capture_base)
        };

        if low + frame_bytes > high {
            return invalid(format!(
                "capture buffer at {:#x} and playback buffer at {:#x} overlap",
                self.capture_base, self.playback_base
            ));
        }

        Ok(())
    }
}

/// Memory a channel transfers frames from or into.
pub trait FrameBuffer: Send {
    /// Bus address programmed into the controller.
    fn phys_addr(&self) -> u64;

    fn byte_len(&self) -> usize;

    /// Copies `samples` to the start of the buffer.
    fn load(&mut self, samples: &[i32]);

    /// Copies the start of the buffer into `out`.
    fn store(&self, out: &mut [i32]);
}

/// Everything a backend hands over on initialization.
#[derive(Debug)]
pub struct Mappings<R, B> {
    pub registers: R,
    pub capture: B,
    pub playback: B,
}

/// Source of the register window and frame buffers.
pub trait DmaBackend {
    type Registers: RegisterIo;
    type Buffer: FrameBuffer;

    /// Maps the registers and both buffers described by `layout`.
    ///
    /// On failure, nothing stays mapped.
    fn map(&mut self, layout: &DmaLayout) -> Result<Mappings<Self::Registers, Self::Buffer>, DmaError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_is_valid() {
        let layout = DmaLayout::default();
        assert_eq!(layout.frame_bytes(), 3840);
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn overlapping_buffers_are_rejected() {
        let layout = DmaLayout {
            playback_base: 0x7000_0000 + 3836,
            ..DmaLayout::default()
        };
        assert!(matches!(
            layout.validate(),
            Err(DmaError::HardwareUnavailable(_))
        ));

        let swapped = DmaLayout {
            capture_base: 0x7001_0000,
            playback_base: 0x7000_0000,
            ..DmaLayout::default()
        };
        assert!(swapped.validate().is_ok());
    }

    #[test]
    fn buffers_must_fit_32_bit_addresses() {
        let layout = DmaLayout {
            capture_base: 0xFFFF_FF00,
            ..DmaLayout::default()
        };
        assert!(layout.validate().is_err());
    }

    #[test]
    fn test_error_display_variants() {
        assert_eq!(
            DmaError::NotInitialized.to_string(),
            "DMA engine is not initialized"
        );
        assert_eq!(
            DmaError::Busy(Direction::Capture).to_string(),
            "capture channel is still busy"
        );

        let timeout = DmaError::Timeout {
            operation: Operation::Transfer(Direction::Playback),
            timeout: Duration::from_millis(100),
        };
        assert_eq!(timeout.to_string(), "playback transfer timed out after 100ms");

        let invalid = DmaError::InvalidLength {
            offset: 0,
            len: 12,
            expected: 3840,
        };
        assert!(invalid.to_string().contains("3840 byte frame"));
    }
}
