//! Register map of the stream-to-memory / memory-to-stream DMA controller.

use core::fmt;

/// Byte length of the register window.
pub const REGISTER_SPAN: usize = 0x10000;

/// Byte offsets of the registers the relay uses, relative to the register base.
pub mod offset {
    pub const MM2S_CTRL: usize = 0x00;
    pub const MM2S_STATUS: usize = 0x04;
    pub const MM2S_SA: usize = 0x18;
    pub const MM2S_LENGTH: usize = 0x28;
    pub const S2MM_CTRL: usize = 0x30;
    pub const S2MM_STATUS: usize = 0x34;
    pub const S2MM_DA: usize = 0x48;
    pub const S2MM_LENGTH: usize = 0x58;
}

/// Control register bits.
pub mod control {
    pub const RUN: u32 = 0x01;
    pub const RESET: u32 = 0x04;
}

/// Status register bits.
pub mod status {
    pub const HALTED: u32 = 0x01;
    pub const IDLE: u32 = 0x02;
    pub const IOC: u32 = 0x1000;
}

/// Raw 32-bit access to the register window, at byte offsets.
///
/// Implementations must perform every access, in program order, without
/// caching or merging them.
pub trait RegisterIo: Send + Sync {
    fn read(&self, offset: usize) -> u32;

    fn write(&self, offset: usize, value: u32);
}

/// Transfer direction, named after the audio flow rather than the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Stream to memory, audio coming from the codec.
    Capture,
    /// Memory to stream, audio going to the codec.
    Playback,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Capture => "capture",
            Self::Playback => "playback",
        })
    }
}

/// Snapshot of a channel's status register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(u32);

impl Status {
    #[inline(always)]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[inline(always)]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline(always)]
    pub const fn is_halted(self) -> bool {
        self.0 & status::HALTED != 0
    }

    #[inline(always)]
    pub const fn is_idle(self) -> bool {
        self.0 & status::IDLE != 0
    }

    /// A channel is busy while it runs a transfer that hasn't gone idle yet.
    /// A halted channel is never busy.
    #[inline(always)]
    pub const fn is_busy(self) -> bool {
        !self.is_halted() && !self.is_idle()
    }
}

/// Typed view over the register window, one accessor per register.
#[derive(Debug)]
pub struct Registers<R> {
    io: R,
}

impl<R: RegisterIo> Registers<R> {
    #[inline(always)]
    pub const fn new(io: R) -> Self {
        Self { io }
    }

    #[inline(always)]
    pub fn io(&self) -> &R {
        &self.io
    }

    #[inline(always)]
    pub fn set_mm2s_control(&self, value: u32) {
        self.io.write(offset::MM2S_CTRL, value)
    }

    #[inline(always)]
    pub fn mm2s_status(&self) -> Status {
        Status(self.io.read(offset::MM2S_STATUS))
    }

    #[inline(always)]
    pub fn set_mm2s_source(&self, phys_addr: u32) {
        self.io.write(offset::MM2S_SA, phys_addr)
    }

    /// Writing the length starts the transfer.
    #[inline(always)]
    pub fn set_mm2s_length(&self, byte_len: u32) {
        self.io.write(offset::MM2S_LENGTH, byte_len)
    }

    #[inline(always)]
    pub fn set_s2mm_control(&self, value: u32) {
        self.io.write(offset::S2MM_CTRL, value)
    }

    #[inline(always)]
    pub fn s2mm_status(&self) -> Status {
        Status(self.io.read(offset::S2MM_STATUS))
    }

    #[inline(always)]
    pub fn set_s2mm_destination(&self, phys_addr: u32) {
        self.io.write(offset::S2MM_DA, phys_addr)
    }

    /// Writing the length starts the transfer.
    #[inline(always)]
    pub fn set_s2mm_length(&self, byte_len: u32) {
        self.io.write(offset::S2MM_LENGTH, byte_len)
    }

    #[inline]
    pub fn status(&self, direction: Direction) -> Status {
        match direction {
            Direction::Capture => self.s2mm_status(),
            Direction::Playback => self.mm2s_status(),
        }
    }

    /// Programs and kicks off a transfer: run bit, buffer address, then length.
    pub fn launch(&self, direction: Direction, phys_addr: u32, byte_len: u32) {
        match direction {
            Direction::Capture => {
                self.set_s2mm_control(control::RUN);
                self.set_s2mm_destination(phys_addr);
                self.set_s2mm_length(byte_len);
            }
            Direction::Playback => {
                self.set_mm2s_control(control::RUN);
                self.set_mm2s_source(phys_addr);
                self.set_mm2s_length(byte_len);
            }
        }
    }
}
