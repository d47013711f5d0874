use core::time::Duration;
use std::sync::Arc;

use crate::{
    BYTES_PER_SAMPLE, DmaError, FrameBuffer, Operation, POLL_INTERVAL,
    regs::{Direction, RegisterIo, Registers},
};

/// State shared by both directions. Each channel exclusively owns its buffer,
/// and only touches its own direction's registers.
#[derive(Debug)]
struct Channel<R, B> {
    direction: Direction,
    registers: Arc<Registers<R>>,
    buffer: B,
}

impl<R: RegisterIo, B: FrameBuffer> Channel<R, B> {
    #[inline(always)]
    fn is_busy(&self) -> bool {
        self.registers.status(self.direction).is_busy()
    }

    fn check_transfer(&self, offset: usize, byte_len: usize) -> Result<(), DmaError> {
        let expected = self.buffer.byte_len();

        if byte_len != expected || offset.checked_add(byte_len).is_none_or(|end| end > expected) {
            return Err(DmaError::InvalidLength {
                offset,
                len: byte_len,
                expected,
            });
        }

        if self.is_busy() {
            return Err(DmaError::Busy(self.direction));
        }

        Ok(())
    }

    fn launch(&self, offset: usize, byte_len: usize) {
        // both fit in 32 bits, checked when the layout was validated
        let phys_addr = (self.buffer.phys_addr() + offset as u64) as u32;
        self.registers
            .launch(self.direction, phys_addr, byte_len as u32);
        log::trace!("{} transfer of {byte_len} bytes started", self.direction);
    }

    fn wait(&self, timeout: Duration) -> Result<(), DmaError> {
        if walkie_utils::poll_until(timeout, POLL_INTERVAL, || !self.is_busy()) {
            Ok(())
        } else {
            Err(DmaError::Timeout {
                operation: Operation::Transfer(self.direction),
                timeout,
            })
        }
    }

    #[inline(always)]
    fn frame_samples(&self) -> usize {
        self.buffer.byte_len() / BYTES_PER_SAMPLE
    }
}

/// Inbound half of the engine: codec audio into the capture buffer.
#[derive(Debug)]
pub struct CaptureChannel<R, B> {
    inner: Channel<R, B>,
}

impl<R: RegisterIo, B: FrameBuffer> CaptureChannel<R, B> {
    pub(crate) fn new(registers: Arc<Registers<R>>, buffer: B) -> Self {
        Self {
            inner: Channel {
                direction: Direction::Capture,
                registers,
                buffer,
            },
        }
    }

    /// Byte length of every capture transfer.
    #[inline(always)]
    pub fn frame_bytes(&self) -> usize {
        self.inner.buffer.byte_len()
    }

    #[inline(always)]
    pub fn frame_samples(&self) -> usize {
        self.inner.frame_samples()
    }

    /// Starts filling the capture buffer, `offset` bytes into it.
    pub fn start(&mut self, offset: usize, byte_len: usize) -> Result<(), DmaError> {
        self.inner.check_transfer(offset, byte_len)?;
        self.inner.launch(offset, byte_len);
        Ok(())
    }

    /// Polls until the current transfer completes, or `timeout` elapses.
    ///
    /// After a timeout, the buffer's content must not be trusted.
    pub fn wait(&self, timeout: Duration) -> Result<(), DmaError> {
        self.inner.wait(timeout)
    }

    #[inline(always)]
    pub fn is_busy(&self) -> bool {
        self.inner.is_busy()
    }

    /// Copies the last captured frame into `out`, returning the number of samples copied.
    ///
    /// Fails with [`DmaError::Busy`] while a transfer is still running.
    pub fn read(&self, out: &mut [i32]) -> Result<usize, DmaError> {
        if self.inner.is_busy() {
            return Err(DmaError::Busy(Direction::Capture));
        }

        let n = out.len().min(self.frame_samples());
        self.inner.buffer.store(&mut out[..n]);
        Ok(n)
    }
}

/// Outbound half of the engine: the playback buffer out to the codec.
#[derive(Debug)]
pub struct PlaybackChannel<R, B> {
    inner: Channel<R, B>,
}

impl<R: RegisterIo, B: FrameBuffer> PlaybackChannel<R, B> {
    pub(crate) fn new(registers: Arc<Registers<R>>, buffer: B) -> Self {
        Self {
            inner: Channel {
                direction: Direction::Playback,
                registers,
                buffer,
            },
        }
    }

    /// Byte length of every playback transfer.
    #[inline(always)]
    pub fn frame_bytes(&self) -> usize {
        self.inner.buffer.byte_len()
    }

    #[inline(always)]
    pub fn frame_samples(&self) -> usize {
        self.inner.frame_samples()
    }

    /// Copies `samples` into the playback buffer and starts sending them out.
    ///
    /// `samples` must hold at least `byte_len` bytes worth of words.
    pub fn start(&mut self, samples: &[i32], byte_len: usize) -> Result<(), DmaError> {
        self.inner.check_transfer(0, byte_len)?;

        let n = byte_len / BYTES_PER_SAMPLE;
        let Some(frame) = samples.get(..n) else {
            return Err(DmaError::InvalidLength {
                offset: 0,
                len: samples.len().strict_mul(BYTES_PER_SAMPLE),
                expected: byte_len,
            });
        };

        self.inner.buffer.load(frame);
        self.inner.launch(0, byte_len);
        Ok(())
    }

    /// Polls until the current transfer completes, or `timeout` elapses.
    pub fn wait(&self, timeout: Duration) -> Result<(), DmaError> {
        self.inner.wait(timeout)
    }

    #[inline(always)]
    pub fn is_busy(&self) -> bool {
        self.inner.is_busy()
    }
}
