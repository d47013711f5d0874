use core::time::Duration;
use std::sync::Arc;

use crate::{
    CaptureChannel, DmaBackend, DmaError, DmaLayout, Operation, PlaybackChannel,
    RESET_POLL_ITERATIONS,
    regs::{Registers, control},
};

type Capture<B> = CaptureChannel<<B as DmaBackend>::Registers, <B as DmaBackend>::Buffer>;
type Playback<B> = PlaybackChannel<<B as DmaBackend>::Registers, <B as DmaBackend>::Buffer>;

// Fields drop in declaration order: buffers first, the register window last.
struct Mapped<B: DmaBackend> {
    capture: Capture<B>,
    playback: Playback<B>,
    registers: Arc<Registers<B::Registers>>,
}

/// The DMA controller, with its register window and both frame buffers.
///
/// Starts out uninitialized, every operation other than [`initialize`](Self::initialize)
/// and [`cleanup`](Self::cleanup) then fails with [`DmaError::NotInitialized`].
/// Resources are released on [`cleanup`](Self::cleanup) or drop, whichever comes first.
pub struct DmaEngine<B: DmaBackend> {
    backend: B,
    layout: DmaLayout,
    mapped: Option<Mapped<B>>,
}

impl<B: DmaBackend> DmaEngine<B> {
    pub fn new(backend: B, layout: DmaLayout) -> Self {
        Self {
            backend,
            layout,
            mapped: None,
        }
    }

    #[inline(always)]
    pub fn layout(&self) -> &DmaLayout {
        &self.layout
    }

    #[inline(always)]
    pub fn is_initialized(&self) -> bool {
        self.mapped.is_some()
    }

    #[inline(always)]
    pub fn frame_bytes(&self) -> usize {
        self.layout.frame_bytes()
    }

    /// Maps the hardware and puts both channels in reset.
    ///
    /// Calling it again on an initialized engine does nothing.
    pub fn initialize(&mut self) -> Result<(), DmaError> {
        if self.is_initialized() {
            return Ok(());
        }

        self.layout.validate()?;

        let mappings = self.backend.map(&self.layout)?;
        let registers = Arc::new(Registers::new(mappings.registers));

        registers.set_s2mm_control(control::RESET);
        registers.set_mm2s_control(control::RESET);
        std::thread::sleep(Duration::from_micros(100));

        self.mapped = Some(Mapped {
            capture: CaptureChannel::new(registers.clone(), mappings.capture),
            playback: PlaybackChannel::new(registers.clone(), mappings.playback),
            registers,
        });

        log::info!(
            "DMA initialized (frame: {} samples, {} bytes)",
            self.layout.samples_per_frame,
            self.layout.frame_bytes()
        );

        Ok(())
    }

    fn mapped(&self) -> Result<&Mapped<B>, DmaError> {
        self.mapped.as_ref().ok_or(DmaError::NotInitialized)
    }

    fn mapped_mut(&mut self) -> Result<&mut Mapped<B>, DmaError> {
        self.mapped.as_mut().ok_or(DmaError::NotInitialized)
    }

    /// Resets both channels, and waits for them to halt.
    pub fn reset(&mut self) -> Result<(), DmaError> {
        let registers = &self.mapped()?.registers;

        registers.set_s2mm_control(control::RESET);
        registers.set_mm2s_control(control::RESET);
        std::thread::sleep(Duration::from_micros(100));

        for _ in 0..RESET_POLL_ITERATIONS {
            if registers.s2mm_status().is_halted() && registers.mm2s_status().is_halted() {
                log::debug!("DMA channels halted");
                return Ok(());
            }
            std::thread::sleep(Duration::from_micros(1));
        }

        Err(DmaError::Timeout {
            operation: Operation::Reset,
            timeout: Duration::from_micros(RESET_POLL_ITERATIONS as u64),
        })
    }

    pub fn start_capture(&mut self, offset: usize, byte_len: usize) -> Result<(), DmaError> {
        self.mapped_mut()?.capture.start(offset, byte_len)
    }

    pub fn start_playback(&mut self, samples: &[i32], byte_len: usize) -> Result<(), DmaError> {
        self.mapped_mut()?.playback.start(samples, byte_len)
    }

    pub fn wait_capture(&self, timeout: Duration) -> Result<(), DmaError> {
        self.mapped()?.capture.wait(timeout)
    }

    pub fn wait_playback(&self, timeout: Duration) -> Result<(), DmaError> {
        self.mapped()?.playback.wait(timeout)
    }

    /// `false` when uninitialized.
    pub fn is_capture_busy(&self) -> bool {
        self.mapped
            .as_ref()
            .is_some_and(|mapped| mapped.capture.is_busy())
    }

    /// `false` when uninitialized.
    pub fn is_playback_busy(&self) -> bool {
        self.mapped
            .as_ref()
            .is_some_and(|mapped| mapped.playback.is_busy())
    }

    pub fn read_capture(&self, out: &mut [i32]) -> Result<usize, DmaError> {
        self.mapped()?.capture.read(out)
    }

    /// Splits the engine into its two directions, so that they can be driven
    /// concurrently.
    pub fn channels(&mut self) -> Result<(&mut Capture<B>, &mut Playback<B>), DmaError> {
        let Mapped {
            capture, playback, ..
        } = self.mapped_mut()?;
        Ok((capture, playback))
    }

    /// Releases the buffers, then the register window. Idempotent.
    pub fn cleanup(&mut self) {
        if self.mapped.take().is_some() {
            log::info!("DMA released");
        }
    }
}

impl<B: DmaBackend> Drop for DmaEngine<B> {
    fn drop(&mut self) {
        self.cleanup();
    }
}
