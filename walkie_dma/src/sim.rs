//! An in-memory stand-in for the DMA controller.
//!
//! [`SimDevice`] models just enough of the hardware for the engine and the relay
//! loops to run without `/dev/mem`: reset halts a channel, setting the run bit
//! makes it idle, and writing a transfer length either completes the transfer
//! at once or leaves the channel running forever, depending on [`SimBehavior`].
//!
//! Completed capture transfers fill the capture buffer from a configurable
//! source frame, completed playback transfers are recorded for inspection.

use std::sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicU32, AtomicUsize, Ordering},
};

use crate::{
    DmaBackend, DmaError, DmaLayout, FrameBuffer, Mappings,
    regs::{RegisterIo, control, offset, status},
};

const REGISTER_WORDS: usize = offset::S2MM_LENGTH / size_of::<u32>() + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimBehavior {
    /// Transfers complete as soon as they are started.
    #[default]
    Instant,
    /// Transfers never complete.
    AlwaysBusy,
    /// Like [`Instant`](Self::Instant), but resets never halt the channels.
    NeverHalts,
}

#[derive(Debug, Default)]
struct SimState {
    registers: [AtomicU32; REGISTER_WORDS],
    behavior: Mutex<SimBehavior>,
    fail_mapping: Mutex<bool>,
    capture_source: Mutex<Vec<i32>>,
    capture_buffer: Mutex<Vec<i32>>,
    playback_buffer: Mutex<Vec<i32>>,
    played: Mutex<Vec<Vec<i32>>>,
    capture_starts: AtomicUsize,
    playback_starts: AtomicUsize,
}

#[inline(always)]
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SimState {
    #[inline(always)]
    fn register(&self, offset: usize) -> Option<&AtomicU32> {
        self.registers.get(offset / size_of::<u32>())
    }

    fn set_status(&self, status_offset: usize, value: u32) {
        if let Some(reg) = self.register(status_offset) {
            reg.store(value, Ordering::Release);
        }
    }

    fn on_control(&self, status_offset: usize, value: u32) {
        let behavior = *lock(&self.behavior);

        if value & control::RESET != 0 {
            let halted = match behavior {
                SimBehavior::NeverHalts => 0,
                _ => status::HALTED,
            };
            self.set_status(status_offset, halted);
        } else if value & control::RUN != 0 {
            self.set_status(status_offset, status::IDLE);
        }
    }

    fn on_capture_length(&self) {
        self.capture_starts.fetch_add(1, Ordering::Relaxed);

        if *lock(&self.behavior) == SimBehavior::AlwaysBusy {
            self.set_status(offset::S2MM_STATUS, 0);
            return;
        }

        let source = lock(&self.capture_source);
        let mut buffer = lock(&self.capture_buffer);
        let n = buffer.len();
        buffer
            .iter_mut()
            .zip(source.iter().cycle().take(n))
            .for_each(|(dst, &src)| *dst = src);

        self.set_status(offset::S2MM_STATUS, status::IDLE | status::IOC);
    }

    fn on_playback_length(&self) {
        self.playback_starts.fetch_add(1, Ordering::Relaxed);

        if *lock(&self.behavior) == SimBehavior::AlwaysBusy {
            self.set_status(offset::MM2S_STATUS, 0);
            return;
        }

        let frame = lock(&self.playback_buffer).clone();
        lock(&self.played).push(frame);

        self.set_status(offset::MM2S_STATUS, status::IDLE | status::IOC);
    }
}

/// Handle on a simulated controller. Clones share the same device.
#[derive(Debug, Clone, Default)]
pub struct SimDevice {
    state: Arc<SimState>,
}

impl SimDevice {
    /// A halted device, completing transfers instantly, capturing a ramp.
    pub fn new() -> Self {
        let device = Self::default();
        device.set_status_bits(offset::S2MM_STATUS, status::HALTED);
        device.set_status_bits(offset::MM2S_STATUS, status::HALTED);
        device.set_capture_source((1..=64).map(|i| i << 16).collect());
        device
    }

    fn set_status_bits(&self, status_offset: usize, value: u32) {
        self.state.set_status(status_offset, value);
    }

    pub fn set_behavior(&self, behavior: SimBehavior) {
        *lock(&self.state.behavior) = behavior;
    }

    /// Makes the next [`DmaBackend::map`] calls fail.
    pub fn fail_mapping(&self, fail: bool) {
        *lock(&self.state.fail_mapping) = fail;
    }

    /// Samples completed capture transfers copy into the capture buffer,
    /// repeated as needed to fill it.
    pub fn set_capture_source(&self, samples: Vec<i32>) {
        *lock(&self.state.capture_source) = samples;
    }

    pub fn capture_starts(&self) -> usize {
        self.state.capture_starts.load(Ordering::Relaxed)
    }

    pub fn playback_starts(&self) -> usize {
        self.state.playback_starts.load(Ordering::Relaxed)
    }

    /// Every frame sent out by a completed playback transfer, oldest first.
    pub fn played_frames(&self) -> Vec<Vec<i32>> {
        lock(&self.state.played).clone()
    }

    /// Raw register value, as the engine would read it.
    pub fn register(&self, offset: usize) -> u32 {
        self.state
            .register(offset)
            .map_or(0, |reg| reg.load(Ordering::Acquire))
    }

    pub fn backend(&self) -> SimBackend {
        SimBackend {
            device: self.clone(),
        }
    }
}

/// Register window of a [`SimDevice`].
#[derive(Debug)]
pub struct SimRegisters {
    state: Arc<SimState>,
}

impl RegisterIo for SimRegisters {
    fn read(&self, offset: usize) -> u32 {
        self.state
            .register(offset)
            .map_or(0, |reg| reg.load(Ordering::Acquire))
    }

    fn write(&self, offset: usize, value: u32) {
        if let Some(reg) = self.state.register(offset) {
            reg.store(value, Ordering::Release);
        }

        match offset {
            offset::S2MM_CTRL => self.state.on_control(offset::S2MM_STATUS, value),
            offset::MM2S_CTRL => self.state.on_control(offset::MM2S_STATUS, value),
            offset::S2MM_LENGTH => self.state.on_capture_length(),
            offset::MM2S_LENGTH => self.state.on_playback_length(),
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Capture,
    Playback,
}

/// One of the two frame buffers of a [`SimDevice`].
#[derive(Debug)]
pub struct SimBuffer {
    state: Arc<SimState>,
    side: Side,
    phys_addr: u64,
    byte_len: usize,
}

impl SimBuffer {
    fn samples(&self) -> MutexGuard<'_, Vec<i32>> {
        match self.side {
            Side::Capture => lock(&self.state.capture_buffer),
            Side::Playback => lock(&self.state.playback_buffer),
        }
    }
}

impl FrameBuffer for SimBuffer {
    fn phys_addr(&self) -> u64 {
        self.phys_addr
    }

    fn byte_len(&self) -> usize {
        self.byte_len
    }

    fn load(&mut self, samples: &[i32]) {
        let mut buffer = self.samples();
        let n = samples.len().min(buffer.len());
        buffer[..n].copy_from_slice(&samples[..n]);
    }

    fn store(&self, out: &mut [i32]) {
        let buffer = self.samples();
        let n = out.len().min(buffer.len());
        out[..n].copy_from_slice(&buffer[..n]);
    }
}

/// Hands a [`SimDevice`] to a [`DmaEngine`](crate::DmaEngine).
#[derive(Debug, Clone)]
pub struct SimBackend {
    device: SimDevice,
}

impl DmaBackend for SimBackend {
    type Registers = SimRegisters;
    type Buffer = SimBuffer;

    fn map(&mut self, layout: &DmaLayout) -> Result<Mappings<SimRegisters, SimBuffer>, DmaError> {
        let state = &self.device.state;

        if *lock(&state.fail_mapping) {
            return Err(DmaError::HardwareUnavailable(
                "simulated mapping failure".into(),
            ));
        }

        *lock(&state.capture_buffer) = vec![0; layout.samples_per_frame];
        *lock(&state.playback_buffer) = vec![0; layout.samples_per_frame];

        let buffer = |side, phys_addr| SimBuffer {
            state: state.clone(),
            side,
            phys_addr,
            byte_len: layout.frame_bytes(),
        };

        Ok(Mappings {
            registers: SimRegisters {
                state: state.clone(),
            },
            capture: buffer(Side::Capture, layout.capture_base),
            playback: buffer(Side::Playback, layout.playback_base),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DmaEngine, Operation};
    use core::time::Duration;

    const TIMEOUT: Duration = Duration::from_millis(20);

    fn engine(device: &SimDevice) -> DmaEngine<SimBackend> {
        let mut engine = DmaEngine::new(device.backend(), DmaLayout::default());
        engine.initialize().unwrap();
        engine
    }

    #[test]
    fn operations_need_initialization() {
        let device = SimDevice::new();
        let mut engine = DmaEngine::new(device.backend(), DmaLayout::default());
        let frame_bytes = engine.frame_bytes();

        assert!(matches!(
            engine.start_capture(0, frame_bytes),
            Err(DmaError::NotInitialized)
        ));
        assert!(matches!(
            engine.wait_playback(TIMEOUT),
            Err(DmaError::NotInitialized)
        ));
        assert!(matches!(engine.reset(), Err(DmaError::NotInitialized)));
        assert!(engine.channels().is_err());
        assert!(!engine.is_capture_busy());
        assert!(!engine.is_playback_busy());
        assert_eq!(device.capture_starts(), 0);
    }

    #[test]
    fn mapping_failure_leaves_engine_uninitialized() {
        let device = SimDevice::new();
        device.fail_mapping(true);

        let mut engine = DmaEngine::new(device.backend(), DmaLayout::default());
        assert!(matches!(
            engine.initialize(),
            Err(DmaError::HardwareUnavailable(_))
        ));
        assert!(!engine.is_initialized());
    }

    #[test]
    fn capture_fills_the_buffer_and_goes_idle() {
        let device = SimDevice::new();
        device.set_capture_source(vec![0x1234_0000, -0x0001_0000]);
        let mut engine = engine(&device);
        let frame_bytes = engine.frame_bytes();

        engine.start_capture(0, frame_bytes).unwrap();
        engine.wait_capture(TIMEOUT).unwrap();
        assert!(!engine.is_capture_busy());

        let mut frame = vec![0; 960];
        assert_eq!(engine.read_capture(&mut frame).unwrap(), 960);
        assert!(frame
            .chunks(2)
            .all(|pair| pair == [0x1234_0000, -0x0001_0000]));
        assert_eq!(device.capture_starts(), 1);
    }

    #[test]
    fn playback_sends_the_loaded_frame() {
        let device = SimDevice::new();
        let mut engine = engine(&device);
        let frame_bytes = engine.frame_bytes();
        let frame: Vec<i32> = (0..960).collect();

        engine.start_playback(&frame, frame_bytes).unwrap();
        engine.wait_playback(TIMEOUT).unwrap();

        assert_eq!(device.played_frames(), [frame]);
    }

    #[test]
    fn transfers_must_span_exactly_one_frame() {
        let device = SimDevice::new();
        let mut engine = engine(&device);
        let frame_bytes = engine.frame_bytes();

        assert!(matches!(
            engine.start_capture(0, frame_bytes - 4),
            Err(DmaError::InvalidLength { .. })
        ));
        assert!(matches!(
            engine.start_capture(4, frame_bytes),
            Err(DmaError::InvalidLength { .. })
        ));
        assert!(matches!(
            engine.start_playback(&[0; 10], frame_bytes),
            Err(DmaError::InvalidLength { .. })
        ));
        assert_eq!(device.capture_starts(), 0);
        assert_eq!(device.playback_starts(), 0);
    }

    #[test]
    fn always_busy_times_out_and_refuses_new_transfers() {
        let device = SimDevice::new();
        device.set_behavior(SimBehavior::AlwaysBusy);
        let mut engine = engine(&device);
        let frame_bytes = engine.frame_bytes();

        engine.start_capture(0, frame_bytes).unwrap();
        assert!(engine.is_capture_busy());

        let start = std::time::Instant::now();
        assert!(matches!(
            engine.wait_capture(TIMEOUT),
            Err(DmaError::Timeout {
                operation: Operation::Transfer(crate::Direction::Capture),
                ..
            })
        ));
        assert!(start.elapsed() >= TIMEOUT);

        assert!(matches!(
            engine.start_capture(0, frame_bytes),
            Err(DmaError::Busy(crate::Direction::Capture))
        ));
        let mut frame = [0; 4];
        assert!(matches!(
            engine.read_capture(&mut frame),
            Err(DmaError::Busy(_))
        ));
        assert_eq!(device.capture_starts(), 1);

        // the other direction is unaffected until started
        assert!(!engine.is_playback_busy());
    }

    #[test]
    fn reset_halts_both_channels() {
        let device = SimDevice::new();
        let mut engine = engine(&device);
        let frame_bytes = engine.frame_bytes();

        engine.start_capture(0, frame_bytes).unwrap();
        engine.reset().unwrap();

        assert_eq!(device.register(offset::S2MM_STATUS), status::HALTED);
        assert_eq!(device.register(offset::MM2S_STATUS), status::HALTED);
    }

    #[test]
    fn reset_gives_up_when_channels_never_halt() {
        let device = SimDevice::new();
        device.set_behavior(SimBehavior::NeverHalts);
        let mut engine = engine(&device);

        assert!(matches!(
            engine.reset(),
            Err(DmaError::Timeout {
                operation: Operation::Reset,
                ..
            })
        ));
    }

    #[test]
    fn channels_run_from_separate_threads() {
        let device = SimDevice::new();
        let mut engine = engine(&device);
        let (capture, playback) = engine.channels().unwrap();
        let frame_bytes = capture.frame_bytes();

        std::thread::scope(|s| {
            s.spawn(|| {
                for _ in 0..10 {
                    capture.start(0, frame_bytes).unwrap();
                    capture.wait(TIMEOUT).unwrap();
                }
            });
            s.spawn(|| {
                let frame = vec![7; playback.frame_samples()];
                for _ in 0..10 {
                    playback.start(&frame, frame_bytes).unwrap();
                    playback.wait(TIMEOUT).unwrap();
                }
            });
        });

        assert_eq!(device.capture_starts(), 10);
        assert_eq!(device.playback_starts(), 10);
    }

    #[test]
    fn cleanup_is_idempotent() {
        let device = SimDevice::new();
        let mut engine = engine(&device);

        engine.cleanup();
        engine.cleanup();
        assert!(!engine.is_initialized());
        assert!(matches!(
            engine.wait_capture(TIMEOUT),
            Err(DmaError::NotInitialized)
        ));
    }
}
