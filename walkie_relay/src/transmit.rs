//! Capture, encode, send.

use core::time::Duration;
use std::time::Instant;

use walkie_dma::{CaptureChannel, FrameBuffer, RegisterIo};
use walkie_net::{DatagramSocket, PacketTransport};
use walkie_utils::{CancellationToken, samples};

use crate::{
    Indicator, PttControl, RelayError, Session, Timing,
    codec::{FrameEncoder, MAX_ENCODED_LEN},
};

/// Longest a pause between ticks keeps a cancelled loop waiting.
const SHUTDOWN_POLL: Duration = Duration::from_millis(5);

/// The transmit loop's state.
///
/// Every [`tick`](Self::tick) samples the button once: a press sends START and
/// enters transmitting state, a release sends END and leaves it. While
/// transmitting, each tick also relays one captured frame.
pub struct TransmitPath<'a, R, B, S: DatagramSocket> {
    session: &'a Session,
    ptt: &'a dyn PttControl,
    capture: &'a mut CaptureChannel<R, B>,
    encoder: &'a mut dyn FrameEncoder,
    transport: &'a PacketTransport<S>,
    timing: Timing,
    button_was_down: bool,
    dma_frame: Box<[i32]>,
    pcm: Box<[i16]>,
    encoded: Box<[u8]>,
}

impl<'a, R: RegisterIo, B: FrameBuffer, S: DatagramSocket> TransmitPath<'a, R, B, S> {
    pub fn new(
        session: &'a Session,
        ptt: &'a dyn PttControl,
        capture: &'a mut CaptureChannel<R, B>,
        encoder: &'a mut dyn FrameEncoder,
        transport: &'a PacketTransport<S>,
        timing: Timing,
    ) -> Self {
        let frame_samples = capture.frame_samples();

        Self {
            session,
            ptt,
            capture,
            encoder,
            transport,
            timing,
            button_was_down: false,
            dma_frame: vec![0; frame_samples].into_boxed_slice(),
            pcm: vec![0; frame_samples].into_boxed_slice(),
            encoded: vec![0; MAX_ENCODED_LEN].into_boxed_slice(),
        }
    }

    /// Runs until `shutdown` is cancelled, then closes any open burst.
    pub fn run(&mut self, shutdown: &CancellationToken) {
        log::info!("TX thread started");

        while !shutdown.is_cancelled() {
            let pause = self.tick();
            if !pause.is_zero() {
                shutdown.sleep(pause, SHUTDOWN_POLL);
            }
        }

        self.finish();
        log::info!("TX thread stopped");
    }

    /// One iteration of the loop, returns how long to wait before the next one.
    pub fn tick(&mut self) -> Duration {
        let started = Instant::now();

        let button_down = self.ptt.read_button();

        match (self.button_was_down, button_down) {
            (false, true) => self.begin_burst(),
            (true, false) => self.end_burst(),
            _ => {}
        }

        // updated before relaying, so that a failed frame can't replay the edge
        self.button_was_down = button_down;

        if !(button_down && self.session.is_transmitting()) {
            return self.timing.idle_poll;
        }

        match self.relay_frame() {
            Ok(()) => self.timing.frame_pause(started.elapsed()),
            Err(e) => {
                self.session.record_capture_dropped();
                log::warn!("TX frame dropped: {e}");
                self.timing.retry
            }
        }
    }

    /// Closes the burst in progress, if any.
    pub fn finish(&mut self) {
        if self.session.is_transmitting() {
            self.end_burst();
        }
        self.button_was_down = false;
    }

    fn begin_burst(&mut self) {
        self.session.set_transmitting(true);
        self.ptt.set_indicator(Indicator::Transmit, true);
        log::info!("TX start");

        if let Err(e) = self.transport.send_start() {
            log::warn!("failed to send START: {e}");
        }
    }

    fn end_burst(&mut self) {
        if let Err(e) = self.transport.send_end() {
            log::warn!("failed to send END: {e}");
        }

        self.session.set_transmitting(false);
        self.ptt.set_indicator(Indicator::Transmit, false);
        log::info!("TX end");
    }

    fn relay_frame(&mut self) -> Result<(), RelayError> {
        let frame_bytes = self.capture.frame_bytes();

        self.capture.start(0, frame_bytes)?;
        self.capture.wait(self.timing.dma_timeout)?;
        self.capture.read(&mut self.dma_frame)?;

        samples::narrow_into(&self.dma_frame, &mut self.pcm);

        let len = self.encoder.encode(&self.pcm, &mut self.encoded)?;
        if len == 0 {
            return Ok(());
        }

        self.transport.send_audio(&self.encoded[..len])?;
        self.session.record_sent();

        Ok(())
    }
}
