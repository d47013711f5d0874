//! Receive, decode, play.

use walkie_dma::{FrameBuffer, PlaybackChannel, RegisterIo};
use walkie_net::{DatagramSocket, PacketTransport, TransportError};
use walkie_proto::{MAX_DATAGRAM_LEN, Packet, PacketKind, SequenceTracker};
use walkie_utils::{CancellationToken, samples};

use crate::{Indicator, PttControl, RelayError, Session, Timing, codec::FrameDecoder};

/// What the receive loop did with a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Sent by this board, discarded.
    SelfOriginated,
    /// Audio discarded because the local button is held.
    Suppressed,
    /// Audio outside of any burst, or carrying no frame, discarded.
    Ignored,
    StreamStarted { sender: u32 },
    StreamEnded { sender: u32 },
    Played,
    /// Malformed, undecodable or unplayable, counted as dropped.
    Dropped,
}

/// The receive loop's state.
pub struct ReceivePath<'a, R, B, S: DatagramSocket> {
    session: &'a Session,
    ptt: &'a dyn PttControl,
    playback: &'a mut PlaybackChannel<R, B>,
    decoder: &'a mut dyn FrameDecoder,
    transport: &'a PacketTransport<S>,
    timing: Timing,
    self_mute: bool,
    sequence: SequenceTracker,
    datagram: Box<[u8]>,
    pcm: Box<[i16]>,
    dma_frame: Box<[i32]>,
}

impl<'a, R: RegisterIo, B: FrameBuffer, S: DatagramSocket> ReceivePath<'a, R, B, S> {
    pub fn new(
        session: &'a Session,
        ptt: &'a dyn PttControl,
        playback: &'a mut PlaybackChannel<R, B>,
        decoder: &'a mut dyn FrameDecoder,
        transport: &'a PacketTransport<S>,
        timing: Timing,
        self_mute: bool,
    ) -> Self {
        let frame_samples = playback.frame_samples();

        Self {
            session,
            ptt,
            playback,
            decoder,
            transport,
            timing,
            self_mute,
            sequence: SequenceTracker::new(),
            datagram: vec![0; MAX_DATAGRAM_LEN].into_boxed_slice(),
            pcm: vec![0; frame_samples].into_boxed_slice(),
            dma_frame: vec![0; frame_samples].into_boxed_slice(),
        }
    }

    /// Runs until `shutdown` is cancelled, then clears reception state.
    pub fn run(&mut self, shutdown: &CancellationToken) {
        log::info!("RX thread started");

        while !shutdown.is_cancelled() {
            self.tick();
        }

        if self.session.is_receiving() {
            self.session.end_reception();
            self.ptt.set_indicator(Indicator::Receive, false);
        }

        log::info!("RX thread stopped");
    }

    /// Waits for one datagram and handles it. `None` if nothing was received.
    pub fn tick(&mut self) -> Option<Disposition> {
        let mut datagram = core::mem::take(&mut self.datagram);

        let disposition = match self.transport.receive(self.timing.recv_timeout, &mut datagram) {
            Ok(Some(received)) => Some(self.handle(&received.packet)),
            Ok(None) => None,
            Err(TransportError::Malformed(e)) => {
                log::debug!("RX dropped malformed datagram: {e}");
                self.session.record_dropped();
                Some(Disposition::Dropped)
            }
            Err(e) => {
                log::warn!("RX failed: {e}");
                std::thread::sleep(self.timing.retry);
                None
            }
        };

        self.datagram = datagram;
        disposition
    }

    /// Applies one received packet to the session, playing it if it's audio.
    pub fn handle(&mut self, packet: &Packet<'_>) -> Disposition {
        let sender = packet.board_id();

        if self.self_mute && sender == self.session.board_id() {
            return Disposition::SelfOriginated;
        }

        match packet.kind() {
            PacketKind::Start => {
                self.session.begin_reception(sender);
                self.sequence.reset();
                self.sequence.observe(packet.seq_num());
                self.ptt.set_indicator(Indicator::Receive, true);
                log::info!("RX start from board {sender}");
                Disposition::StreamStarted { sender }
            }
            PacketKind::End => {
                self.session.end_reception();
                self.ptt.set_indicator(Indicator::Receive, false);
                log::info!("RX end from board {sender}");
                Disposition::StreamEnded { sender }
            }
            PacketKind::Audio => self.handle_audio(packet),
        }
    }

    fn handle_audio(&mut self, packet: &Packet<'_>) -> Disposition {
        let in_burst = self.session.current_sender() == Some(packet.board_id());

        // suppressed packets still arrived, keep the tracker in step with them
        if in_burst {
            self.track(packet.seq_num());
        }

        // half duplex
        if self.session.is_transmitting() {
            return Disposition::Suppressed;
        }

        if !in_burst || packet.payload().is_empty() {
            return Disposition::Ignored;
        }

        match self.play(packet.payload()) {
            Ok(()) => {
                self.session.record_received();
                Disposition::Played
            }
            Err(e) => {
                self.session.record_dropped();
                log::debug!("RX frame dropped: {e}");
                Disposition::Dropped
            }
        }
    }

    fn track(&mut self, seq_num: u32) {
        let lost = self.sequence.observe(seq_num);
        if lost != 0 {
            self.session.record_lost(lost);
            log::debug!("RX lost {lost} packets before seq {seq_num}");
        }
    }

    fn play(&mut self, payload: &[u8]) -> Result<(), RelayError> {
        let decoded = self.decoder.decode(payload, &mut self.pcm)?;

        if decoded != self.pcm.len() {
            return Err(RelayError::DecodeMismatch {
                expected: self.pcm.len(),
                actual: decoded,
            });
        }

        samples::widen_into(&self.pcm, &mut self.dma_frame);

        let frame_bytes = self.playback.frame_bytes();
        self.playback.start(&self.dma_frame, frame_bytes)?;
        self.playback.wait(self.timing.dma_timeout)?;

        Ok(())
    }
}
