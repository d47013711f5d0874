//! State shared by the transmit and receive loops.

use core::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

/// Half-duplex state and counters of one running relay.
///
/// `transmitting` is written by the transmit loop only, and read by the
/// receive loop to mute playback while the local button is held.
/// Reception bookkeeping is written by the receive loop only.
#[derive(Debug)]
pub struct Session {
    board_id: u32,
    transmitting: AtomicBool,
    receiving: AtomicBool,
    current_sender: AtomicU32,
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
    capture_dropped: AtomicU64,
    packets_lost: AtomicU64,
}

impl Session {
    pub fn new(board_id: u32) -> Self {
        Self {
            board_id,
            transmitting: AtomicBool::new(false),
            receiving: AtomicBool::new(false),
            current_sender: AtomicU32::new(0),
            frames_sent: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            capture_dropped: AtomicU64::new(0),
            packets_lost: AtomicU64::new(0),
        }
    }

    #[inline(always)]
    pub fn board_id(&self) -> u32 {
        self.board_id
    }

    #[inline(always)]
    pub fn is_transmitting(&self) -> bool {
        self.transmitting.load(Ordering::Acquire)
    }

    #[inline(always)]
    pub fn set_transmitting(&self, transmitting: bool) {
        self.transmitting.store(transmitting, Ordering::Release);
    }

    #[inline(always)]
    pub fn is_receiving(&self) -> bool {
        self.receiving.load(Ordering::Acquire)
    }

    pub fn begin_reception(&self, sender: u32) {
        self.current_sender.store(sender, Ordering::Relaxed);
        self.receiving.store(true, Ordering::Release);
    }

    pub fn end_reception(&self) {
        self.receiving.store(false, Ordering::Release);
    }

    /// The board whose burst is being played, if any.
    pub fn current_sender(&self) -> Option<u32> {
        self.is_receiving()
            .then(|| self.current_sender.load(Ordering::Relaxed))
    }

    #[inline(always)]
    pub fn record_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_capture_dropped(&self) {
        self.capture_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_lost(&self, packets: u32) {
        self.packets_lost
            .fetch_add(u64::from(packets), Ordering::Relaxed);
    }

    pub fn stats(&self) -> Stats {
        Stats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            capture_dropped: self.capture_dropped.load(Ordering::Relaxed),
            packets_lost: self.packets_lost.load(Ordering::Relaxed),
        }
    }
}

/// A snapshot of the session's counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Encoded frames handed to the network.
    pub frames_sent: u64,
    /// Received frames played back.
    pub frames_received: u64,
    /// Received frames that failed to decode or play.
    pub frames_dropped: u64,
    /// Captured frames that never made it to the network.
    pub capture_dropped: u64,
    /// Sequence numbers missing from received bursts.
    pub packets_lost: u64,
}

impl Stats {
    /// Share of received frames that were dropped, as a percentage.
    pub fn drop_rate(&self) -> Option<f64> {
        let total = self.frames_received + self.frames_dropped;
        (total != 0).then(|| self.frames_dropped as f64 * 100. / total as f64)
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TX: {} RX: {} dropped: {} capture dropped: {} lost: {}",
            self.frames_sent,
            self.frames_received,
            self.frames_dropped,
            self.capture_dropped,
            self.packets_lost,
        )?;

        if let Some(rate) = self.drop_rate() {
            write!(f, " ({rate:.1}% drop rate)")?;
        }

        Ok(())
    }
}
