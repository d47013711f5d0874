#![allow(dead_code)]

use std::{
    collections::VecDeque,
    io, net,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use walkie_dma::{
    DmaEngine, DmaLayout,
    sim::{SimBackend, SimDevice},
};
use walkie_net::{DatagramSocket, Destination, PacketTransport};
use walkie_proto::{Flags, Packet, PacketKind, Timestamp};
use walkie_relay::{Indicator, PttControl, Timing};

pub const SAMPLES_PER_FRAME: usize = 960;

const PEER: net::SocketAddr =
    net::SocketAddr::V4(net::SocketAddrV4::new(net::Ipv4Addr::new(10, 0, 0, 2), 5000));

#[derive(Debug, Default)]
struct Wire {
    inbound: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    recv_timeout: Option<Duration>,
}

/// A socket backed by two in-memory queues. Clones share the same queues.
#[derive(Debug, Clone, Default)]
pub struct MemorySocket {
    wire: Arc<Mutex<Wire>>,
}

impl MemorySocket {
    /// Queues a datagram for the next `recv_from`.
    pub fn deliver(&self, datagram: impl Into<Vec<u8>>) {
        self.wire.lock().unwrap().inbound.push_back(datagram.into());
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.wire.lock().unwrap().sent.clone()
    }

    /// Kind and sequence number of every sent datagram, oldest first.
    pub fn sent_kinds(&self) -> Vec<(PacketKind, u32)> {
        self.sent()
            .iter()
            .map(|datagram| {
                let packet = Packet::decode(datagram).unwrap();
                (packet.kind(), packet.seq_num())
            })
            .collect()
    }

    fn pop(&self) -> Option<Vec<u8>> {
        self.wire.lock().unwrap().inbound.pop_front()
    }
}

impl DatagramSocket for MemorySocket {
    fn send_to(&self, buf: &[u8], _addr: net::SocketAddr) -> io::Result<usize> {
        self.wire.lock().unwrap().sent.push(buf.to_vec());
        Ok(buf.len())
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, net::SocketAddr)> {
        let datagram = match self.pop() {
            Some(datagram) => datagram,
            None => {
                // behave like a blocking socket with a read timeout
                let timeout = self.wire.lock().unwrap().recv_timeout;
                std::thread::sleep(timeout.unwrap_or(Duration::from_millis(1)));
                self.pop().ok_or(io::ErrorKind::WouldBlock)?
            }
        };

        let len = datagram.len().min(buf.len());
        buf[..len].copy_from_slice(&datagram[..len]);
        Ok((len, PEER))
    }

    fn set_recv_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.wire.lock().unwrap().recv_timeout = timeout;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Panel {
    button: AtomicBool,
    indicators: Mutex<Vec<(Indicator, bool)>>,
}

/// A button the test presses, and LEDs that remember every change.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPtt {
    panel: Arc<Panel>,
}

impl ScriptedPtt {
    pub fn press(&self) {
        self.panel.button.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.panel.button.store(false, Ordering::SeqCst);
    }

    pub fn indicator_log(&self) -> Vec<(Indicator, bool)> {
        self.panel.indicators.lock().unwrap().clone()
    }

    /// Last state set on `indicator`, `false` if never set.
    pub fn is_lit(&self, indicator: Indicator) -> bool {
        self.indicator_log()
            .iter()
            .rev()
            .find(|(i, _)| *i == indicator)
            .is_some_and(|&(_, on)| on)
    }
}

impl PttControl for ScriptedPtt {
    fn read_button(&self) -> bool {
        self.panel.button.load(Ordering::SeqCst)
    }

    fn set_indicator(&self, indicator: Indicator, on: bool) {
        self.panel.indicators.lock().unwrap().push((indicator, on));
    }
}

/// Short enough for tests to run quickly, long enough for the simulated
/// device to always make it.
pub fn fast_timing() -> Timing {
    Timing {
        frame_period: Duration::from_millis(2),
        frame_slack: Duration::ZERO,
        idle_poll: Duration::from_millis(1),
        retry: Duration::from_millis(1),
        dma_timeout: Duration::from_millis(5),
        recv_timeout: Duration::from_millis(2),
        stats_interval: Duration::from_millis(20),
    }
}

pub fn engine(device: &SimDevice) -> DmaEngine<SimBackend> {
    let mut engine = DmaEngine::new(device.backend(), DmaLayout::default());
    engine.initialize().unwrap();
    engine
}

pub fn transport(board_id: u32) -> (PacketTransport<MemorySocket>, MemorySocket) {
    let socket = MemorySocket::default();
    let transport = PacketTransport::with_socket(socket.clone(), board_id, Destination::default());
    (transport, socket)
}

/// An encoded datagram, as another board would send it.
pub fn datagram(board_id: u32, seq_num: u32, flags: Flags, payload: &[u8]) -> Vec<u8> {
    Packet::new(board_id, seq_num, Timestamp::default(), flags, payload)
        .unwrap()
        .encode()
        .to_vec()
}

/// A full frame of 16-bit big-endian samples.
pub fn pcm_payload(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_be_bytes()).collect()
}

pub fn tone() -> Vec<i16> {
    (0..SAMPLES_PER_FRAME)
        .map(|i| ((i % 100) as i16 - 50) * 300)
        .collect()
}
