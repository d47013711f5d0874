mod common;

use std::{thread, time::Duration};

use common::*;
use walkie_dma::{
    DmaEngine, DmaError, DmaLayout,
    sim::{SimBackend, SimDevice},
};
use walkie_proto::{Flags, PacketKind};
use walkie_relay::{
    Indicator, Relay, RelayError, RelaySettings,
    codec::{self, CodecKind, CodecPair, CodecParams},
};
use walkie_utils::CancellationToken;

const LOCAL: u32 = 1;
const REMOTE: u32 = 2;

fn pcm_codec() -> CodecPair {
    let params = CodecParams {
        sample_rate: 48_000,
        samples_per_frame: SAMPLES_PER_FRAME,
        bitrate: 0,
    };
    codec::build(CodecKind::Pcm, &params).unwrap()
}

fn relay(device: &SimDevice) -> (Relay<SimBackend, MemorySocket>, MemorySocket, ScriptedPtt) {
    let (transport, socket) = transport(LOCAL);
    let ptt = ScriptedPtt::default();

    let settings = RelaySettings {
        timing: fast_timing(),
        self_mute: true,
    };

    let relay = Relay::new(Box::new(ptt.clone()), engine(device), transport, pcm_codec(), settings);
    (relay, socket, ptt)
}

#[test]
fn a_full_session_talks_and_listens() {
    walkie_relay::logging::init_for_tests();

    let device = SimDevice::new();
    let (mut relay, socket, ptt) = relay(&device);
    let shutdown = CancellationToken::new();

    let stats = thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(20));
            ptt.press();
            thread::sleep(Duration::from_millis(40));
            ptt.release();
            thread::sleep(Duration::from_millis(20));

            let payload = pcm_payload(&tone());
            socket.deliver(datagram(REMOTE, 0, Flags::START, &[]));
            for seq_num in 1..=3 {
                socket.deliver(datagram(REMOTE, seq_num, Flags::NONE, &payload));
            }
            socket.deliver(datagram(REMOTE, 4, Flags::END, &[]));
            // our own echo, as multicast loops it back
            socket.deliver(datagram(LOCAL, 0, Flags::START, &[]));

            thread::sleep(Duration::from_millis(100));
            shutdown.cancel();
        });

        relay.run(&shutdown).unwrap()
    });

    let sent = socket.sent_kinds();
    assert_eq!(sent.first(), Some(&(PacketKind::Start, 0)));
    assert_eq!(sent.last().map(|&(kind, _)| kind), Some(PacketKind::End));
    assert!(sent[1..sent.len() - 1]
        .iter()
        .all(|&(kind, _)| kind == PacketKind::Audio));

    assert!(stats.frames_sent > 0);
    assert_eq!(stats.frames_sent as usize, sent.len() - 2);
    assert_eq!(stats.frames_received, 3);
    assert_eq!(stats.frames_dropped, 0);
    assert_eq!(stats.packets_lost, 0);
    assert_eq!(device.played_frames().len(), 3);

    assert!(!ptt.is_lit(Indicator::Transmit));
    assert!(!ptt.is_lit(Indicator::Receive));
    assert!(!relay.session().is_transmitting());
}

#[test]
fn shutdown_closes_a_burst_in_progress() {
    let device = SimDevice::new();
    let (mut relay, socket, ptt) = relay(&device);
    let shutdown = CancellationToken::new();

    ptt.press();

    thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(30));
            shutdown.cancel();
        });

        relay.run(&shutdown).unwrap();
    });

    let sent = socket.sent_kinds();
    assert_eq!(sent.first().map(|&(kind, _)| kind), Some(PacketKind::Start));
    assert_eq!(sent.last().map(|&(kind, _)| kind), Some(PacketKind::End));
    assert!(shutdown.is_cancelled());
}

#[test]
fn an_uninitialized_engine_is_refused() {
    let device = SimDevice::new();
    let (transport, socket) = transport(LOCAL);
    let engine = DmaEngine::new(device.backend(), DmaLayout::default());

    let mut relay = Relay::new(
        Box::new(ScriptedPtt::default()),
        engine,
        transport,
        pcm_codec(),
        RelaySettings {
            timing: fast_timing(),
            self_mute: true,
        },
    );

    let shutdown = CancellationToken::new();
    assert!(matches!(
        relay.run(&shutdown),
        Err(RelayError::Dma(DmaError::NotInitialized))
    ));
    assert!(socket.sent().is_empty());
}
