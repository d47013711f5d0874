mod common;

use std::{
    thread,
    time::{Duration, Instant},
};

use common::*;
use proptest::prelude::*;
use walkie_dma::sim::{SimBehavior, SimDevice};
use walkie_proto::{HEADER_LEN, Packet, PacketKind};
use walkie_relay::{Indicator, Session, Timing, TransmitPath, codec::Pcm16Codec};
use walkie_utils::CancellationToken;

#[test]
fn a_press_produces_one_framed_burst() {
    let device = SimDevice::new();
    let mut engine = engine(&device);
    let (capture, _) = engine.channels().unwrap();
    let (transport, socket) = transport(7);
    let session = Session::new(7);
    let ptt = ScriptedPtt::default();
    let mut encoder = Pcm16Codec::new(SAMPLES_PER_FRAME);
    let timing = fast_timing();

    let mut tx = TransmitPath::new(&session, &ptt, capture, &mut encoder, &transport, timing);

    assert_eq!(tx.tick(), timing.idle_poll);
    assert!(socket.sent().is_empty());

    ptt.press();
    tx.tick();
    assert!(session.is_transmitting());
    assert!(ptt.is_lit(Indicator::Transmit));
    tx.tick();

    ptt.release();
    assert_eq!(tx.tick(), timing.idle_poll);
    assert!(!session.is_transmitting());
    assert!(!ptt.is_lit(Indicator::Transmit));

    assert_eq!(
        socket.sent_kinds(),
        [
            (PacketKind::Start, 0),
            (PacketKind::Audio, 1),
            (PacketKind::Audio, 2),
            (PacketKind::End, 3),
        ]
    );
    assert_eq!(session.stats().frames_sent, 2);
    assert_eq!(device.capture_starts(), 2);
}

#[test]
fn audio_packets_carry_the_captured_frame() {
    let device = SimDevice::new();
    device.set_capture_source(vec![0x0102_0000, -0x0001_0000]);
    let mut engine = engine(&device);
    let (capture, _) = engine.channels().unwrap();
    let (transport, socket) = transport(7);
    let session = Session::new(7);
    let ptt = ScriptedPtt::default();
    let mut encoder = Pcm16Codec::new(SAMPLES_PER_FRAME);

    let mut tx = TransmitPath::new(&session, &ptt, capture, &mut encoder, &transport, fast_timing());

    ptt.press();
    tx.tick();

    let sent = socket.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].len(), HEADER_LEN);
    assert_eq!(sent[1].len(), HEADER_LEN + SAMPLES_PER_FRAME * 2);

    let audio = Packet::decode(&sent[1]).unwrap();
    assert_eq!(audio.board_id(), 7);
    assert!(audio.payload().chunks(4).all(|pair| pair == [0x01, 0x02, 0xFF, 0xFF]));
}

#[test]
fn stuck_capture_drops_frames_and_keeps_going() {
    let device = SimDevice::new();
    let mut engine = engine(&device);
    device.set_behavior(SimBehavior::AlwaysBusy);
    let (capture, _) = engine.channels().unwrap();
    let (transport, socket) = transport(1);
    let session = Session::new(1);
    let ptt = ScriptedPtt::default();
    let mut encoder = Pcm16Codec::new(SAMPLES_PER_FRAME);
    let timing = fast_timing();

    let mut tx = TransmitPath::new(&session, &ptt, capture, &mut encoder, &transport, timing);

    ptt.press();
    assert_eq!(tx.tick(), timing.retry);
    assert_eq!(tx.tick(), timing.retry);
    assert!(session.is_transmitting());

    ptt.release();
    tx.tick();

    let stats = session.stats();
    assert_eq!(stats.capture_dropped, 2);
    assert_eq!(stats.frames_sent, 0);
    assert_eq!(
        socket.sent_kinds(),
        [(PacketKind::Start, 0), (PacketKind::End, 1)]
    );
    // the second tick found the channel still busy and never restarted it
    assert_eq!(device.capture_starts(), 1);
}

#[test]
fn finishing_mid_burst_sends_end() {
    let device = SimDevice::new();
    let mut engine = engine(&device);
    let (capture, _) = engine.channels().unwrap();
    let (transport, socket) = transport(1);
    let session = Session::new(1);
    let ptt = ScriptedPtt::default();
    let mut encoder = Pcm16Codec::new(SAMPLES_PER_FRAME);

    let mut tx = TransmitPath::new(&session, &ptt, capture, &mut encoder, &transport, fast_timing());

    tx.finish();
    assert!(socket.sent().is_empty());

    ptt.press();
    tx.tick();
    tx.finish();

    assert!(!session.is_transmitting());
    assert!(!ptt.is_lit(Indicator::Transmit));
    assert_eq!(socket.sent_kinds().last(), Some(&(PacketKind::End, 2)));

    // still held: the next tick sees a fresh press
    tx.tick();
    assert_eq!(socket.sent_kinds()[3], (PacketKind::Start, 3));
}

#[test]
fn cancelling_cuts_the_pause_short() {
    let device = SimDevice::new();
    let mut engine = engine(&device);
    let (capture, _) = engine.channels().unwrap();
    let (transport, socket) = transport(1);
    let session = Session::new(1);
    let ptt = ScriptedPtt::default();
    let mut encoder = Pcm16Codec::new(SAMPLES_PER_FRAME);

    let timing = Timing {
        idle_poll: Duration::from_secs(60),
        ..fast_timing()
    };
    let mut tx = TransmitPath::new(&session, &ptt, capture, &mut encoder, &transport, timing);

    let shutdown = CancellationToken::new();
    let started = Instant::now();

    thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(20));
            shutdown.cancel();
        });

        tx.run(&shutdown);
    });

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(socket.sent().is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn bursts_are_well_formed(presses in prop::collection::vec(any::<bool>(), 1..24)) {
        let device = SimDevice::new();
        let mut engine = engine(&device);
        let (capture, _) = engine.channels().unwrap();
        let (transport, socket) = transport(3);
        let session = Session::new(3);
        let ptt = ScriptedPtt::default();
        let mut encoder = Pcm16Codec::new(SAMPLES_PER_FRAME);

        let mut tx = TransmitPath::new(&session, &ptt, capture, &mut encoder, &transport, fast_timing());

        for &down in &presses {
            if down { ptt.press() } else { ptt.release() }
            tx.tick();
        }
        tx.finish();

        let sent = socket.sent_kinds();
        let mut in_burst = false;

        for (i, &(kind, seq_num)) in sent.iter().enumerate() {
            prop_assert_eq!(seq_num, i as u32);
            match kind {
                PacketKind::Start => {
                    prop_assert!(!in_burst);
                    in_burst = true;
                }
                PacketKind::End => {
                    prop_assert!(in_burst);
                    in_burst = false;
                }
                PacketKind::Audio => prop_assert!(in_burst),
            }
        }
        prop_assert!(!in_burst);

        let held = presses.iter().filter(|&&down| down).count();
        prop_assert_eq!(session.stats().frames_sent, held as u64);
    }
}
