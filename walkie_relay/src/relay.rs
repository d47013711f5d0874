use std::thread;

use walkie_dma::{DmaBackend, DmaEngine};
use walkie_net::{DatagramSocket, PacketTransport};
use walkie_utils::{CancellationToken, Deadline};

use crate::{
    PttControl, ReceivePath, RelayError, Session, Stats, Timing, TransmitPath,
    codec::{CodecPair, FrameDecoder, FrameEncoder},
};

/// How often the supervising thread checks for shutdown.
const SUPERVISE_POLL: core::time::Duration = core::time::Duration::from_millis(50);

/// Settings that aren't owned by any single component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySettings {
    pub timing: Timing,
    /// Discard packets carrying this board's id.
    pub self_mute: bool,
}

/// Owns every component of a running relay.
///
/// [`run`](Self::run) drives the transmit and receive loops on two scoped
/// threads, while the calling thread reports statistics and waits for shutdown.
///
/// Fields drop in reverse order of acquisition: network, codecs, DMA, then GPIO.
pub struct Relay<Bk: DmaBackend, S: DatagramSocket> {
    transport: PacketTransport<S>,
    encoder: Box<dyn FrameEncoder>,
    decoder: Box<dyn FrameDecoder>,
    dma: DmaEngine<Bk>,
    ptt: Box<dyn PttControl>,
    session: Session,
    settings: RelaySettings,
}

impl<Bk: DmaBackend, S: DatagramSocket> Relay<Bk, S> {
    /// `dma` must be initialized before [`run`](Self::run) is called.
    pub fn new(
        ptt: Box<dyn PttControl>,
        dma: DmaEngine<Bk>,
        transport: PacketTransport<S>,
        (encoder, decoder): CodecPair,
        settings: RelaySettings,
    ) -> Self {
        Self {
            session: Session::new(transport.board_id()),
            ptt,
            dma,
            transport,
            encoder,
            decoder,
            settings,
        }
    }

    #[inline(always)]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[inline(always)]
    pub fn transport(&self) -> &PacketTransport<S> {
        &self.transport
    }

    /// Runs both loops until `shutdown` is cancelled, or one of them stops.
    ///
    /// Both threads are joined before returning, and `shutdown` is left
    /// cancelled.
    pub fn run(&mut self, shutdown: &CancellationToken) -> Result<Stats, RelayError> {
        let Self {
            session,
            ptt,
            dma,
            transport,
            encoder,
            decoder,
            settings,
        } = self;

        let (capture, playback) = dma.channels()?;
        let (session, ptt, transport) = (&*session, &**ptt, &*transport);
        let RelaySettings { timing, self_mute } = *settings;

        log::info!(
            "relay running as board {} ({}, self mute {})",
            session.board_id(),
            transport.destination(),
            if self_mute { "on" } else { "off" },
        );

        thread::scope(|scope| {
            let tx = thread::Builder::new()
                .name("walkie-tx".into())
                .spawn_scoped(scope, move || {
                    TransmitPath::new(session, ptt, capture, &mut **encoder, transport, timing)
                        .run(shutdown)
                })
                .map_err(|source| {
                    shutdown.cancel();
                    RelayError::Spawn {
                        name: "transmit",
                        source,
                    }
                })?;

            let rx = thread::Builder::new()
                .name("walkie-rx".into())
                .spawn_scoped(scope, move || {
                    ReceivePath::new(
                        session,
                        ptt,
                        playback,
                        &mut **decoder,
                        transport,
                        timing,
                        self_mute,
                    )
                    .run(shutdown)
                })
                .map_err(|source| {
                    shutdown.cancel();
                    RelayError::Spawn {
                        name: "receive",
                        source,
                    }
                })?;

            supervise(session, timing, shutdown, || {
                tx.is_finished() || rx.is_finished()
            });

            // a loop that died on its own takes the other one down with it
            shutdown.cancel();

            let tx = tx.join();
            let rx = rx.join();

            if tx.is_err() {
                return Err(RelayError::WorkerPanicked("transmit"));
            }
            if rx.is_err() {
                return Err(RelayError::WorkerPanicked("receive"));
            }

            Ok(())
        })?;

        let stats = session.stats();
        log::info!("relay stopped, {stats}");

        Ok(stats)
    }
}

/// Logs statistics every `timing.stats_interval`, until shutdown or `finished`.
fn supervise(
    session: &Session,
    timing: Timing,
    shutdown: &CancellationToken,
    finished: impl Fn() -> bool,
) {
    let mut report = Deadline::after(timing.stats_interval);

    while !shutdown.is_cancelled() && !finished() {
        thread::sleep(SUPERVISE_POLL);

        if report.is_expired() {
            log::info!("{}", session.stats());
            report = Deadline::after(timing.stats_interval);
        }
    }
}
