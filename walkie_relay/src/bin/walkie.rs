use std::{net::Ipv4Addr, path::PathBuf, process::ExitCode};

use clap::Parser;
use walkie_dma::{DevMemBackend, DmaEngine};
use walkie_net::PacketTransport;
use walkie_relay::{
    Relay, RelayConfig, RelayError, RelaySettings,
    codec::{self, CodecKind},
    config::NetworkMode,
    identity, logging,
    ptt::SysfsPtt,
    shutdown,
};
use walkie_utils::CancellationToken;

/// Push-to-talk audio relay.
///
/// Captures audio while the push-to-talk button is held and sends it to the
/// other boards, plays the audio they send otherwise.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, short, env = "WALKIE_CONFIG")]
    config: Option<PathBuf>,

    /// Identity of this board, overrides $BOARD_ID and /etc/board_id
    #[arg(long)]
    board_id: Option<u32>,

    /// Talk to a single peer instead of a multicast group
    #[arg(long, conflicts_with = "group")]
    peer: Option<Ipv4Addr>,

    /// Multicast group to join
    #[arg(long)]
    group: Option<Ipv4Addr>,

    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    codec: Option<CodecKind>,

    /// Seconds between statistics reports
    #[arg(long)]
    stats_interval: Option<u64>,
}

impl Cli {
    fn apply(&self, config: &mut RelayConfig) {
        if let Some(peer) = self.peer {
            config.network.mode = NetworkMode::Unicast;
            config.network.peer = Some(peer);
        }
        if let Some(group) = self.group {
            config.network.mode = NetworkMode::Multicast;
            config.network.group = group;
        }
        if let Some(port) = self.port {
            config.network.port = port;
        }
        if let Some(codec) = self.codec {
            config.audio.codec = codec;
        }
        if let Some(secs) = self.stats_interval {
            config.timing.stats_interval_secs = secs;
        }
    }
}

fn run(cli: &Cli) -> Result<(), RelayError> {
    let mut config = match &cli.config {
        Some(path) => RelayConfig::load(path)?,
        None => RelayConfig::default(),
    };
    cli.apply(&mut config);
    config.validate()?;

    let board_id = identity::resolve_board_id(cli.board_id);
    log::info!("board id {board_id}");

    let shutdown = CancellationToken::new();
    shutdown::install(&shutdown)?;

    // acquired in this order, released in reverse
    let ptt = SysfsPtt::open(&config.gpio)?;

    let mut dma = DmaEngine::new(
        DevMemBackend::new(config.dma.device.clone()),
        config.dma_layout(),
    );
    dma.initialize()?;
    dma.reset()?;

    let codec = codec::build(config.audio.codec, &config.codec_params())?;

    let transport = PacketTransport::initialize(board_id, config.network.destination()?)?;

    let settings = RelaySettings {
        timing: config.timing(),
        self_mute: config.network.self_mute(),
    };

    let mut relay = Relay::new(Box::new(ptt), dma, transport, codec, settings);
    let stats = relay.run(&shutdown)?;

    match stats.drop_rate() {
        Some(rate) => log::info!("final drop rate: {rate:.1}%"),
        None => log::info!("no audio received"),
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    logging::init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
