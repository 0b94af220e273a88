//! Sidelink CLI: watch offers, offer or answer a session description.

#![forbid(unsafe_code)]

mod static_peer;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use sidelink_client::config::DEFAULT_SERVER_URL;
use sidelink_client::{
    CancelToken, ClientConfig, DeviceCatalog, HttpTransport, OfferRegistry, PeerSession,
    Selection, SignalingTransport,
};
use sidelink_common::{Offer, SdpType};

use crate::static_peer::{StaticMedia, StaticPeer};

#[derive(Parser, Debug)]
#[command(name = "sidelink")]
#[command(about = "Sidelink signaling client")]
struct Args {
    /// Signaling relay base URL
    #[arg(long, global = true, env = "SIDELINK_SERVER_URL", default_value = DEFAULT_SERVER_URL)]
    server: String,

    /// Poll interval in milliseconds
    #[arg(long, global = true, env = "SIDELINK_POLL_INTERVAL_MS", default_value_t = 1000)]
    poll_interval_ms: u64,

    /// Log level
    #[arg(long, global = true, env = "SIDELINK_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the open offers every time the list changes
    Offers {
        /// Exit after this many changes
        #[arg(long)]
        changes: Option<usize>,
    },

    /// Publish an offer and wait for its answer
    Offer {
        /// Label shown to answerers
        #[arg(short, long)]
        label: String,

        /// File holding the offer SDP
        #[arg(long)]
        sdp: PathBuf,
    },

    /// Answer the first offer carrying a label
    Answer {
        /// Label of the offer to answer
        #[arg(short, long)]
        label: String,

        /// File holding the answer SDP
        #[arg(long)]
        sdp: PathBuf,
    },

    /// Show version information
    Version,
}

fn main() -> Result<()> {
    let args = Args::parse();

    sidelink_common::init_tracing_with_default(&args.log_level);

    if let Command::Version = args.command {
        println!("sidelink {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = ClientConfig::from_env()
        .with_server_url(args.server.clone())
        .with_poll_interval(Duration::from_millis(args.poll_interval_ms));
    config.validate()?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(run(args.command, config))
}

async fn run(command: Command, config: ClientConfig) -> Result<()> {
    let transport: Arc<dyn SignalingTransport> = Arc::new(HttpTransport::new(&config)?);
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupted");
                cancel.cancel();
            }
        });
    }

    match command {
        Command::Offers { changes } => watch_offers(transport, &config, changes, &cancel).await,
        Command::Offer { label, sdp } => offer(transport, config, &label, sdp, &cancel).await,
        Command::Answer { label, sdp } => answer(transport, config, &label, sdp, &cancel).await,
        Command::Version => Ok(()),
    }
}

fn print_offers(offers: &[Offer]) {
    println!("{} open offer(s)", offers.len());
    for offer in offers {
        println!("  {:<24} {}", offer.label, offer.offerer_id);
    }
}

async fn watch_offers(
    transport: Arc<dyn SignalingTransport>,
    config: &ClientConfig,
    changes: Option<usize>,
    cancel: &CancelToken,
) -> Result<()> {
    let registry = OfferRegistry::new(transport, config)?;
    let mut feed = registry.watch();
    registry.start()?;

    let mut seen = 0;
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => None,
            offers = feed.next() => offers,
        };
        let Some(offers) = next else { break };
        print_offers(&offers);
        seen += 1;
        if changes.is_some_and(|limit| seen >= limit) {
            break;
        }
    }
    registry.stop();
    Ok(())
}

async fn offer(
    transport: Arc<dyn SignalingTransport>,
    config: ClientConfig,
    label: &str,
    sdp: PathBuf,
    cancel: &CancelToken,
) -> Result<()> {
    let peer = StaticPeer::from_file(&sdp, SdpType::Offer)?;
    let media = StaticMedia;
    let mut catalog = DeviceCatalog::new();
    catalog.refresh(&media).await?;
    let device = catalog
        .devices()
        .first()
        .cloned()
        .map(Selection::Chosen)
        .unwrap_or_default();

    let mut session = PeerSession::offerer(peer, transport, config)?;
    info!("offering {:?} as {}", label, session.id());
    session
        .run_offerer(label, &device, &media, cancel)
        .await
        .context("offer was not answered")?;

    let remote = session.peer().remote().context("connected without an answer")?;
    eprintln!("answered by {}", session.remote_id().unwrap_or("unknown"));
    println!("{}", remote.sdp);
    Ok(())
}

async fn answer(
    transport: Arc<dyn SignalingTransport>,
    config: ClientConfig,
    label: &str,
    sdp: PathBuf,
    cancel: &CancelToken,
) -> Result<()> {
    let peer = StaticPeer::from_file(&sdp, SdpType::Answer)?;
    let registry = OfferRegistry::new(transport.clone(), &config)?;
    registry.start()?;

    let mut session = PeerSession::answerer(peer, transport, config)?;
    info!("waiting for an offer labelled {:?}", label);
    let result = session.run_answerer(&registry, label, cancel).await;
    registry.stop();
    if let Err(e) = &result {
        warn!("session {} ended in {}: {}", session.id(), session.state(), e);
    }
    result.context("could not answer")?;

    let remote = session.peer().remote().context("connected without an offer")?;
    eprintln!("answered {}", session.remote_id().unwrap_or("unknown"));
    println!("{}", remote.sdp);
    Ok(())
}
