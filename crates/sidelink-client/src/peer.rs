//! Peer-connection capability boundary.
//!
//! The media transport itself (SDP generation, ICE agents, tracks) lives
//! outside this crate. Hosts plug it in by implementing [`PeerConnection`].

use async_trait::async_trait;
use tokio::sync::mpsc;

use sidelink_common::{IceCandidate, Result, SessionDescription};

use crate::media::MediaStream;

#[async_trait]
pub trait PeerConnection: Send {
    async fn create_offer(&mut self) -> Result<SessionDescription>;
    async fn create_answer(&mut self) -> Result<SessionDescription>;
    async fn set_local_description(&mut self, description: &SessionDescription) -> Result<()>;
    async fn set_remote_description(&mut self, description: &SessionDescription) -> Result<()>;

    /// Attach every track of a local stream for sending.
    async fn add_tracks(&mut self, stream: &MediaStream) -> Result<()>;

    async fn add_ice_candidate(&mut self, candidate: &IceCandidate) -> Result<()>;

    /// Local candidate events. Handed out once; later calls return `None`.
    fn take_local_candidates(&mut self) -> Option<mpsc::UnboundedReceiver<IceCandidate>>;
}

/// Create an offer and install it as the local description.
pub async fn create_local_offer<P: PeerConnection + ?Sized>(
    peer: &mut P,
) -> Result<SessionDescription> {
    let offer = peer.create_offer().await?;
    peer.set_local_description(&offer).await?;
    Ok(offer)
}

/// Install a remote offer, then create and install the matching answer.
pub async fn create_local_answer<P: PeerConnection + ?Sized>(
    peer: &mut P,
    offer: &SessionDescription,
) -> Result<SessionDescription> {
    peer.set_remote_description(offer).await?;
    let answer = peer.create_answer().await?;
    peer.set_local_description(&answer).await?;
    Ok(answer)
}
