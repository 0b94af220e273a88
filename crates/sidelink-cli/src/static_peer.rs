//! File-backed collaborators for driving a session from the command line.
//!
//! The CLI has no media stack of its own: the local description is read
//! from a file and whatever the remote sends is kept for printing.

use std::path::Path;

use anyhow::{bail, Context};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use sidelink_client::{
    DeviceKind, MediaDevice, MediaSource, MediaStream, MediaTrack, PeerConnection, TrackKind,
};
use sidelink_common::{Error, IceCandidate, Result, SdpType, SessionDescription};

pub const STATIC_DEVICE_ID: &str = "static";

pub struct StaticPeer {
    local: SessionDescription,
    remote: Option<SessionDescription>,
}

impl StaticPeer {
    pub fn from_file(path: &Path, kind: SdpType) -> anyhow::Result<Self> {
        let sdp = std::fs::read_to_string(path)
            .with_context(|| format!("reading session description from {}", path.display()))?;
        if sdp.trim().is_empty() {
            bail!("{} is empty", path.display());
        }
        Ok(Self {
            local: SessionDescription { kind, sdp },
            remote: None,
        })
    }

    pub fn remote(&self) -> Option<&SessionDescription> {
        self.remote.as_ref()
    }

    fn local_as(&self, kind: SdpType) -> Result<SessionDescription> {
        if self.local.kind != kind {
            return Err(Error::peer(format!(
                "loaded description is {:?}, not {:?}",
                self.local.kind, kind
            )));
        }
        Ok(self.local.clone())
    }
}

#[async_trait]
impl PeerConnection for StaticPeer {
    async fn create_offer(&mut self) -> Result<SessionDescription> {
        self.local_as(SdpType::Offer)
    }

    async fn create_answer(&mut self) -> Result<SessionDescription> {
        if self.remote.is_none() {
            return Err(Error::peer("no remote offer to answer"));
        }
        self.local_as(SdpType::Answer)
    }

    async fn set_local_description(&mut self, _description: &SessionDescription) -> Result<()> {
        Ok(())
    }

    async fn set_remote_description(&mut self, description: &SessionDescription) -> Result<()> {
        self.remote = Some(description.clone());
        Ok(())
    }

    async fn add_tracks(&mut self, stream: &MediaStream) -> Result<()> {
        debug!("stream {} carries {} tracks", stream.id, stream.tracks.len());
        Ok(())
    }

    async fn add_ice_candidate(&mut self, candidate: &IceCandidate) -> Result<()> {
        debug!("remote candidate: {}", candidate.0);
        Ok(())
    }

    fn take_local_candidates(&mut self) -> Option<mpsc::UnboundedReceiver<IceCandidate>> {
        None
    }
}

/// A single pseudo camera; its tracks live in the static description.
pub struct StaticMedia;

#[async_trait]
impl MediaSource for StaticMedia {
    async fn enumerate_devices(&self) -> Result<Vec<MediaDevice>> {
        Ok(vec![MediaDevice {
            device_id: STATIC_DEVICE_ID.to_string(),
            label: "Static description".to_string(),
            kind: DeviceKind::VideoInput,
        }])
    }

    async fn open(&self, device_id: &str) -> Result<MediaStream> {
        if device_id != STATIC_DEVICE_ID {
            return Err(Error::media(format!("no such device: {device_id}")));
        }
        Ok(MediaStream {
            id: STATIC_DEVICE_ID.to_string(),
            tracks: vec![MediaTrack {
                id: format!("{STATIC_DEVICE_ID}-video"),
                kind: TrackKind::Video,
            }],
        })
    }
}
