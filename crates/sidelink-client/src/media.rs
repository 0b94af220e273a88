//! Local media capability boundary and the detected-device list.

use async_trait::async_trait;
use tracing::debug;

use sidelink_common::Result;

use crate::reconcile::reconcile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    VideoInput,
    AudioInput,
    AudioOutput,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDevice {
    pub device_id: String,
    pub label: String,
    pub kind: DeviceKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    pub id: String,
    pub kind: TrackKind,
}

/// An opened device, ready to attach to a peer connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStream {
    pub id: String,
    pub tracks: Vec<MediaTrack>,
}

#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn enumerate_devices(&self) -> Result<Vec<MediaDevice>>;
    async fn open(&self, device_id: &str) -> Result<MediaStream>;
}

/// Video input devices offered for selection.
///
/// Refreshing goes through the reconciler, so the list only changes when the
/// enumerated set actually did.
#[derive(Debug, Default)]
pub struct DeviceCatalog {
    devices: Vec<MediaDevice>,
}

impl DeviceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-enumerate and report whether the visible list changed.
    pub async fn refresh<M: MediaSource + ?Sized>(&mut self, source: &M) -> Result<bool> {
        let detected: Vec<MediaDevice> = source
            .enumerate_devices()
            .await?
            .into_iter()
            .filter(|device| device.kind == DeviceKind::VideoInput)
            .collect();
        let changed = reconcile(&mut self.devices, &detected);
        if changed {
            debug!("video devices changed: {} available", self.devices.len());
        }
        Ok(changed)
    }

    pub fn devices(&self) -> &[MediaDevice] {
        &self.devices
    }

    pub fn find(&self, device_id: &str) -> Option<&MediaDevice> {
        self.devices.iter().find(|d| d.device_id == device_id)
    }
}
