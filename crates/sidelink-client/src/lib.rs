//! Sidelink signaling client.
//!
//! Two peers negotiate a media session through a plain HTTP relay: the
//! offerer publishes an offer and polls for the answer, the answerer
//! discovers offers through a shared [`OfferRegistry`] and posts an answer.
//! ICE candidates travel the same side channel once the descriptions are
//! exchanged.

#![forbid(unsafe_code)]

pub mod config;
pub mod media;
pub mod peer;
pub mod poller;
pub mod reconcile;
pub mod registry;
pub mod selection;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testing;

pub use config::ClientConfig;
pub use media::{
    DeviceCatalog, DeviceKind, MediaDevice, MediaSource, MediaStream, MediaTrack, TrackKind,
};
pub use peer::PeerConnection;
pub use poller::{CancelToken, Ticker};
pub use registry::{OfferFeed, OfferList, OfferRegistry, SubscriptionId};
pub use selection::Selection;
pub use session::{PeerSession, Role, SessionState};
pub use transport::{HttpTransport, SignalingTransport};
