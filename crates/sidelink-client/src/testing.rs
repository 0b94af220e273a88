//! Scripted collaborators for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use sidelink_common::{
    Answer, ConnectivityMessage, Error, IceCandidate, Offer, Result, SessionDescription,
    SessionId, TransportError,
};

use crate::media::{DeviceKind, MediaDevice, MediaSource, MediaStream, MediaTrack, TrackKind};
use crate::peer::PeerConnection;
use crate::transport::SignalingTransport;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    PostOffer(Offer),
    PostAnswer(Answer),
    PostConnectivity(String, IceCandidate),
    PollAnswer(String),
    PollOffers,
    PollConnectivity(String),
}

/// Transport whose responses are queued up front. Empty queues answer with
/// success and no data.
#[derive(Default)]
pub struct ScriptedTransport {
    pub offer_posts: Mutex<VecDeque<std::result::Result<(), TransportError>>>,
    pub answer_posts: Mutex<VecDeque<std::result::Result<(), TransportError>>>,
    pub candidate_posts: Mutex<VecDeque<std::result::Result<(), TransportError>>>,
    pub answers: Mutex<VecDeque<std::result::Result<Option<Answer>, TransportError>>>,
    pub offers: Mutex<VecDeque<std::result::Result<Vec<Offer>, TransportError>>>,
    pub candidates: Mutex<HashMap<String, Vec<IceCandidate>>>,
    pub calls: Mutex<Vec<Call>>,
    offer_polls_in_flight: AtomicUsize,
    max_offer_polls_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub fn push_offers(&self, result: std::result::Result<Vec<Offer>, TransportError>) {
        self.offers.lock().unwrap().push_back(result);
    }

    pub fn push_answer(&self, result: std::result::Result<Option<Answer>, TransportError>) {
        self.answers.lock().unwrap().push_back(result);
    }

    /// Highest number of offer polls that were ever running at once.
    pub fn max_offer_polls_in_flight(&self) -> usize {
        self.max_offer_polls_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

pub fn down() -> TransportError {
    TransportError::network("relay unreachable")
}

#[async_trait]
impl SignalingTransport for ScriptedTransport {
    async fn post_offer(&self, offer: &Offer) -> std::result::Result<(), TransportError> {
        self.record(Call::PostOffer(offer.clone()));
        self.offer_posts.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn post_answer(&self, answer: &Answer) -> std::result::Result<(), TransportError> {
        self.record(Call::PostAnswer(answer.clone()));
        self.answer_posts.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn post_connectivity(
        &self,
        client_id: &SessionId,
        candidate: &IceCandidate,
    ) -> std::result::Result<(), TransportError> {
        self.record(Call::PostConnectivity(
            client_id.to_string(),
            candidate.clone(),
        ));
        self.candidate_posts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn poll_answer(
        &self,
        offerer_id: &SessionId,
    ) -> std::result::Result<Option<Answer>, TransportError> {
        self.record(Call::PollAnswer(offerer_id.to_string()));
        self.answers.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }

    async fn poll_offers(&self) -> std::result::Result<Vec<Offer>, TransportError> {
        self.record(Call::PollOffers);
        let now = self.offer_polls_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_offer_polls_in_flight.fetch_max(now, Ordering::SeqCst);
        // Let a concurrent poll run before this one answers.
        tokio::task::yield_now().await;
        let result = self.offers.lock().unwrap().pop_front().unwrap_or(Ok(vec![]));
        self.offer_polls_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn poll_connectivity(
        &self,
        remote_id: &str,
    ) -> std::result::Result<Vec<ConnectivityMessage>, TransportError> {
        self.record(Call::PollConnectivity(remote_id.to_string()));
        let candidates = self
            .candidates
            .lock()
            .unwrap()
            .get(remote_id)
            .cloned()
            .unwrap_or_default();
        Ok(candidates
            .into_iter()
            .map(|candidate| ConnectivityMessage {
                target_client_id: remote_id.to_string(),
                candidate,
            })
            .collect())
    }
}

/// Peer that fabricates descriptions and records what it was given.
pub struct FakePeer {
    pub local: Option<SessionDescription>,
    pub remote: Option<SessionDescription>,
    pub streams: Vec<MediaStream>,
    pub applied: Vec<IceCandidate>,
    pub fail_remote: bool,
    /// Candidates that `add_ice_candidate` refuses.
    pub reject: Vec<IceCandidate>,
    candidate_tx: mpsc::UnboundedSender<IceCandidate>,
    candidate_rx: Option<mpsc::UnboundedReceiver<IceCandidate>>,
}

impl FakePeer {
    pub fn new() -> Self {
        let (candidate_tx, candidate_rx) = mpsc::unbounded_channel();
        Self {
            local: None,
            remote: None,
            streams: Vec::new(),
            applied: Vec::new(),
            fail_remote: false,
            reject: Vec::new(),
            candidate_tx,
            candidate_rx: Some(candidate_rx),
        }
    }

    /// Handle for emitting local candidate events.
    pub fn candidate_events(&self) -> mpsc::UnboundedSender<IceCandidate> {
        self.candidate_tx.clone()
    }
}

#[async_trait]
impl PeerConnection for FakePeer {
    async fn create_offer(&mut self) -> Result<SessionDescription> {
        Ok(SessionDescription::offer("v=0 fake-offer"))
    }

    async fn create_answer(&mut self) -> Result<SessionDescription> {
        if self.remote.is_none() {
            return Err(Error::peer("no remote description"));
        }
        Ok(SessionDescription::answer("v=0 fake-answer"))
    }

    async fn set_local_description(&mut self, description: &SessionDescription) -> Result<()> {
        self.local = Some(description.clone());
        Ok(())
    }

    async fn set_remote_description(&mut self, description: &SessionDescription) -> Result<()> {
        if self.fail_remote {
            return Err(Error::peer("rejected remote description"));
        }
        self.remote = Some(description.clone());
        Ok(())
    }

    async fn add_tracks(&mut self, stream: &MediaStream) -> Result<()> {
        self.streams.push(stream.clone());
        Ok(())
    }

    async fn add_ice_candidate(&mut self, candidate: &IceCandidate) -> Result<()> {
        if self.reject.contains(candidate) {
            return Err(Error::peer("malformed candidate"));
        }
        self.applied.push(candidate.clone());
        Ok(())
    }

    fn take_local_candidates(&mut self) -> Option<mpsc::UnboundedReceiver<IceCandidate>> {
        self.candidate_rx.take()
    }
}

pub struct FakeCamera;

#[async_trait]
impl MediaSource for FakeCamera {
    async fn enumerate_devices(&self) -> Result<Vec<MediaDevice>> {
        Ok(vec![camera()])
    }

    async fn open(&self, device_id: &str) -> Result<MediaStream> {
        Ok(MediaStream {
            id: format!("stream-{device_id}"),
            tracks: vec![MediaTrack {
                id: format!("{device_id}-video"),
                kind: TrackKind::Video,
            }],
        })
    }
}

pub fn camera() -> MediaDevice {
    MediaDevice {
        device_id: "cam0".into(),
        label: "Front camera".into(),
        kind: DeviceKind::VideoInput,
    }
}

pub fn offer(label: &str, offerer_id: &str) -> Offer {
    Offer {
        label: label.into(),
        offerer_id: offerer_id.into(),
        sdp: SessionDescription::offer(format!("v=0 {offerer_id}")),
    }
}
