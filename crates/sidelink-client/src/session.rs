//! One side of a peer negotiation, from first offer to connected.
//!
//! ```text
//! offerer:  Idle -> Offered -> AwaitingAnswer -> Connected
//! answerer: Idle -> Discovering -> Answering  -> Connected
//! ```
//!
//! Any non-terminal state may drop to `Failed` once retries are exhausted
//! or the peer rejects a description. A session never moves backwards.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use sidelink_common::{
    Answer, Error, IceCandidate, Offer, Result, SessionDescription, SessionId, TransportError,
};

use crate::config::ClientConfig;
use crate::media::{MediaDevice, MediaSource};
use crate::peer::{create_local_answer, create_local_offer, PeerConnection};
use crate::poller::{CancelToken, Ticker};
use crate::registry::{OfferFeed, OfferRegistry};
use crate::selection::Selection;
use crate::transport::SignalingTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Offerer,
    Answerer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Offerer => write!(f, "offerer"),
            Role::Answerer => write!(f, "answerer"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Offered,
    AwaitingAnswer,
    Discovering,
    Answering,
    Connected,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Connected | SessionState::Failed)
    }

    fn can_advance(self, role: Role, next: SessionState) -> bool {
        use SessionState::*;
        if next == Failed {
            return !self.is_terminal();
        }
        match role {
            Role::Offerer => matches!(
                (self, next),
                (Idle, Offered) | (Offered, AwaitingAnswer) | (AwaitingAnswer, Connected)
            ),
            Role::Answerer => matches!(
                (self, next),
                (Idle, Discovering) | (Discovering, Answering) | (Answering, Connected)
            ),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Offered => "offered",
            SessionState::AwaitingAnswer => "awaiting answer",
            SessionState::Discovering => "discovering",
            SessionState::Answering => "answering",
            SessionState::Connected => "connected",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// First offer in `offers` carrying `label`.
pub fn find_offer_by_label<'a>(offers: &'a [Offer], label: &str) -> Option<&'a Offer> {
    offers.iter().find(|offer| offer.label == label)
}

pub struct PeerSession<P: PeerConnection> {
    id: SessionId,
    role: Role,
    state: SessionState,
    peer: P,
    transport: Arc<dyn SignalingTransport>,
    config: ClientConfig,
    label: Option<String>,
    remote_id: Option<String>,
    local_offer: Option<SessionDescription>,
    pending_answer: Option<Answer>,
    post_failures: u32,
    poll_failures: u32,
    answer_poll: Option<CancelToken>,
    local_candidates: Option<mpsc::UnboundedReceiver<IceCandidate>>,
    outbox: VecDeque<IceCandidate>,
    applied_remote: usize,
}

impl<P: PeerConnection> PeerSession<P> {
    /// Fails if `config` does not validate.
    pub fn new(
        role: Role,
        peer: P,
        transport: Arc<dyn SignalingTransport>,
        config: ClientConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            id: SessionId::generate(),
            role,
            state: SessionState::Idle,
            peer,
            transport,
            config,
            label: None,
            remote_id: None,
            local_offer: None,
            pending_answer: None,
            post_failures: 0,
            poll_failures: 0,
            answer_poll: None,
            local_candidates: None,
            outbox: VecDeque::new(),
            applied_remote: 0,
        })
    }

    pub fn offerer(
        peer: P,
        transport: Arc<dyn SignalingTransport>,
        config: ClientConfig,
    ) -> Result<Self> {
        Self::new(Role::Offerer, peer, transport, config)
    }

    pub fn answerer(
        peer: P,
        transport: Arc<dyn SignalingTransport>,
        config: ClientConfig,
    ) -> Result<Self> {
        Self::new(Role::Answerer, peer, transport, config)
    }

    /// Replace the generated identifier. Only meaningful before signaling.
    pub fn with_id(mut self, id: SessionId) -> Self {
        self.id = id;
        self
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// The counterpart's session id, once known.
    pub fn remote_id(&self) -> Option<&str> {
        self.remote_id.as_deref()
    }

    pub fn peer(&self) -> &P {
        &self.peer
    }

    pub fn peer_mut(&mut self) -> &mut P {
        &mut self.peer
    }

    /// Whether an answer poll is live.
    pub fn is_polling(&self) -> bool {
        self.answer_poll
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }

    /// Token that stops the answer poll when cancelled from elsewhere.
    pub fn answer_poll_token(&self) -> Option<CancelToken> {
        self.answer_poll.clone()
    }

    fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_advance(self.role, next) {
            warn!("session {}: refusing {} -> {}", self.id, self.state, next);
            return Err(Error::invalid_state(self.state, "advance the session"));
        }
        info!("session {} ({}): {} -> {}", self.id, self.role, self.state, next);
        self.state = next;
        Ok(())
    }

    fn fail(&mut self, reason: &str) {
        if self.state.is_terminal() {
            return;
        }
        warn!("session {} failed in {}: {}", self.id, self.state, reason);
        self.stop_answer_poll();
        self.state = SessionState::Failed;
    }

    fn require(&self, role: Role, states: &[SessionState], action: &'static str) -> Result<()> {
        if self.role != role {
            return Err(Error::invalid_state(format!("in the {} role", self.role), action));
        }
        if !states.contains(&self.state) {
            return Err(Error::invalid_state(self.state, action));
        }
        Ok(())
    }

    /// Count a failed post. Drops to `Failed` once the attempt budget is spent.
    fn post_failed(&mut self, err: TransportError) -> Error {
        self.post_failures += 1;
        if self.post_failures >= self.config.max_attempts {
            self.fail(&format!("{} failed attempts, last: {}", self.post_failures, err));
        }
        Error::Transport(err)
    }

    fn stop_answer_poll(&mut self) {
        if let Some(token) = self.answer_poll.take() {
            token.cancel();
            debug!("session {}: answer poll stopped", self.id);
        }
    }

    fn adopt_candidate_events(&mut self) {
        if self.local_candidates.is_none() {
            self.local_candidates = self.peer.take_local_candidates();
        }
    }

    // ---- offerer ----

    /// Publish an offer for `device` under `label` and start waiting for an
    /// answer.
    ///
    /// On a failed post the session stays `Idle` and the call may be
    /// repeated; the media and local description are only set up once.
    pub async fn offer<M>(
        &mut self,
        label: &str,
        device: &Selection<MediaDevice>,
        media: &M,
    ) -> Result<()>
    where
        M: MediaSource + ?Sized,
    {
        self.require(Role::Offerer, &[SessionState::Idle], "post an offer")?;
        let device = device.validate()?;
        if label.trim().is_empty() {
            return Err(Error::validation("offer label must not be empty"));
        }

        let sdp = match &self.local_offer {
            Some(sdp) => sdp.clone(),
            None => {
                let stream = media.open(&device.device_id).await?;
                self.peer.add_tracks(&stream).await?;
                let sdp = create_local_offer(&mut self.peer).await?;
                self.adopt_candidate_events();
                self.local_offer = Some(sdp.clone());
                sdp
            }
        };

        let offer = Offer {
            label: label.to_string(),
            offerer_id: self.id.to_string(),
            sdp,
        };
        if let Err(e) = self.transport.post_offer(&offer).await {
            return Err(self.post_failed(e));
        }
        self.post_failures = 0;
        self.label = Some(offer.label);
        self.transition(SessionState::Offered)?;
        self.answer_poll = Some(CancelToken::new());
        self.transition(SessionState::AwaitingAnswer)
    }

    /// One answer poll. Returns `true` once the session is connected.
    ///
    /// While the answer poll is cancelled this makes no request;
    /// [`PeerSession::await_answer`] re-arms it.
    pub async fn poll_answer_once(&mut self) -> Result<bool> {
        if self.state != SessionState::AwaitingAnswer {
            debug!("session {}: answer poll ignored in {}", self.id, self.state);
            return Ok(self.state == SessionState::Connected);
        }
        let Some(token) = self.answer_poll.clone() else {
            return Ok(false);
        };

        let polled = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(false),
            polled = self.transport.poll_answer(&self.id) => polled,
        };
        let answer = match polled {
            Ok(Some(answer)) => answer,
            Ok(None) => {
                self.poll_failures = 0;
                return Ok(false);
            }
            Err(e) => {
                self.poll_failures += 1;
                if let Some(limit) = self.config.answer_poll_failure_limit {
                    if self.poll_failures >= limit {
                        self.fail(&format!(
                            "{} failed answer polls, last: {}",
                            self.poll_failures, e
                        ));
                    }
                }
                return Err(e.into());
            }
        };
        self.poll_failures = 0;

        self.stop_answer_poll();
        self.remote_id = Some(answer.answerer_id.clone());
        if let Err(e) = self.peer.set_remote_description(&answer.sdp).await {
            self.fail(&format!("remote answer rejected: {e}"));
            return Err(e);
        }
        self.transition(SessionState::Connected)?;
        Ok(true)
    }

    /// Poll for the answer every interval until connected, failed or the
    /// poll is cancelled through [`PeerSession::answer_poll_token`].
    ///
    /// After a cancellation the session is still awaiting its answer; calling
    /// this again resumes polling under a fresh token.
    pub async fn await_answer(&mut self) -> Result<()> {
        match self.state {
            SessionState::AwaitingAnswer => {}
            SessionState::Connected => return Ok(()),
            other => return Err(Error::invalid_state(other, "await an answer")),
        }
        if !self.is_polling() {
            debug!("session {}: answer poll (re)started", self.id);
            self.answer_poll = Some(CancelToken::new());
        }
        let token = self
            .answer_poll
            .clone()
            .ok_or_else(|| Error::invalid_state(self.state, "await an answer"))?;
        let mut ticker = Ticker::new(self.config.poll_interval, token)?;

        while ticker.tick().await {
            self.forward_local_candidates().await;
            match self.poll_answer_once().await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) if e.is_transport() && self.state == SessionState::AwaitingAnswer => {
                    debug!("session {}: answer poll failed, retrying: {}", self.id, e);
                }
                Err(e) => return Err(e),
            }
        }
        match self.state {
            SessionState::Connected => Ok(()),
            _ => Err(Error::Cancelled),
        }
    }

    /// Offer with retry, then wait for the answer.
    pub async fn run_offerer<M>(
        &mut self,
        label: &str,
        device: &Selection<MediaDevice>,
        media: &M,
        cancel: &CancelToken,
    ) -> Result<()>
    where
        M: MediaSource + ?Sized,
    {
        let mut attempt = 0;
        loop {
            match self.offer(label, device, media).await {
                Ok(()) => break,
                Err(e) if e.is_transport() && self.state == SessionState::Idle => {
                    attempt += 1;
                    let delay = self.config.backoff(attempt);
                    warn!("offer post failed ({}), retrying in {:?}", e, delay);
                    if !cancel.sleep(delay).await {
                        return Err(Error::Cancelled);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        let outcome = tokio::select! {
            _ = cancel.cancelled() => None,
            result = self.await_answer() => Some(result),
        };
        match outcome {
            Some(result) => result,
            None => {
                self.stop_answer_poll();
                Err(Error::Cancelled)
            }
        }
    }

    // ---- answerer ----

    /// Start watching the registry for offers. Dropping the returned feed
    /// ends the subscription.
    pub fn discover(&mut self, registry: &OfferRegistry) -> Result<OfferFeed> {
        self.require(Role::Answerer, &[SessionState::Idle], "discover offers")?;
        let feed = registry.watch();
        self.transition(SessionState::Discovering)?;
        Ok(feed)
    }

    /// Answer the chosen offer and post the answer.
    ///
    /// If the post fails the session stays `Answering`; retry with
    /// [`PeerSession::send_answer`].
    pub async fn answer(&mut self, selection: &Selection<Offer>) -> Result<()> {
        self.require(Role::Answerer, &[SessionState::Discovering], "answer an offer")?;
        let offer = selection.validate()?.clone();

        let sdp = match create_local_answer(&mut self.peer, &offer.sdp).await {
            Ok(sdp) => sdp,
            Err(e) => {
                self.fail(&format!("could not answer {}: {e}", offer.offerer_id));
                return Err(e);
            }
        };
        self.adopt_candidate_events();
        self.remote_id = Some(offer.offerer_id.clone());
        self.label = Some(offer.label.clone());
        self.pending_answer = Some(Answer {
            offerer_id: offer.offerer_id,
            answerer_id: self.id.to_string(),
            sdp,
        });
        self.transition(SessionState::Answering)?;
        self.send_answer().await
    }

    pub async fn send_answer(&mut self) -> Result<()> {
        self.require(Role::Answerer, &[SessionState::Answering], "send an answer")?;
        let Some(answer) = self.pending_answer.clone() else {
            return Err(Error::invalid_state(self.state, "send an answer"));
        };
        if let Err(e) = self.transport.post_answer(&answer).await {
            return Err(self.post_failed(e));
        }
        self.post_failures = 0;
        self.pending_answer = None;
        self.stop_answer_poll();
        self.transition(SessionState::Connected)
    }

    /// Wait for an offer labelled `target_label`, answer it and retry the
    /// post until it lands.
    ///
    /// The registry's current list is checked first, since change
    /// notifications never replay earlier state.
    pub async fn run_answerer(
        &mut self,
        registry: &OfferRegistry,
        target_label: &str,
        cancel: &CancelToken,
    ) -> Result<()> {
        let mut feed = self.discover(registry)?;
        let found = registry.visible().find_by_label(target_label);
        let offer = match found {
            Some(offer) => offer,
            None => loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => None,
                    offers = feed.next() => offers,
                };
                let Some(offers) = next else {
                    registry.unsubscribe(feed.id());
                    return Err(Error::Cancelled);
                };
                if let Some(offer) = find_offer_by_label(&offers, target_label) {
                    break offer.clone();
                }
            },
        };
        registry.unsubscribe(feed.id());
        info!("answering {:?} from {}", offer.label, offer.offerer_id);

        let mut result = self.answer(&Selection::Chosen(offer)).await;
        let mut attempt = 0;
        loop {
            match result {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transport() && self.state == SessionState::Answering => {
                    attempt += 1;
                    let delay = self.config.backoff(attempt);
                    warn!("answer post failed ({}), retrying in {:?}", e, delay);
                    if !cancel.sleep(delay).await {
                        return Err(Error::Cancelled);
                    }
                    result = self.send_answer().await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    // ---- connectivity ----

    /// Post queued local candidates. Returns how many were delivered.
    ///
    /// Undelivered candidates stay queued for the next call.
    pub async fn forward_local_candidates(&mut self) -> usize {
        if let Some(rx) = self.local_candidates.as_mut() {
            while let Ok(candidate) = rx.try_recv() {
                self.outbox.push_back(candidate);
            }
        }
        let mut sent = 0;
        while let Some(candidate) = self.outbox.front() {
            match self.transport.post_connectivity(&self.id, candidate).await {
                Ok(()) => {
                    self.outbox.pop_front();
                    sent += 1;
                }
                Err(e) => {
                    debug!("session {}: candidate post deferred: {}", self.id, e);
                    break;
                }
            }
        }
        sent
    }

    /// Apply remote candidates not seen yet. Deferred until connected.
    pub async fn apply_remote_candidates(&mut self) -> Result<usize> {
        if self.state != SessionState::Connected {
            debug!("session {}: remote candidates deferred in {}", self.id, self.state);
            return Ok(0);
        }
        let Some(remote) = self.remote_id.clone() else {
            warn!("session {}: connected without a remote id", self.id);
            return Ok(0);
        };

        let messages = self.transport.poll_connectivity(&remote).await?;
        if messages.len() < self.applied_remote {
            warn!(
                "session {}: remote candidate list shrank from {} to {}, reapplying",
                self.id,
                self.applied_remote,
                messages.len()
            );
            self.applied_remote = 0;
        }

        let mut applied = 0;
        for message in &messages[self.applied_remote..] {
            self.applied_remote += 1;
            // Skip candidates the peer rejects.
            if let Err(e) = self.peer.add_ice_candidate(&message.candidate).await {
                warn!(
                    "session {}: skipping remote candidate from {}: {}",
                    self.id, message.target_client_id, e
                );
                continue;
            }
            applied += 1;
        }
        Ok(applied)
    }

    /// Keep exchanging candidates every interval until cancelled.
    pub async fn run_connectivity(&mut self, cancel: &CancelToken) -> Result<()> {
        let mut ticker = Ticker::new(self.config.poll_interval, cancel.clone())?;
        while ticker.tick().await {
            if ticker.guard(self.forward_local_candidates()).await.is_none() {
                break;
            }
            match ticker.guard(self.apply_remote_candidates()).await {
                None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) if e.is_transport() => {
                    debug!("session {}: candidate poll failed: {}", self.id, e);
                }
                Some(Err(e)) => return Err(e),
            }
        }
        Ok(())
    }
}

impl<P: PeerConnection> Drop for PeerSession<P> {
    fn drop(&mut self) {
        self.stop_answer_poll();
    }
}
