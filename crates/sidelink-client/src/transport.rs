//! Side-channel request/response exchanges.
//!
//! Every operation is a single stateless request. Failures come back as
//! [`TransportError`] values and are logged here; nothing is retried at this
//! layer, the pollers and sessions above decide when to try again.

use async_trait::async_trait;
use reqwest::{header, Method, Url};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use sidelink_common::protocol::{
    paths, AnswerResponse, CandidatesResponse, OffersResponse, StatusEnvelope,
};
use sidelink_common::{
    Answer, ConnectivityMessage, Error, IceCandidate, Offer, Result, SessionId, TransportError,
};

use crate::config::ClientConfig;

const UNKNOWN_ERROR: &str = "unknown signaling error";

/// The six side-channel operations used by sessions and the offer registry.
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    /// `POST /make-offer`
    async fn post_offer(&self, offer: &Offer) -> std::result::Result<(), TransportError>;

    /// `POST /make-answer`
    async fn post_answer(&self, answer: &Answer) -> std::result::Result<(), TransportError>;

    /// `POST /ice/{client_id}`, attributing the candidate to the sender.
    async fn post_connectivity(
        &self,
        client_id: &SessionId,
        candidate: &IceCandidate,
    ) -> std::result::Result<(), TransportError>;

    /// `GET /answer/{offerer_id}`. `Ok(None)` until someone has answered.
    async fn poll_answer(
        &self,
        offerer_id: &SessionId,
    ) -> std::result::Result<Option<Answer>, TransportError>;

    /// `GET /offers`
    async fn poll_offers(&self) -> std::result::Result<Vec<Offer>, TransportError>;

    /// `GET /ice/{remote_id}`: everything the remote has posted so far.
    async fn poll_connectivity(
        &self,
        remote_id: &str,
    ) -> std::result::Result<Vec<ConnectivityMessage>, TransportError>;
}

/// JSON-over-HTTP transport against a signaling relay.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let mut base_url = config.server_url()?;
        // Endpoints are joined relative to the base, so keep any path prefix.
        if !base_url.path().ends_with('/') {
            let prefixed = format!("{}/", base_url.path());
            base_url.set_path(&prefixed);
        }
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(Error::config)?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve an endpoint path such as `/offers` under the base URL.
    pub fn endpoint(&self, path: &str) -> std::result::Result<Url, TransportError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| TransportError::network(format!("bad endpoint {path}: {e}")))
    }

    /// One request/response exchange.
    ///
    /// Non-success statuses are reported with the relay's `status` message when
    /// it supplied one.
    pub async fn exchange<B, R>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> std::result::Result<R, TransportError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let mut request = self
            .client
            .request(method.clone(), url)
            .header(header::CACHE_CONTROL, "no-cache");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("{} {} failed: {}", method, path, e);
                return Err(TransportError::network(e));
            }
        };
        let status = response.status();
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("{} {} failed reading body: {}", method, path, e);
                return Err(TransportError::network(e));
            }
        };

        if !status.is_success() {
            let message = serde_json::from_slice::<StatusEnvelope>(&bytes)
                .ok()
                .and_then(|envelope| envelope.status)
                .unwrap_or_else(|| UNKNOWN_ERROR.to_string());
            warn!("{} {} returned {}: {}", method, path, status, message);
            return Err(TransportError::status(status.as_u16(), message));
        }

        serde_json::from_slice::<R>(&bytes).map_err(|e| {
            warn!("{} {} returned malformed body: {}", method, path, e);
            TransportError::decode(e)
        })
    }
}

#[async_trait]
impl SignalingTransport for HttpTransport {
    async fn post_offer(&self, offer: &Offer) -> std::result::Result<(), TransportError> {
        self.exchange::<_, StatusEnvelope>(Method::POST, paths::MAKE_OFFER, Some(offer))
            .await
            .map(|_| ())
    }

    async fn post_answer(&self, answer: &Answer) -> std::result::Result<(), TransportError> {
        self.exchange::<_, StatusEnvelope>(Method::POST, paths::MAKE_ANSWER, Some(answer))
            .await
            .map(|_| ())
    }

    async fn post_connectivity(
        &self,
        client_id: &SessionId,
        candidate: &IceCandidate,
    ) -> std::result::Result<(), TransportError> {
        self.exchange::<_, StatusEnvelope>(
            Method::POST,
            &paths::ice(client_id.as_str()),
            Some(candidate),
        )
        .await
        .map(|_| ())
    }

    async fn poll_answer(
        &self,
        offerer_id: &SessionId,
    ) -> std::result::Result<Option<Answer>, TransportError> {
        let response: AnswerResponse = self
            .exchange::<(), _>(Method::GET, &paths::answer(offerer_id.as_str()), None)
            .await?;
        Ok(answer_from_response(offerer_id, response))
    }

    async fn poll_offers(&self) -> std::result::Result<Vec<Offer>, TransportError> {
        let response: OffersResponse = self
            .exchange::<(), _>(Method::GET, paths::OFFERS, None)
            .await?;
        Ok(response.offers)
    }

    async fn poll_connectivity(
        &self,
        remote_id: &str,
    ) -> std::result::Result<Vec<ConnectivityMessage>, TransportError> {
        let response: CandidatesResponse = self
            .exchange::<(), _>(Method::GET, &paths::ice(remote_id), None)
            .await?;
        Ok(response
            .messages
            .into_iter()
            .map(|candidate| ConnectivityMessage {
                target_client_id: remote_id.to_string(),
                candidate,
            })
            .collect())
    }
}

/// An answer counts only once both the answerer id and its description are present.
fn answer_from_response(offerer_id: &SessionId, response: AnswerResponse) -> Option<Answer> {
    match (response.answerer, response.answer) {
        (Some(answerer_id), Some(sdp)) if !answerer_id.is_empty() => Some(Answer {
            offerer_id: offerer_id.to_string(),
            answerer_id,
            sdp,
        }),
        _ => {
            debug!("no answer yet for {}", offerer_id);
            None
        }
    }
}
