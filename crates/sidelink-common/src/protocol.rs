//! Side-channel wire protocol.
//!
//! JSON request/response bodies exchanged with the signaling relay. Field names
//! match what browser peers already send, so both kinds of client can share one
//! relay.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use tracing::warn;

/// Relay endpoints.
pub mod paths {
    pub const MAKE_OFFER: &str = "/make-offer";
    pub const MAKE_ANSWER: &str = "/make-answer";
    pub const OFFERS: &str = "/offers";

    pub fn answer(offerer_id: &str) -> String {
        format!("/answer/{offerer_id}")
    }

    pub fn ice(client_id: &str) -> String {
        format!("/ice/{client_id}")
    }
}

/// Client-generated routing key, stable for the lifetime of one peer session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// A connection-setup description as produced by the peer capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Opaque connectivity candidate, forwarded to the remote peer untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IceCandidate(pub serde_json::Value);

/// An outstanding offer. Also the `POST /make-offer` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub label: String,
    #[serde(rename = "offerer")]
    pub offerer_id: String,
    #[serde(rename = "offer")]
    pub sdp: SessionDescription,
}

impl Offer {
    /// An offer is usable only with a routing id and a non-empty description.
    pub fn is_complete(&self) -> bool {
        !self.offerer_id.trim().is_empty() && !self.sdp.sdp.trim().is_empty()
    }
}

/// Reply to one offer. Also the `POST /make-answer` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    #[serde(rename = "offerer")]
    pub offerer_id: String,
    #[serde(rename = "answerer")]
    pub answerer_id: String,
    #[serde(rename = "answer")]
    pub sdp: SessionDescription,
}

/// A candidate attributed to the session that sent it.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectivityMessage {
    pub target_client_id: String,
    pub candidate: IceCandidate,
}

/// Status message carried by every relay response; the only field on failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusEnvelope {
    #[serde(default)]
    pub status: Option<String>,
}

/// `GET /offers`. Malformed entries are dropped so one bad offer does not
/// hide the rest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OffersResponse {
    #[serde(default, deserialize_with = "skip_malformed_offers")]
    pub offers: Vec<Offer>,
}

fn skip_malformed_offers<'de, D>(deserializer: D) -> Result<Vec<Offer>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<Offer>(value) {
            Ok(offer) => Some(offer),
            Err(e) => {
                warn!("skipping malformed offer: {}", e);
                None
            }
        })
        .collect())
}

/// `GET /answer/{offerer}`. Both fields are absent until someone answers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnswerResponse {
    #[serde(default)]
    pub answerer: Option<String>,
    #[serde(default)]
    pub answer: Option<SessionDescription>,
}

/// `GET /ice/{client}`: every candidate posted under that id so far.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidatesResponse {
    #[serde(default)]
    pub messages: Vec<IceCandidate>,
}
