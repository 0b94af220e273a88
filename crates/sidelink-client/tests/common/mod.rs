//! In-process signaling relay for integration tests.
//!
//! Mirrors the production relay's routes and quirks: answered offers stay
//! listed, `/answer` without an answer is still a 200, a fresh offer clears
//! the offerer's candidates and an answer for an unknown offerer is a bare
//! 500 without a status message.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use sidelink_client::ClientConfig;

const OK: &str = "Yehaw";

#[derive(Default)]
struct Listing {
    label: Value,
    offer: Value,
    answer: Option<Value>,
    answerer: Option<Value>,
}

#[derive(Default)]
pub struct Db {
    offers: Vec<(String, Listing)>,
    ice: HashMap<String, Vec<Value>>,
    pub offline: bool,
    pub uncached_requests: usize,
    pub requests: usize,
}

impl Db {
    fn listing_mut(&mut self, offerer: &str) -> Option<&mut Listing> {
        self.offers
            .iter_mut()
            .find(|(id, _)| id == offerer)
            .map(|(_, listing)| listing)
    }
}

#[derive(Clone, Default)]
pub struct RelayState(pub Arc<Mutex<Db>>);

pub struct Relay {
    pub url: String,
    pub state: RelayState,
}

impl Relay {
    pub fn config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_server_url(self.url.clone())
            .with_poll_interval(Duration::from_millis(50))
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.0.lock().unwrap().offline = offline;
    }

    pub fn requests(&self) -> usize {
        self.state.0.lock().unwrap().requests
    }

    pub fn uncached_requests(&self) -> usize {
        self.state.0.lock().unwrap().uncached_requests
    }

    pub fn candidates(&self, id: &str) -> Vec<Value> {
        self.state.0.lock().unwrap().ice.get(id).cloned().unwrap_or_default()
    }
}

fn status(code: StatusCode, message: &str) -> Response {
    (code, Json(json!({ "status": message }))).into_response()
}

/// Count the request; `Some` short-circuits it while offline.
fn admit(state: &RelayState, headers: &HeaderMap) -> Option<Response> {
    let mut db = state.0.lock().unwrap();
    db.requests += 1;
    let no_cache = headers
        .get(header::CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("no-cache"));
    if no_cache {
        db.uncached_requests += 1;
    }
    db.offline
        .then(|| status(StatusCode::SERVICE_UNAVAILABLE, "relay offline"))
}

async fn get_offers(State(state): State<RelayState>, headers: HeaderMap) -> Response {
    if let Some(refused) = admit(&state, &headers) {
        return refused;
    }
    let db = state.0.lock().unwrap();
    let offers: Vec<Value> = db
        .offers
        .iter()
        .map(|(offerer, listing)| {
            json!({ "label": listing.label, "offerer": offerer, "offer": listing.offer })
        })
        .collect();
    Json(json!({ "status": OK, "offers": offers })).into_response()
}

async fn get_answer(
    State(state): State<RelayState>,
    Path(offerer): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Some(refused) = admit(&state, &headers) {
        return refused;
    }
    let db = state.0.lock().unwrap();
    let listing = db.offers.iter().find(|(id, _)| *id == offerer);
    match listing.map(|(_, l)| (&l.answer, &l.answerer)) {
        Some((Some(answer), Some(answerer))) => {
            Json(json!({ "status": OK, "answer": answer, "answerer": answerer })).into_response()
        }
        _ => status(StatusCode::OK, "No answer available"),
    }
}

async fn make_offer(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(refused) = admit(&state, &headers) {
        return refused;
    }
    let mut db = state.0.lock().unwrap();
    let offerer = body.get("offerer").and_then(Value::as_str).map(str::to_string);
    let (Some(offerer), Some(offer), Some(label)) =
        (offerer, body.get("offer").cloned(), body.get("label").cloned())
    else {
        return status(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Offer must supply 'label', 'offerer' and 'offer' data",
        );
    };
    db.ice.insert(offerer.clone(), Vec::new());
    let listing = Listing {
        label,
        offer,
        answer: None,
        answerer: None,
    };
    match db.listing_mut(&offerer) {
        Some(existing) => *existing = listing,
        None => db.offers.push((offerer, listing)),
    }
    status(StatusCode::OK, OK)
}

async fn make_answer(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(refused) = admit(&state, &headers) {
        return refused;
    }
    let mut db = state.0.lock().unwrap();
    let offerer = body.get("offerer").and_then(Value::as_str).map(str::to_string);
    let (Some(offerer), Some(answer), Some(answerer)) =
        (offerer, body.get("answer").cloned(), body.get("answerer").cloned())
    else {
        return status(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Answer must supply 'answerer', 'offerer', and 'answer' data",
        );
    };
    match db.listing_mut(&offerer) {
        Some(listing) => {
            listing.answer = Some(answer);
            listing.answerer = Some(answerer);
            status(StatusCode::OK, OK)
        }
        None => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response(),
    }
}

async fn get_ice(
    State(state): State<RelayState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Some(refused) = admit(&state, &headers) {
        return refused;
    }
    let db = state.0.lock().unwrap();
    let messages = db.ice.get(&id).cloned().unwrap_or_default();
    Json(json!({ "status": OK, "messages": messages })).into_response()
}

async fn post_ice(
    State(state): State<RelayState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(candidate): Json<Value>,
) -> Response {
    if let Some(refused) = admit(&state, &headers) {
        return refused;
    }
    state.0.lock().unwrap().ice.entry(id).or_default().push(candidate);
    status(StatusCode::OK, OK)
}

pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/offers", get(get_offers))
        .route("/answer/:offerer", get(get_answer))
        .route("/make-offer", post(make_offer))
        .route("/make-answer", post(make_answer))
        .route("/ice/:id", get(get_ice).post(post_ice))
        .with_state(state)
}

pub async fn spawn_relay() -> Relay {
    let state = RelayState::default();
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .expect("bind relay");
    let addr = listener.local_addr().expect("relay addr");
    let app = router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("relay server");
    });
    Relay {
        url: format!("http://{addr}"),
        state,
    }
}

/// An address nothing is listening on.
pub async fn dead_url() -> String {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    format!("http://{addr}")
}
