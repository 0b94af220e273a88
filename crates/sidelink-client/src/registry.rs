//! Shared, polled list of open offers.
//!
//! One registry serves every answerer in the process. It polls the relay on
//! a fixed interval, reconciles the response into a single visible list and
//! tells subscribers when that list actually changed. Subscribers are only
//! ever told about changes: one that joins after the last change sees
//! nothing until the next one, and should read [`OfferRegistry::visible`]
//! or call [`OfferRegistry::poll_once`] if it needs the current state.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use sidelink_common::{Offer, Result, TransportError};

use crate::config::ClientConfig;
use crate::poller::{CancelToken, Ticker};
use crate::reconcile::reconcile;
use crate::transport::SignalingTransport;

type Callback = Arc<dyn Fn(&[Offer]) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Handle to the visible offer list.
///
/// Every clone views the same container for the lifetime of the registry.
#[derive(Debug, Clone, Default)]
pub struct OfferList(Arc<RwLock<Vec<Offer>>>);

impl OfferList {
    pub fn snapshot(&self) -> Vec<Offer> {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.0.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find_by_label(&self, label: &str) -> Option<Offer> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|offer| offer.label == label)
            .cloned()
    }

    pub fn same_container(&self, other: &OfferList) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn reconcile(&self, incoming: &[Offer]) -> bool {
        let mut visible = self.0.write().unwrap_or_else(PoisonError::into_inner);
        reconcile(&mut visible, incoming)
    }
}

/// Change notifications delivered over a channel. Dropping the feed ends
/// the subscription.
pub struct OfferFeed {
    id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<Vec<Offer>>,
}

impl OfferFeed {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next changed offer set, or `None` once the registry is gone.
    pub async fn next(&mut self) -> Option<Vec<Offer>> {
        self.rx.recv().await
    }

    pub fn try_next(&mut self) -> Option<Vec<Offer>> {
        self.rx.try_recv().ok()
    }
}

#[derive(Clone)]
enum Subscriber {
    Callback(Callback),
    Feed(mpsc::UnboundedSender<Vec<Offer>>),
}

impl Subscriber {
    fn is_closed(&self) -> bool {
        match self {
            Subscriber::Callback(_) => false,
            Subscriber::Feed(tx) => tx.is_closed(),
        }
    }

    fn deliver(&self, offers: &[Offer]) {
        match self {
            Subscriber::Callback(callback) => callback(offers),
            // A closed feed is pruned on the next (un)subscribe or notify.
            Subscriber::Feed(tx) => {
                let _ = tx.send(offers.to_vec());
            }
        }
    }
}

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    entries: Vec<(SubscriptionId, Subscriber)>,
}

impl Subscribers {
    fn add(&mut self, subscriber: Subscriber) -> SubscriptionId {
        self.prune();
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.entries.push((id, subscriber));
        id
    }

    fn prune(&mut self) {
        self.entries.retain(|(id, subscriber)| {
            let closed = subscriber.is_closed();
            if closed {
                debug!("dropping closed offer feed {:?}", id);
            }
            !closed
        });
    }
}

struct Shared {
    transport: Arc<dyn SignalingTransport>,
    visible: OfferList,
    subscribers: Mutex<Subscribers>,
    // One fetch-and-reconcile at a time, background or manual.
    polling: AsyncMutex<()>,
}

impl Shared {
    async fn tick(&self) -> std::result::Result<bool, TransportError> {
        let _polling = self.polling.lock().await;
        let offers = match self.transport.poll_offers().await {
            Ok(offers) => offers,
            Err(e) => {
                debug!("offer poll skipped: {}", e);
                return Err(e);
            }
        };
        let changed = self.visible.reconcile(&offers);
        if changed {
            self.notify();
        }
        Ok(changed)
    }

    fn notify(&self) {
        let offers = self.visible.snapshot();
        // Callbacks run outside the lock so they may (un)subscribe.
        let targets: Vec<Subscriber> = {
            let mut subscribers = self
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            subscribers.prune();
            subscribers
                .entries
                .iter()
                .map(|(_, subscriber)| subscriber.clone())
                .collect()
        };
        debug!(
            "offer list changed: {} offers, {} subscribers",
            offers.len(),
            targets.len()
        );
        for subscriber in targets {
            subscriber.deliver(&offers);
        }
    }
}

struct Running {
    cancel: CancelToken,
    handle: JoinHandle<()>,
}

pub struct OfferRegistry {
    shared: Arc<Shared>,
    poll_interval: Duration,
    running: Mutex<Option<Running>>,
}

impl OfferRegistry {
    pub fn new(transport: Arc<dyn SignalingTransport>, config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                transport,
                visible: OfferList::default(),
                subscribers: Mutex::new(Subscribers::default()),
                polling: AsyncMutex::new(()),
            }),
            poll_interval: config.poll_interval,
            running: Mutex::new(None),
        })
    }

    /// Begin background polling. Returns `false` if already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<bool> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = running.as_ref() {
            if !current.handle.is_finished() {
                return Ok(false);
            }
        }

        let cancel = CancelToken::new();
        let shared = Arc::clone(&self.shared);
        let mut ticker = Ticker::new(self.poll_interval, cancel.clone())?;
        let period = self.poll_interval;
        let handle = tokio::spawn(async move {
            info!("polling offers every {:?}", period);
            while ticker.tick().await {
                // Failures are already logged; the next tick retries.
                if ticker.guard(shared.tick()).await.is_none() {
                    break;
                }
            }
            debug!("offer polling stopped after {} ticks", ticker.ticks());
        });
        *running = Some(Running { cancel, handle });
        Ok(true)
    }

    /// Stop background polling. An in-flight request is abandoned.
    pub fn stop(&self) {
        let taken = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(running) = taken {
            running.cancel.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|r| !r.cancel.is_cancelled() && !r.handle.is_finished())
    }

    /// Run one poll now. Returns whether the visible list changed.
    ///
    /// Waits for a background poll already in flight, so the two never
    /// reconcile at the same time.
    pub async fn poll_once(&self) -> std::result::Result<bool, TransportError> {
        self.shared.tick().await
    }

    pub fn visible(&self) -> OfferList {
        self.shared.visible.clone()
    }

    /// Register a change callback. It is not called for the current state.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&[Offer]) + Send + Sync + 'static,
    {
        self.shared
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add(Subscriber::Callback(Arc::new(callback)))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .shared
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.entries.len();
        subscribers.entries.retain(|(entry, _)| *entry != id);
        let removed = subscribers.entries.len() != before;
        subscribers.prune();
        removed
    }

    /// Subscribe through a channel instead of a callback.
    pub fn watch(&self) -> OfferFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self
            .shared
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add(Subscriber::Feed(tx));
        OfferFeed { id, rx }
    }

    /// Live subscriptions. Feeds whose receiver was dropped are not counted.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self
            .shared
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.prune();
        subscribers.entries.len()
    }
}

impl Drop for OfferRegistry {
    fn drop(&mut self) {
        self.stop();
    }
}
