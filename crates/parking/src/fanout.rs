//! One-to-many delivery of spot status changes to connected viewers.
//!
//! A [`Fanout`] is an explicitly constructed component; every clone shares the
//! same subscriber registry, independent instances never see each other's
//! events. There is no replay: a subscription only receives events published
//! while it is attached.
//!
//! Every subscriber has a queue of [`SUBSCRIBER_BUFFER`] updates. A subscriber
//! that falls that far behind is detached; its stream ends after the queued
//! updates and the viewer is expected to reconnect and query again.

use std::{
    collections::HashMap,
    fmt,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, Weak,
    },
    task::{Context, Poll},
};

use futures::Stream;
use model::spot::StatusUpdate;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Updates queued per subscriber before it is considered stalled.
pub const SUBSCRIBER_BUFFER: usize = 256;

type Subscribers = HashMap<u64, mpsc::Sender<StatusUpdate>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanoutError {
    Closed,
}

impl fmt::Display for FanoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "fanout is closed"),
        }
    }
}

impl std::error::Error for FanoutError {}

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    closed: AtomicBool,
    subscribers: Mutex<Subscribers>,
}

impl Registry {
    fn subscribers(&self) -> MutexGuard<'_, Subscribers> {
        // the map stays consistent even if a holder panicked
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn detach(&self, id: u64) {
        if self.subscribers().remove(&id).is_some() {
            log::debug!("subscriber {} detached", id);
        }
    }
}

#[derive(Clone, Default)]
pub struct Fanout {
    registry: Arc<Registry>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a new subscriber. Dropping the returned subscription detaches it.
    pub fn subscribe(&self) -> Subscription {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_BUFFER);
        let mut subscribers = self.registry.subscribers();
        // on a closed fanout the sender is dropped, so the subscription ends at once
        if !self.registry.closed.load(Ordering::Acquire) {
            subscribers.insert(id, sender);
            log::debug!("subscriber {} attached", id);
        }
        drop(subscribers);
        Subscription {
            id,
            receiver,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Delivers the update to every currently attached subscriber and returns
    /// how many received it.
    ///
    /// Publishing holds the registry lock, so two updates published one after
    /// another reach every subscriber in that order.
    pub fn publish(&self, update: StatusUpdate) -> Result<usize, FanoutError> {
        if self.registry.closed.load(Ordering::Acquire) {
            return Err(FanoutError::Closed);
        }
        let mut subscribers = self.registry.subscribers();
        subscribers.retain(|id, sender| match sender.try_send(update.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::warn!(
                    "subscriber {} has {} undelivered updates, detaching it",
                    id,
                    SUBSCRIBER_BUFFER
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        });
        log::debug!(
            "published status `{}` of spot {} to {} subscribers",
            update.status,
            update.id,
            subscribers.len()
        );
        Ok(subscribers.len())
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.subscribers().len()
    }

    /// Detaches all subscribers, ending their streams. Later publishes fail
    /// with `FanoutError::Closed`.
    pub fn close(&self) {
        self.registry.closed.store(true, Ordering::Release);
        let detached = self.registry.subscribers().drain().count();
        log::info!("fanout closed, detached {} subscribers", detached);
    }
}

/// A live attachment to a [`Fanout`]. Yields status updates in publish order.
pub struct Subscription {
    id: u64,
    receiver: mpsc::Receiver<StatusUpdate>,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the next update. `None` once the fanout was closed.
    pub async fn recv(&mut self) -> Option<StatusUpdate> {
        self.receiver.recv().await
    }

    /// Returns an already delivered update without waiting.
    pub fn try_recv(&mut self) -> Option<StatusUpdate> {
        self.receiver.try_recv().ok()
    }

    /// Stops delivery immediately. Same as dropping the subscription.
    pub fn detach(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.detach(self.id);
        }
    }
}

impl Stream for Subscription {
    type Item = StatusUpdate;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use model::spot::Status;
    use utility::id::Id;

    use super::*;

    fn update(id: &str, status: Status) -> StatusUpdate {
        StatusUpdate::new(Id::new(id.to_owned()), status)
    }

    #[tokio::test]
    async fn delivers_to_every_subscriber() {
        let fanout = Fanout::new();
        let mut first = fanout.subscribe();
        let mut second = fanout.subscribe();

        assert_eq!(fanout.publish(update("a", Status::Full)), Ok(2));

        assert_eq!(first.recv().await, Some(update("a", Status::Full)));
        assert_eq!(second.recv().await, Some(update("a", Status::Full)));
        assert_eq!(first.try_recv(), None);
    }

    #[tokio::test]
    async fn keeps_publish_order_per_subscriber() {
        let fanout = Fanout::new();
        let subscription = fanout.subscribe();

        let statuses = [Status::Limited, Status::Full, Status::Available, Status::Full];
        for status in statuses {
            fanout.publish(update("a", status)).unwrap();
        }
        fanout.close();

        let received = subscription.map(|u| u.status).collect::<Vec<_>>().await;
        assert_eq!(received, statuses.to_vec());
    }

    #[tokio::test]
    async fn detached_subscribers_receive_nothing() {
        let fanout = Fanout::new();
        let keep = fanout.subscribe();
        let leave = fanout.subscribe();
        assert_eq!(fanout.subscriber_count(), 2);

        leave.detach();
        assert_eq!(fanout.subscriber_count(), 1);
        assert_eq!(fanout.publish(update("a", Status::Full)), Ok(1));
        drop(keep);
        assert_eq!(fanout.subscriber_count(), 0);
        assert_eq!(fanout.publish(update("a", Status::Limited)), Ok(0));
    }

    #[tokio::test]
    async fn no_replay_for_late_subscribers() {
        let fanout = Fanout::new();
        fanout.publish(update("a", Status::Full)).unwrap();
        let mut late = fanout.subscribe();
        assert_eq!(late.try_recv(), None);
    }

    #[tokio::test]
    async fn instances_are_isolated() {
        let one = Fanout::new();
        let other = Fanout::new();
        let mut subscription = other.subscribe();
        one.publish(update("a", Status::Full)).unwrap();
        assert_eq!(subscription.try_recv(), None);
    }

    #[tokio::test]
    async fn stalled_subscribers_are_detached() {
        let fanout = Fanout::new();
        let stalled = fanout.subscribe();
        let mut reading = fanout.subscribe();

        for round in 0..SUBSCRIBER_BUFFER * 4 {
            let status = if round % 2 == 0 { Status::Full } else { Status::Available };
            fanout.publish(update("a", status)).unwrap();
            assert!(reading.recv().await.is_some());
        }
        assert_eq!(fanout.subscriber_count(), 1);
        assert_eq!(fanout.publish(update("a", Status::Limited)), Ok(1));

        // only the queued updates are left, then the stream ends
        let queued = stalled.collect::<Vec<_>>().await;
        assert_eq!(queued.len(), SUBSCRIBER_BUFFER);
        assert_eq!(queued[0], update("a", Status::Full));
    }

    #[tokio::test]
    async fn close_ends_streams_and_rejects_publishes() {
        let fanout = Fanout::new();
        let mut subscription = fanout.subscribe();
        fanout.close();
        assert_eq!(subscription.recv().await, None);
        assert_eq!(
            fanout.publish(update("a", Status::Full)),
            Err(FanoutError::Closed)
        );
        let mut late = fanout.subscribe();
        assert_eq!(late.recv().await, None);
    }
}
