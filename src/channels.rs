use crate::model::Notification;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_CAPACITY: usize = 10;

/// Events background tasks hand to the UI loop outside the snapshot channels.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    LogChunk { session: u64, text: String },
    LogEnded { session: u64 },
    Notify(Notification),
    ClearNotification(u64),
}

pub type UiSender = mpsc::UnboundedSender<UiEvent>;
pub type UiReceiver = mpsc::UnboundedReceiver<UiEvent>;

pub fn ui_channel() -> (UiSender, UiReceiver) {
    mpsc::unbounded_channel()
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Offer {
    Sent,
    /// Buffer full; held as the pending value until `flush` runs.
    Deferred,
    Closed,
}

/// Producer half of an update channel. Sends never wait: when the buffer is
/// full the newest value is parked and older parked values are dropped.
#[derive(Debug)]
pub struct Publisher<T> {
    tx: mpsc::Sender<T>,
    pending: Option<T>,
}

impl<T> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            pending: None,
        }
    }
}

impl<T> Publisher<T> {
    pub fn offer(&mut self, value: T) -> Offer {
        match self.tx.try_send(value) {
            Ok(()) => {
                self.pending = None;
                Offer::Sent
            }
            Err(TrySendError::Full(value)) => {
                self.pending = Some(value);
                Offer::Deferred
            }
            Err(TrySendError::Closed(_)) => {
                self.pending = None;
                Offer::Closed
            }
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Waits for capacity and delivers the parked value. Cancel safe: the
    /// value is only taken once a slot is reserved.
    pub async fn flush(&mut self) -> Offer {
        if self.pending.is_none() {
            return Offer::Sent;
        }
        match self.tx.reserve().await {
            Ok(permit) => {
                if let Some(value) = self.pending.take() {
                    permit.send(value);
                }
                Offer::Sent
            }
            Err(_) => {
                self.pending = None;
                Offer::Closed
            }
        }
    }
}

/// Consumer half. Yields `None` for good once the channel closes or shutdown
/// fires.
#[derive(Debug)]
pub struct Listener<T> {
    rx: mpsc::Receiver<T>,
    shutdown: CancellationToken,
    done: bool,
}

impl<T> Listener<T> {
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub async fn listen(&mut self) -> Option<T> {
        if self.done {
            return None;
        }

        let received = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => None,
            value = self.rx.recv() => value,
        };
        if received.is_none() {
            self.done = true;
            self.rx.close();
        }
        received
    }
}

pub fn update_channel<T>(
    capacity: usize,
    shutdown: CancellationToken,
) -> (Publisher<T>, Listener<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        Publisher { tx, pending: None },
        Listener {
            rx,
            shutdown,
            done: false,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_CAPACITY, Offer, update_channel};
    use tokio::time::{Duration, timeout};
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn burst_keeps_capacity_buffered_and_delivers_the_latest() {
        let (mut publisher, mut listener) =
            update_channel::<usize>(DEFAULT_CAPACITY, CancellationToken::new());

        let outcomes = (0..50).map(|n| publisher.offer(n)).collect::<Vec<_>>();
        let sent = outcomes.iter().filter(|o| **o == Offer::Sent).count();
        let deferred = outcomes.iter().filter(|o| **o == Offer::Deferred).count();
        assert_eq!(sent, DEFAULT_CAPACITY);
        assert_eq!(deferred, 50 - DEFAULT_CAPACITY);
        assert!(publisher.has_pending());

        let mut seen = Vec::new();
        for _ in 0..DEFAULT_CAPACITY {
            seen.push(listener.listen().await.expect("buffered"));
        }
        assert_eq!(seen, (0..DEFAULT_CAPACITY).collect::<Vec<_>>());

        assert_eq!(publisher.flush().await, Offer::Sent);
        assert!(!publisher.has_pending());
        assert_eq!(listener.listen().await, Some(49));
    }

    #[tokio::test]
    async fn flush_waits_for_capacity() {
        let (mut publisher, mut listener) = update_channel::<u8>(1, CancellationToken::new());
        assert_eq!(publisher.offer(1), Offer::Sent);
        assert_eq!(publisher.offer(2), Offer::Deferred);
        assert_eq!(publisher.offer(3), Offer::Deferred);

        assert!(
            timeout(Duration::from_millis(20), publisher.flush())
                .await
                .is_err()
        );
        assert!(publisher.has_pending());

        assert_eq!(listener.listen().await, Some(1));
        publisher.flush().await;
        assert_eq!(listener.listen().await, Some(3));
    }

    #[tokio::test]
    async fn listener_stops_for_good_on_shutdown() {
        let shutdown = CancellationToken::new();
        let (mut publisher, mut listener) = update_channel::<u8>(4, shutdown.clone());
        shutdown.cancel();
        assert_eq!(listener.listen().await, None);
        assert!(listener.is_done());

        assert_eq!(publisher.offer(1), Offer::Closed);
        assert_eq!(listener.listen().await, None);
    }

    #[tokio::test]
    async fn listener_ends_when_every_publisher_is_dropped() {
        let (publisher, mut listener) = update_channel::<u8>(4, CancellationToken::new());
        drop(publisher);
        assert_eq!(listener.listen().await, None);
        assert!(listener.is_done());
    }
}
