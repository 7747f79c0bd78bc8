use crate::channels::{UiEvent, UiSender};
use crate::model::Notification;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::{Duration, sleep};

pub const DEFAULT_NOTIFICATION_TTL: Duration = Duration::from_secs(3);

/// Posts transient notifications that clear themselves through a delayed
/// `ClearNotification` event.
#[derive(Debug, Clone)]
pub struct Notifier {
    events: UiSender,
    next_id: Arc<AtomicU64>,
    ttl: Duration,
}

impl Notifier {
    pub fn new(events: UiSender, ttl: Duration) -> Self {
        Self {
            events,
            next_id: Arc::new(AtomicU64::new(1)),
            ttl,
        }
    }

    pub fn notify(&self, text: impl Into<String>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let notification = Notification {
            id,
            text: text.into(),
        };
        if self.events.send(UiEvent::Notify(notification)).is_err() {
            return id;
        }

        let events = self.events.clone();
        let ttl = self.ttl;
        tokio::spawn(async move {
            sleep(ttl).await;
            let _ = events.send(UiEvent::ClearNotification(id));
        });
        id
    }

    pub fn error(&self, error: &anyhow::Error) -> u64 {
        self.notify(format!("Error: {}", compact_error(error)))
    }
}

pub fn compact_error(error: &anyhow::Error) -> String {
    let mut out = Vec::new();
    for (index, cause) in error.chain().enumerate() {
        if index > 2 {
            break;
        }
        out.push(cause.to_string());
    }

    out.join(": ")
}

#[cfg(test)]
mod tests {
    use super::{Notifier, compact_error};
    use crate::channels::{UiEvent, ui_channel};
    use anyhow::Context;
    use tokio::time::{Duration, Instant};

    #[tokio::test(start_paused = true)]
    async fn notification_clears_itself_after_ttl() {
        let (tx, mut rx) = ui_channel();
        let notifier = Notifier::new(tx, Duration::from_secs(3));
        let started = Instant::now();

        let id = notifier.notify("Saved logs to ./web.log");
        match rx.recv().await {
            Some(UiEvent::Notify(notification)) => {
                assert_eq!(notification.id, id);
                assert_eq!(notification.text, "Saved logs to ./web.log");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(rx.recv().await, Some(UiEvent::ClearNotification(id)));
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn ids_are_unique_per_notification() {
        let (tx, _rx) = ui_channel();
        let notifier = Notifier::new(tx, Duration::from_secs(3));
        let first = notifier.notify("a");
        let second = notifier.clone().notify("b");
        assert_ne!(first, second);
    }

    #[test]
    fn compact_error_joins_the_first_causes() {
        let error = Err::<(), _>(anyhow::anyhow!("connection refused"))
            .context("failed to fetch logs")
            .context("saving web-0")
            .context("outer")
            .unwrap_err();
        assert_eq!(
            compact_error(&error),
            "outer: saving web-0: failed to fetch logs"
        );
    }
}
