use crate::channels::{Offer, Publisher};
use crate::gateway::{ClusterGateway, ObjectCache, WatchEvent, WatchSubscription};
use crate::model::{ALL_NAMESPACES, ClusterObject, ResourceKind, sort_objects};
use crate::session::{RetiredSessions, SessionHandle, SessionScope, SessionStart};
use crate::state::{ObjectSnapshot, SharedState};
use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Owns the one live object subscription. Cloning shares the same gate and
/// id counter.
#[derive(Clone)]
pub struct WatchManager {
    inner: Arc<WatchInner>,
}

struct WatchInner {
    gateway: Arc<dyn ClusterGateway>,
    state: SharedState,
    updates: Publisher<ObjectSnapshot>,
    poll_interval: Duration,
    gate: Mutex<()>,
    retired: RetiredSessions,
    next_id: AtomicU64,
}

impl WatchManager {
    pub fn new(
        gateway: Arc<dyn ClusterGateway>,
        state: SharedState,
        updates: Publisher<ObjectSnapshot>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(WatchInner {
                gateway,
                state,
                updates,
                poll_interval,
                gate: Mutex::new(()),
                retired: RetiredSessions::default(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Cancels the active session and installs the new one before returning,
    /// so a later selection always finds the newest handle in state. Joining
    /// the old session and opening the new one happen on the spawned task.
    pub fn start_watch(&self, kind: ResourceKind, namespace: String) -> JoinHandle<SessionStart> {
        let handle = self.install(&kind, &namespace);
        let manager = self.clone();
        tokio::spawn(async move { manager.open(handle, kind, namespace).await })
    }

    /// Cancels and joins the active session, if any.
    pub async fn stop(&self) {
        if let Some(previous) = self.inner.state.write(|state| state.take_watch()) {
            previous.cancel();
            self.inner.retired.push(previous);
        }
        let _gate = self.inner.gate.lock().await;
        self.inner.retired.join_all().await;
    }

    fn install(&self, kind: &ResourceKind, namespace: &str) -> SessionHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = SessionHandle::new(
            id,
            SessionScope::Watch {
                kind: kind.clone(),
                namespace: namespace.to_string(),
            },
        );
        let previous = self.inner.state.write(|state| {
            let previous = state.take_watch();
            if let Some(previous) = &previous {
                previous.cancel();
            }
            state.install_watch(handle.clone());
            previous
        });
        if let Some(previous) = previous {
            debug!(
                "stopping watch session {} ({})",
                previous.id(),
                previous.scope().describe()
            );
            self.inner.retired.push(previous);
        }
        handle
    }

    async fn open(
        &self,
        handle: SessionHandle,
        kind: ResourceKind,
        namespace: String,
    ) -> SessionStart {
        let _gate = self.inner.gate.lock().await;
        self.inner.retired.join_all().await;

        let id = handle.id();
        if handle.is_cancelled() {
            debug!("watch session {id} superseded before it opened");
            return SessionStart::Superseded;
        }

        let started = if kind.watchable {
            self.start_event_session(&handle, &kind, &namespace).await
        } else {
            self.start_polling_session(&handle, &kind, &namespace).await
        };

        match started {
            SessionStart::Serving(_) => {
                info!("watch session {id} started for {}", handle.scope().describe());
            }
            SessionStart::Superseded => {
                debug!("watch session {id} superseded while opening");
            }
            SessionStart::Failed => {
                self.inner.state.write(|state| state.remove_watch(id));
            }
        }
        started
    }

    async fn start_event_session(
        &self,
        handle: &SessionHandle,
        kind: &ResourceKind,
        namespace: &str,
    ) -> SessionStart {
        let token = handle.token();
        let subscription = tokio::select! {
            biased;
            _ = token.cancelled() => return SessionStart::Superseded,
            subscription = self.inner.gateway.watch(kind, namespace) => subscription,
        };
        let subscription = match subscription {
            Ok(subscription) => subscription,
            Err(error) => {
                warn!("failed to watch {}: {error:#}", kind.name);
                return SessionStart::Failed;
            }
        };

        let session = handle.id();
        let publisher = self.inner.updates.clone();
        handle.tracker().spawn(forward_watch_events(
            subscription,
            publisher,
            token,
            move |objects| ObjectSnapshot { session, objects },
        ));
        SessionStart::Serving(session)
    }

    async fn start_polling_session(
        &self,
        handle: &SessionHandle,
        kind: &ResourceKind,
        namespace: &str,
    ) -> SessionStart {
        let token = handle.token();
        let listed = tokio::select! {
            biased;
            _ = token.cancelled() => return SessionStart::Superseded,
            listed = self.inner.gateway.list_objects(kind, namespace) => listed,
        };
        let objects = match listed {
            Ok(objects) => objects,
            Err(error) => {
                warn!("initial list of {} failed: {error:#}", kind.name);
                return SessionStart::Failed;
            }
        };

        let session = handle.id();
        let mut publisher = self.inner.updates.clone();
        publish(&mut publisher, &token, session, objects);

        let gateway = self.inner.gateway.clone();
        let period = self.inner.poll_interval;
        let kind = kind.clone();
        let namespace = namespace.to_string();
        handle.tracker().spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = publisher.flush(), if publisher.has_pending() => {}
                    _ = ticker.tick() => {
                        let listed = tokio::select! {
                            _ = token.cancelled() => break,
                            listed = gateway.list_objects(&kind, &namespace) => listed,
                        };
                        match listed {
                            Ok(objects) => {
                                if publish(&mut publisher, &token, session, objects) == Offer::Closed {
                                    break;
                                }
                            }
                            Err(error) => warn!("polling {} failed: {error:#}", kind.name),
                        }
                    }
                }
            }
            debug!("polling session {session} exited");
        });
        SessionStart::Serving(session)
    }
}

fn publish(
    publisher: &mut Publisher<ObjectSnapshot>,
    token: &CancellationToken,
    session: u64,
    mut objects: Vec<ClusterObject>,
) -> Offer {
    if token.is_cancelled() {
        return Offer::Closed;
    }
    sort_objects(&mut objects);
    let offer = publisher.offer(ObjectSnapshot { session, objects });
    if offer == Offer::Deferred {
        debug!("update buffer full, holding snapshot of session {session}");
    }
    offer
}

/// Re-reads the full cache on every notification and offers it downstream.
async fn forward_watch_events<T, F>(
    subscription: WatchSubscription,
    mut publisher: Publisher<T>,
    token: CancellationToken,
    build: F,
) where
    F: Fn(Vec<ClusterObject>) -> T,
{
    let WatchSubscription { mut events, cache } = subscription;
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = publisher.flush(), if publisher.has_pending() => {}
            event = events.next() => match event {
                Some(Ok(event)) => {
                    trace_event(&event);
                    if token.is_cancelled() {
                        break;
                    }
                    if publisher.offer(build(sorted_snapshot(cache.as_ref()))) == Offer::Closed {
                        break;
                    }
                }
                Some(Err(error)) => warn!("watch stream error: {error:#}"),
                None => break,
            },
        }
    }
}

fn sorted_snapshot(cache: &dyn ObjectCache) -> Vec<ClusterObject> {
    let mut objects = cache.snapshot();
    sort_objects(&mut objects);
    objects
}

fn trace_event(event: &WatchEvent) {
    match event {
        WatchEvent::Applied(object) => debug!("applied {}", object.qualified_name()),
        WatchEvent::Deleted(object) => debug!("deleted {}", object.qualified_name()),
        WatchEvent::Restarted => debug!("watch relisted"),
    }
}

pub fn namespace_names(objects: &[ClusterObject]) -> Vec<String> {
    let mut names = objects
        .iter()
        .map(|object| object.name.clone())
        .collect::<Vec<_>>();
    names.sort();
    names.dedup();
    names.insert(0, ALL_NAMESPACES.to_string());
    names
}

/// Long-lived cluster-wide namespace watch. The returned handle is only
/// cancelled at shutdown.
pub fn spawn_namespace_watch(
    gateway: Arc<dyn ClusterGateway>,
    publisher: Publisher<Vec<String>>,
) -> SessionHandle {
    let handle = SessionHandle::new(0, SessionScope::Namespaces);
    let token = handle.token();
    handle.tracker().spawn(async move {
        let kind = ResourceKind::namespaces();
        let subscription = tokio::select! {
            _ = token.cancelled() => return,
            subscription = gateway.watch(&kind, "") => subscription,
        };
        match subscription {
            Ok(subscription) => {
                forward_watch_events(subscription, publisher, token, |objects| {
                    namespace_names(&objects)
                })
                .await;
            }
            Err(error) => warn!("failed to watch namespaces: {error:#}"),
        }
    });
    handle
}
