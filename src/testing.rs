//! In-memory `ClusterGateway` used by the async tests.

use crate::gateway::{
    ClusterGateway, LogRequest, LogStream, ObjectCache, WatchEvent, WatchSubscription,
};
use crate::model::{ClusterObject, GroupVersionResource, LOG_ACTION, ResourceKind, SPEC_ACTION};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use futures::channel::mpsc::{UnboundedSender, unbounded};
use futures::{StreamExt, TryStreamExt};
use serde_json::json;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn pod_kind() -> ResourceKind {
    ResourceKind {
        name: "pods".to_string(),
        kind: "Pod".to_string(),
        namespaced: true,
        watchable: true,
        gvr: GroupVersionResource::new("", "v1", "pods"),
        actions: vec![SPEC_ACTION.to_string(), LOG_ACTION.to_string()],
    }
}

pub fn event_kind() -> ResourceKind {
    ResourceKind {
        name: "events".to_string(),
        kind: "Event".to_string(),
        namespaced: true,
        watchable: false,
        gvr: GroupVersionResource::new("", "v1", "events"),
        actions: vec![SPEC_ACTION.to_string()],
    }
}

pub fn node_kind() -> ResourceKind {
    ResourceKind {
        name: "nodes".to_string(),
        kind: "Node".to_string(),
        namespaced: false,
        watchable: true,
        gvr: GroupVersionResource::new("", "v1", "nodes"),
        actions: vec![SPEC_ACTION.to_string(), "status".to_string()],
    }
}

pub fn object(name: &str, namespace: &str) -> ClusterObject {
    ClusterObject::new(
        name,
        Some(namespace),
        json!({
            "metadata": { "name": name, "namespace": namespace },
            "spec": { "containers": [{ "name": "web" }, { "name": "sidecar" }] }
        }),
    )
}

#[derive(Default)]
struct Counters {
    list_calls: AtomicUsize,
    watch_calls: AtomicUsize,
    active_watches: AtomicUsize,
    max_active_watches: AtomicUsize,
    active_logs: AtomicUsize,
    max_active_logs: AtomicUsize,
}

/// Decrements its counter when the owning stream is dropped.
struct ActiveGuard {
    counters: Arc<Counters>,
    logs: bool,
}

impl ActiveGuard {
    fn new(counters: Arc<Counters>, logs: bool) -> Self {
        let (active, max) = if logs {
            (&counters.active_logs, &counters.max_active_logs)
        } else {
            (&counters.active_watches, &counters.max_active_watches)
        };
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self { counters, logs }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let active = if self.logs {
            &self.counters.active_logs
        } else {
            &self.counters.active_watches
        };
        active.fetch_sub(1, Ordering::SeqCst);
    }
}

struct MockCache {
    objects: Arc<Mutex<Vec<ClusterObject>>>,
    namespace: String,
}

impl ObjectCache for MockCache {
    fn snapshot(&self) -> Vec<ClusterObject> {
        lock(&self.objects)
            .iter()
            .filter(|object| object.in_namespace(&self.namespace))
            .cloned()
            .collect()
    }
}

type EventSender = UnboundedSender<Result<WatchEvent>>;
type LogSender = UnboundedSender<io::Result<Vec<u8>>>;

#[derive(Default)]
pub struct MockGateway {
    kinds: Vec<ResourceKind>,
    objects: Arc<Mutex<Vec<ClusterObject>>>,
    counters: Arc<Counters>,
    fail_lists: AtomicBool,
    list_delay: Mutex<Duration>,
    fail_watches: AtomicBool,
    fail_log_streams: AtomicBool,
    fetch_error: Mutex<Option<String>>,
    fetched_logs: Mutex<String>,
    watchers: Mutex<Vec<EventSender>>,
    log_feeds: Mutex<Vec<LogSender>>,
    log_requests: Mutex<Vec<LogRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl MockGateway {
    pub fn with_kinds(kinds: Vec<ResourceKind>) -> Self {
        Self {
            kinds,
            ..Self::default()
        }
    }

    pub fn set_objects(&self, objects: Vec<ClusterObject>) {
        *lock(&self.objects) = objects;
    }

    pub fn fail_lists(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }

    /// Makes every list wait this long before answering.
    pub fn delay_lists(&self, delay: Duration) {
        *lock(&self.list_delay) = delay;
    }

    pub fn fail_watches(&self, fail: bool) {
        self.fail_watches.store(fail, Ordering::SeqCst);
    }

    pub fn fail_log_streams(&self, fail: bool) {
        self.fail_log_streams.store(fail, Ordering::SeqCst);
    }

    pub fn fail_log_fetch(&self, message: &str) {
        *lock(&self.fetch_error) = Some(message.to_string());
    }

    pub fn set_fetched_logs(&self, text: &str) {
        *lock(&self.fetched_logs) = text.to_string();
    }

    pub fn list_calls(&self) -> usize {
        self.counters.list_calls.load(Ordering::SeqCst)
    }

    pub fn watch_calls(&self) -> usize {
        self.counters.watch_calls.load(Ordering::SeqCst)
    }

    pub fn active_watches(&self) -> usize {
        self.counters.active_watches.load(Ordering::SeqCst)
    }

    pub fn max_active_watches(&self) -> usize {
        self.counters.max_active_watches.load(Ordering::SeqCst)
    }

    pub fn active_logs(&self) -> usize {
        self.counters.active_logs.load(Ordering::SeqCst)
    }

    pub fn max_active_logs(&self) -> usize {
        self.counters.max_active_logs.load(Ordering::SeqCst)
    }

    pub fn log_requests(&self) -> Vec<LogRequest> {
        lock(&self.log_requests).clone()
    }

    pub async fn wait_for_watches(&self, count: usize) {
        while self.watch_calls() < count {
            tokio::task::yield_now().await;
        }
    }

    pub async fn wait_for_log_streams(&self, count: usize) {
        while lock(&self.log_requests).iter().filter(|r| r.follow).count() < count {
            tokio::task::yield_now().await;
        }
    }

    pub fn apply(&self, object: ClusterObject) {
        {
            let mut objects = lock(&self.objects);
            objects.retain(|existing| !existing.same_identity(&object));
            objects.push(object.clone());
        }
        self.emit(WatchEvent::Applied(object));
    }

    pub fn delete(&self, object: &ClusterObject) {
        lock(&self.objects).retain(|existing| !existing.same_identity(object));
        self.emit(WatchEvent::Deleted(object.clone()));
    }

    pub fn restart(&self) {
        self.emit(WatchEvent::Restarted);
    }

    fn emit(&self, event: WatchEvent) {
        lock(&self.watchers).retain(|tx| tx.unbounded_send(Ok(event.clone())).is_ok());
    }

    /// Feeds one line to the most recent log stream.
    pub fn push_log_line(&self, line: &str) -> bool {
        lock(&self.log_feeds)
            .last()
            .is_some_and(|tx| tx.unbounded_send(Ok(format!("{line}\n").into_bytes())).is_ok())
    }
}

#[async_trait]
impl ClusterGateway for MockGateway {
    async fn list_types(&self) -> Result<Vec<ResourceKind>> {
        Ok(self.kinds.clone())
    }

    async fn list_objects(
        &self,
        _kind: &ResourceKind,
        namespace: &str,
    ) -> Result<Vec<ClusterObject>> {
        self.counters.list_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.list_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(anyhow!("list refused"));
        }
        Ok(lock(&self.objects)
            .iter()
            .filter(|object| object.in_namespace(namespace))
            .cloned()
            .collect())
    }

    async fn watch(&self, _kind: &ResourceKind, namespace: &str) -> Result<WatchSubscription> {
        self.counters.watch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_watches.load(Ordering::SeqCst) {
            return Err(anyhow!("watch refused"));
        }

        let (tx, rx) = unbounded();
        lock(&self.watchers).push(tx);
        let guard = ActiveGuard::new(self.counters.clone(), false);
        let events = rx
            .map(move |event| {
                let _ = &guard;
                event
            })
            .boxed();

        Ok(WatchSubscription {
            events,
            cache: Arc::new(MockCache {
                objects: self.objects.clone(),
                namespace: namespace.to_string(),
            }),
        })
    }

    async fn stream_logs(&self, request: &LogRequest) -> Result<LogStream> {
        lock(&self.log_requests).push(request.clone());
        if self.fail_log_streams.load(Ordering::SeqCst) {
            return Err(anyhow!("container \"{}\" is waiting to start", request.container));
        }
        let (tx, rx) = unbounded::<io::Result<Vec<u8>>>();
        lock(&self.log_feeds).push(tx);
        let guard = ActiveGuard::new(self.counters.clone(), true);
        let reader = rx
            .map(move |chunk| {
                let _ = &guard;
                chunk
            })
            .into_async_read();
        Ok(Box::pin(reader))
    }

    async fn fetch_logs(&self, request: &LogRequest) -> Result<String> {
        lock(&self.log_requests).push(request.clone());
        if let Some(message) = lock(&self.fetch_error).clone() {
            return Err(anyhow!(message));
        }
        Ok(lock(&self.fetched_logs).clone())
    }
}
