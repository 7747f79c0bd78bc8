use crate::model::{ClusterObject, ResourceKind};
use anyhow::Result;
use async_trait::async_trait;
use futures::AsyncBufRead;
use futures::stream::BoxStream;
use std::pin::Pin;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    Applied(ClusterObject),
    Deleted(ClusterObject),
    /// The underlying watch relisted; the cache holds a fresh full set.
    Restarted,
}

/// Local view of a subscription's objects, kept current by the watch itself.
pub trait ObjectCache: Send + Sync {
    fn snapshot(&self) -> Vec<ClusterObject>;
}

pub struct WatchSubscription {
    pub events: BoxStream<'static, Result<WatchEvent>>,
    pub cache: Arc<dyn ObjectCache>,
}

pub type LogStream = Pin<Box<dyn AsyncBufRead + Send>>;

#[derive(Debug, Clone, PartialEq)]
pub struct LogRequest {
    pub object: ClusterObject,
    pub container: String,
    pub tail_lines: i64,
    pub follow: bool,
}

impl LogRequest {
    pub fn new(object: ClusterObject, container: impl Into<String>, tail_lines: i64) -> Self {
        Self {
            object,
            container: container.into(),
            tail_lines,
            follow: false,
        }
    }

    pub fn following(mut self) -> Self {
        self.follow = true;
        self
    }
}

/// Everything the browser needs from a cluster. Implemented against the API
/// server by `KubeGateway` and by an in-memory double in tests.
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    async fn list_types(&self) -> Result<Vec<ResourceKind>>;

    /// An empty namespace lists across the whole cluster.
    async fn list_objects(&self, kind: &ResourceKind, namespace: &str)
    -> Result<Vec<ClusterObject>>;

    async fn watch(&self, kind: &ResourceKind, namespace: &str) -> Result<WatchSubscription>;

    async fn stream_logs(&self, request: &LogRequest) -> Result<LogStream>;

    async fn fetch_logs(&self, request: &LogRequest) -> Result<String>;
}
