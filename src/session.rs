use crate::model::{ClusterObject, ResourceKind};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

/// How a session start ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStart {
    Serving(u64),
    /// A newer selection cancelled the session before it opened.
    Superseded,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionScope {
    Watch {
        kind: ResourceKind,
        namespace: String,
    },
    Log {
        object: ClusterObject,
        container: String,
        follow: bool,
    },
    Namespaces,
}

impl SessionScope {
    pub fn watch_namespace(&self) -> Option<&str> {
        match self {
            Self::Watch { namespace, .. } => Some(namespace),
            Self::Log { .. } | Self::Namespaces => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Watch { kind, namespace } if namespace.is_empty() => kind.name.clone(),
            Self::Watch { kind, namespace } => format!("{}@{namespace}", kind.name),
            Self::Log {
                object, container, ..
            } => format!("{}:{container}", object.qualified_name()),
            Self::Namespaces => "namespaces".to_string(),
        }
    }
}

/// Owned handle to a background session. Clones share the same token and
/// tracker, so a handle can be taken out of shared state and awaited without
/// holding the lock.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: u64,
    scope: SessionScope,
    token: CancellationToken,
    tracker: TaskTracker,
}

impl PartialEq for SessionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl SessionHandle {
    pub fn new(id: u64, scope: SessionScope) -> Self {
        Self {
            id,
            scope,
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn scope(&self) -> &SessionScope {
        &self.scope
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Resolves once every task spawned on the tracker has exited.
    pub async fn join(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }

    pub async fn shutdown(&self) {
        self.cancel();
        self.join().await;
    }
}

/// Sessions cancelled outside a manager's gate. They are joined by whichever
/// task holds the gate next.
#[derive(Debug, Default)]
pub struct RetiredSessions {
    handles: Mutex<Vec<SessionHandle>>,
}

impl RetiredSessions {
    pub fn push(&self, handle: SessionHandle) {
        self.lock().push(handle);
    }

    pub async fn join_all(&self) {
        let retired = std::mem::take(&mut *self.lock());
        for handle in retired {
            debug!("joining session {} ({})", handle.id(), handle.scope().describe());
            handle.join().await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SessionHandle>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
