use crate::model::{ALL_NAMESPACES, ClusterObject, ResourceKind};
use crate::session::SessionHandle;
use std::sync::{Arc, PoisonError, RwLock};

/// Lines of a followed log kept in memory.
pub const LOG_WINDOW_LINES: usize = 10_000;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub kind: Option<ResourceKind>,
    /// Empty means every namespace.
    pub namespace: String,
    pub object: Option<ClusterObject>,
    pub action: String,
    pub container: String,
}

impl Selection {
    pub fn kind_is_namespaced(&self) -> bool {
        self.kind.as_ref().is_some_and(|kind| kind.namespaced)
    }

    pub fn kind_name(&self) -> &str {
        self.kind.as_ref().map_or("", |kind| kind.name.as_str())
    }
}

/// Full object set produced by one watch session.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSnapshot {
    pub session: u64,
    pub objects: Vec<ClusterObject>,
}

#[derive(Debug, Default)]
pub struct AppState {
    pub catalog: Vec<ResourceKind>,
    pub selection: Selection,
    pub objects: Vec<ClusterObject>,
    pub namespaces: Vec<String>,
    pub log_buffer: String,
    log_lines: usize,
    pub watch: Option<SessionHandle>,
    pub log: Option<SessionHandle>,
}

impl AppState {
    pub fn new(catalog: Vec<ResourceKind>) -> Self {
        Self {
            catalog,
            namespaces: vec![ALL_NAMESPACES.to_string()],
            ..Self::default()
        }
    }

    pub fn active_watch_id(&self) -> Option<u64> {
        self.watch.as_ref().map(SessionHandle::id)
    }

    pub fn active_log_id(&self) -> Option<u64> {
        self.log.as_ref().map(SessionHandle::id)
    }

    /// Replaces the object set when the snapshot belongs to the active watch.
    pub fn apply_snapshot(&mut self, snapshot: ObjectSnapshot) -> bool {
        if self.active_watch_id() != Some(snapshot.session) {
            return false;
        }
        self.objects = snapshot.objects;
        true
    }

    pub fn set_namespaces(&mut self, namespaces: Vec<String>) -> bool {
        if self.namespaces == namespaces {
            return false;
        }
        self.namespaces = namespaces;
        true
    }

    pub fn install_watch(&mut self, handle: SessionHandle) {
        self.watch = Some(handle);
    }

    pub fn take_watch(&mut self) -> Option<SessionHandle> {
        self.watch.take()
    }

    /// Drops the active watch only if it is still the given session.
    pub fn remove_watch(&mut self, id: u64) -> Option<SessionHandle> {
        if self.active_watch_id() == Some(id) {
            self.watch.take()
        } else {
            None
        }
    }

    pub fn install_log(&mut self, handle: SessionHandle) {
        self.clear_log();
        self.log = Some(handle);
    }

    pub fn clear_log(&mut self) {
        self.log_buffer.clear();
        self.log_lines = 0;
    }

    pub fn remove_log(&mut self, id: u64) -> Option<SessionHandle> {
        if self.active_log_id() == Some(id) {
            self.log.take()
        } else {
            None
        }
    }

    /// Cancels the active log session in place. The caller joins the returned
    /// handle outside the lock.
    pub fn cancel_log(&mut self) -> Option<SessionHandle> {
        let handle = self.log.take()?;
        handle.cancel();
        Some(handle)
    }

    /// Appends a log line for session `id`. Refused once that session was
    /// cancelled or replaced.
    pub fn append_log(&mut self, id: u64, text: &str) -> bool {
        match &self.log {
            Some(handle) if handle.id() == id && !handle.is_cancelled() => {
                self.log_buffer.push_str(text);
                self.log_lines += text.matches('\n').count();
                trim_log_window(&mut self.log_buffer, &mut self.log_lines);
                true
            }
            _ => false,
        }
    }

    pub fn selected_object_refreshed(&self) -> Option<ClusterObject> {
        let selected = self.selection.object.as_ref()?;
        self.objects
            .iter()
            .find(|object| object.same_identity(selected))
            .cloned()
    }
}

/// Drops the oldest lines once `lines` runs a quarter past the window.
pub fn trim_log_window(buffer: &mut String, lines: &mut usize) {
    if *lines <= LOG_WINDOW_LINES + LOG_WINDOW_LINES / 4 {
        return;
    }
    let excess = *lines - LOG_WINDOW_LINES;
    if let Some((index, _)) = buffer.match_indices('\n').nth(excess - 1) {
        buffer.drain(..=index);
        *lines = LOG_WINDOW_LINES;
    }
}

/// Cheaply cloneable handle to the one application state record. Access goes
/// through closures so no guard can be held across an `.await`.
#[derive(Debug, Clone)]
pub struct SharedState {
    inner: Arc<RwLock<AppState>>,
}

impl SharedState {
    pub fn new(state: AppState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&AppState) -> R) -> R {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut AppState) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}
