use crate::channels::{UiEvent, UiSender};
use crate::gateway::{ClusterGateway, LogRequest, LogStream};
use crate::model::ClusterObject;
use crate::notify::{Notifier, compact_error};
use crate::session::{RetiredSessions, SessionHandle, SessionScope, SessionStart};
use crate::state::SharedState;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use futures::{AsyncBufReadExt, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_TAIL_LINES: i64 = 200;

/// Owns the one live log tail.
#[derive(Clone)]
pub struct LogManager {
    inner: Arc<LogInner>,
}

struct LogInner {
    gateway: Arc<dyn ClusterGateway>,
    state: SharedState,
    events: UiSender,
    notifier: Notifier,
    tail_lines: i64,
    gate: Mutex<()>,
    retired: RetiredSessions,
    next_id: AtomicU64,
}

impl LogManager {
    pub fn new(
        gateway: Arc<dyn ClusterGateway>,
        state: SharedState,
        events: UiSender,
        notifier: Notifier,
        tail_lines: i64,
    ) -> Self {
        Self {
            inner: Arc::new(LogInner {
                gateway,
                state,
                events,
                notifier,
                tail_lines,
                gate: Mutex::new(()),
                retired: RetiredSessions::default(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Installs the new tail in state before returning. A `Back` handled
    /// right after this call therefore cancels the session even if its
    /// stream has not been opened yet.
    pub fn start_log_session(
        &self,
        object: ClusterObject,
        container: String,
    ) -> JoinHandle<SessionStart> {
        let handle = self.install(object.clone(), container.clone());
        let manager = self.clone();
        tokio::spawn(async move { manager.open(handle, object, container).await })
    }

    pub async fn stop(&self) {
        if let Some(previous) = self.inner.state.write(|state| state.cancel_log()) {
            self.inner.retired.push(previous);
        }
        let _gate = self.inner.gate.lock().await;
        self.inner.retired.join_all().await;
    }

    /// Joins a session that the UI already cancelled under the state lock.
    pub fn reap(&self, handle: SessionHandle) -> JoinHandle<()> {
        self.inner.retired.push(handle);
        let manager = self.clone();
        tokio::spawn(async move {
            let _gate = manager.inner.gate.lock().await;
            manager.inner.retired.join_all().await;
        })
    }

    fn install(&self, object: ClusterObject, container: String) -> SessionHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = SessionHandle::new(
            id,
            SessionScope::Log {
                object,
                container,
                follow: true,
            },
        );
        let previous = self.inner.state.write(|state| {
            let previous = state.cancel_log();
            state.install_log(handle.clone());
            previous
        });
        if let Some(previous) = previous {
            debug!("stopping log session {}", previous.id());
            self.inner.retired.push(previous);
        }
        handle
    }

    async fn open(
        &self,
        handle: SessionHandle,
        object: ClusterObject,
        container: String,
    ) -> SessionStart {
        let _gate = self.inner.gate.lock().await;
        self.inner.retired.join_all().await;

        let id = handle.id();
        let token = handle.token();
        if token.is_cancelled() {
            debug!("log session {id} cancelled before it opened");
            return SessionStart::Superseded;
        }

        let request = LogRequest::new(object, container, self.inner.tail_lines).following();
        let opened = tokio::select! {
            biased;
            _ = token.cancelled() => return SessionStart::Superseded,
            opened = self.inner.gateway.stream_logs(&request) => opened,
        };
        let stream = match opened {
            Ok(stream) => stream,
            Err(error) => {
                warn!(
                    "failed to stream logs for {}: {error:#}",
                    request.object.qualified_name()
                );
                self.inner.state.write(|state| state.remove_log(id));
                self.inner.notifier.error(&error);
                return SessionStart::Failed;
            }
        };

        handle.tracker().spawn(read_log_lines(
            stream,
            self.inner.state.clone(),
            self.inner.events.clone(),
            self.inner.notifier.clone(),
            token,
            id,
        ));
        info!("log session {id} started for {}", handle.scope().describe());
        SessionStart::Serving(id)
    }
}

async fn read_log_lines(
    stream: LogStream,
    state: SharedState,
    events: UiSender,
    notifier: Notifier,
    token: CancellationToken,
    session: u64,
) {
    let mut lines = stream.lines();
    loop {
        let line = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            line = lines.next() => line,
        };
        match line {
            Some(Ok(line)) => {
                let text = format!("{line}\n");
                if !state.write(|state| state.append_log(session, &text)) {
                    break;
                }
                if events.send(UiEvent::LogChunk { session, text }).is_err() {
                    break;
                }
            }
            Some(Err(error)) => {
                warn!("log stream {session} failed: {error}");
                if !token.is_cancelled() {
                    notifier.notify(format!("Error: {error}"));
                }
                break;
            }
            None => {
                let _ = events.send(UiEvent::LogEnded { session });
                break;
            }
        }
    }
    debug!("log session {session} exited");
}

pub fn log_file_name(pod: &str, container: &str, at: DateTime<Local>) -> String {
    format!("{pod}-{container}-{}.log", at.format("%Y-%m-%d_%H-%M-%S"))
}

/// One-shot fetch of the tail window written to the export directory.
pub async fn save_log_to_file(
    gateway: &dyn ClusterGateway,
    request: &LogRequest,
    export_dir: &Path,
) -> Result<PathBuf> {
    let text = gateway.fetch_logs(request).await.with_context(|| {
        format!(
            "failed to fetch logs for {}",
            request.object.qualified_name()
        )
    })?;

    tokio::fs::create_dir_all(export_dir)
        .await
        .with_context(|| format!("failed to create {}", export_dir.display()))?;
    let path = export_dir.join(log_file_name(
        &request.object.name,
        &request.container,
        Local::now(),
    ));
    tokio::fs::write(&path, text)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

pub fn save_outcome_message(outcome: &Result<PathBuf>) -> String {
    match outcome {
        Ok(path) => format!("Saved logs to {}", path.display()),
        Err(error) => format!("Error: {}", compact_error(error)),
    }
}

pub fn spawn_save_logs(
    gateway: Arc<dyn ClusterGateway>,
    request: LogRequest,
    export_dir: PathBuf,
    notifier: Notifier,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let outcome = save_log_to_file(gateway.as_ref(), &request, &export_dir).await;
        if let Err(error) = &outcome {
            warn!("saving logs failed: {error:#}");
        }
        notifier.notify(save_outcome_message(&outcome));
    })
}
