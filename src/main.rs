mod app;
mod catalog;
mod channels;
mod cli;
mod config;
mod gateway;
mod input;
mod k8s;
mod logs;
mod model;
mod nav;
mod notify;
mod session;
mod state;
#[cfg(test)]
mod testing;
mod ui;
mod watch;

use anyhow::{Context, Result, bail};
use app::{App, AppCommand};
use catalog::{CatalogCache, load_catalog};
use channels::{Listener, UiReceiver, ui_channel, update_channel};
use chrono::Local;
use clap::Parser;
use cli::CliArgs;
use config::TraverseConfig;
use crossterm::event::{
    Event, EventStream, KeyEventKind, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
    PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
    supports_keyboard_enhancement,
};
use futures::StreamExt;
use gateway::{ClusterGateway, LogRequest};
use k8s::KubeGateway;
use logs::{LogManager, spawn_save_logs};
use model::namespace_label;
use notify::Notifier;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use session::{SessionHandle, SessionStart};
use state::{AppState, ObjectSnapshot, SharedState};
use std::fs::{self, File};
use std::io::{self, Stdout};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::time::{Duration, MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use watch::{WatchManager, spawn_namespace_watch};

type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;
const TICK_INTERVAL: Duration = Duration::from_secs(1);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Background machinery the UI loop hands work to.
struct Services {
    gateway: Arc<dyn ClusterGateway>,
    watches: WatchManager,
    logs: LogManager,
    notifier: Notifier,
    export_dir: PathBuf,
    tail_lines: i64,
}

struct Listeners {
    resources: Listener<ObjectSnapshot>,
    namespaces: Listener<Vec<String>>,
    ui: UiReceiver,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    let config = TraverseConfig::load(&args)?;
    let log_path = init_tracing(&config.log_filter, &config.log_dir)?;
    info!(
        "kube-traverse starting, log file {}, config {}",
        log_path.display(),
        config.source.as_deref().unwrap_or("defaults")
    );

    let gateway = KubeGateway::new().await?;
    let cache = CatalogCache::in_home(config.catalog_ttl);
    let catalog = load_catalog(&gateway, cache.as_ref(), config.refresh_catalog).await?;
    if catalog.is_empty() {
        bail!("the cluster reported no listable resource types");
    }

    let context = gateway.context().to_string();
    let cluster = gateway.cluster().to_string();
    let gateway: Arc<dyn ClusterGateway> = Arc::new(gateway);
    let state = SharedState::new(AppState::new(catalog));
    let mut app = App::new(state.clone(), context, cluster);

    run(&mut app, gateway, state, &config).await
}

fn init_tracing(level_filter: &str, log_dir: &Path) -> Result<PathBuf> {
    let filter = EnvFilter::try_new(level_filter)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;

    fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;
    let path = log_dir.join(format!(
        "kube-traverse-{}.log",
        Local::now().format("%Y-%m-%d_%H-%M-%S")
    ));
    let file = File::create(&path)
        .with_context(|| format!("failed to create log file {}", path.display()))?;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .compact()
        .with_writer(Mutex::new(file))
        .try_init();

    Ok(path)
}

async fn run(
    app: &mut App,
    gateway: Arc<dyn ClusterGateway>,
    state: SharedState,
    config: &TraverseConfig,
) -> Result<()> {
    let shutdown = CancellationToken::new();
    let (resource_publisher, resources) =
        update_channel::<ObjectSnapshot>(config.update_capacity, shutdown.clone());
    let (namespace_publisher, namespaces) =
        update_channel::<Vec<String>>(config.update_capacity, shutdown.clone());
    let (ui_tx, ui) = ui_channel();
    let notifier = Notifier::new(ui_tx.clone(), config.notification_ttl);

    let services = Services {
        watches: WatchManager::new(
            gateway.clone(),
            state.clone(),
            resource_publisher,
            config.poll_interval,
        ),
        logs: LogManager::new(
            gateway.clone(),
            state,
            ui_tx,
            notifier.clone(),
            config.log_tail_lines,
        ),
        notifier,
        export_dir: config.export_dir.clone(),
        tail_lines: config.log_tail_lines,
        gateway: gateway.clone(),
    };
    let namespace_session = spawn_namespace_watch(gateway, namespace_publisher);
    let mut listeners = Listeners {
        resources,
        namespaces,
        ui,
    };

    let (mut terminal, keyboard_enhanced) = init_terminal()?;
    let run_result = run_loop(&mut terminal, app, &services, &mut listeners).await;
    let restore_result = restore_terminal(&mut terminal, keyboard_enhanced);

    shutdown.cancel();
    stop_sessions(&services, &namespace_session).await;

    match (run_result, restore_result) {
        (Err(run_error), Err(restore_error)) => Err(anyhow::anyhow!(
            "{run_error:#}\nterminal restore error: {restore_error:#}"
        )),
        (Err(error), _) => Err(error),
        (_, Err(error)) => Err(error),
        (Ok(()), Ok(())) => Ok(()),
    }
}

async fn stop_sessions(services: &Services, namespace_session: &SessionHandle) {
    let teardown = async {
        tokio::join!(
            services.watches.stop(),
            services.logs.stop(),
            namespace_session.shutdown()
        );
    };
    if timeout(SHUTDOWN_TIMEOUT, teardown).await.is_err() {
        warn!("sessions did not stop within {SHUTDOWN_TIMEOUT:?}");
    }
}

fn init_terminal() -> Result<(TuiTerminal, bool)> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    let keyboard_enhanced = matches!(supports_keyboard_enhancement(), Ok(true));
    if keyboard_enhanced {
        execute!(
            stdout,
            EnterAlternateScreen,
            PushKeyboardEnhancementFlags(
                KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
                    | KeyboardEnhancementFlags::REPORT_EVENT_TYPES
            )
        )
        .context("failed to enter alternate screen with keyboard enhancement")?;
    } else {
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    }
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().context("failed to clear terminal")?;
    Ok((terminal, keyboard_enhanced))
}

fn restore_terminal(terminal: &mut TuiTerminal, keyboard_enhanced: bool) -> Result<()> {
    if keyboard_enhanced {
        execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags)
            .context("failed to pop keyboard enhancement flags")?;
    }
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;
    Ok(())
}

async fn run_loop(
    terminal: &mut TuiTerminal,
    app: &mut App,
    services: &Services,
    listeners: &mut Listeners,
) -> Result<()> {
    let mut reader = EventStream::new();
    let mut ticker = interval(TICK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        if app.take_dirty() {
            terminal
                .draw(|frame| ui::render(frame, app))
                .context("failed to render terminal frame")?;
        }

        if !app.running() {
            break;
        }

        tokio::select! {
            maybe_event = reader.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        if let Some(action) = input::map_key(app.mode(), key) {
                            debug!("action={action:?}");
                            let command = app.apply_action(action);
                            execute_app_command(app, services, command);
                        }
                    }
                    Some(Ok(Event::Resize(_, _))) => app.mark_dirty(),
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        app.set_status(format!("terminal event error: {error}"));
                    }
                    None => {
                        app.set_status("terminal event stream closed");
                        break;
                    }
                }
            }
            maybe_snapshot = listeners.resources.listen(), if !listeners.resources.is_done() => {
                if let Some(snapshot) = maybe_snapshot {
                    app.on_resource_snapshot(snapshot);
                }
            }
            maybe_names = listeners.namespaces.listen(), if !listeners.namespaces.is_done() => {
                if let Some(names) = maybe_names {
                    app.on_namespace_snapshot(names);
                }
            }
            Some(event) = listeners.ui.recv() => {
                app.on_ui_event(event);
            }
            _ = ticker.tick() => {
                app.mark_dirty();
            }
        }
    }

    Ok(())
}

/// Hands a command to the background services. Never awaits cluster I/O.
fn execute_app_command(app: &mut App, services: &Services, command: AppCommand) {
    match command {
        AppCommand::None => {}
        AppCommand::StartWatch { kind, namespace } => {
            let label = format!("{} in {}", kind.name, namespace_label(&namespace));
            app.set_status(format!("watching {label}"));
            let started = services.watches.start_watch(kind, namespace);
            let notifier = services.notifier.clone();
            tokio::spawn(async move {
                match started.await {
                    Ok(SessionStart::Serving(id)) => debug!("watch session {id} serving {label}"),
                    Ok(SessionStart::Superseded) => debug!("watch of {label} superseded"),
                    Ok(SessionStart::Failed) => {
                        notifier.notify(format!("Error: failed to load {label}"));
                    }
                    Err(error) => warn!("watch start task failed: {error}"),
                }
            });
        }
        AppCommand::StartLogSession { object, container } => {
            app.set_status(format!(
                "following {}:{container}",
                object.qualified_name()
            ));
            services.logs.start_log_session(object, container);
        }
        AppCommand::ReapLogSession(handle) => {
            debug!("reaping log session {}", handle.id());
            services.logs.reap(handle);
        }
        AppCommand::SaveLogs { object, container } => {
            app.set_status(format!("saving logs for {}:{container}", object.name));
            let request = LogRequest::new(object, container, services.tail_lines);
            spawn_save_logs(
                services.gateway.clone(),
                request,
                services.export_dir.clone(),
                services.notifier.clone(),
            );
        }
    }
}
