use crate::channels::UiEvent;
use crate::input::Action;
use crate::model::{
    ClusterObject, ListItem, Notification, ResourceKind, compare_objects, namespace_label,
    namespace_scope,
};
use crate::nav::{NavContext, NavEvent, NavMachine};
use crate::session::SessionHandle;
use crate::state::{AppState, ObjectSnapshot, SharedState, trim_log_window};
use tracing::debug;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InputMode {
    Normal,
    Filter,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    None,
    StartWatch {
        kind: ResourceKind,
        namespace: String,
    },
    StartLogSession {
        object: ClusterObject,
        container: String,
    },
    /// Join a log session already cancelled under the state lock.
    ReapLogSession(SessionHandle),
    SaveLogs {
        object: ClusterObject,
        container: String,
    },
}

#[derive(Debug, Clone, Default)]
struct ListView {
    title: String,
    items: Vec<ListItem>,
    selected: usize,
    filter: String,
}

impl ListView {
    fn visible(&self) -> Vec<&ListItem> {
        self.items
            .iter()
            .filter(|item| item.matches_filter(&self.filter))
            .collect()
    }

    fn selected_item(&self) -> Option<&ListItem> {
        self.visible().get(self.selected).copied()
    }

    fn clamp(&mut self) {
        let len = self.visible().len();
        self.selected = self.selected.min(len.saturating_sub(1));
    }

    fn move_by(&mut self, delta: isize) {
        let len = self.visible().len();
        if len == 0 {
            self.selected = 0;
            return;
        }
        let max_index = len.saturating_sub(1) as isize;
        let current = self.selected.min(max_index as usize) as isize;
        self.selected = (current + delta).clamp(0, max_index) as usize;
    }

    /// Swaps items while keeping the cursor on the same entry when it survives.
    fn replace_items(&mut self, title: String, items: Vec<ListItem>) {
        let previous = self.selected_item().cloned();
        self.title = title;
        self.items = items;
        if let Some(previous) = previous
            && let Some(index) = self.visible().iter().position(|item| **item == previous)
        {
            self.selected = index;
        }
        self.clamp();
    }
}

#[derive(Debug, Clone, Default)]
pub struct Viewport {
    content: String,
    lines: usize,
    offset: usize,
    height: usize,
}

impl Viewport {
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    fn line_count(&self) -> usize {
        self.lines
    }

    fn max_offset(&self) -> usize {
        self.line_count().saturating_sub(self.height.max(1))
    }

    fn set_content(&mut self, content: String) {
        self.lines = content.lines().count();
        self.content = content;
        self.offset = self.offset.min(self.max_offset());
    }

    /// Appends followed log text, keeping the same window as the state buffer.
    fn append_log(&mut self, text: &str) {
        self.content.push_str(text);
        self.lines += text.matches('\n').count();
        trim_log_window(&mut self.content, &mut self.lines);
        self.offset = self.offset.min(self.max_offset());
    }

    fn scroll(&mut self, delta: isize) {
        let next = (self.offset as isize + delta).clamp(0, self.max_offset() as isize);
        self.offset = next as usize;
    }

    fn goto_top(&mut self) {
        self.offset = 0;
    }

    fn goto_bottom(&mut self) {
        self.offset = self.max_offset();
    }

    pub fn scroll_percent(&self) -> u16 {
        let max = self.max_offset();
        if max == 0 {
            return 100;
        }
        ((self.offset * 100) / max) as u16
    }
}

pub struct App {
    nav: NavMachine,
    state: SharedState,
    list: ListView,
    viewport: Viewport,
    mode: InputMode,
    input: String,
    notification: Option<Notification>,
    status: String,
    show_help: bool,
    running: bool,
    dirty: bool,
    page_size: usize,
    context: String,
    cluster: String,
}

impl App {
    pub fn new(state: SharedState, context: String, cluster: String) -> Self {
        let mut app = Self {
            nav: NavMachine::default(),
            state,
            list: ListView::default(),
            viewport: Viewport::default(),
            mode: InputMode::Normal,
            input: String::new(),
            notification: None,
            status: String::new(),
            show_help: false,
            running: true,
            dirty: true,
            page_size: 10,
            context,
            cluster,
        };
        app.sync_view();
        app
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn context(&self) -> NavContext {
        self.nav.current()
    }

    pub fn kube_context(&self) -> &str {
        &self.context
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn show_help(&self) -> bool {
        self.show_help
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn notification(&self) -> Option<&Notification> {
        self.notification.as_ref()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn filter(&self) -> &str {
        &self.list.filter
    }

    pub fn list_title(&self) -> &str {
        &self.list.title
    }

    pub fn visible_items(&self) -> Vec<&ListItem> {
        self.list.visible()
    }

    pub fn selected_index(&self) -> usize {
        self.list.selected
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn set_page_size(&mut self, rows: usize) {
        self.page_size = rows.max(1);
        self.viewport.height = self.page_size;
        self.viewport.offset = self.viewport.offset.min(self.viewport.max_offset());
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// True once per change that needs a redraw.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
        self.dirty = true;
    }

    /// `kind › namespace › object › action › container` for the current drill-down.
    pub fn breadcrumb(&self) -> String {
        self.state.read(|state| {
            let selection = &state.selection;
            let mut parts = Vec::new();
            let context = self.nav.current();
            if context == NavContext::TypeSelect {
                return String::new();
            }
            parts.push(selection.kind_name().to_string());
            if selection.kind_is_namespaced() {
                parts.push(namespace_label(&selection.namespace).to_string());
            }
            if matches!(
                context,
                NavContext::ActionSelect
                    | NavContext::ContainerSelect
                    | NavContext::SpecView
                    | NavContext::LogView
            ) && let Some(object) = &selection.object
            {
                parts.push(object.name.clone());
            }
            if matches!(
                context,
                NavContext::ContainerSelect | NavContext::SpecView | NavContext::LogView
            ) {
                parts.push(selection.action.clone());
            }
            if context == NavContext::LogView {
                parts.push(selection.container.clone());
            }
            parts.join(" › ")
        })
    }

    pub fn apply_action(&mut self, action: Action) -> AppCommand {
        self.dirty = true;
        if self.show_help && !matches!(action, Action::ToggleHelp) {
            self.show_help = false;
        }

        match action {
            Action::Quit => {
                self.running = false;
                AppCommand::None
            }
            Action::Select => self.forward(),
            Action::Back => self.backward(),
            Action::Down => {
                self.move_cursor(1);
                AppCommand::None
            }
            Action::Up => {
                self.move_cursor(-1);
                AppCommand::None
            }
            Action::PageDown => {
                self.move_cursor(self.page_size as isize);
                AppCommand::None
            }
            Action::PageUp => {
                self.move_cursor(-(self.page_size as isize));
                AppCommand::None
            }
            Action::Top => {
                if self.nav.current().is_viewport() {
                    self.viewport.goto_top();
                } else {
                    self.list.selected = 0;
                }
                AppCommand::None
            }
            Action::Bottom => {
                if self.nav.current().is_viewport() {
                    self.viewport.goto_bottom();
                } else {
                    self.list.selected = self.list.visible().len().saturating_sub(1);
                }
                AppCommand::None
            }
            Action::ToggleHelp => {
                self.show_help = !self.show_help;
                AppCommand::None
            }
            Action::StartFilter => {
                if !self.nav.current().is_viewport() {
                    self.mode = InputMode::Filter;
                    self.input = self.list.filter.clone();
                }
                AppCommand::None
            }
            Action::InputChar(c) => {
                self.input.push(c);
                self.apply_filter_input();
                AppCommand::None
            }
            Action::Backspace => {
                self.input.pop();
                self.apply_filter_input();
                AppCommand::None
            }
            Action::SubmitInput => {
                self.mode = InputMode::Normal;
                self.list.filter = std::mem::take(&mut self.input);
                self.list.clamp();
                AppCommand::None
            }
            Action::CancelInput => {
                self.mode = InputMode::Normal;
                self.input.clear();
                self.list.filter.clear();
                self.list.clamp();
                AppCommand::None
            }
            Action::SaveLogs => self.save_logs_command(),
        }
    }

    fn apply_filter_input(&mut self) {
        self.list.filter = self.input.clone();
        self.list.selected = 0;
    }

    fn move_cursor(&mut self, delta: isize) {
        if self.nav.current().is_viewport() {
            self.viewport.scroll(delta);
        } else {
            self.list.move_by(delta);
        }
    }

    fn save_logs_command(&self) -> AppCommand {
        let container = match self.nav.current() {
            NavContext::ContainerSelect => self.list.selected_item().map(|item| item.label.clone()),
            NavContext::LogView => Some(self.state.read(|state| state.selection.container.clone())),
            _ => None,
        };
        let Some(container) = container else {
            return AppCommand::None;
        };
        let Some(object) = self.state.read(|state| state.selection.object.clone()) else {
            return AppCommand::None;
        };
        AppCommand::SaveLogs { object, container }
    }

    /// Records the choice for the context being left, then dispatches Forward.
    fn forward(&mut self) -> AppCommand {
        let context = self.nav.current();
        if context.is_viewport() {
            return AppCommand::None;
        }
        let Some(choice) = self.list.selected_item().cloned() else {
            return AppCommand::None;
        };

        let nav = &mut self.nav;
        let (transition, command) = self.state.write(|state| {
            let Some(command) = record_choice(state, context, &choice) else {
                return (None, AppCommand::None);
            };
            let transition = nav.dispatch(NavEvent::Forward, &state.selection);
            (Some(transition), command)
        });

        if transition.is_some_and(|transition| transition.transitioned) {
            self.enter_context();
        }
        command
    }

    fn backward(&mut self) -> AppCommand {
        let context = self.nav.current();
        let nav = &mut self.nav;
        let (transition, reaped) = self.state.write(|state| {
            let reaped = if context == NavContext::LogView {
                state.cancel_log()
            } else {
                None
            };
            (nav.dispatch(NavEvent::Backward, &state.selection), reaped)
        });

        if transition.transitioned {
            self.enter_context();
        }
        match reaped {
            Some(handle) => AppCommand::ReapLogSession(handle),
            None => AppCommand::None,
        }
    }

    fn enter_context(&mut self) {
        self.mode = InputMode::Normal;
        self.input.clear();
        self.list = ListView::default();
        self.viewport.offset = 0;
        self.sync_view();
        if self.nav.current() == NavContext::LogView {
            self.viewport.goto_bottom();
        }
    }

    /// Rebuilds the list or viewport for the current context from shared state.
    fn sync_view(&mut self) {
        let context = self.nav.current();
        match context {
            NavContext::SpecView => {
                let content = self.state.read(|state| {
                    state
                        .selection
                        .object
                        .as_ref()
                        .map(ClusterObject::to_yaml)
                        .unwrap_or_default()
                });
                self.viewport.set_content(content);
            }
            NavContext::LogView => {
                let content = self.state.read(|state| state.log_buffer.clone());
                self.viewport.set_content(content);
            }
            _ => {
                let (title, items) = self.state.read(|state| list_for(context, state));
                self.list.replace_items(title, items);
            }
        }
        self.dirty = true;
    }

    pub fn on_resource_snapshot(&mut self, snapshot: ObjectSnapshot) -> bool {
        let session = snapshot.session;
        let context = self.nav.current();
        let applied = self.state.write(|state| {
            if !state.apply_snapshot(snapshot) {
                return false;
            }
            if context == NavContext::SpecView
                && let Some(refreshed) = state.selected_object_refreshed()
            {
                state.selection.object = Some(refreshed);
            }
            true
        });
        if !applied {
            debug!("dropping snapshot from inactive session {session}");
            return false;
        }

        if matches!(context, NavContext::ObjectSelect | NavContext::SpecView) {
            self.sync_view();
            return true;
        }
        false
    }

    pub fn on_namespace_snapshot(&mut self, namespaces: Vec<String>) -> bool {
        let changed = self.state.write(|state| state.set_namespaces(namespaces));
        if changed && self.nav.current() == NavContext::NamespaceSelect {
            self.sync_view();
            return true;
        }
        false
    }

    pub fn on_ui_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::LogChunk { session, text } => {
                let active = self.state.read(|state| state.active_log_id());
                if self.nav.current() == NavContext::LogView && active == Some(session) {
                    self.viewport.append_log(&text);
                    self.viewport.goto_bottom();
                    self.dirty = true;
                }
            }
            UiEvent::LogEnded { session } => {
                let active = self.state.read(|state| state.active_log_id());
                if active == Some(session) {
                    self.set_status("log stream ended");
                }
            }
            UiEvent::Notify(notification) => {
                self.notification = Some(notification);
                self.dirty = true;
            }
            UiEvent::ClearNotification(id) => {
                if self.notification.as_ref().is_some_and(|current| current.id == id) {
                    self.notification = None;
                    self.dirty = true;
                }
            }
        }
    }
}

/// Writes the selection for `context`. `None` means the choice no longer
/// resolves and nothing should happen.
fn record_choice(
    state: &mut AppState,
    context: NavContext,
    choice: &ListItem,
) -> Option<AppCommand> {
    let selection = &mut state.selection;
    match context {
        NavContext::TypeSelect => {
            let kind = state
                .catalog
                .iter()
                .find(|kind| kind.name == choice.label)?
                .clone();
            selection.kind = Some(kind.clone());
            selection.namespace.clear();
            selection.object = None;
            selection.action.clear();
            selection.container.clear();
            state.objects.clear();
            Some(AppCommand::StartWatch {
                kind,
                namespace: String::new(),
            })
        }
        NavContext::NamespaceSelect => {
            let namespace = namespace_scope(&choice.label);
            selection.namespace = namespace.clone();
            let kind = selection.kind.clone()?;
            let active_scope = state
                .watch
                .as_ref()
                .and_then(|handle| handle.scope().watch_namespace().map(str::to_string));
            if active_scope.as_deref() == Some(namespace.as_str()) {
                Some(AppCommand::None)
            } else {
                Some(AppCommand::StartWatch { kind, namespace })
            }
        }
        NavContext::ObjectSelect => {
            let object = state
                .objects
                .iter()
                .find(|object| {
                    object.name == choice.label && object.namespace == choice.detail
                })?
                .clone();
            selection.object = Some(object);
            Some(AppCommand::None)
        }
        NavContext::ActionSelect => {
            selection.action = choice.label.clone();
            Some(AppCommand::None)
        }
        NavContext::ContainerSelect => {
            let object = selection.object.clone()?;
            selection.container = choice.label.clone();
            state.clear_log();
            Some(AppCommand::StartLogSession {
                object,
                container: choice.label.clone(),
            })
        }
        NavContext::SpecView | NavContext::LogView => None,
    }
}

fn list_for(context: NavContext, state: &AppState) -> (String, Vec<ListItem>) {
    let selection = &state.selection;
    let kind = selection.kind_name();
    match context {
        NavContext::TypeSelect => (
            "Resources (GVRs)".to_string(),
            state
                .catalog
                .iter()
                .map(|kind| ListItem::with_detail(&kind.name, Some(kind.gvr.to_string())))
                .collect(),
        ),
        NavContext::NamespaceSelect => (
            format!("Namespaces ({kind})"),
            state.namespaces.iter().map(ListItem::new).collect(),
        ),
        NavContext::ObjectSelect => {
            let mut objects = state
                .objects
                .iter()
                .filter(|object| object.in_namespace(&selection.namespace))
                .collect::<Vec<_>>();
            objects.sort_by(|left, right| compare_objects(left, right));
            (
                format!("Resources ({kind})"),
                objects
                    .into_iter()
                    .map(|object| ListItem::with_detail(&object.name, object.namespace.clone()))
                    .collect(),
            )
        }
        NavContext::ActionSelect => (
            format!("Actions for {kind}"),
            selection
                .kind
                .iter()
                .flat_map(|kind| kind.actions.iter())
                .map(ListItem::new)
                .collect(),
        ),
        NavContext::ContainerSelect => (
            "Select Container".to_string(),
            selection
                .object
                .iter()
                .flat_map(ClusterObject::container_names)
                .map(ListItem::new)
                .collect(),
        ),
        NavContext::SpecView | NavContext::LogView => (String::new(), Vec::new()),
    }
}
