use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Flex, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap};

use crate::app::{App, InputMode};
use crate::input::KEY_HELP;
use crate::nav::NavContext;

const BG: Color = Color::Rgb(9, 15, 25);
const PANEL: Color = Color::Rgb(16, 27, 44);
const ACCENT: Color = Color::Rgb(52, 211, 153);
const MUTED: Color = Color::Rgb(140, 156, 178);
const WARN: Color = Color::Rgb(251, 191, 36);
const ERROR: Color = Color::Rgb(248, 113, 113);
const PL_A: Color = Color::Rgb(17, 94, 89);
const PL_B: Color = Color::Rgb(30, 64, 175);
const PL_C: Color = Color::Rgb(55, 48, 163);

pub fn render(frame: &mut Frame, app: &mut App) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(6),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(frame, root[0], app);
    render_body(frame, root[1], app);
    render_footer(frame, root[2], app);

    if app.show_help() {
        render_help_modal(frame, app);
    }
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let left_line = build_left_header_line(app);
    let right_line = build_right_header_line(app);
    let right_width = spans_width(&right_line.spans) as u16;
    if area.width < 42 || right_width == 0 || right_width >= area.width {
        frame.render_widget(
            Paragraph::new(left_line).style(Style::default().bg(BG).fg(Color::White)),
            area,
        );
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(right_width)])
        .split(area);
    frame.render_widget(
        Paragraph::new(left_line).style(Style::default().bg(BG).fg(Color::White)),
        chunks[0],
    );
    frame.render_widget(
        Paragraph::new(right_line)
            .style(Style::default().bg(BG))
            .alignment(Alignment::Right),
        chunks[1],
    );
}

fn build_left_header_line(app: &App) -> Line<'static> {
    let mut spans = Vec::new();
    let breadcrumb = app.breadcrumb();
    let context_bg = if breadcrumb.is_empty() { BG } else { PL_C };
    push_powerline_segment(&mut spans, " ⎈ traverse ", Color::White, PL_A, PL_B);
    push_powerline_segment(
        &mut spans,
        format!(" {} ", app.context().label()),
        Color::White,
        PL_B,
        context_bg,
    );
    if !breadcrumb.is_empty() {
        push_powerline_segment(
            &mut spans,
            format!(" {} ", compact_text(&breadcrumb, 80)),
            Color::White,
            PL_C,
            BG,
        );
    }
    Line::from(spans)
}

fn build_right_header_line(app: &App) -> Line<'static> {
    Line::from(vec![
        Span::styled(
            format!(" {} ", compact_text(app.kube_context(), 32)),
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("{} ", cluster_host(app.cluster())),
            Style::default().fg(MUTED),
        ),
    ])
}

fn render_body(frame: &mut Frame, area: Rect, app: &mut App) {
    app.set_page_size(body_rows_visible(area));
    if app.context().is_viewport() {
        render_viewport(frame, area, app);
    } else {
        render_list(frame, area, app);
    }
}

fn render_list(frame: &mut Frame, area: Rect, app: &App) {
    let items = app.visible_items();
    let show_detail = items.iter().any(|item| item.detail.is_some());
    let rows = items.iter().map(|item| {
        let mut cells = vec![Cell::from(item.label.clone()).style(Style::default().fg(Color::White))];
        if show_detail {
            cells.push(
                Cell::from(item.detail.clone().unwrap_or_default())
                    .style(Style::default().fg(MUTED)),
            );
        }
        Row::new(cells)
    });
    let widths = if show_detail {
        vec![Constraint::Percentage(60), Constraint::Percentage(40)]
    } else {
        vec![Constraint::Percentage(100)]
    };

    let mut title = format!("{} ({})", app.list_title(), items.len());
    if !app.filter().is_empty() {
        title.push_str(&format!(" /{}", app.filter()));
    }
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(ACCENT))
        .style(Style::default().bg(PANEL));

    if items.is_empty() {
        let placeholder = if app.filter().is_empty() {
            empty_list_text(app.context())
        } else {
            "No matches"
        };
        frame.render_widget(
            Paragraph::new(placeholder)
                .block(block)
                .style(Style::default().fg(MUTED)),
            area,
        );
        return;
    }

    let table = Table::new(rows, widths)
        .block(block)
        .column_spacing(1)
        .row_highlight_style(
            Style::default()
                .bg(Color::Rgb(24, 36, 58))
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("› ");

    let mut state = TableState::default();
    state.select(Some(app.selected_index()));
    frame.render_stateful_widget(table, area, &mut state);
}

fn empty_list_text(context: NavContext) -> &'static str {
    match context {
        NavContext::ObjectSelect => "Waiting for resources…",
        NavContext::ContainerSelect => "No containers",
        NavContext::ActionSelect => "No actions",
        _ => "Nothing to show",
    }
}

fn render_viewport(frame: &mut Frame, area: Rect, app: &App) {
    let viewport = app.viewport();
    let (label, text) = match app.context() {
        NavContext::LogView => ("Logs", highlight_log_text(viewport.content())),
        _ => ("Spec", highlight_yaml_text(viewport.content())),
    };
    let block = Block::default()
        .title(format!("{label} {}%", viewport.scroll_percent()))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(ACCENT))
        .style(Style::default().bg(PANEL));
    let paragraph = Paragraph::new(text)
        .block(block)
        .style(Style::default().fg(Color::White))
        .scroll((viewport.offset().min(u16::MAX as usize) as u16, 0));

    frame.render_widget(paragraph, area);
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App) {
    if app.mode() == InputMode::Filter {
        let mut spans = Vec::new();
        push_powerline_segment(&mut spans, " 󰈲 flt ", Color::Black, WARN, PL_B);
        push_powerline_segment(
            &mut spans,
            format!(" /{} ", app.input()),
            Color::White,
            PL_B,
            BG,
        );
        frame.render_widget(
            Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
            area,
        );
        return;
    }

    let status_text = app
        .notification()
        .map(|notification| notification.text.clone())
        .unwrap_or_else(|| app.status().to_string());
    let status_text = if status_text.is_empty() {
        "? for help".to_string()
    } else {
        status_text
    };
    let failed = is_failure(&status_text);
    let (status_bg, status_fg) = if failed {
        (ERROR, Color::Black)
    } else {
        (PL_B, Color::White)
    };
    let status_icon = if failed { "󰅚" } else { "󰄬" };

    let mut spans = Vec::new();
    push_powerline_segment(&mut spans, " 󰘳 nrm ", Color::White, PL_A, status_bg);
    push_powerline_segment(
        &mut spans,
        format!(
            " {status_icon} {} ",
            compact_text(&status_text, area.width.saturating_sub(24).max(24) as usize)
        ),
        status_fg,
        status_bg,
        BG,
    );

    let position = footer_position(app);
    let right_width = position.chars().count() as u16;
    if right_width == 0 || right_width >= area.width {
        frame.render_widget(
            Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
            area,
        );
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(right_width)])
        .split(area);
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
        chunks[0],
    );
    frame.render_widget(
        Paragraph::new(position)
            .style(Style::default().bg(BG).fg(MUTED))
            .alignment(Alignment::Right),
        chunks[1],
    );
}

fn footer_position(app: &App) -> String {
    if app.context().is_viewport() {
        return format!(" {}% ", app.viewport().scroll_percent());
    }
    let total = app.visible_items().len();
    if total == 0 {
        return String::new();
    }
    format!(" {}/{total} ", app.selected_index() + 1)
}

fn is_failure(status_text: &str) -> bool {
    let status = status_text.to_ascii_lowercase();
    ["failed", "error", "forbidden", "denied", "timed out"]
        .iter()
        .any(|needle| status.contains(needle))
}

fn highlight_yaml_text(input: &str) -> Text<'static> {
    let lines = input
        .lines()
        .map(highlight_yaml_line)
        .collect::<Vec<Line<'static>>>();
    Text::from(lines)
}

fn highlight_yaml_line(line: &str) -> Line<'static> {
    let indent_len = line
        .as_bytes()
        .iter()
        .take_while(|byte| **byte == b' ' || **byte == b'\t')
        .count();
    let indent = &line[..indent_len];
    let trimmed = &line[indent_len..];

    let mut spans = vec![Span::raw(indent.to_string())];
    if trimmed.is_empty() {
        return Line::from(spans);
    }

    if let Some(rest) = trimmed.strip_prefix("- ") {
        spans.push(Span::styled("- ", Style::default().fg(ACCENT)));
        spans.extend(highlight_yaml_content(rest));
        return Line::from(spans);
    }

    spans.extend(highlight_yaml_content(trimmed));
    Line::from(spans)
}

fn highlight_yaml_content(content: &str) -> Vec<Span<'static>> {
    let Some((key, value)) = split_yaml_key_value(content) else {
        return vec![Span::styled(
            content.to_string(),
            Style::default().fg(Color::White),
        )];
    };

    let mut spans = vec![
        Span::styled(
            key.to_string(),
            Style::default().fg(Color::Rgb(103, 232, 249)),
        ),
        Span::styled(":", Style::default().fg(MUTED)),
    ];
    if value.trim().is_empty() {
        return spans;
    }

    spans.push(Span::raw(" "));
    spans.push(Span::styled(
        value.trim_start().to_string(),
        Style::default().fg(yaml_value_color(value.trim())),
    ));
    spans
}

fn split_yaml_key_value(content: &str) -> Option<(&str, &str)> {
    let (key, value) = content.split_once(':')?;
    let key = key.trim_end();
    if key.is_empty() || key.contains(' ') {
        return None;
    }
    Some((key, value))
}

fn yaml_value_color(value: &str) -> Color {
    if value.starts_with('"') || value.starts_with('\'') {
        Color::Rgb(125, 211, 252)
    } else if matches!(value, "true" | "false" | "null" | "~") {
        WARN
    } else if value.parse::<f64>().is_ok() {
        Color::Rgb(251, 146, 60)
    } else if value.starts_with('{') || value.starts_with('[') {
        MUTED
    } else {
        Color::Rgb(147, 197, 253)
    }
}

fn highlight_log_text(input: &str) -> Text<'static> {
    Text::from(
        input
            .lines()
            .map(|line| Line::styled(line.to_string(), Style::default().fg(log_line_color(line))))
            .collect::<Vec<_>>(),
    )
}

fn log_line_color(line: &str) -> Color {
    let upper = line.to_ascii_uppercase();
    if ["ERROR", "FATAL", "PANIC"].iter().any(|level| upper.contains(level)) {
        ERROR
    } else if upper.contains("WARN") {
        WARN
    } else if upper.contains("DEBUG") || upper.contains("TRACE") {
        MUTED
    } else {
        Color::White
    }
}

fn push_powerline_segment(
    spans: &mut Vec<Span<'static>>,
    content: impl Into<String>,
    fg: Color,
    bg: Color,
    next_bg: Color,
) {
    spans.push(Span::styled(
        content.into(),
        Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD),
    ));
    spans.push(Span::styled("", Style::default().fg(bg).bg(next_bg)));
}

fn spans_width(spans: &[Span<'_>]) -> usize {
    spans.iter().map(|span| span.content.chars().count()).sum()
}

fn render_help_modal(frame: &mut Frame, app: &App) {
    let area = centered_rect(70, 60, frame.area());
    frame.render_widget(Clear, area);

    let mut lines = vec![
        Line::from(format!(
            "traverse help  mode:{}  view:{}",
            help_mode_label(app.mode()),
            app.context().label()
        )),
        Line::from(""),
    ];
    for (keys, description) in KEY_HELP {
        lines.push(Line::from(vec![
            Span::styled(format!("{keys:<18}"), Style::default().fg(ACCENT)),
            Span::raw(description.to_string()),
        ]));
    }

    let modal = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .title("Help")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(ACCENT))
                .style(Style::default().bg(PANEL)),
        )
        .style(Style::default().fg(Color::White));

    frame.render_widget(modal, area);
}

fn help_mode_label(mode: InputMode) -> &'static str {
    match mode {
        InputMode::Normal => "normal",
        InputMode::Filter => "filter",
    }
}

fn body_rows_visible(area: Rect) -> usize {
    area.height.saturating_sub(2).max(1) as usize
}

/// Truncates breadcrumbs and context names to `max_chars`, marking the cut.
fn compact_text(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        None => value.to_string(),
        Some(_) => {
            let keep = max_chars.saturating_sub(1);
            let cut = value.char_indices().nth(keep).map_or(0, |(index, _)| index);
            format!("{}…", &value[..cut])
        }
    }
}

/// Host and port of the API server, without scheme or path.
fn cluster_host(server: &str) -> &str {
    let server = server.trim();
    let rest = server.split_once("://").map_or(server, |(_, rest)| rest);
    rest.split('/').next().unwrap_or(rest)
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let [row] = Layout::vertical([Constraint::Percentage(percent_y)])
        .flex(Flex::Center)
        .areas(area);
    let [cell] = Layout::horizontal([Constraint::Percentage(percent_x)])
        .flex(Flex::Center)
        .areas(row);
    cell
}

#[cfg(test)]
mod tests {
    use super::{
        ERROR, WARN, centered_rect, cluster_host, compact_text, highlight_yaml_line,
        log_line_color, render, split_yaml_key_value,
    };
    use crate::app::App;
    use crate::input::Action;
    use crate::state::{AppState, SharedState};
    use crate::testing::{node_kind, pod_kind};
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;
    use ratatui::layout::Rect;
    use ratatui::style::Color;

    fn screen(terminal: &Terminal<TestBackend>) -> String {
        terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn yaml_keys_split_only_on_simple_keys() {
        assert_eq!(split_yaml_key_value("name: web"), Some(("name", " web")));
        assert_eq!(split_yaml_key_value("not a key: x"), None);
        assert_eq!(split_yaml_key_value("plain"), None);

        let line = highlight_yaml_line("  - name: web");
        let text = line
            .spans
            .iter()
            .map(|span| span.content.as_ref())
            .collect::<String>();
        assert_eq!(text, "  - name: web");
    }

    #[test]
    fn log_levels_pick_colors() {
        assert_eq!(log_line_color("2024 ERROR boom"), ERROR);
        assert_eq!(log_line_color("level=warn slow"), WARN);
        assert_eq!(log_line_color("listening on :8080"), Color::White);
    }

    #[test]
    fn compact_text_truncates_on_chars() {
        assert_eq!(compact_text("kube-system", 20), "kube-system");
        assert_eq!(compact_text("kube-system", 5), "kube…");
        assert_eq!(compact_text("kube-system", 11), "kube-system");
        assert_eq!(compact_text("ünïcödé", 3), "ün…");
    }

    #[test]
    fn cluster_host_drops_scheme_and_path() {
        assert_eq!(cluster_host("https://10.0.0.1:6443/"), "10.0.0.1:6443");
        assert_eq!(cluster_host("https://api.example.com/k8s/clusters/c-1"), "api.example.com");
        assert_eq!(cluster_host("127.0.0.1:6443"), "127.0.0.1:6443");
    }

    #[test]
    fn help_modal_is_centered() {
        let area = centered_rect(50, 50, Rect::new(0, 0, 100, 40));
        assert_eq!((area.x, area.y, area.width, area.height), (25, 10, 50, 20));
    }

    #[test]
    fn renders_type_list_and_help() {
        let state = SharedState::new(AppState::new(vec![node_kind(), pod_kind()]));
        let mut app = App::new(state, "kind-dev".to_string(), "https://127.0.0.1:6443".to_string());
        let mut terminal = Terminal::new(TestBackend::new(100, 20)).expect("terminal");

        terminal.draw(|frame| render(frame, &mut app)).expect("draw");
        let drawn = screen(&terminal);
        assert!(drawn.contains("Resources (GVRs) (2)"));
        assert!(drawn.contains("pods"));
        assert!(drawn.contains("kind-dev"));

        app.apply_action(Action::ToggleHelp);
        terminal.draw(|frame| render(frame, &mut app)).expect("draw");
        assert!(screen(&terminal).contains("traverse help"));
    }
}
