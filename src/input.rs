use crate::app::InputMode;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Quit,
    Select,
    Back,
    Down,
    Up,
    PageDown,
    PageUp,
    Top,
    Bottom,
    ToggleHelp,
    StartFilter,
    SaveLogs,
    SubmitInput,
    CancelInput,
    Backspace,
    InputChar(char),
}

pub fn map_key(mode: InputMode, key: KeyEvent) -> Option<Action> {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Some(Action::Quit);
    }

    match mode {
        InputMode::Normal => map_normal_mode_key(key),
        InputMode::Filter => map_filter_mode_key(key),
    }
}

fn map_normal_mode_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(Action::PageDown)
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Action::PageUp),
        KeyCode::Char('m') | KeyCode::Char('j')
            if key.modifiers.contains(KeyModifiers::CONTROL) =>
        {
            Some(Action::Select)
        }
        _ if key.modifiers.contains(KeyModifiers::CONTROL) => None,
        KeyCode::Char('q') => Some(Action::Quit),
        KeyCode::Enter | KeyCode::Char('l') | KeyCode::Right => Some(Action::Select),
        KeyCode::Esc | KeyCode::Char('h') | KeyCode::Left | KeyCode::Backspace => {
            Some(Action::Back)
        }
        KeyCode::Char('j') | KeyCode::Down => Some(Action::Down),
        KeyCode::Char('k') | KeyCode::Up => Some(Action::Up),
        KeyCode::PageDown => Some(Action::PageDown),
        KeyCode::PageUp => Some(Action::PageUp),
        KeyCode::Char('g') | KeyCode::Home => Some(Action::Top),
        KeyCode::Char('G') | KeyCode::End => Some(Action::Bottom),
        KeyCode::Char('?') => Some(Action::ToggleHelp),
        KeyCode::Char('/') => Some(Action::StartFilter),
        KeyCode::Char('s') => Some(Action::SaveLogs),
        _ => None,
    }
}

fn map_filter_mode_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Esc => Some(Action::CancelInput),
        KeyCode::Enter => Some(Action::SubmitInput),
        KeyCode::Char('m') | KeyCode::Char('j')
            if key.modifiers.contains(KeyModifiers::CONTROL) =>
        {
            Some(Action::SubmitInput)
        }
        KeyCode::Backspace => Some(Action::Backspace),
        KeyCode::Down => Some(Action::Down),
        KeyCode::Up => Some(Action::Up),
        KeyCode::Char(c) if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT => {
            Some(Action::InputChar(c))
        }
        _ => None,
    }
}

/// Key reference shown by the help overlay.
pub const KEY_HELP: &[(&str, &str)] = &[
    ("enter / l", "select"),
    ("esc / h", "back"),
    ("j / k", "move down / up"),
    ("ctrl+d / ctrl+u", "page down / up"),
    ("g / G", "top / bottom"),
    ("/", "filter the list (enter applies, esc clears)"),
    ("s", "save logs to a file (containers, log view)"),
    ("?", "toggle help"),
    ("q / ctrl+c", "quit"),
];

#[cfg(test)]
mod tests {
    use super::{Action, map_key};
    use crate::app::InputMode;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    #[test]
    fn normal_mode_maps_quit() {
        assert_eq!(
            map_key(InputMode::Normal, key(KeyCode::Char('q'))),
            Some(Action::Quit)
        );
        assert_eq!(map_key(InputMode::Normal, ctrl('c')), Some(Action::Quit));
    }

    #[test]
    fn select_and_back_have_vim_and_arrow_keys() {
        for code in [KeyCode::Enter, KeyCode::Char('l'), KeyCode::Right] {
            assert_eq!(map_key(InputMode::Normal, key(code)), Some(Action::Select));
        }
        for code in [KeyCode::Esc, KeyCode::Char('h'), KeyCode::Left] {
            assert_eq!(map_key(InputMode::Normal, key(code)), Some(Action::Back));
        }
    }

    #[test]
    fn ctrl_d_pages_instead_of_plain_d() {
        assert_eq!(map_key(InputMode::Normal, ctrl('d')), Some(Action::PageDown));
        assert_eq!(map_key(InputMode::Normal, ctrl('u')), Some(Action::PageUp));
        assert_eq!(map_key(InputMode::Normal, ctrl('s')), None);
    }

    #[test]
    fn filter_mode_captures_letters() {
        assert_eq!(
            map_key(InputMode::Filter, key(KeyCode::Char('q'))),
            Some(Action::InputChar('q'))
        );
        assert_eq!(
            map_key(InputMode::Filter, key(KeyCode::Esc)),
            Some(Action::CancelInput)
        );
        assert_eq!(
            map_key(InputMode::Filter, key(KeyCode::Enter)),
            Some(Action::SubmitInput)
        );
    }

    #[test]
    fn filter_mode_still_quits_on_ctrl_c() {
        assert_eq!(map_key(InputMode::Filter, ctrl('c')), Some(Action::Quit));
    }

    #[test]
    fn save_key_maps_in_normal_mode() {
        assert_eq!(
            map_key(InputMode::Normal, key(KeyCode::Char('s'))),
            Some(Action::SaveLogs)
        );
    }
}
