use crate::model::{LOG_ACTION, SPEC_ACTION};
use crate::state::Selection;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum NavContext {
    TypeSelect,
    NamespaceSelect,
    ObjectSelect,
    ActionSelect,
    ContainerSelect,
    SpecView,
    LogView,
}

impl NavContext {
    pub fn label(self) -> &'static str {
        match self {
            Self::TypeSelect => "types",
            Self::NamespaceSelect => "namespaces",
            Self::ObjectSelect => "objects",
            Self::ActionSelect => "actions",
            Self::ContainerSelect => "containers",
            Self::SpecView => "spec",
            Self::LogView => "logs",
        }
    }

    /// Contexts rendered as a scrollable viewport instead of a list.
    pub fn is_viewport(self) -> bool {
        match self {
            Self::SpecView | Self::LogView => true,
            Self::TypeSelect
            | Self::NamespaceSelect
            | Self::ObjectSelect
            | Self::ActionSelect
            | Self::ContainerSelect => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum NavEvent {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Transition {
    pub next: NavContext,
    pub transitioned: bool,
}

impl Transition {
    fn to(next: NavContext) -> Self {
        Self {
            next,
            transitioned: true,
        }
    }

    fn stay(current: NavContext) -> Self {
        Self {
            next: current,
            transitioned: false,
        }
    }
}

type Handler = fn(&Selection) -> Transition;

fn handler(context: NavContext, event: NavEvent) -> Handler {
    use NavContext::*;
    use NavEvent::*;

    match (context, event) {
        (TypeSelect, Forward) => type_forward,
        (TypeSelect, Backward) => |_| Transition::stay(TypeSelect),
        (NamespaceSelect, Forward) => |_| Transition::to(ObjectSelect),
        (NamespaceSelect, Backward) => |_| Transition::to(TypeSelect),
        (ObjectSelect, Forward) => |_| Transition::to(ActionSelect),
        (ObjectSelect, Backward) => object_backward,
        (ActionSelect, Forward) => action_forward,
        (ActionSelect, Backward) => |_| Transition::to(ObjectSelect),
        (ContainerSelect, Forward) => |_| Transition::to(LogView),
        (ContainerSelect, Backward) => |_| Transition::to(ActionSelect),
        (SpecView, Forward) => |_| Transition::stay(SpecView),
        (SpecView, Backward) => |_| Transition::to(ActionSelect),
        (LogView, Forward) => |_| Transition::stay(LogView),
        (LogView, Backward) => |_| Transition::to(ContainerSelect),
    }
}

fn type_forward(selection: &Selection) -> Transition {
    if selection.kind_is_namespaced() {
        Transition::to(NavContext::NamespaceSelect)
    } else {
        Transition::to(NavContext::ObjectSelect)
    }
}

fn object_backward(selection: &Selection) -> Transition {
    if selection.kind_is_namespaced() {
        Transition::to(NavContext::NamespaceSelect)
    } else {
        Transition::to(NavContext::TypeSelect)
    }
}

fn action_forward(selection: &Selection) -> Transition {
    match selection.action.as_str() {
        SPEC_ACTION => Transition::to(NavContext::SpecView),
        LOG_ACTION => Transition::to(NavContext::ContainerSelect),
        _ => Transition::stay(NavContext::ActionSelect),
    }
}

/// Navigation state machine. Guards read the selection but never mutate it;
/// callers perform side effects around `dispatch`.
#[derive(Debug, Clone)]
pub struct NavMachine {
    current: NavContext,
}

impl Default for NavMachine {
    fn default() -> Self {
        Self::new(NavContext::TypeSelect)
    }
}

impl NavMachine {
    pub fn new(initial: NavContext) -> Self {
        Self { current: initial }
    }

    pub fn current(&self) -> NavContext {
        self.current
    }

    pub fn peek(&self, event: NavEvent, selection: &Selection) -> Transition {
        handler(self.current, event)(selection)
    }

    pub fn dispatch(&mut self, event: NavEvent, selection: &Selection) -> Transition {
        let transition = self.peek(event, selection);
        if transition.transitioned {
            self.current = transition.next;
        }
        transition
    }
}

#[cfg(test)]
mod tests {
    use super::{NavContext, NavEvent, NavMachine};
    use crate::model::{GroupVersionResource, ResourceKind};
    use crate::state::Selection;

    fn kind(namespaced: bool) -> ResourceKind {
        ResourceKind {
            name: if namespaced { "pods" } else { "nodes" }.to_string(),
            kind: if namespaced { "Pod" } else { "Node" }.to_string(),
            namespaced,
            watchable: true,
            gvr: GroupVersionResource::new("", "v1", if namespaced { "pods" } else { "nodes" }),
            actions: vec!["spec".to_string(), "log".to_string()],
        }
    }

    fn selections() -> Vec<Selection> {
        let mut out = Vec::new();
        for namespaced in [true, false] {
            for action in ["spec", "log", "status", ""] {
                out.push(Selection {
                    kind: Some(kind(namespaced)),
                    action: action.to_string(),
                    ..Selection::default()
                });
            }
        }
        out
    }

    #[test]
    fn starts_at_type_select() {
        let machine = NavMachine::default();
        assert_eq!(machine.current(), NavContext::TypeSelect);
    }

    #[test]
    fn type_select_forward_depends_on_namespaced_kind() {
        let mut machine = NavMachine::default();
        let namespaced = Selection {
            kind: Some(kind(true)),
            ..Selection::default()
        };
        assert_eq!(
            machine.dispatch(NavEvent::Forward, &namespaced).next,
            NavContext::NamespaceSelect
        );

        let mut machine = NavMachine::default();
        let cluster = Selection {
            kind: Some(kind(false)),
            ..Selection::default()
        };
        assert_eq!(
            machine.dispatch(NavEvent::Forward, &cluster).next,
            NavContext::ObjectSelect
        );
    }

    #[test]
    fn unrecognized_action_does_not_transition() {
        let mut machine = NavMachine::new(NavContext::ActionSelect);
        let selection = Selection {
            kind: Some(kind(true)),
            action: "exec".to_string(),
            ..Selection::default()
        };
        let transition = machine.dispatch(NavEvent::Forward, &selection);
        assert!(!transition.transitioned);
        assert_eq!(machine.current(), NavContext::ActionSelect);
    }

    #[test]
    fn backward_after_forward_returns_to_prior_context() {
        let round_trip = [
            NavContext::TypeSelect,
            NavContext::NamespaceSelect,
            NavContext::ObjectSelect,
            NavContext::ActionSelect,
            NavContext::ContainerSelect,
        ];
        for selection in selections() {
            for start in round_trip {
                if start == NavContext::NamespaceSelect && !selection.kind_is_namespaced() {
                    continue;
                }
                let mut machine = NavMachine::new(start);
                let forward = machine.dispatch(NavEvent::Forward, &selection);
                if !forward.transitioned {
                    assert_eq!(machine.current(), start);
                    continue;
                }
                machine.dispatch(NavEvent::Backward, &selection);
                assert_eq!(
                    machine.current(),
                    start,
                    "round trip from {start:?} with {selection:?}"
                );
            }
        }
    }

    #[test]
    fn leaf_views_ignore_forward() {
        for selection in selections() {
            for leaf in [NavContext::SpecView, NavContext::LogView] {
                let mut machine = NavMachine::new(leaf);
                for _ in 0..3 {
                    let transition = machine.dispatch(NavEvent::Forward, &selection);
                    assert!(!transition.transitioned);
                    assert_eq!(machine.current(), leaf);
                }
            }
        }
    }

    #[test]
    fn backward_graph_is_fixed() {
        let namespaced = Selection {
            kind: Some(kind(true)),
            ..Selection::default()
        };
        let cluster = Selection {
            kind: Some(kind(false)),
            ..Selection::default()
        };
        let cases = [
            (NavContext::TypeSelect, &namespaced, NavContext::TypeSelect, false),
            (NavContext::NamespaceSelect, &namespaced, NavContext::TypeSelect, true),
            (NavContext::ObjectSelect, &namespaced, NavContext::NamespaceSelect, true),
            (NavContext::ObjectSelect, &cluster, NavContext::TypeSelect, true),
            (NavContext::ActionSelect, &cluster, NavContext::ObjectSelect, true),
            (NavContext::ContainerSelect, &cluster, NavContext::ActionSelect, true),
            (NavContext::SpecView, &cluster, NavContext::ActionSelect, true),
            (NavContext::LogView, &cluster, NavContext::ContainerSelect, true),
        ];
        for (start, selection, expected, transitioned) in cases {
            let mut machine = NavMachine::new(start);
            let transition = machine.dispatch(NavEvent::Backward, selection);
            assert_eq!(transition.next, expected, "backward from {start:?}");
            assert_eq!(transition.transitioned, transitioned);
        }
    }

    #[test]
    fn every_context_has_a_label() {
        let contexts = [
            NavContext::TypeSelect,
            NavContext::NamespaceSelect,
            NavContext::ObjectSelect,
            NavContext::ActionSelect,
            NavContext::ContainerSelect,
            NavContext::SpecView,
            NavContext::LogView,
        ];
        for context in contexts {
            assert!(!context.label().is_empty());
        }
    }
}
