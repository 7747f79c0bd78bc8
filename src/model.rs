use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

/// Literal list entry standing for "every namespace".
pub const ALL_NAMESPACES: &str = "all";
pub const SPEC_ACTION: &str = "spec";
pub const LOG_ACTION: &str = "log";

#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct GroupVersionResource {
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl GroupVersionResource {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            resource: resource.into(),
        }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl Display for GroupVersionResource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.resource)
    }
}

/// A discovered resource type. Built once at startup and read-only afterwards.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ResourceKind {
    pub name: String,
    pub kind: String,
    pub namespaced: bool,
    pub watchable: bool,
    pub gvr: GroupVersionResource,
    /// Ordered actions offered for an instance; "spec" always comes first.
    pub actions: Vec<String>,
}

impl ResourceKind {
    pub fn namespaces() -> Self {
        Self {
            name: "namespaces".to_string(),
            kind: "Namespace".to_string(),
            namespaced: false,
            watchable: true,
            gvr: GroupVersionResource::new("", "v1", "namespaces"),
            actions: vec![SPEC_ACTION.to_string()],
        }
    }

    pub fn push_action(&mut self, action: &str) {
        if !self.actions.iter().any(|existing| existing == action) {
            self.actions.push(action.to_string());
        }
    }
}

/// Opaque cluster object. Snapshots replace these wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterObject {
    pub name: String,
    pub namespace: Option<String>,
    pub body: Value,
}

impl ClusterObject {
    pub fn new(name: impl Into<String>, namespace: Option<&str>, body: Value) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.map(str::to_string),
            body,
        }
    }

    pub fn from_body(body: Value) -> Option<Self> {
        let metadata = body.get("metadata")?;
        let name = metadata.get("name")?.as_str()?.to_string();
        let namespace = metadata
            .get("namespace")
            .and_then(Value::as_str)
            .filter(|namespace| !namespace.is_empty())
            .map(str::to_string);
        Some(Self::new(name, namespace.as_deref(), body))
    }

    pub fn same_identity(&self, other: &ClusterObject) -> bool {
        self.name == other.name && self.namespace == other.namespace
    }

    /// An empty scope matches every object.
    pub fn in_namespace(&self, namespace: &str) -> bool {
        namespace.is_empty() || self.namespace.as_deref() == Some(namespace)
    }

    pub fn qualified_name(&self) -> String {
        match &self.namespace {
            Some(namespace) => format!("{namespace}/{}", self.name),
            None => self.name.clone(),
        }
    }

    pub fn container_names(&self) -> Vec<String> {
        ["containers", "initContainers"]
            .iter()
            .filter_map(|field| self.body.pointer(&format!("/spec/{field}")))
            .filter_map(Value::as_array)
            .flatten()
            .filter_map(|container| container.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }

    pub fn to_yaml(&self) -> String {
        serde_yaml::to_string(&self.body)
            .unwrap_or_else(|error| format!("Error marshaling spec: {error}"))
    }
}

pub fn compare_objects(left: &ClusterObject, right: &ClusterObject) -> Ordering {
    left.name
        .cmp(&right.name)
        .then_with(|| left.namespace.cmp(&right.namespace))
}

pub fn sort_objects(objects: &mut [ClusterObject]) {
    objects.sort_by(compare_objects);
}

/// Maps the "all" list entry to the unscoped namespace value.
pub fn namespace_scope(choice: &str) -> String {
    if choice == ALL_NAMESPACES {
        String::new()
    } else {
        choice.to_string()
    }
}

pub fn namespace_label(namespace: &str) -> &str {
    if namespace.is_empty() {
        ALL_NAMESPACES
    } else {
        namespace
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ListItem {
    pub label: String,
    pub detail: Option<String>,
}

impl ListItem {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            detail: None,
        }
    }

    pub fn with_detail(label: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            label: label.into(),
            detail,
        }
    }

    pub fn matches_filter(&self, query: &str) -> bool {
        let query = query.trim();
        if query.is_empty() {
            return true;
        }

        let query_lower = query.to_ascii_lowercase();
        if self.label.to_ascii_lowercase().contains(&query_lower) {
            return true;
        }

        self.detail
            .as_ref()
            .is_some_and(|detail| detail.to_ascii_lowercase().contains(&query_lower))
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Notification {
    pub id: u64,
    pub text: String,
}
