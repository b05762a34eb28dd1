//! Resource model shared by the provisioning engine, the fixture runner and cleanup

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kind of item in the application's content tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Folder,
    Note,
    Task,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Folder => "folder",
            ResourceKind::Note => "note",
            ResourceKind::Task => "task",
        }
    }

    /// Leaf kinds can only be created inside a folder.
    pub fn requires_container(&self) -> bool {
        !matches!(self, ResourceKind::Folder)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provisioning request. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub kind: ResourceKind,
    pub requested_name: String,
    /// Resolved label of an existing folder
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl ResourceSpec {
    pub fn folder(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Folder, name)
    }

    pub fn note(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Note, name)
    }

    pub fn task(name: impl Into<String>) -> Self {
        Self::new(ResourceKind::Task, name)
    }

    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            requested_name: name.into(),
            parent: None,
            content: None,
        }
    }

    pub fn under(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

/// An item as rendered by the application under test. Read-only from the engine's side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeItem {
    pub id: String,
    pub label: String,
    pub kind: ResourceKind,
    #[serde(default)]
    pub children: Vec<TreeItem>,
    #[serde(default)]
    pub content: Option<String>,
}

impl TreeItem {
    /// Depth-first search by exact label.
    pub fn find(&self, label: &str) -> Option<&TreeItem> {
        if self.label == label {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(label))
    }

    /// Indented outline, one label per line.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        self.write_outline(0, &mut out);
        out
    }

    fn write_outline(&self, depth: usize, out: &mut String) {
        out.push_str(&"  ".repeat(depth));
        out.push_str(&format!("[{}] {}\n", self.kind, self.label));
        for child in &self.children {
            child.write_outline(depth + 1, out);
        }
    }
}

/// A resource this engine created and confirmed as ready.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionedResourceRecord {
    pub id: Uuid,
    pub spec: ResourceSpec,
    pub resolved_name: String,
    /// Label of the containing folder, explicit or synthetic
    pub parent: Option<String>,
    pub parent_synthetic: bool,
    /// Application-side id read from the tree item, when exposed
    pub resource_id: Option<String>,
    /// Identity of the session that created the item
    pub owner: Option<String>,
    /// Item already existed and was adopted instead of created (idempotent mode)
    #[serde(default)]
    pub adopted: bool,
    pub created_at: DateTime<Utc>,
}

impl ProvisionedResourceRecord {
    pub fn kind(&self) -> ResourceKind {
        self.spec.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_kinds_require_container() {
        assert!(!ResourceKind::Folder.requires_container());
        assert!(ResourceKind::Note.requires_container());
        assert!(ResourceKind::Task.requires_container());
    }

    #[test]
    fn test_tree_item_find_and_outline() {
        let tree = TreeItem {
            id: "1".into(),
            label: "Projects".into(),
            kind: ResourceKind::Folder,
            children: vec![TreeItem {
                id: "2".into(),
                label: "Plan".into(),
                kind: ResourceKind::Note,
                children: vec![],
                content: Some("body".into()),
            }],
            content: None,
        };
        assert_eq!(tree.find("Plan").map(|i| i.id.as_str()), Some("2"));
        assert!(tree.find("Missing").is_none());
        assert_eq!(tree.outline(), "[folder] Projects\n  [note] Plan\n");
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let yaml = serde_yaml::to_string(&ResourceSpec::task("Ship")).unwrap();
        assert!(yaml.contains("kind: task"));
    }
}
