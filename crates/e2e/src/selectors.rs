//! Locators for the notes application's tree, creation surfaces and editor
//!
//! Every locator is a Playwright selector string. Item-scoped locators are
//! built from the exact label so that two items never share a locator.

use serde::{Deserialize, Serialize};

use crate::model::ResourceKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    /// Container of the whole tree view
    pub tree_root: String,
    /// Label element of every tree item
    pub tree_item_label: String,
    /// Tree item row (wraps the label and the per-item menu trigger)
    pub tree_item: String,
    /// Per-item "add child" menu trigger, relative to `tree_item`
    pub item_menu_trigger: String,
    /// Root-level "add" button
    pub root_add: String,
    /// The creation menu once opened
    pub create_menu: String,
    pub create_folder: String,
    pub create_note: String,
    pub create_task: String,
    pub dialog: String,
    pub name_input: String,
    pub submit: String,
    pub cancel: String,
    pub validation_error: String,
    /// Toast the application raises when a backend call fails
    pub error_toast: String,
    pub editor_body: String,
    /// Neutral area used to dismiss menus by clicking outside them
    pub outside: String,
    /// Attribute on the label element carrying the application-side id
    pub item_id_attribute: String,
    /// Attribute on the label element naming the item kind
    pub item_kind_attribute: String,
    /// Attribute on the label element carrying the parent's id
    pub item_parent_attribute: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            tree_root: r#"[data-testid="tree-root"]"#.to_string(),
            tree_item_label: r#"[data-testid="tree-item-label"]"#.to_string(),
            tree_item: r#"[data-testid="tree-item"]"#.to_string(),
            item_menu_trigger: r#"[data-testid="tree-item-add"]"#.to_string(),
            root_add: r#"[data-testid="tree-root-add"]"#.to_string(),
            create_menu: r#"[data-testid="create-menu"]"#.to_string(),
            create_folder: r#"[data-testid="create-folder"]"#.to_string(),
            create_note: r#"[data-testid="create-note"]"#.to_string(),
            create_task: r#"[data-testid="create-task"]"#.to_string(),
            dialog: r#"[data-testid="create-dialog"]"#.to_string(),
            name_input: r#"[data-testid="create-dialog-name"]"#.to_string(),
            submit: r#"[data-testid="create-dialog-submit"]"#.to_string(),
            cancel: r#"[data-testid="create-dialog-cancel"]"#.to_string(),
            validation_error: r#"[data-testid="create-dialog-error"]"#.to_string(),
            error_toast: r#"[data-testid="error-toast"]"#.to_string(),
            editor_body: r#"[data-testid="note-editor-body"]"#.to_string(),
            outside: r#"[data-testid="app-header"]"#.to_string(),
            item_id_attribute: "data-item-id".to_string(),
            item_kind_attribute: "data-item-kind".to_string(),
            item_parent_attribute: "data-parent-id".to_string(),
        }
    }
}

impl Selectors {
    /// Label element whose text is exactly `label`.
    pub fn item_label(&self, label: &str) -> String {
        format!(r#"{}:text-is("{}")"#, self.tree_item_label, escape(label))
    }

    /// Menu trigger inside the row of the item labelled `label`.
    pub fn item_menu(&self, label: &str) -> String {
        format!("{}:has({}) {}", self.tree_item, self.item_label(label), self.item_menu_trigger)
    }

    pub fn create_action(&self, kind: ResourceKind) -> &str {
        match kind {
            ResourceKind::Folder => &self.create_folder,
            ResourceKind::Note => &self.create_note,
            ResourceKind::Task => &self.create_task,
        }
    }
}

fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}
