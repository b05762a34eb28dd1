//! Declarative YAML fixture plans
//!
//! A plan lists the folders, notes and tasks a suite needs. Parents are
//! referenced by the `key` of an earlier entry, since the label the
//! application ends up with is only known after provisioning.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{E2eError, E2eResult};
use crate::model::ResourceKind;

/// A complete fixture plan parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixturePlan {
    /// Unique name for this plan
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering plans
    #[serde(default)]
    pub tags: Vec<String>,

    /// Resources to provision, in order
    pub resources: Vec<FixtureResource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureResource {
    /// Reference used by later entries; defaults to the name
    #[serde(default)]
    pub key: Option<String>,

    pub kind: ResourceKind,

    pub name: String,

    /// Key of an earlier folder entry
    #[serde(default)]
    pub parent: Option<String>,

    /// Note body
    #[serde(default)]
    pub content: Option<String>,
}

impl FixtureResource {
    pub fn key(&self) -> &str {
        self.key.as_deref().unwrap_or(&self.name)
    }
}

impl FixturePlan {
    /// Parse and validate a plan from a YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let plan: Self = serde_yaml::from_str(yaml)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Parse a plan from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::PlanParse(format!("{}: {}", path.display(), e)))
    }

    /// Load a single plan file, or every plan under a directory
    pub fn load_all(path: &Path) -> E2eResult<Vec<Self>> {
        if path.is_file() {
            return Ok(vec![Self::from_file(path)?]);
        }

        let mut plans = Vec::new();
        let mut entries: Vec<_> = walkdir::WalkDir::new(path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .collect();
        entries.sort_by(|a, b| a.path().cmp(b.path()));

        for entry in entries {
            plans.push(Self::from_file(entry.path())?);
        }
        Ok(plans)
    }

    /// Filter plans by tag
    pub fn filter_by_tag<'a>(plans: &'a [Self], tag: &str) -> Vec<&'a Self> {
        plans.iter().filter(|p| p.tags.iter().any(|t| t == tag)).collect()
    }

    /// Keys are unique; parents name an earlier folder; content only on notes.
    pub fn validate(&self) -> E2eResult<()> {
        let mut kinds: HashMap<&str, ResourceKind> = HashMap::new();

        for resource in &self.resources {
            let key = resource.key();
            if resource.name.trim().is_empty() {
                return Err(E2eError::PlanParse(format!("'{}': empty resource name", self.name)));
            }
            if let Some(parent) = &resource.parent {
                match kinds.get(parent.as_str()) {
                    Some(ResourceKind::Folder) => {}
                    Some(kind) => {
                        return Err(E2eError::PlanParse(format!(
                            "'{}': parent '{}' of '{}' is a {}, not a folder",
                            self.name, parent, key, kind
                        )))
                    }
                    None => {
                        return Err(E2eError::PlanParse(format!(
                            "'{}': parent '{}' of '{}' is not defined earlier",
                            self.name, parent, key
                        )))
                    }
                }
            }
            if resource.content.is_some() && resource.kind != ResourceKind::Note {
                return Err(E2eError::PlanParse(format!(
                    "'{}': only notes take content ('{}' is a {})",
                    self.name, key, resource.kind
                )));
            }
            if kinds.insert(key, resource.kind).is_some() {
                return Err(E2eError::PlanParse(format!(
                    "'{}': duplicate key '{}'",
                    self.name, key
                )));

            }
        }
        Ok(())
    }
}
