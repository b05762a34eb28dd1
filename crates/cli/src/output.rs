//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

use notes_e2e::cleanup::CleanupReport;
use notes_e2e::runner::PlanResult;
use notes_e2e::ProvisionedResourceRecord;

/// Output format
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
}

/// Trait for items that can be displayed in a table
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

impl TableDisplay for ProvisionedResourceRecord {
    fn headers() -> Vec<&'static str> {
        vec!["Kind", "Name", "Parent", "Resource ID", "Owner"]
    }

    fn row(&self) -> Vec<String> {
        let parent = match (&self.parent, self.parent_synthetic) {
            (Some(p), true) => format!("{} (synthetic)", p),
            (Some(p), false) => p.clone(),
            (None, _) => "-".to_string(),
        };
        vec![
            self.kind().to_string(),
            self.resolved_name.clone(),
            parent,
            self.resource_id.clone().unwrap_or_else(|| "-".to_string()),
            self.owner.clone().unwrap_or_else(|| "-".to_string()),
        ]
    }
}

impl TableDisplay for PlanResult {
    fn headers() -> Vec<&'static str> {
        vec!["Plan", "Status", "Resources", "Duration", "Error"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            if self.success { "passed" } else { "failed" }.to_string(),
            self.resources.len().to_string(),
            format!("{} ms", self.duration_ms),
            self.error.clone().unwrap_or_default(),
        ]
    }
}

impl TableDisplay for CleanupReport {
    fn headers() -> Vec<&'static str> {
        vec!["Tier", "Deleted", "Failed", "Errors"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            format!("{:?}", self.tier),
            self.deleted.to_string(),
            self.failed.to_string(),
            self.errors.len().to_string(),
        ]
    }
}

fn table<T: TableDisplay>(items: &[&T]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(T::headers());
    for item in items {
        table.add_row(item.row());
    }
    table
}

fn serialized<T: Serialize + ?Sized>(value: &T, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(value).unwrap_or_default(),
        _ => serde_yaml::to_string(value).unwrap_or_default(),
    }
}

/// Print a single item
pub fn print_item<T: Serialize + TableDisplay>(item: &T, format: OutputFormat) {
    match format {
        OutputFormat::Table => println!("{}", table(&[item])),
        _ => println!("{}", serialized(item, format)),
    }
}

/// Print a list of items
pub fn print_list<T: Serialize + TableDisplay>(items: &[T], format: OutputFormat) {
    if items.is_empty() {
        println!("No items found.");
        return;
    }

    match format {
        OutputFormat::Table => {
            let refs: Vec<&T> = items.iter().collect();
            println!("{}", table(&refs));
        }
        _ => println!("{}", serialized(items, format)),
    }
}

/// Print success message
pub fn print_success(message: &str) {
    println!("{} {}", "✔".green(), message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✘".red(), message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "!".yellow(), message);
}
