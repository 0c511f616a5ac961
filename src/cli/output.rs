//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying synthesis
//! and deployment information to the user in various formats.

use colored::Colorize;
use serde_json::json;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::cloud::ChangeSetPlan;
use crate::compose::ValidationResult;
use crate::synth::SynthContext;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Change-set row for table display.
#[derive(Tabled)]
struct ChangeRow {
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Type")]
    resource_type: String,
    #[tabled(rename = "Replacement")]
    replacement: String,
}

/// Family summary row for table display.
#[derive(Tabled)]
struct FamilyRow {
    #[tabled(rename = "Family")]
    family: String,
    #[tabled(rename = "Containers")]
    containers: String,
    #[tabled(rename = "Launch")]
    launch: String,
    #[tabled(rename = "Ports")]
    ports: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a validation result for display.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&json!({
                "valid": result.is_valid(),
                "errors": result.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "warnings": result.warnings,
            }))
            .unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();
                if result.is_valid() {
                    let _ = writeln!(output, "{} Compose document is valid.", "✓".green());
                } else {
                    let _ = writeln!(
                        output,
                        "{} Validation failed with {} errors.",
                        "✗".red(),
                        result.error_count()
                    );
                    for error in &result.errors {
                        let _ = writeln!(output, "  - {error}");
                    }
                }
                if show_warnings && result.warning_count() > 0 {
                    let _ = writeln!(output, "\nWarnings:");
                    for warning in &result.warnings {
                        let _ = writeln!(output, "  - {warning}");
                    }
                }
                output
            }
        }
    }

    /// Formats a synthesis summary for display.
    #[must_use]
    pub fn format_synthesis(&self, context: &SynthContext) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&json!({
                "families": context.families.len(),
                "resources": context.graph.len(),
                "bindings": context.bindings.len(),
            }))
            .unwrap_or_default(),
            OutputFormat::Text => {
                let rows: Vec<FamilyRow> = context
                    .families
                    .values()
                    .map(|family| FamilyRow {
                        family: family.name.clone(),
                        containers: family
                            .all_services()
                            .map(|svc| svc.name.clone())
                            .collect::<Vec<_>>()
                            .join(", "),
                        launch: family
                            .launch
                            .mode
                            .map_or_else(|| String::from("-"), |mode| format!("{mode:?}")),
                        ports: family
                            .networking
                            .ports
                            .iter()
                            .map(|port| format!("{}/{}", port.target, port.protocol.as_str()))
                            .collect::<Vec<_>>()
                            .join(", "),
                    })
                    .collect();

                let mut output = String::new();
                if !rows.is_empty() {
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }
                let _ = writeln!(
                    output,
                    "\nSynthesized {} resources across {} families.",
                    context.graph.len().to_string().green(),
                    context.families.len()
                );
                output
            }
        }
    }

    /// Formats a change-set plan for display.
    #[must_use]
    pub fn format_changes(&self, plan: &ChangeSetPlan) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&json!({
                "stack": plan.stack_name,
                "change_set": plan.change_set_name,
                "empty": plan.is_empty,
                "changes": plan.changes.iter().map(|change| json!({
                    "action": change.action,
                    "logical_id": change.logical_id,
                    "type": change.resource_type,
                    "replacement": change.replacement,
                })).collect::<Vec<_>>(),
            }))
            .unwrap_or_default(),
            OutputFormat::Text => Self::format_changes_text(plan),
        }
    }

    /// Formats a change-set plan as text.
    fn format_changes_text(plan: &ChangeSetPlan) -> String {
        if plan.is_empty {
            return format!(
                "{} No changes required - the stack is up to date.\n",
                "✓".green()
            );
        }

        let mut output = String::new();
        let _ = writeln!(
            output,
            "\nChange set {} on stack {}:\n",
            plan.change_set_name, plan.stack_name
        );

        let rows: Vec<ChangeRow> = plan
            .changes
            .iter()
            .map(|change| ChangeRow {
                action: Self::format_action(&change.action),
                resource: change.logical_id.clone(),
                resource_type: change.resource_type.clone(),
                replacement: change.replacement.clone().unwrap_or_default(),
            })
            .collect();
        if !rows.is_empty() {
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        let adds = plan.changes.iter().filter(|c| c.action == "Add").count();
        let modifies = plan.changes.iter().filter(|c| c.action == "Modify").count();
        let removes = plan.changes.iter().filter(|c| c.action == "Remove").count();
        let _ = writeln!(
            output,
            "\nPlan: {} to add, {} to change, {} to remove.",
            adds.to_string().green(),
            modifies.to_string().yellow(),
            removes.to_string().red()
        );
        output
    }

    /// Colors one change action.
    fn format_action(action: &str) -> String {
        match action {
            "Add" => action.green().to_string(),
            "Modify" => action.yellow().to_string(),
            "Remove" => action.red().to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::PlannedChange;

    fn plan() -> ChangeSetPlan {
        ChangeSetPlan {
            stack_name: String::from("app"),
            change_set_name: String::from("stacksmith-123"),
            changes: vec![PlannedChange {
                action: String::from("Add"),
                logical_id: String::from("WebService"),
                resource_type: String::from("AWS::ECS::Service"),
                replacement: None,
            }],
            is_empty: false,
        }
    }

    #[test]
    fn test_format_changes_text_contains_summary() {
        let formatter = OutputFormatter::new(OutputFormat::Text);
        let output = formatter.format_changes(&plan());
        assert!(output.contains("WebService"));
        assert!(output.contains("to add"));
    }

    #[test]
    fn test_format_changes_json_shape() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let output = formatter.format_changes(&plan());
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["stack"], "app");
        assert_eq!(value["changes"][0]["action"], "Add");
    }

    #[test]
    fn test_empty_plan_message() {
        let formatter = OutputFormatter::new(OutputFormat::Text);
        let empty = ChangeSetPlan {
            stack_name: String::from("app"),
            change_set_name: String::from("stacksmith-123"),
            changes: vec![],
            is_empty: true,
        };
        assert!(formatter.format_changes(&empty).contains("No changes required"));
    }
}
