//! Output formatting for CLI commands.
//!
//! Every formatter returns a string: a table for people, pretty JSON for
//! scripts.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::catalog::Catalog;
use crate::config::ValidationResult;
use crate::planner::{ExecutionOutcome, ReconciliationAction, ReconciliationPlan};
use crate::reconciler::{DriftReport, ResolveOutcome};
use crate::report::{ConvergenceReport, RunStatus};
use crate::state::{LockInfo, TrackedMap, TrackedState};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    format: OutputFormat,
}

#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

#[derive(Tabled)]
struct CatalogRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Native ID")]
    native_id: String,
    #[tabled(rename = "Depends on")]
    depends_on: String,
}

#[derive(Tabled)]
struct TrackedRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Tracked ID")]
    native_id: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Returns true for JSON output.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    fn json<T: Serialize + ?Sized>(value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_default()
    }

    /// Formats a reconciliation plan.
    #[must_use]
    pub fn format_plan(&self, plan: &ReconciliationPlan) -> String {
        if self.is_json() {
            return Self::json(plan);
        }

        let mut output = String::new();
        let _ = writeln!(output, "\nReconciliation Plan");
        let _ = writeln!(output, "   Catalog hash: {}\n", short(&plan.catalog_hash));

        let rows: Vec<PlanRow> = plan
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| PlanRow {
                index: i + 1,
                action: Self::format_action(&e.action),
                resource: e.logical_name.clone(),
                address: e.address.clone(),
                detail: Self::truncate(&Self::action_detail(&e.action), 60),
            })
            .collect();
        if !rows.is_empty() {
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        let _ = write!(
            output,
            "\nPlan: {} to import, {} to create (engine apply), {} conflicts, {} probe failures\n",
            plan.import_count().to_string().green(),
            plan.create_count().to_string().cyan(),
            plan.conflict_count().to_string().yellow(),
            plan.probe_failure_count().to_string().red()
        );
        output
    }

    /// Formats a convergence report.
    #[must_use]
    pub fn format_report(&self, report: &ConvergenceReport) -> String {
        if self.is_json() {
            return Self::json(report);
        }

        let mut output = match report.status {
            RunStatus::Converged => format!("{} Converged\n\n", "✓".green()),
            RunStatus::NeedsAttention => format!("{} Needs attention\n\n", "⚠".yellow()),
        };

        let rows: Vec<ResultRow> = report
            .results
            .iter()
            .map(|r| ResultRow {
                resource: r.logical_name.clone(),
                outcome: Self::format_outcome(&r.outcome),
                detail: Self::truncate(r.outcome.detail().unwrap_or(""), 60),
            })
            .collect();
        if !rows.is_empty() {
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        let _ = writeln!(
            output,
            "\n   Applied: {}  Skipped: {}  Deferred: {}",
            report.applied, report.skipped, report.deferred
        );
        if report.cancelled > 0 {
            let _ = writeln!(
                output,
                "   {} Interrupted: {} entries not attempted; run again to finish",
                "✗".red(),
                report.cancelled
            );
        }
        if let Some(outcome) = &report.engine_apply {
            let _ = writeln!(output, "   Engine apply: {}", Self::format_outcome(outcome));
        }

        if !report.conflicts.is_empty() {
            let _ = writeln!(output, "\n{} Conflicts (run `converge resolve <name>`):", "⚠".yellow());
            for c in &report.conflicts {
                let _ = writeln!(output, "   - {} ({}): {}", c.logical_name, c.address, c.reason);
            }
        }
        if !report.failures.is_empty() {
            let _ = writeln!(output, "\n{} Failures:", "✗".red());
            for c in &report.failures {
                let _ = writeln!(output, "   - {} ({}): {}", c.logical_name, c.address, c.reason);
            }
        }
        output
    }

    /// Formats a drift report.
    #[must_use]
    pub fn format_drift(&self, report: &DriftReport) -> String {
        if self.is_json() {
            return Self::json(report);
        }
        if report.is_converged() {
            return format!("{} No drift detected - state is converged.\n", "✓".green());
        }

        let mut output = format!("{} Drift detected:\n\n", "⚠".yellow());
        for entry in &report.drifted {
            let _ = writeln!(
                output,
                "   {} {} - {}",
                Self::format_action(&entry.action),
                entry.logical_name,
                Self::action_detail(&entry.action)
            );
        }
        for address in &report.unclaimed {
            let _ = writeln!(output, "   {} {address} - tracked but not in catalog", "?".dimmed());
        }
        let _ = write!(
            output,
            "\n{}/{} resources out of sync.\n",
            report.drifted.len(),
            report.total_resources
        );
        output
    }

    /// Formats the catalog in the given order.
    #[must_use]
    pub fn format_catalog(&self, catalog: &Catalog, reverse: bool) -> String {
        let descriptors: Vec<_> = if reverse {
            catalog.destroy_order().collect()
        } else {
            catalog.all_descriptors().iter().collect()
        };

        if self.is_json() {
            #[derive(Serialize)]
            struct Entry<'a> {
                name: &'a str,
                kind: &'a str,
                address: &'a str,
                native_id: &'a str,
                depends_on: &'a [String],
            }
            let entries: Vec<Entry<'_>> = descriptors
                .iter()
                .map(|d| Entry {
                    name: &d.logical_name,
                    kind: d.kind.as_str(),
                    address: &d.address,
                    native_id: catalog.resolved_id(&d.logical_name).unwrap_or_default(),
                    depends_on: &d.depends_on,
                })
                .collect();
            return Self::json(&entries);
        }

        let rows: Vec<CatalogRow> = descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| CatalogRow {
                index: i + 1,
                name: d.logical_name.clone(),
                kind: d.kind.to_string(),
                address: d.address.clone(),
                native_id: Self::truncate(catalog.resolved_id(&d.logical_name).unwrap_or_default(), 50),
                depends_on: d.depends_on.join(", "),
            })
            .collect();
        format!("{}\n", Table::new(rows))
    }

    /// Formats tracked state for catalog resources.
    #[must_use]
    pub fn format_tracked(&self, state: &TrackedState, tracked: &TrackedMap, catalog: &Catalog) -> String {
        if self.is_json() {
            return Self::json(tracked);
        }

        let mut output = String::new();
        let _ = writeln!(
            output,
            "\nTracked state (serial {}, terraform {})\n",
            state.serial.map_or_else(|| String::from("-"), |s| s.to_string()),
            state.terraform_version.as_deref().unwrap_or("-")
        );

        let rows: Vec<TrackedRow> = catalog
            .all_descriptors()
            .iter()
            .map(|d| TrackedRow {
                resource: d.logical_name.clone(),
                address: d.address.clone(),
                native_id: tracked.get(&d.logical_name).map_or_else(
                    || "untracked".dimmed().to_string(),
                    |t| Self::truncate(&t.native_id, 50),
                ),
            })
            .collect();
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        let unclaimed = state.unclaimed(catalog);
        if !unclaimed.is_empty() {
            let _ = writeln!(output, "\n   Not in catalog: {}", unclaimed.join(", "));
        }
        output
    }

    /// Formats every tracked address.
    #[must_use]
    pub fn format_addresses(&self, state: &TrackedState) -> String {
        let addresses: Vec<&str> = state.addresses().collect();
        if self.is_json() {
            return Self::json(&addresses);
        }
        if addresses.is_empty() {
            return String::from("No tracked resources.\n");
        }
        let mut output = String::new();
        for address in addresses {
            let _ = writeln!(output, "{address}");
        }
        output
    }

    /// Formats run lock information.
    #[must_use]
    pub fn format_lock(&self, lock: &LockInfo) -> String {
        if self.is_json() {
            return Self::json(lock);
        }
        format!(
            "Run lock {} held by {} since {} (expires in {}s)\n",
            lock.lock_id,
            lock.holder,
            lock.acquired_at.format("%Y-%m-%d %H:%M:%S"),
            lock.remaining_secs()
        )
    }

    /// Formats validation results.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        if self.is_json() {
            return Self::json(result);
        }

        let mut output = if result.is_valid() {
            format!("{} Configuration is valid.\n", "✓".green())
        } else {
            let mut o = format!("{} Configuration has {} errors:\n", "✗".red(), result.error_count());
            for e in &result.errors {
                let _ = writeln!(o, "   - {}: {}", e.field, e.message);
            }
            o
        };

        if (show_warnings || !result.is_valid()) && !result.warnings.is_empty() {
            let _ = writeln!(output, "\n{} Warnings:", "⚠".yellow());
            for w in &result.warnings {
                let _ = writeln!(output, "   - {w}");
            }
        }
        output
    }

    /// Formats the outcome of a conflict resolution.
    #[must_use]
    pub fn format_resolve(&self, outcome: &ResolveOutcome) -> String {
        if self.is_json() {
            return Self::json(outcome);
        }
        match outcome {
            ResolveOutcome::Removed { address } => {
                format!("{} Removed {address} from tracked state.\n", "✓".green())
            }
            ResolveOutcome::Reimported { address, native_id } => {
                format!("{} Re-imported {native_id} into {address}.\n", "✓".green())
            }
            ResolveOutcome::NothingToResolve { action } => {
                format!("Nothing to resolve: {action}\n")
            }
        }
    }

    fn format_action(action: &ReconciliationAction) -> String {
        match action {
            ReconciliationAction::NoOp { .. } => "noop".dimmed().to_string(),
            ReconciliationAction::Import { .. } => "<=import".green().to_string(),
            ReconciliationAction::Create { .. } => "+create".cyan().to_string(),
            ReconciliationAction::Conflict { .. } => "!conflict".yellow().to_string(),
            ReconciliationAction::ProbeFailed { .. } => "?probe-failed".red().to_string(),
        }
    }

    fn action_detail(action: &ReconciliationAction) -> String {
        match action {
            ReconciliationAction::NoOp { .. } => String::new(),
            ReconciliationAction::Import { native_id, .. } => native_id.clone(),
            ReconciliationAction::Create { .. } => String::from("left to engine apply"),
            ReconciliationAction::Conflict { reason, .. } => reason.to_string(),
            ReconciliationAction::ProbeFailed { error, .. } => error.clone(),
        }
    }

    fn format_outcome(outcome: &ExecutionOutcome) -> String {
        match outcome {
            ExecutionOutcome::Applied => "applied".green().to_string(),
            ExecutionOutcome::Skipped(_) => "skipped".dimmed().to_string(),
            ExecutionOutcome::Deferred => "deferred".cyan().to_string(),
            ExecutionOutcome::Conflict(_) => "conflict".yellow().to_string(),
            ExecutionOutcome::Failed(_) => "failed".red().to_string(),
            ExecutionOutcome::Cancelled => "cancelled".magenta().to_string(),
        }
    }

    /// Truncates a string to at most `max_len` characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }
}

fn short(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ResourceDescriptor, ResourceKind, TemplateParams};
    use crate::planner::{ActionResult, PlannedEntry};
    use chrono::Utc;

    fn plan() -> ReconciliationPlan {
        ReconciliationPlan {
            created_at: Utc::now(),
            catalog_hash: String::from("0123456789abcdef"),
            entries: vec![PlannedEntry {
                logical_name: String::from("network"),
                address: String::from("aws_vpc.main"),
                kind: ResourceKind::Network,
                action: ReconciliationAction::Import {
                    name: String::from("network"),
                    native_id: String::from("vpc-1"),
                },
            }],
        }
    }

    #[test]
    fn test_plan_text_mentions_resource() {
        colored::control::set_override(false);
        let text = OutputFormatter::new(OutputFormat::Text).format_plan(&plan());
        assert!(text.contains("aws_vpc.main"));
        assert!(text.contains("01234567"));
        assert!(text.contains("1 to import"));
    }

    #[test]
    fn test_plan_json() {
        let json = OutputFormatter::new(OutputFormat::Json).format_plan(&plan());
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["entries"][0]["action"]["action"], "import");
        assert_eq!(value["entries"][0]["action"]["native_id"], "vpc-1");
    }

    #[test]
    fn test_report_json_status() {
        let report = ConvergenceReport::from_results(vec![ActionResult {
            logical_name: String::from("vm"),
            address: String::from("aws_instance.vm"),
            action: ReconciliationAction::NoOp {
                name: String::from("vm"),
            },
            outcome: ExecutionOutcome::Failed(String::from("boom")),
        }]);
        let json = OutputFormatter::new(OutputFormat::Json).format_report(&report);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "needs_attention");
        assert_eq!(value["failures"][0]["reason"], "boom");
    }

    #[test]
    fn test_catalog_reverse_order() {
        let catalog = Catalog::new(
            vec![
                ResourceDescriptor::new("network", ResourceKind::Network, "{project}-vpc").unwrap(),
                ResourceDescriptor::new("subnet", ResourceKind::Subnet, "{project}-subnet")
                    .unwrap()
                    .depends_on("network"),
            ],
            TemplateParams::new("demo", "dev"),
        )
        .unwrap();
        let json = OutputFormatter::new(OutputFormat::Json).format_catalog(&catalog, true);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["name"], "subnet");
        assert_eq!(value[1]["native_id"], "demo-vpc");
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(OutputFormatter::truncate("abcdef", 10), "abcdef");
        assert_eq!(OutputFormatter::truncate("ééééééé", 5), "éé...");
    }
}
