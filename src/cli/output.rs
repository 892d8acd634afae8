//! Terminal rendering for CLI commands

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use serde::Serialize;

use crate::storage::MigrationInfo;
use crate::vault_audit::{CheckStatus, OverallStatus, VaultAuditReport};

/// Print data as pretty JSON
pub fn print_json<T: Serialize>(data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).context("Failed to serialize to JSON")?;
    println!("{}", json);
    Ok(())
}

/// Truncate string to maximum length with ellipsis
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

fn status_label(status: CheckStatus) -> String {
    match status {
        CheckStatus::Pass => format!("{}", "PASS".green()),
        CheckStatus::Warning => format!("{}", "WARN".yellow()),
        CheckStatus::Fail => format!("{}", "FAIL".red().bold()),
    }
}

fn overall_label(status: OverallStatus) -> String {
    match status {
        OverallStatus::Healthy => format!("{}", status.as_str().green().bold()),
        OverallStatus::Degraded => format!("{}", status.as_str().yellow().bold()),
        OverallStatus::Critical => format!("{}", status.as_str().red().bold()),
    }
}

/// Human-readable vault audit report
pub fn print_vault_report(report: &VaultAuditReport) {
    println!();
    println!(
        "Vault health: {}  ({})",
        overall_label(report.overall_status),
        report.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("{}", "-".repeat(90));

    for check in &report.checks {
        println!(
            "{}  {:<26} {}",
            status_label(check.status),
            check.component,
            truncate(&check.message, 56)
        );
    }

    if !report.recommendations.is_empty() {
        println!();
        println!("{}", "Recommendations:".bold());
        for recommendation in &report.recommendations {
            println!("  - {}", recommendation);
        }
    }
    println!();
}

pub fn print_migrations_table(migrations: &[MigrationInfo]) {
    println!();
    println!("{:<15} {:<50} {:<25} {:<10}", "Version", "Description", "Applied On", "Time (ms)");
    println!("{}", "-".repeat(100));

    for migration in migrations {
        println!(
            "{:<15} {:<50} {:<25} {:<10}",
            migration.version,
            truncate(&migration.description, 48),
            migration.installed_on.format("%Y-%m-%d %H:%M:%S"),
            migration.execution_time
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("credential_schema check output", 10), "credent...");
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate("ééééééééééé", 6), "ééé...");
    }
}
