use anyhow::{Context, Result, bail};
use console::style;
use std::path::PathBuf;

use super::flag_value;
use crate::core::callbacks::open_database;
use crate::core::config::AppConfig;
use crate::core::migrations::{DriftPolicy, FailurePolicy, MigrationReport, MigrationStatus};
use crate::core::terminal::{
    GuideSection, print_error, print_info, print_step, print_success, print_warn,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MigrateAction {
    Up,
    Status,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MigrateArgs {
    pub action: MigrateAction,
    pub dir: Option<PathBuf>,
    pub db: Option<PathBuf>,
    pub stop_on_failure: bool,
    pub fail_on_drift: bool,
}

pub(crate) fn parse_migrate_args(args: &[String]) -> Result<MigrateArgs> {
    let mut parsed = MigrateArgs {
        action: MigrateAction::Up,
        dir: None,
        db: None,
        stop_on_failure: false,
        fail_on_drift: false,
    };
    let mut i = 0;
    if let Some(first) = args.first() {
        match first.as_str() {
            "up" => i = 1,
            "status" => {
                parsed.action = MigrateAction::Status;
                i = 1;
            }
            _ => {}
        }
    }
    while i < args.len() {
        match args[i].as_str() {
            "--dir" | "-d" => {
                parsed.dir = Some(PathBuf::from(flag_value(args, i)?));
                i += 2;
            }
            "--db" => {
                parsed.db = Some(PathBuf::from(flag_value(args, i)?));
                i += 2;
            }
            "--stop-on-failure" => {
                parsed.stop_on_failure = true;
                i += 1;
            }
            "--fail-on-drift" => {
                parsed.fail_on_drift = true;
                i += 1;
            }
            other => bail!("unexpected argument '{}' for migrate", other),
        }
    }
    Ok(parsed)
}

/// Flags win over file and environment values.
fn apply_overrides(config: &mut AppConfig, args: &MigrateArgs) {
    if let Some(dir) = &args.dir {
        config.migrations.dir = dir.clone();
    }
    if let Some(db) = &args.db {
        config.database.path = db.clone();
    }
    if args.stop_on_failure {
        config.migrations.on_failure = FailurePolicy::Stop;
    }
    if args.fail_on_drift {
        config.migrations.on_drift = DriftPolicy::Fail;
    }
}

pub fn run_migrate_command(mut config: AppConfig, args: &[String]) -> Result<()> {
    let parsed = parse_migrate_args(args)?;
    apply_overrides(&mut config, &parsed);

    let runner = config.migrations.runner();
    let mut conn = open_database(&config.database.path)?;

    match parsed.action {
        MigrateAction::Up => {
            print_step(&format!(
                "Applying migrations from {} to {}",
                runner.dir().display(),
                config.database.path.display()
            ));
            let report = runner.run(&mut conn).context("migration run aborted")?;
            print_report(&report);
            if !report.is_success() {
                bail!(
                    "{} migration(s) failed: {}",
                    report.failed.len(),
                    report.failed_files().join(", ")
                );
            }
        }
        MigrateAction::Status => {
            let status = runner.status(&conn).context("reading migration status")?;
            print_migration_status(&status);
        }
    }
    Ok(())
}

fn print_report(report: &MigrationReport) {
    for name in &report.drifted {
        print_warn(&format!("{} changed after it was applied", name));
    }
    for name in &report.applied {
        print_success(&format!("Applied {}", name));
    }
    for err in &report.failed {
        print_error(&err.to_string());
    }
    if report.applied.is_empty() && report.failed.is_empty() {
        print_info("Database is up to date.");
    } else {
        print_info(&format!(
            "{} applied, {} failed, {} already applied",
            report.applied.len(),
            report.failed.len(),
            report.skipped.len()
        ));
    }
}

fn print_migration_status(status: &MigrationStatus) {
    let mut section = GuideSection::new("Migrations")
        .status("Total", &status.total.to_string())
        .status("Executed", &status.executed.len().to_string())
        .status("Pending", &status.pending.len().to_string());

    if !status.executed.is_empty() {
        section = section.blank();
        for m in &status.executed {
            section = section.text(&format!(
                "{} {}  {}",
                style("✓").green(),
                m.filename,
                style(&m.executed_at).dim()
            ));
        }
    }
    if !status.pending.is_empty() {
        section = section.blank();
        for name in &status.pending {
            section = section.text(&format!("{} {}", style("•").yellow(), name));
        }
    }
    section.print();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bare_migrate_means_up() {
        let parsed = parse_migrate_args(&[]).unwrap();
        assert_eq!(parsed.action, MigrateAction::Up);
        assert!(!parsed.stop_on_failure);
    }

    #[test]
    fn reads_every_flag() {
        let parsed = parse_migrate_args(&argv(&[
            "up",
            "--dir",
            "db/migrations",
            "--db",
            "data/app.db",
            "--stop-on-failure",
            "--fail-on-drift",
        ]))
        .unwrap();
        assert_eq!(parsed.action, MigrateAction::Up);
        assert_eq!(parsed.dir, Some(PathBuf::from("db/migrations")));
        assert_eq!(parsed.db, Some(PathBuf::from("data/app.db")));
        assert!(parsed.stop_on_failure);
        assert!(parsed.fail_on_drift);
    }

    #[test]
    fn status_accepts_dir_and_db() {
        let parsed = parse_migrate_args(&argv(&["status", "--db", "x.db"])).unwrap();
        assert_eq!(parsed.action, MigrateAction::Status);
        assert_eq!(parsed.db, Some(PathBuf::from("x.db")));
    }

    #[test]
    fn unknown_argument_is_rejected() {
        assert!(parse_migrate_args(&argv(&["down"])).is_err());
        assert!(parse_migrate_args(&argv(&["up", "--force"])).is_err());
    }

    #[test]
    fn flags_override_config() {
        let mut config = AppConfig::default();
        let parsed = parse_migrate_args(&argv(&[
            "--dir",
            "other",
            "--stop-on-failure",
            "--fail-on-drift",
        ]))
        .unwrap();
        apply_overrides(&mut config, &parsed);
        assert_eq!(config.migrations.dir, PathBuf::from("other"));
        assert_eq!(config.database.path, PathBuf::from("airshorts.db"));
        assert_eq!(config.migrations.on_failure, FailurePolicy::Stop);
        assert_eq!(config.migrations.on_drift, DriftPolicy::Fail);
    }
}
