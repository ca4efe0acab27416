mod migrate;
mod serve;
mod webhook;

use anyhow::{Context, Result, bail};
use console::style;
use std::path::PathBuf;

use crate::core::config::AppConfig;
use crate::core::terminal::{self, GuideSection, print_error};

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Migrations")
        .command("migrate [up]", "Apply pending SQL migrations")
        .command("migrate status", "Show executed and pending migrations")
        .text("Flags: --dir <path>  --db <path>  --stop-on-failure  --fail-on-drift")
        .print();

    GuideSection::new("Akool Webhooks")
        .command("webhook verify <file|->", "Verify and decrypt a callback envelope")
        .command("webhook seal --payload <json>", "Build a signed, encrypted envelope")
        .text("Flags: --nonce <n>  --timestamp <ms>")
        .print();

    GuideSection::new("Service")
        .command("serve", "Run migrations, then accept Akool callbacks")
        .text("Flags: --host <addr>  --port <port>")
        .print();

    GuideSection::new("Global")
        .command("--config <path>", "Config file (default: airshorts.toml)")
        .command("--verbose", "Debug logging")
        .print();

    println!(
        "\n {} {} <command> [subcommand]\n",
        style("Usage:").bold(),
        style("airshorts").green()
    );
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct GlobalArgs {
    pub config: Option<PathBuf>,
    pub verbose: bool,
    /// Everything else, program name removed.
    pub rest: Vec<String>,
}

/// Pull `--config` and `--verbose` out wherever they appear.
pub(crate) fn parse_global_flags(args: &[String]) -> Result<GlobalArgs> {
    let mut parsed = GlobalArgs::default();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                parsed.config = Some(PathBuf::from(flag_value(args, i)?));
                i += 2;
            }
            "--verbose" | "-v" => {
                parsed.verbose = true;
                i += 1;
            }
            other => {
                parsed.rest.push(other.to_string());
                i += 1;
            }
        }
    }
    Ok(parsed)
}

/// The value following the flag at `i`.
pub(crate) fn flag_value(args: &[String], i: usize) -> Result<String> {
    match args.get(i + 1) {
        Some(v) if !v.starts_with("--") => Ok(v.clone()),
        _ => bail!("{} needs a value", args[i]),
    }
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let global = parse_global_flags(&args)?;
    crate::logging::init(global.verbose);

    let Some(cmd) = global.rest.first().map(String::as_str) else {
        print_help();
        return Ok(());
    };

    match cmd {
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        "version" | "--version" | "-V" => {
            println!("airshorts {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "migrate" => {
            let config = load_config(&global)?;
            migrate::run_migrate_command(config, &global.rest[1..])
        }
        "webhook" => {
            let config = load_config(&global)?;
            webhook::run_webhook_command(&config, &global.rest[1..])
        }
        "serve" => {
            let config = load_config(&global)?;
            serve::run_serve_command(config, &global.rest[1..]).await
        }
        other => {
            print_error(&format!("Unknown command '{}'", other));
            print_help();
            bail!("unknown command '{}'", other)
        }
    }
}

fn load_config(global: &GlobalArgs) -> Result<AppConfig> {
    AppConfig::load(global.config.as_deref()).context("loading configuration")
}
