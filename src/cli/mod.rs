//! # Command Line Interface
//!
//! `credgate serve` runs the gateway, `credgate migrate` manages the schema and
//! `credgate vault-audit` runs the vault health battery once.

pub mod output;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::info;

use crate::api::{start_api_server, ApiState};
use crate::config::AppConfig;
use crate::observability::{init_logging, init_observability, log_config_info};
use crate::storage::{create_pool, list_applied_migrations, run_migrations, validate_migrations};
use crate::vault_audit::OverallStatus;

/// Actor recorded in the audit trail for CLI-initiated health checks.
pub const CLI_ACTOR: &str = "credgate-cli";

#[derive(Parser)]
#[command(name = "credgate")]
#[command(about = "Secret lifecycle and access-control gateway")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database URL override
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP gateway
    Serve,

    /// Apply pending database migrations
    Migrate {
        /// Only report whether the schema is current
        #[arg(long)]
        check: bool,

        /// List applied migrations
        #[arg(long)]
        list: bool,
    },

    /// Run the vault health audit once and print the report
    VaultAudit {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn run_cli() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = AppConfig::from_env();
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }
    if cli.verbose {
        config.observability.log_level = "debug".to_string();
    }

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Migrate { check, list } => {
            init_logging(&config.observability);
            migrate(&config, check, list).await
        }
        Commands::VaultAudit { json } => {
            init_logging(&config.observability);
            vault_audit(config, json).await
        }
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<ExitCode> {
    init_observability(&config.observability)?;
    config.validate()?;
    log_config_info(&config);

    let state = ApiState::from_config(config).await?;
    start_api_server(state).await?;
    Ok(ExitCode::SUCCESS)
}

async fn migrate(config: &AppConfig, check: bool, list: bool) -> anyhow::Result<ExitCode> {
    let mut database = config.database.clone();
    database.auto_migrate = false;
    let pool = create_pool(&database).await?;

    if list {
        let migrations = list_applied_migrations(&pool).await?;
        if migrations.is_empty() {
            println!("No migrations have been applied");
        } else {
            println!("Applied migrations:");
            output::print_migrations_table(&migrations);
        }
        return Ok(ExitCode::SUCCESS);
    }

    if check {
        return if validate_migrations(&pool).await? {
            println!("Database schema is up to date");
            Ok(ExitCode::SUCCESS)
        } else {
            println!("Database schema has pending or modified migrations");
            Ok(ExitCode::FAILURE)
        };
    }

    let applied = run_migrations(&pool).await?;
    println!("Applied {} migration(s)", applied);
    Ok(ExitCode::SUCCESS)
}

async fn vault_audit(config: AppConfig, json: bool) -> anyhow::Result<ExitCode> {
    let state = ApiState::from_config(config).await?;
    let report = state.vault_auditor.run(CLI_ACTOR).await;
    info!(overall_status = %report.overall_status, "Vault audit finished");

    if json {
        output::print_json(&report)?;
    } else {
        output::print_vault_report(&report);
    }

    Ok(if report.overall_status == OverallStatus::Critical {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
