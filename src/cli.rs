//! Command-line entry point: parses arguments, loads configuration, and
//! dispatches to either the server or one of the database management
//! subcommands.

use std::process;

use clap::{Parser, Subcommand};

use crate::config::{load_config, DatabaseConfig};
use crate::errors::Result;
use crate::storage::{create_pool, list_applied_migrations, run_db_migrations, validate_migrations, MigrationInfo};

#[derive(Parser)]
#[command(name = "marchproxy")]
#[command(about = "MarchProxy control plane")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file path. Falls back to environment variables alone
    /// when omitted.
    #[arg(short, long)]
    pub config: Option<String>,

    /// Database URL override.
    #[arg(long)]
    pub database_url: Option<String>,

    /// Enable debug-level logging regardless of configuration.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the control plane server.
    Serve,

    /// Database management commands.
    Database {
        #[command(subcommand)]
        command: DatabaseCommands,
    },
}

#[derive(Subcommand)]
pub enum DatabaseCommands {
    /// Run pending migrations.
    Migrate,

    /// Show whether the schema is up to date.
    Status,

    /// List all applied migrations.
    List,

    /// Validate the database schema against the compiled-in migrations.
    Validate,
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }

    crate::observability::logging::init_logging(&config.observability)?;

    match cli.command {
        Some(Commands::Database { command }) => handle_database_command(command, &config.database).await,
        Some(Commands::Serve) | None => {
            tracing::info!(bind_address = %config.server.bind_address(), "starting marchproxy control plane");
            let shutdown = async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("shutdown signal received");
            };
            crate::startup::run_server(config, shutdown).await
        }
    }
}

async fn handle_database_command(command: DatabaseCommands, config: &DatabaseConfig) -> Result<()> {
    let pool = create_pool(config).await?;

    match command {
        DatabaseCommands::Migrate => {
            println!("Running database migrations...");
            run_db_migrations(&pool).await?;
            println!("Migrations completed successfully!");
        }

        DatabaseCommands::Status => {
            let is_valid = validate_migrations(&pool).await?;
            if is_valid {
                println!("Database schema is up to date");
            } else {
                println!("Database schema has pending migrations");
                process::exit(1);
            }
        }

        DatabaseCommands::List => {
            let migrations = list_applied_migrations(&pool).await?;
            if migrations.is_empty() {
                println!("No migrations have been applied");
            } else {
                print_migrations_table(&migrations);
            }
        }

        DatabaseCommands::Validate => {
            println!("Validating database schema...");
            let is_valid = validate_migrations(&pool).await?;
            if is_valid {
                println!("Database schema validation passed");
            } else {
                println!("Database schema validation failed");
                process::exit(1);
            }
        }
    }

    Ok(())
}

fn print_migrations_table(migrations: &[MigrationInfo]) {
    println!();
    println!("{:<15} {:<50} {:<25} {:<10}", "Version", "Description", "Applied On", "Time (ms)");
    println!("{}", "-".repeat(100));

    for migration in migrations {
        println!(
            "{:<15} {:<50} {:<25} {:<10}",
            migration.version,
            truncate_string(&migration.description, 48),
            migration.installed_on.format("%Y-%m-%d %H:%M:%S"),
            migration.execution_time
        );
    }
    println!();
}

fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", &s[..max_len - 3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_database_status_subcommand() {
        let cli = Cli::try_parse_from(["marchproxy", "database", "status"]).unwrap();
        match cli.command {
            Some(Commands::Database { command: DatabaseCommands::Status }) => {}
            _ => panic!("expected database status command"),
        }
    }

    #[test]
    fn truncates_long_descriptions() {
        assert_eq!(truncate_string("short", 10), "short");
        assert_eq!(truncate_string("this is a very long string", 10), "this is...");
    }
}
