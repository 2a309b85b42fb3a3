//! Inspect and install Postgres extensions on the database named by the
//! `RDS_*` environment variables.

use std::collections::HashSet;

use anyhow::Context;
use thiserror::Error;
use tokio_postgres::{Client, NoTls};
use tracing::{error, info, warn};

use agent_factory::logging;

/// Extensions this deployment expects.
const DESIRED_EXTENSIONS: [&str; 4] = ["vector", "pgrouting", "postgis", "postgres_fdw"];

const REQUIRED_VARS: [&str; 5] = ["RDS_USER", "RDS_PASSWORD", "RDS_HOST", "RDS_PORT", "RDS_DB"];

struct DbSettings {
    user: String,
    password: String,
    host: String,
    port: u16,
    database: String,
}

impl std::fmt::Debug for DbSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbSettings")
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .finish()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
enum SettingsError {
    #[error("Missing environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("Invalid RDS_PORT: {0}")]
    InvalidPort(String),
}

impl DbSettings {
    /// Read every required variable, reporting all missing ones at once.
    fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let values: Vec<Option<String>> = REQUIRED_VARS
            .iter()
            .map(|var| lookup(var).filter(|v| !v.trim().is_empty()))
            .collect();

        let missing: Vec<&'static str> = REQUIRED_VARS
            .iter()
            .zip(&values)
            .filter(|(_, value)| value.is_none())
            .map(|(var, _)| *var)
            .collect();
        if !missing.is_empty() {
            return Err(SettingsError::Missing(missing));
        }

        let mut values = values.into_iter().flatten();
        let mut next = || values.next().unwrap_or_default();
        let user = next();
        let password = next();
        let host = next();
        let port_raw = next();
        let database = next();

        let port = port_raw
            .trim()
            .parse::<u16>()
            .map_err(|_| SettingsError::InvalidPort(port_raw.clone()))?;

        Ok(Self {
            user,
            password,
            host,
            port,
            database,
        })
    }

    fn pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .user(&self.user)
            .password(&self.password)
            .host(&self.host)
            .port(self.port)
            .dbname(&self.database);
        config
    }
}

/// A row of `pg_available_extensions`.
#[derive(Debug, Clone)]
struct AvailableExtension {
    name: String,
    default_version: Option<String>,
    installed_version: Option<String>,
    comment: Option<String>,
}

/// What to do with one desired extension.
#[derive(Debug, Clone, PartialEq, Eq)]
enum InstallAction {
    Install(String),
    AlreadyInstalled(String),
    Unavailable(String),
}

/// Decide, in `desired` order, which extensions need installing.
fn plan_installs(
    desired: &[&str],
    available: &[AvailableExtension],
    installed: &[String],
) -> Vec<InstallAction> {
    let available: HashSet<&str> = available.iter().map(|e| e.name.as_str()).collect();
    let installed: HashSet<&str> = installed.iter().map(String::as_str).collect();

    desired
        .iter()
        .map(|name| {
            let name = name.to_string();
            if !available.contains(name.as_str()) {
                InstallAction::Unavailable(name)
            } else if installed.contains(name.as_str()) {
                InstallAction::AlreadyInstalled(name)
            } else {
                InstallAction::Install(name)
            }
        })
        .collect()
}

/// Quote an identifier for interpolation into DDL.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

async fn available_extensions(
    client: &Client,
) -> Result<Vec<AvailableExtension>, tokio_postgres::Error> {
    let rows = client
        .query(
            "SELECT name, default_version, installed_version, comment \
             FROM pg_available_extensions ORDER BY name",
            &[],
        )
        .await?;
    Ok(rows
        .iter()
        .map(|row| AvailableExtension {
            name: row.get(0),
            default_version: row.get(1),
            installed_version: row.get(2),
            comment: row.get(3),
        })
        .collect())
}

async fn installed_extensions(client: &Client) -> Result<Vec<String>, tokio_postgres::Error> {
    let rows = client.query("SELECT extname FROM pg_extension", &[]).await?;
    Ok(rows.iter().map(|row| row.get(0)).collect())
}

async fn install_extension(client: &Client, name: &str) -> bool {
    let statement = format!("CREATE EXTENSION IF NOT EXISTS {}", quote_ident(name));
    match client.batch_execute(&statement).await {
        Ok(()) => {
            println!("Successfully installed extension: {}", name);
            info!(extension = %name, "Installed extension");
            true
        }
        Err(e) => {
            println!("Error installing extension {}: {}", name, e);
            error!(extension = %name, error = %e, "Extension install failed");
            false
        }
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    logging::init(&logging::filter_for("pg_extensions"));

    let settings = match DbSettings::from_lookup(|var| std::env::var(var).ok()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(settings).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(settings: DbSettings) -> anyhow::Result<()> {
    println!("Connecting to database...");
    tracing::debug!(?settings, "Database settings");
    let (client, connection) = settings
        .pg_config()
        .connect(NoTls)
        .await
        .context("could not connect to database")?;
    let connection = tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!(error = %e, "Database connection error");
        }
    });

    println!("\nAvailable extensions:");
    let available = available_extensions(&client).await.unwrap_or_else(|e| {
        warn!(error = %e, "Could not fetch available extensions");
        Vec::new()
    });
    for ext in &available {
        println!("- {}: {}", ext.name, ext.comment.as_deref().unwrap_or(""));
        println!(
            "  Default version: {}",
            ext.default_version.as_deref().unwrap_or("unknown")
        );
        println!(
            "  Installed version: {}",
            ext.installed_version.as_deref().unwrap_or("Not installed")
        );
    }

    let installed = installed_extensions(&client).await.unwrap_or_else(|e| {
        warn!(error = %e, "Could not fetch installed extensions");
        Vec::new()
    });
    println!("\nCurrently installed extensions: {}", installed.join(", "));

    println!("\nChecking and installing required extensions...");
    let mut failures = 0usize;
    for action in plan_installs(&DESIRED_EXTENSIONS, &available, &installed) {
        match action {
            InstallAction::Install(name) => {
                println!("Installing {}...", name);
                if !install_extension(&client, &name).await {
                    failures += 1;
                }
            }
            InstallAction::AlreadyInstalled(name) => println!("{} is already installed.", name),
            InstallAction::Unavailable(name) => {
                println!("{} is not available in your region/setup.", name)
            }
        }
    }

    drop(client);
    let _ = connection.await;
    println!("\nDatabase connection closed.");
    if failures > 0 {
        warn!(failures, "Some extensions failed to install");
    }
    Ok(())
}
