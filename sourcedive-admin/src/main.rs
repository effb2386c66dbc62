//! SourceDive admin server and command-line tools
//!
//! `sourcedive serve` runs the admin API and UI. The other subcommands
//! import and export sources and manage users against the same database.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sourcedive_admin::{build_router, AppState};
use sourcedive_common::config::{AppConfig, RootFolderInitializer, TomlConfig};
use sourcedive_common::db::{init_database, users};
use sourcedive_common::transfer;
use sourcedive_common::Viewer;
use sqlx::SqlitePool;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "sourcedive")]
#[command(about = "Contact manager for journalists")]
#[command(version)]
struct Args {
    /// Folder holding sourcedive.db
    #[arg(short, long, global = true, env = "SOURCEDIVE_ROOT")]
    root_folder: Option<PathBuf>,

    /// Config file (defaults to ~/.config/sourcedive/config.toml)
    #[arg(short, long, global = true, env = "SOURCEDIVE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the admin HTTP server (default)
    Serve {
        /// Address to bind
        #[arg(short, long, env = "SOURCEDIVE_BIND")]
        bind: Option<String>,

        /// Port to listen on
        #[arg(short, long, env = "SOURCEDIVE_PORT")]
        port: Option<u16>,
    },

    /// Import sources from a CSV file
    Import {
        file: PathBuf,

        /// Username credited for rows without created_by
        #[arg(long)]
        as_user: Option<String>,
    },

    /// Export the sources a user may export as CSV
    Export {
        /// Username to export for
        #[arg(short, long)]
        user: String,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Manage users
    #[command(subcommand)]
    User(UserCommand),
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    /// Register a user and print their API token
    Add { username: String, email: String },
    /// Replace a user's API token and print it
    Token { username: String },
    /// List users
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml = match &args.config {
        Some(path) => TomlConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => TomlConfig::load_or_default(),
    };

    let (bind_arg, port_arg) = match &args.command {
        Some(Command::Serve { bind, port }) => (bind.clone(), *port),
        _ => (None, None),
    };
    let config = AppConfig::resolve(toml, args.root_folder.clone(), bind_arg, port_arg);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "sourcedive={level},tower_http={level}",
                    level = config.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Build identification first, before any database work
    info!(
        "Starting {} (sourcedive-admin) v{} [{}] built {} ({})",
        config.project_name,
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let initializer = RootFolderInitializer::new(config.root_folder.clone());
    initializer.ensure_directory_exists()?;
    let db_path = initializer.database_path();
    info!("Database path: {}", db_path.display());

    let pool = init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    match args.command.unwrap_or(Command::Serve {
        bind: None,
        port: None,
    }) {
        Command::Serve { .. } => serve(pool, config).await,
        Command::Import { file, as_user } => import(&pool, file, as_user).await,
        Command::Export { user, output } => export(&pool, &user, output).await,
        Command::User(command) => user(&pool, &config, command).await,
    }
}

async fn serve(pool: SqlitePool, config: AppConfig) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid bind address {}:{}",
                config.bind_address, config.port
            )
        })?;

    let app = build_router(AppState::new(pool, config));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("sourcedive-admin listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn import(pool: &SqlitePool, file: PathBuf, as_user: Option<String>) -> Result<()> {
    let default_creator = match as_user {
        Some(username) => Some(users::find_user_by_username(pool, &username).await?.id),
        None => None,
    };

    let reader =
        File::open(&file).with_context(|| format!("Failed to open {}", file.display()))?;
    let summary = transfer::import_sources(pool, reader, default_creator).await?;

    for row in &summary.rows {
        println!(
            "line {:>5}  {:<40} {}",
            row.line,
            row.email_address,
            serde_json::to_string(&row.outcome)?
        );
    }
    println!();
    println!("Started import:   {}", summary.started);
    println!("Finished import:  {}", summary.finished);
    println!("Import length:    {} ms", summary.duration_ms);
    println!(
        "Created {}, skipped {}, failed {}",
        summary.created, summary.skipped, summary.failed
    );
    Ok(())
}

async fn export(pool: &SqlitePool, username: &str, output: Option<PathBuf>) -> Result<()> {
    let user = users::find_user_by_username(pool, username).await?;
    let viewer = Viewer::new(user.id, user.username);

    let writer: Box<dyn Write> = match &output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(io::stdout()),
    };

    let count = transfer::export_sources(pool, &viewer, writer).await?;
    info!("Exported {} sources for '{}'", count, viewer.username);
    Ok(())
}

async fn user(pool: &SqlitePool, config: &AppConfig, command: UserCommand) -> Result<()> {
    match command {
        UserCommand::Add { username, email } => {
            let (user, token) = users::register_user(pool, &config.auth, &username, &email).await?;
            println!("Created user '{}' <{}>", user.username, user.email);
            println!("API token (shown once): {}", token);
        }
        UserCommand::Token { username } => {
            let user = users::find_user_by_username(pool, &username).await?;
            let token = users::issue_token(pool, &config.auth, user.id).await?;
            println!("New API token for '{}' (shown once): {}", user.username, token);
        }
        UserCommand::List => {
            for user in users::list_users(pool).await? {
                println!(
                    "{:>5}  {:<24} {:<40} staff={} last_login={}",
                    user.id,
                    user.username,
                    user.email,
                    user.is_staff,
                    user.last_login
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "never".to_string())
                );
            }
        }
    }
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
