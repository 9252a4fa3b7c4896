//! Bookshelf Server
//!
//! Serves the catalog and provides the administrative commands.

use std::net::SocketAddr;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bookshelf_server::{
    api,
    config::AppConfig,
    models::{
        permission::Capability,
        user::{NewAccount, Role},
    },
    repository::Repository,
    AppState,
};

#[derive(Parser)]
#[command(name = "bookshelf-server", version, about = "Bookshelf catalog server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Create or reset the Viewers, Editors and Admins bundles
    CreateGroups,
    /// Create an account with every capability
    CreateSuperuser {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: Option<String>,
        /// Read from BOOKSHELF_SUPERUSER_PASSWORD when omitted
        #[arg(long, env = "BOOKSHELF_SUPERUSER_PASSWORD")]
        password: String,
    },
    /// Move an existing account to another role (admin, librarian, member)
    SetRole {
        #[arg(long)]
        username: String,
        #[arg(long)]
        role: Role,
    },
    /// Grant one capability (can_view, can_create, can_edit, can_delete) directly to an account
    Grant {
        #[arg(long)]
        username: String,
        #[arg(long)]
        capability: Capability,
    },
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("bookshelf_server={},tower_http=debug", config.logging.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn connect(config: &AppConfig) -> anyhow::Result<Repository> {
    if config.database.is_in_memory() {
        tracing::warn!("Using the in-memory store; data is lost on exit");
        return Ok(Repository::in_memory());
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Connected to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    tracing::info!("Database migrations completed");

    Ok(Repository::postgres(pool))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::load().context("Failed to load configuration")?;
    config.check_secrets().context("Refusing to start")?;
    init_tracing(&config);

    let repository = connect(&config).await?;
    let state = AppState::new(config, repository).context("Failed to compile templates")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(state).await,
        Command::CreateGroups => {
            let bundles = state.services.permissions.reconcile_defaults().await?;
            for bundle in bundles {
                let codenames: Vec<&str> = bundle.capabilities.iter().map(|c| c.codename()).collect();
                println!("{} -> {}: {}", bundle.name, bundle.role, codenames.join(", "));
            }
            Ok(())
        }
        Command::CreateSuperuser {
            username,
            email,
            password,
        } => {
            let (user, _) = state
                .services
                .users
                .create_account(NewAccount::superuser(&username, email, &password))
                .await?;
            println!("Superuser {} created (id {})", user.username, user.id);
            Ok(())
        }
        Command::SetRole { username, role } => {
            state.services.users.set_role(&username, role).await?;
            println!("{} is now {}", username, role);
            Ok(())
        }
        Command::Grant { username, capability } => {
            state.services.users.grant(&username, capability).await?;
            println!("Granted {} to {}", capability, username);
            Ok(())
        }
    }
}

async fn serve(state: AppState) -> anyhow::Result<()> {
    tracing::info!("Starting Bookshelf Server v{}", env!("CARGO_PKG_VERSION"));

    // Bundles are reconciled explicitly, never as a side effect of loading a module
    state.services.permissions.reconcile_defaults().await?;

    let addr = SocketAddr::new(
        state.config.server.host.parse().context("Invalid host address")?,
        state.config.server.port,
    );
    if state.config.security.development {
        tracing::warn!("Development security settings: no HTTPS redirect, no HSTS, no Secure cookies");
    }

    let app = api::router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_role_parses_the_role_name() {
        let cli = Cli::try_parse_from(["bookshelf-server", "set-role", "--username", "ana", "--role", "Librarian"]).unwrap();
        match cli.command {
            Some(Command::SetRole { username, role }) => {
                assert_eq!(username, "ana");
                assert_eq!(role, Role::Librarian);
            }
            _ => panic!("expected set-role"),
        }
    }

    #[test]
    fn grant_parses_the_codename() {
        let cli = Cli::try_parse_from(["bookshelf-server", "grant", "--username", "ana", "--capability", "can_delete"]).unwrap();
        match cli.command {
            Some(Command::Grant { capability, .. }) => assert_eq!(capability, Capability::CanDelete),
            _ => panic!("expected grant"),
        }
    }

    #[test]
    fn unknown_role_or_capability_is_rejected() {
        assert!(Cli::try_parse_from(["bookshelf-server", "set-role", "--username", "ana", "--role", "janitor"]).is_err());
        assert!(Cli::try_parse_from(["bookshelf-server", "grant", "--username", "ana", "--capability", "can_fly"]).is_err());
    }
}
