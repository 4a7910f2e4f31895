use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use datacollab::auth::{TokenGenerator, issue_token};
use datacollab::config::ServerConfig;
use datacollab::events::EventBus;
use datacollab::objects::FsObjectStore;
use datacollab::server::{AppState, create_router};
use datacollab::server::validation::validate_user_name;
use datacollab::store::{SqliteStore, Store};
use datacollab::types::User;

const ADMIN_TOKEN_FILE: &str = ".admin_token";

#[cfg(unix)]
fn set_restrictive_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        tracing::warn!("Failed to set permissions on {}: {e}", path.display());
    }
}

#[derive(Parser)]
#[command(name = "datacollab")]
#[command(about = "A dataset collaboration server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Start the server
    Serve {
        /// Host to bind to (overrides config.toml)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (overrides config.toml)
        #[arg(long, short)]
        port: Option<u16>,

        /// Data directory for the database, objects, and config.toml
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        /// Public base URL for external access (e.g., "https://data.example.com").
        /// Used as the prefix of signed object URLs.
        #[arg(long)]
        public_base_url: Option<String>,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Initialize the server (create database and admin token)
    Init {
        /// Data directory for the database and objects
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        /// Only print the token path, not the token itself
        #[arg(long)]
        non_interactive: bool,
    },

    /// Create a user and print its token
    CreateUser {
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        #[arg(long)]
        name: String,
    },
}

fn open_store(data_dir: &Path) -> anyhow::Result<SqliteStore> {
    let config = ServerConfig::load(data_dir)?;
    let store = SqliteStore::new(config.db_path())?;
    store.initialize()?;
    Ok(store)
}

fn run_init(data_dir: &Path, non_interactive: bool) -> anyhow::Result<()> {
    fs::create_dir_all(data_dir)
        .with_context(|| format!("creating {}", data_dir.display()))?;

    let store = open_store(data_dir)?;
    let token_file = data_dir.join(ADMIN_TOKEN_FILE);

    if store.has_admin_token()? {
        bail!(
            "Server already initialized. Admin token exists at: {}",
            token_file.display()
        );
    }

    let (_, raw_token) = issue_token(&store, &TokenGenerator::new(), true, None)?;
    fs::write(&token_file, &raw_token)?;

    #[cfg(unix)]
    set_restrictive_permissions(&token_file);

    if non_interactive {
        println!("Admin token written to: {}", token_file.display());
        return Ok(());
    }

    println!();
    println!("========================================");
    println!("Admin token (save this, it won't be shown again):");
    println!();
    println!("  {raw_token}");
    println!();
    println!("Token also written to: {}", token_file.display());
    println!("========================================");
    println!();

    Ok(())
}

fn run_create_user(data_dir: &Path, name: &str) -> anyhow::Result<()> {
    let store = open_store(data_dir)?;
    if !store.has_admin_token()? {
        bail!("Server not initialized. Run 'datacollab admin init' first.");
    }

    if let Err(e) = validate_user_name(name) {
        bail!(e);
    }
    if store.get_user_by_name(name)?.is_some() {
        bail!("User '{name}' already exists");
    }

    let user = User {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        created_at: Utc::now(),
    };
    store.create_user(&user)?;

    let (_, raw_token) = issue_token(&store, &TokenGenerator::new(), false, Some(user.id.clone()))?;

    println!();
    println!("========================================");
    println!("Created user '{name}' ({}) with token:", user.id);
    println!();
    println!("  {raw_token}");
    println!();
    println!("========================================");
    println!();

    Ok(())
}

async fn run_serve(
    data_dir: &Path,
    host: Option<String>,
    port: Option<u16>,
    public_base_url: Option<String>,
) -> anyhow::Result<()> {
    let mut config = ServerConfig::load(data_dir)?;
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if public_base_url.is_some() {
        config.public_base_url = public_base_url;
    }

    let token_file = config.data_dir.join(ADMIN_TOKEN_FILE);
    if !token_file.exists() {
        bail!(
            "Server not initialized. Run 'datacollab admin init' first to create the database and admin token."
        );
    }

    let store = SqliteStore::new(config.db_path())?;
    store.initialize()?;
    if !store.has_admin_token()? {
        bail!(
            "Server not initialized. Run 'datacollab admin init' first to create the database and admin token."
        );
    }

    info!("Admin token available at {}", token_file.display());

    let objects = FsObjectStore::new(&config.data_dir, config.base_url(), config.signing_secret()?);
    let addr = config.socket_addr()?;

    let state = Arc::new(AppState::new(
        Arc::new(store),
        Arc::new(objects),
        Arc::new(EventBus::default()),
        config,
    ));

    let app = create_router(state);

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("datacollab=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Admin { command } => match command {
            AdminCommands::Init {
                data_dir,
                non_interactive,
            } => run_init(&data_dir, non_interactive)?,
            AdminCommands::CreateUser { data_dir, name } => run_create_user(&data_dir, &name)?,
        },
        Commands::Serve {
            host,
            port,
            data_dir,
            public_base_url,
        } => run_serve(&data_dir, host, port, public_base_url).await?,
    }

    Ok(())
}
