//! User Store - administrative CLI over the user record store.

use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use domain::DEFAULT_PAGE_SIZE;
use user_store_lib::config::UserStoreConfig;
use user_store_lib::{
    initialize, open_store, stream_users, AppError, AppResult, NewUser, PageRequest, UserPatch,
    UserStore,
};

#[derive(Parser)]
#[command(name = "user-store")]
#[command(about = "User record store administration")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to storage and apply the users schema
    Init,
    /// Create a user
    Create {
        #[arg(long)]
        username: String,
        /// Opaque JSON payload stored with the user
        #[arg(long, default_value = "{}")]
        payload: String,
    },
    /// Look up a live user by id or username
    Get {
        #[arg(long, conflicts_with = "username", required_unless_present = "username")]
        id: Option<Uuid>,
        #[arg(long)]
        username: Option<String>,
    },
    /// Rename a user and/or replace its payload
    Update {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        payload: Option<String>,
    },
    /// Delete a user and release its username
    Delete {
        #[arg(long)]
        id: Uuid,
    },
    /// List live users in id order
    List {
        /// Start after this id
        #[arg(long)]
        cursor: Option<Uuid>,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        limit: u64,
        /// Keep following cursors until every user is printed
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli.command).await {
        tracing::error!("Command failed: {}", e);
        eprintln!("error [{}]: {}", e.code(), e.user_message());
        std::process::exit(1);
    }
}

/// Initialize tracing subscriber
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        "debug".to_string()
    } else {
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::new(filter))
        .init();
}

async fn run(command: Commands) -> AppResult<()> {
    let config = UserStoreConfig::from_env()?;
    tracing::debug!(?config, "Configuration loaded");

    match command {
        Commands::Init => initialize(&config).await,
        other => {
            let store = open_store(&config).await?;
            execute(store, other).await
        }
    }
}

async fn execute(store: std::sync::Arc<dyn UserStore>, command: Commands) -> AppResult<()> {
    match command {
        Commands::Init => Ok(()),
        Commands::Create { username, payload } => {
            let record = store
                .create(NewUser::new(username, parse_payload(&payload)?))
                .await?;
            print_json(&record)
        }
        Commands::Get { id, username } => {
            let record = match (id, username) {
                (Some(id), _) => store.get_by_id(id).await?,
                (None, Some(username)) => store.get_by_username(&username).await?,
                (None, None) => return Err(AppError::invalid_input("Pass --id or --username")),
            };
            print_json(&record)
        }
        Commands::Update {
            id,
            username,
            payload,
        } => {
            let patch = UserPatch {
                username,
                payload: payload.as_deref().map(parse_payload).transpose()?,
            };
            let record = store.update(id, patch).await?;
            print_json(&record)
        }
        Commands::Delete { id } => {
            store.delete(id).await?;
            println!("Deleted {}", id);
            Ok(())
        }
        Commands::List { cursor, limit, all } => {
            if all {
                let mut users = Box::pin(stream_users(store, cursor, limit));
                while let Some(user) = users.try_next().await? {
                    print_json(&user)?;
                }
                Ok(())
            } else {
                let page = store.list(PageRequest { cursor, limit }).await?;
                print_json(&page)
            }
        }
    }
}

fn parse_payload(raw: &str) -> AppResult<serde_json::Value> {
    serde_json::from_str(raw)
        .map_err(|e| AppError::invalid_input(format!("Invalid payload JSON: {}", e)))
}

fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::internal(format!("Serialization error: {}", e)))?;
    println!("{}", json);
    Ok(())
}
