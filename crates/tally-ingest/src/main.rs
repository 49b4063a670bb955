//! tally-ingest server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) layered under
//! `TALLY_*` environment variables, opens the SQLite store, and either serves
//! the webhook endpoint or runs one of the operator subcommands.
//!
//! ```text
//! server register-node --workspace ws_1
//! server add-product --node <node> --product pro --price 9900 --primary
//! server serve
//! ```

use std::{
  net::SocketAddr,
  path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tally_core::catalog::ProductMapping;
use tally_ingest::{AppState, ServerConfig};
use tally_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Tally webhook ingestion server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Run the HTTP server (the default).
  Serve,

  /// Create a node and print its webhook token. The token is not stored and
  /// cannot be shown again.
  RegisterNode {
    #[arg(long)]
    workspace: String,
    /// Node id; a random one is generated when omitted.
    #[arg(long)]
    node:      Option<String>,
  },

  /// Append a product to a node's catalog, or update it if already mapped.
  AddProduct {
    #[arg(long)]
    node:    String,
    #[arg(long)]
    product: String,
    #[arg(long)]
    name:    Option<String>,
    /// Expected unit price in cents; repeat for several price points.
    #[arg(long = "price")]
    prices:  Vec<i64>,
    /// Use this product as the node's attribution fallback.
    #[arg(long)]
    primary: bool,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(
      config::Environment::with_prefix("TALLY")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  // Expand `~` in store path.
  let store_path = expand_tilde(&server_cfg.store_path);

  // Open SQLite store.
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  match cli.command.unwrap_or(Command::Serve) {
    Command::Serve => serve(store, server_cfg).await,
    Command::RegisterNode { workspace, node } => {
      let node_id = node.unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
      let token = store
        .register_node(&workspace, &node_id)
        .await
        .with_context(|| format!("failed to register node {node_id}"))?;
      println!("node_id: {node_id}");
      println!("token:   {token}");
      println!("webhook: /webhook/{workspace}/{node_id}/{token}");
      Ok(())
    }
    Command::AddProduct { node, product, name, prices, primary } => {
      let mapping = ProductMapping {
        product_id:         product,
        name,
        price_points_cents: prices,
        is_primary:         primary,
      };
      store
        .add_product(&node, &mapping)
        .await
        .with_context(|| format!("failed to add product to node {node}"))?;
      tracing::info!(node_id = %node, product_id = %mapping.product_id, "product mapped");
      Ok(())
    }
  }
}

async fn serve(store: SqliteStore, server_cfg: ServerConfig) -> anyhow::Result<()> {
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);
  let app = tally_ingest::router(AppState::new(store, server_cfg));

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
    .await
    .context("server error")?;

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
