//! Gumbo API server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), layers
//! `GUMBO_*` environment variables over it, opens the SQLite store, and
//! serves the JSON API over HTTP.
//!
//! # Seeding an admin password
//!
//! ```
//! cargo run -p gumbo-api --bin server -- --hash-password
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::Context as _;
use clap::Parser;
use gumbo_api::{
  AppState, ServerConfig, maintenance, password::hash_password, payments::LocalProvider,
  signer::CdnSigner, token::TokenConfig,
};
use gumbo_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Gumbo learning API server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if cli.hash_password {
    let password = read_password()?;
    let hash = hash_password(&password).map_err(|e| anyhow::anyhow!("{e}"))?;
    println!("{hash}");
    return Ok(());
  }

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("GUMBO"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let tenants = server_cfg
    .tenant_registry()
    .context("invalid tenant allow-list")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let signer = CdnSigner::new(&server_cfg.cdn_base_url, &server_cfg.url_signing_secret)
    .map_err(|e| anyhow::anyhow!("invalid url signing secret: {e}"))?;

  let state = AppState {
    store:          Arc::new(store),
    tenants:        Arc::new(tenants),
    tokens:         Arc::new(TokenConfig::new(&server_cfg.jwt_secret, server_cfg.jwt_expiry())),
    pricing:        Arc::new(server_cfg.pricing()),
    signer:         Arc::new(signer),
    payments:       Arc::new(LocalProvider),
    identity:       server_cfg.identity_verifier(),
    signed_url_ttl: server_cfg.signed_url_ttl(),
  };

  if server_cfg.maintenance_interval_secs > 0 {
    maintenance::spawn(
      state.store.clone(),
      Duration::from_secs(server_cfg.maintenance_interval_secs),
    );
  }

  let app = gumbo_api::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_owned())
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
