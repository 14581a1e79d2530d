//! HTTP front end for the TSOAM membership engine.
//!
//! Wires configuration, Basic auth, request tracing and the domain-event log
//! around the JSON API from [`tsoam_api`].

pub mod auth;
pub mod error;

pub use error::Error;

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{Router, middleware, routing::get};
use serde::Deserialize;
use tokio::{sync::broadcast::error::RecvError, task::JoinHandle};
use tower_http::trace::TraceLayer;
use tsoam_core::store::MemberStore;
use tsoam_engine::{Engine, EngineConfig, EventBus};

use auth::AuthConfig;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `TSOAM_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:               String,
  pub port:               u16,
  pub store_path:         PathBuf,
  pub auth_username:      String,
  pub auth_password_hash: String,
  #[serde(default)]
  pub scheduler:          SchedulerConfig,
}

/// The `[scheduler]` table.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SchedulerConfig {
  /// Start the periodic auto-transfer task on boot.
  pub enabled:                bool,
  pub period_secs:            u64,
  /// Upper bound on each store call made by the engine.
  pub store_timeout_secs:     u64,
  pub default_service_groups: Vec<String>,
}

impl Default for SchedulerConfig {
  fn default() -> Self {
    Self {
      enabled:                true,
      period_secs:            24 * 60 * 60,
      store_timeout_secs:     10,
      default_service_groups: Vec::new(),
    }
  }
}

impl SchedulerConfig {
  pub fn engine_config(&self) -> EngineConfig {
    EngineConfig {
      store_timeout:          Duration::from_secs(self.store_timeout_secs),
      scheduler_period:       Duration::from_secs(self.period_secs),
      default_service_groups: self.default_service_groups.clone(),
    }
  }
}

impl ServerConfig {
  pub fn auth(&self) -> AuthConfig {
    AuthConfig {
      username:      self.auth_username.clone(),
      password_hash: self.auth_password_hash.clone(),
    }
  }
}

/// `TSOAM_PORT=8080`, `TSOAM_SCHEDULER__PERIOD_SECS=3600`,
/// `TSOAM_SCHEDULER__DEFAULT_SERVICE_GROUPS=Ushering,Choir`.
fn environment() -> config::Environment {
  config::Environment::with_prefix("TSOAM")
    .prefix_separator("_")
    .separator("__")
    .try_parsing(true)
    .list_separator(",")
    .with_list_parse_key("scheduler.default_service_groups")
}

/// Load configuration from an optional TOML file, overridden by environment.
pub fn load_config(path: impl Into<PathBuf>) -> Result<ServerConfig, config::ConfigError> {
  config::Config::builder()
    .add_source(config::File::from(path.into()).required(false))
    .add_source(environment())
    .build()?
    .try_deserialize()
}

/// Parse configuration from a TOML string, overridden by environment.
pub fn parse_config(toml: &str) -> Result<ServerConfig, config::ConfigError> {
  config::Config::builder()
    .add_source(config::File::from_str(toml, config::FileFormat::Toml))
    .add_source(environment())
    .build()?
    .try_deserialize()
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full application router.
///
/// Everything under `/api` requires Basic auth; `/health` does not.
pub fn router<S>(engine: Arc<Engine<S>>, credentials: Arc<AuthConfig>) -> Router
where
  S: MemberStore + 'static,
{
  let api = tsoam_api::api_router(engine)
    .layer(middleware::from_fn_with_state(credentials, auth::require_auth));

  Router::new()
    .route("/health", get(health))
    .nest("/api", api)
    .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str { "ok" }

// ─── Event log ────────────────────────────────────────────────────────────────

/// Log every domain event published on `bus` until the bus is dropped.
pub fn spawn_event_log(bus: &EventBus) -> JoinHandle<()> {
  let mut rx = bus.subscribe();
  tokio::spawn(async move {
    loop {
      match rx.recv().await {
        Ok(event) => {
          tracing::info!(event = event.event_type(), "{}", event.message());
        }
        Err(RecvError::Lagged(skipped)) => {
          tracing::warn!(skipped, "event log fell behind");
        }
        Err(RecvError::Closed) => break,
      }
    }
  })
}
