/*
 * SPDX-FileCopyrightText: 2026 OmniFlow Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::dialogs;
use crate::proxy::{ProxyClient, ProxyConfig, DEFAULT_PROXY_TIMEOUT_SECS};
use crate::store::BridgeStore;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use omniflow_protocol::{ProxyRequest, ProxyResponse, StreamEvent};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

const DB_FILE_NAME: &str = "omniflow.db";
const EVENT_CHANNEL_CAPACITY: usize = 512;

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct BridgeConfig {
    /// Data directory override; platform default when unset.
    #[serde(default)]
    pub data_dir: Option<String>,
    /// Timeout for unary proxy requests (seconds).
    #[serde(default)]
    pub proxy_timeout_secs: Option<u64>,
}

pub fn default_data_dir() -> Result<PathBuf> {
    if let Ok(v) = std::env::var("OMNIFLOW_DATA_DIR") {
        return Ok(PathBuf::from(v));
    }
    let proj = ProjectDirs::from("app", "omniflow", "OmniFlow")
        .context("unable to determine platform data dir")?;
    Ok(proj.data_local_dir().to_path_buf())
}

/// The surface the host shell binds to the sandboxed frontend: the HTTP
/// proxy, app/session persistence, and the directory dialog. Cheap to clone;
/// clones share the store path and the event channel.
#[derive(Clone)]
pub struct Bridge {
    proxy: ProxyClient,
    store: BridgeStore,
    events: broadcast::Sender<StreamEvent>,
}

impl Bridge {
    pub fn start(cfg: BridgeConfig) -> Result<Self> {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("info".parse().unwrap()),
            )
            .try_init()
            .ok();

        let data_dir = match &cfg.data_dir {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir()?,
        };
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("create data dir: {}", data_dir.display()))?;
        info!("data dir: {}", data_dir.display());

        let store = BridgeStore::open(data_dir.join(DB_FILE_NAME))?;
        let (events, _) = broadcast::channel::<StreamEvent>(EVENT_CHANNEL_CAPACITY);
        let timeout =
            Duration::from_secs(cfg.proxy_timeout_secs.unwrap_or(DEFAULT_PROXY_TIMEOUT_SECS));
        let proxy = ProxyClient::new(&ProxyConfig { timeout }, events.clone())?;

        Ok(Self {
            proxy,
            store,
            events,
        })
    }

    /// Register a stream event subscriber. Subscribe before calling
    /// [`Bridge::proxy_stream_request`] or early chunks may be missed.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.events.subscribe()
    }

    pub async fn proxy_request(&self, req: &ProxyRequest) -> ProxyResponse {
        self.proxy.proxy_request(req).await
    }

    pub fn proxy_stream_request(&self, request_id: &str, req: ProxyRequest) -> JoinHandle<()> {
        self.proxy.proxy_stream_request(request_id, req)
    }

    pub fn save_app(&self, app_json: &str) -> Result<()> {
        self.store.save_app(app_json)
    }

    pub fn list_apps(&self) -> Result<Vec<String>> {
        self.store.list_apps()
    }

    pub fn delete_app(&self, id: &str) -> Result<()> {
        self.store.delete_app(id)
    }

    pub fn save_session(&self, session_json: &str) -> Result<()> {
        self.store.save_session(session_json)
    }

    pub fn list_sessions(&self) -> Result<Vec<String>> {
        self.store.list_sessions()
    }

    pub fn delete_session(&self, id: &str) -> Result<()> {
        self.store.delete_session(id)
    }

    pub fn select_directory(&self) -> Option<PathBuf> {
        dialogs::select_directory()
    }
}
