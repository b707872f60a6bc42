//! Serveur HTTP de PMOSlim
//!
//! Un unique router axum reçoit les routes des différentes crates (flux
//! audio des lecteurs, API `/api/players`, logs) avant `start()`.

use crate::logs::{create_logs_router, init_logging, log_dump, log_sse};
use anyhow::Result;
use axum::handler::Handler;
use axum::routing::get;
use axum::{Json, Router};
use pmoconfig::get_config;
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{signal, sync::RwLock, task::JoinHandle};
use tracing::{error, info};

/// Identité publiée sur `/info`
#[derive(Clone, Debug, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub base_url: String,
    pub http_port: u16,
}

pub struct Server {
    name: String,
    base_url: String,
    http_port: u16,
    router: Arc<RwLock<Router>>,
    join_handle: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl Server {
    /// `http_port` à 0 : port éphémère, lisible par `local_addr()` après `start()`.
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, http_port: u16) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            http_port,
            router: Arc::new(RwLock::new(Router::new())),
            join_handle: None,
            local_addr: None,
        }
    }

    /// Serveur réglé par `host.base_url` et `host.http_port`
    pub fn new_configured() -> Self {
        let config = get_config();
        Self::new("PMOSlim", config.get_base_url(), config.get_http_port())
    }

    async fn mount(&self, path: &str, route: Router) {
        let mut router = self.router.write().await;
        let current = std::mem::take(&mut *router);
        *router = if path == "/" {
            current.merge(route)
        } else {
            current.nest(path, route)
        };
    }

    /// Route GET renvoyant le JSON produit par `f`
    ///
    /// ```rust,no_run
    /// # #[tokio::main]
    /// # async fn main() {
    /// # let mut server = pmoserver::Server::new("Test", "localhost", 3000);
    /// server.add_route("/ping", || async {
    ///     serde_json::json!({"pong": true})
    /// }).await;
    /// # }
    /// ```
    pub async fn add_route<F, Fut, T>(&mut self, path: &str, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let f = Arc::new(f);
        let handler = move || {
            let f = f.clone();
            async move { Json(f().await) }
        };
        self.mount(path, Router::new().route("/", get(handler))).await;
    }

    pub async fn add_handler_with_state<H, T, S>(&mut self, path: &str, handler: H, state: S)
    where
        H: Handler<T, S> + Clone + 'static,
        T: 'static,
        S: Clone + Send + Sync + 'static,
    {
        let route = Router::new().route("/", get(handler)).with_state(state);
        self.mount(path, route).await;
    }

    /// `"/"` fusionne `sub_router` à la racine, tout autre chemin l'imbrique.
    pub async fn add_router(&mut self, path: &str, sub_router: Router) {
        if path == "/" {
            self.mount("/", sub_router).await;
        } else {
            let nested = format!("/{}", path.trim_start_matches('/'));
            self.mount(&nested, sub_router).await;
        }
    }

    /// Ouvre le socket puis sert en tâche de fond jusqu'à Ctrl+C.
    ///
    /// Une erreur de bind remonte à l'appelant.
    pub async fn start(&mut self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(("0.0.0.0", self.http_port)).await?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);
        info!(
            "🌐 {} listening on http://{}:{}",
            self.name,
            self.base_url,
            local_addr.port()
        );

        let router = self.router.read().await.clone();
        let serving = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router.into_make_service()).await {
                error!("❌ HTTP server stopped: {}", e);
            }
        });

        let interrupted = async {
            if signal::ctrl_c().await.is_ok() {
                info!("Ctrl+C reçu, arrêt gracieux");
            } else {
                std::future::pending::<()>().await;
            }
        };
        self.join_handle = Some(tokio::spawn(async move {
            tokio::select! {
                _ = serving => {},
                _ = interrupted => {},
            }
        }));
        Ok(())
    }

    /// Attend l'arrêt du serveur
    pub async fn wait(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.await;
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            name: self.name.clone(),
            base_url: self.base_url.clone(),
            http_port: self.local_addr.map_or(self.http_port, |a| a.port()),
        }
    }

    /// Installe le subscriber tracing et publie `/log-sse`, `/log-dump`
    /// et `/api/log_setup`.
    pub async fn init_logging(&mut self) {
        let log_state = init_logging();
        self.add_handler_with_state("/log-sse", log_sse, log_state.clone())
            .await;
        self.add_handler_with_state("/log-dump", log_dump, log_state.clone())
            .await;
        self.add_router("/api", create_logs_router(log_state)).await;
    }
}
