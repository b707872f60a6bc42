use std::sync::Arc;

use pmoconfig::get_config;
use pmoserver::Server;
use pmoslim::{HttpResolver, SlimConfigExt, SlimRegistry, SlimServer, SlimServerExt};
use pmoxpl::{XplBridge, XplConfigExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ========== PHASE 1 : Infrastructure ==========

    let config = get_config();
    let mut server = Server::new_configured();
    server.init_logging().await;

    let info = server.info();
    server
        .add_route("/info", move || {
            let info = info.clone();
            async move { serde_json::json!({"server": info, "version": env!("CARGO_PKG_VERSION")}) }
        })
        .await;

    let settings = config.slim_settings();
    let shutdown = CancellationToken::new();
    let registry = SlimRegistry::new(settings.ir_debounce);

    // ========== PHASE 2 : Services slimproto ==========

    info!("🎵 Initializing track resolver...");
    let resolver = Arc::new(HttpResolver::new(settings.resolver.clone())?);

    server.register_slim_api(registry.clone()).await;

    let slim = Arc::new(
        SlimServer::new(settings, registry.clone(), resolver)
            .with_config(config.clone())
            .with_token(shutdown.child_token()),
    );
    let slim_addr = slim.clone().start().await?;
    info!("✅ Squeezebox players can connect on port {}", slim_addr.port());
    for (interface, addresses) in pmoutils::list_local_ipv4s() {
        info!("  - {}: {:?}", interface, addresses);
    }

    let xpl_settings = config.xpl_settings();
    if xpl_settings.enabled {
        info!("🏠 Starting xPL bridge...");
        match XplBridge::bind(xpl_settings, registry.clone()).await {
            Ok(bridge) => {
                tokio::spawn(Arc::new(bridge).run(shutdown.child_token()));
            }
            Err(e) => warn!("⚠️ Failed to start xPL bridge: {}", e),
        }
    }

    // ========== PHASE 3 : Démarrage du serveur HTTP ==========

    info!("🌐 Starting HTTP server...");
    server.start().await?;

    info!("✅ PMOSlim is ready!");
    info!("Press Ctrl+C to stop...");
    server.wait().await;

    info!("🛑 Stopping {} player session(s)...", registry.len());
    shutdown.cancel();

    Ok(())
}
