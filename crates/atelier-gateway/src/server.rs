use std::sync::Arc;

use atelier_common::Result;
use atelier_config::AppConfig;
use atelier_db::Database;
use tokio::net::TcpListener;
use tracing::info;

use crate::router::build_router;
use crate::state::AppState;

/// The main API server. The database pool is constructed by the host
/// process and injected here; the server shuts the pool down on exit.
pub struct GatewayServer {
    config: AppConfig,
    db: Database,
}

impl GatewayServer {
    pub fn new(config: AppConfig, db: Database) -> Self {
        Self { config, db }
    }

    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);

        let db = self.db.clone();
        let state = Arc::new(AppState::new(self.config, self.db)?);
        let app = build_router(state);

        let listener = TcpListener::bind(&addr).await?;
        info!("atelier gateway listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("shutdown signal received");
            })
            .await
            .map_err(|e| atelier_common::Error::Gateway(format!("server error: {e}")))?;

        db.shutdown();
        Ok(())
    }
}
