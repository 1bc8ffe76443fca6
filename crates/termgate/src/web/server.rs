use anyhow::Result;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::audit::{AuditLog, AuditSink};
use crate::config::BrokerConfig;
use crate::control::ControlBroadcaster;
use crate::registry::SessionRegistry;
use crate::web::routes::{self, AppState};
use termgate_rules::RiskAnalyzer;

/// Web server instance
pub struct WebServer {
    config: BrokerConfig,
}

impl WebServer {
    /// Create a new web server
    pub fn new(config: BrokerConfig) -> Self {
        Self { config }
    }

    /// Start the web server and serve until ctrl-c.
    pub async fn start(self) -> Result<()> {
        let config = Arc::new(self.config);

        let audit = match &config.audit_dir {
            Some(dir) => AuditLog::spawn(dir).await?,
            None => AuditSink::disabled(),
        };

        let registry = Arc::new(SessionRegistry::new(config.max_sessions));
        let analyzer = Arc::new(RiskAnalyzer::new(&config.analyzer_config()));
        let control = ControlBroadcaster::spawn(Arc::clone(&registry));

        let app_state = AppState {
            registry: Arc::clone(&registry),
            control,
            analyzer,
            audit,
            config: Arc::clone(&config),
        };

        // CORS layer for development
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let app = routes::create_router(app_state)
            .layer(cors)
            .layer(TraceLayer::new_for_http());

        println!("🌐 Broker listening on http://{}", config.bind_addr);
        println!(
            "   WebSocket endpoint: ws://{}/ws/{{session_id}}",
            config.bind_addr
        );
        println!("   API endpoints: http://{}/api/sessions", config.bind_addr);

        let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        // Kill any shells still running; their pumps finish the teardown.
        let remaining = registry.list_active().await;
        if !remaining.is_empty() {
            info!(count = remaining.len(), "closing remaining sessions");
            for session in remaining {
                session.close();
            }
        }

        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
