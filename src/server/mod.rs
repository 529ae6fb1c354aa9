pub mod api;

use crate::agent::Assistant;
use crate::cli::Args;
use log::info;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

pub use self::api::{ router, ApiError, AppState };

pub struct Server {
    addr: String,
    assistant: Arc<Assistant>,
    args: Args,
}

impl Server {
    pub fn new(addr: String, assistant: Arc<Assistant>, args: Args) -> Self {
        Self { addr, assistant, args }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let addr = self.addr.parse::<SocketAddr>()?;
        let app = router(AppState::new(Arc::clone(&self.assistant), self.args.turn_rate_limit));

        match (self.args.enable_tls, &self.args.tls_cert_path, &self.args.tls_key_path) {
            (true, Some(cert_path), Some(key_path)) => {
                let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                    cert_path,
                    key_path
                ).await?;
                info!("HTTPS server listening on: https://{}", addr);
                axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await?;
            }
            (true, _, _) => {
                return Err("ENABLE_TLS requires both TLS_CERT_PATH and TLS_KEY_PATH".into());
            }
            _ => {
                let listener = tokio::net::TcpListener
                    ::bind(addr).await
                    .map_err(|e| format!("Failed to bind HTTP server to {}: {}", addr, e))?;
                info!("HTTP server listening on: http://{}", addr);
                axum::serve(listener, app.into_make_service()).await?;
            }
        }

        Ok(())
    }
}
