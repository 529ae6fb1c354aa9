pub mod agent;
pub mod cli;
pub mod gitlab;
pub mod history;
pub mod llm;
pub mod models;
pub mod search;
pub mod server;
pub mod tools;

use agent::Assistant;
use cli::Args;
use log::info;
use server::Server;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Database URL: {}", args.database_url);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Max Steps per Turn: {}", args.max_steps);
    info!("Turn Rate Limit: {}/s", args.turn_rate_limit);
    info!("GitLab URL: {}", args.gitlab_url);
    info!("GitLab Token Set: {}", args.gitlab_token.as_deref().is_some_and(|t| !t.trim().is_empty()));
    info!("GitLab Max Pages: {}", args.gitlab_max_pages);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let assistant = Arc::new(Assistant::new(&args).await?);
    info!("Starting server on: {}", args.server_addr);
    let server = Server::new(args.server_addr.clone(), assistant, args.clone());
    server.run().await?;

    Ok(())
}
