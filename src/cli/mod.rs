use clap::Parser;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a GitLab assistant. You can list, create, update and delete \
projects, list groups, and manage README.md files with the tools available to you. \
Ask for required parameters (such as a project name and namespace id) when they are missing \
and confirm with the user before creating or deleting anything.";

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Server Args ---
    /// Host address and port for the HTTP server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Maximum number of chat turns accepted per second across all clients.
    #[arg(long, env = "TURN_RATE_LIMIT", default_value = "10")]
    pub turn_rate_limit: u32,

    // --- History Store Args ---
    /// Connection URL of the SQLite chat history database (e.g., sqlite://chat.db, sqlite::memory:)
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://chat.db")]
    pub database_url: String,

    // --- Chat LLM Provider Args ---
    /// Type of OpenAI-compatible provider for chat completion (openai, cerebras, groq, xai, deepseek, ollama)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "cerebras")]
    pub chat_llm_type: String,

    /// Base URL for the Chat LLM provider API (e.g., https://api.cerebras.ai/v1)
    #[arg(long, env = "CHAT_BASE_URL")] // No default, provider type decides
    pub chat_base_url: Option<String>,

    /// API Key for the Chat LLM provider.
    #[arg(long, env = "CHAT_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Model name for chat completion (e.g., gpt-oss-120b, gpt-4o, llama3)
    #[arg(long, env = "CHAT_MODEL")] // No default, provider type decides
    pub chat_model: Option<String>,

    /// System prompt sent ahead of every conversation.
    #[arg(long, env = "SYSTEM_PROMPT", default_value = DEFAULT_SYSTEM_PROMPT)]
    pub system_prompt: String,

    /// Maximum number of model steps (tool-call rounds) in a single turn.
    #[arg(long, env = "MAX_STEPS", default_value = "5")]
    pub max_steps: usize,

    // --- GitLab Args ---
    /// Base URL of the GitLab REST API.
    #[arg(long, env = "GITLAB_URL", default_value = "https://gitlab.com/api/v4")]
    pub gitlab_url: String,

    /// Access token sent as a bearer credential. Tools report a configuration error when unset.
    #[arg(long, env = "GITLAB_TOKEN")]
    pub gitlab_token: Option<String>,

    /// Upper bound on pages fetched by list tools (100 items per page).
    #[arg(long, env = "GITLAB_MAX_PAGES", default_value = "50")]
    pub gitlab_max_pages: u32,

    // --- General App Args ---
    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,

    /// Optional path to the TLS certificate file (PEM format) for enabling HTTPS. Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for enabling HTTPS. Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}
