use anyhow::{Context, Result};
use clap::Parser;
use notion_sse_bridge::backend::Credentials;
use notion_sse_bridge::{api, config};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "notion-sse-bridge")]
#[command(about = "SSE bridge forwarding tool calls to the Notion API", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override listen host
    #[arg(long)]
    host: Option<String>,

    /// Override listen port
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Override log format (pretty, json)
    #[arg(long)]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install the rustls crypto provider before the backend client does any TLS
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = config::load_config(&cli.config).with_context(|| {
        format!(
            "Failed to load configuration from: {}",
            cli.config.display()
        )
    })?;

    // Apply CLI overrides
    if let Some(host) = cli.host {
        config.http.host = host;
    }
    if let Some(port) = cli.port {
        config.http.port = port;
    }
    if let Some(log_level) = cli.log_level {
        config.logging.level = log_level;
    }
    if let Some(log_format) = cli.log_format {
        config.logging.format = log_format;
    }
    config::validate_config(&config).context("Invalid configuration after CLI overrides")?;

    init_logging(&config.logging)?;

    // Malformed credentials are fatal; absent ones only disable authentication
    let credentials = Credentials::from_env(&config.backend.credentials_env)
        .context("Failed to read backend credentials")?;

    print_banner(&config, &credentials);
    if !credentials.is_configured() {
        warn!(
            "{} is not set; backend requests will be sent without credentials",
            config.backend.credentials_env
        );
    }

    info!("Starting notion-sse-bridge...");
    api::start_server(config, credentials).await?;

    Ok(())
}

fn init_logging(config: &config::LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .try_init()?;
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .try_init()?;
        }
    }

    Ok(())
}

fn print_banner(config: &config::AppConfig, credentials: &Credentials) {
    let version = env!("CARGO_PKG_VERSION");
    let width = 59usize;
    let border = "═".repeat(width + 2);
    let line = |content: &str| {
        info!("║ {:width$} ║", content, width = width);
    };

    info!("╔{}╗", border);
    line("NOTION-SSE-BRIDGE");
    line(&format!("Tool-call bridge v{}", version));
    info!("╚{}╝", border);
    info!("");
    info!("Server Configuration:");
    info!("  → Address: {}:{}", config.http.host, config.http.port);
    info!("  → Backend: {}", config.backend.base_url);
    info!(
        "  → Backend timeout: {}s",
        config.backend.request_timeout_secs
    );
    info!(
        "  → Heartbeat: every {}s",
        config.stream.heartbeat_interval_secs
    );
    info!(
        "  → Credential headers: {} (from {})",
        credentials.len(),
        config.backend.credentials_env
    );
    info!("  → Log Level: {}", config.logging.level);
    info!("  → Log Format: {}", config.logging.format);
    info!("");
}
