//! Literature survey web server
//!
//! Serves the browser UI and the JSON API from `litsurvey_lib::http_server`.
//!
//! Usage:
//!   GEMINI_API_KEY=... LITSURVEY_BIND=0.0.0.0:8501 litsurvey-server
//!
//! Or with args:
//!   litsurvey-server --config /path/to/settings.json --bind 127.0.0.1:8501

use clap::Parser;
use litsurvey_lib::http_server::{build_router, AppState};
use litsurvey_lib::settings::Settings;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "litsurvey-server",
    version,
    about = "Literature survey web UI",
    after_help = "Environment variables:
  GEMINI_API_KEY     Gemini API key (default backend)
  ANTHROPIC_API_KEY  Anthropic API key
  LITSURVEY_BACKEND  gemini | anthropic
  LITSURVEY_MODEL    Model name override
  LITSURVEY_PDF_DIR  Keep downloaded PDFs in this directory
  LITSURVEY_BIND     Bind address (default: 127.0.0.1:8501)
  RUST_LOG           Log filter (default: info)"
)]
struct Args {
    /// Settings file (default: <data dir>/litsurvey/settings.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind address, overrides LITSURVEY_BIND and the settings file
    #[arg(long)]
    bind: Option<String>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing();

    let mut settings = Settings::load_with_env(args.config.as_deref());
    if let Some(bind) = args.bind {
        settings.bind_addr = bind;
    }
    let bind_addr = settings.bind_addr.clone();

    if settings.has_api_key() {
        tracing::info!(backend = settings.llm_backend.as_str(), model = settings.model_name(), "Model configured");
    } else {
        // Server still starts; survey requests fail with a configuration error
        tracing::warn!("{} not set; surveys will fail until it is configured", settings.llm_backend.key_env_var());
    }

    let app = build_router(AppState::new(settings));

    // Bind and serve
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", bind_addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Listening on http://{}", bind_addr);
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_bind_and_config_flags() {
        let args = Args::try_parse_from([
            "litsurvey-server", "--bind", "0.0.0.0:9000", "--config", "/tmp/settings.json",
        ])
        .unwrap();
        assert_eq!(args.bind.as_deref(), Some("0.0.0.0:9000"));
        assert_eq!(args.config, Some(PathBuf::from("/tmp/settings.json")));
    }
}
