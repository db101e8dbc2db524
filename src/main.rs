use anyhow::Context;

use code_inbox::app::App;
use code_inbox::config::AppConfig;
use code_inbox::pipeline::spawn_retention_sweep;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;

    eprintln!("📬 Code Inbox v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Primary keys: {} ({})",
        config.credentials.available_primaries().len(),
        config.providers.primary_model
    );
    eprintln!(
        "   Secondary: {}",
        if config.credentials.has_secondary() {
            config.providers.secondary_model.as_str()
        } else {
            "none"
        }
    );
    eprintln!("   Inbound: http://0.0.0.0:{}/api/inbound", config.port);
    eprintln!("   Codes:   http://0.0.0.0:{}/api/codes", config.port);
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!(
        "   Notifications: {}",
        if config.notify.enabled {
            format!("{} target(s)", config.notify.targets.len())
        } else {
            "disabled".to_string()
        }
    );

    let app = App::build(&config)
        .await
        .context("failed to start service")?;

    let _sweep_handle = spawn_retention_sweep(
        app.db.clone(),
        config.retention_windows(),
        config.sweep_interval,
    );

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "HTTP server started");
    axum::serve(listener, app.router).await?;

    Ok(())
}
