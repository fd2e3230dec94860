use pdf_chat::ChatConfig;
use pdf_chat_service::create_app;
use tokio::net::TcpListener;
use tracing::{Level, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Missing credentials or an unreadable document stop us before we serve anything
    let config = match ChatConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let app = match create_app(&config).await {
        Ok(app) => app,
        Err(e) => {
            error!("Startup failed: {}", e);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    let addr = listener.local_addr()?;

    info!("PDF chat service starting on {}", addr);
    info!("Chat UI: http://{}/", addr);
    info!("Health check endpoint: http://{}/health", addr);
    info!("JSON API: POST http://{}/api/sessions", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
